mod bounded_log;
mod credentials;
mod line_store;
mod record;

#[cfg(test)]
mod tests;

pub use bounded_log::{retain_newest, BoundedLog};
pub use credentials::{CredentialStore, Credentials};
pub use line_store::{FsLineStore, LineStore, MemoryLineStore};
pub use record::{AggregationRecord, DataPoint};
