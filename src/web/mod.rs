mod handlers;
mod server;

#[cfg(test)]
mod tests;

pub use server::{build_router, ServerState, WebServer};
