use super::line_store::LineStore;
use crate::error::StorageError;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Stored station credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

impl Credentials {
    pub fn new<S: Into<String>, P: Into<String>>(ssid: S, password: P) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Whole-value text store for network credentials.
///
/// Unlike the bounded log each resource holds exactly one value that is
/// overwritten, never appended or trimmed.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn LineStore>,
    ssid_resource: String,
    password_resource: String,
}

impl CredentialStore {
    pub fn new<S: Into<String>, P: Into<String>>(
        store: Arc<dyn LineStore>,
        ssid_resource: S,
        password_resource: P,
    ) -> Self {
        Self {
            store,
            ssid_resource: ssid_resource.into(),
            password_resource: password_resource.into(),
        }
    }

    /// Stored credentials, `None` when no SSID has been saved
    pub async fn load(&self) -> Result<Option<Credentials>, StorageError> {
        let ssid = self.store.read_first_line(&self.ssid_resource).await?;
        let Some(ssid) = ssid.filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        let password = self
            .store
            .read_first_line(&self.password_resource)
            .await?
            .unwrap_or_default();

        Ok(Some(Credentials { ssid, password }))
    }

    /// Overwrite both values; each must fit on a single line
    pub async fn save(&self, credentials: &Credentials) -> Result<(), StorageError> {
        single_line(&self.ssid_resource, &credentials.ssid)?;
        single_line(&self.password_resource, &credentials.password)?;

        self.store
            .write_line(&self.ssid_resource, &credentials.ssid)
            .await?;
        self.store
            .write_line(&self.password_resource, &credentials.password)
            .await?;

        info!("Stored credentials for network '{}'", credentials.ssid);
        Ok(())
    }

    /// Erase both values; erasing absent credentials succeeds
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(&self.ssid_resource).await?;
        self.store.remove(&self.password_resource).await?;

        info!("Stored network credentials erased");
        Ok(())
    }
}

fn single_line(resource: &str, value: &str) -> Result<(), StorageError> {
    if value.contains(['\n', '\r']) {
        return Err(StorageError::InvalidValue {
            resource: resource.to_string(),
            details: "line breaks are not allowed".to_string(),
        });
    }
    Ok(())
}
