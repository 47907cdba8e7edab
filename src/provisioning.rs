use crate::storage::{CredentialStore, Credentials};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// How the node joins a network after boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMode {
    /// Connected to the stored network
    Station { ssid: String },
    /// No usable credentials; a local configuration interface is needed
    ConfigurationPortal,
}

impl NetworkMode {
    pub fn is_station(&self) -> bool {
        matches!(self, NetworkMode::Station { .. })
    }
}

/// Attempts to join a network with stored credentials
#[async_trait]
pub trait NetworkLink: Send + Sync {
    async fn connect(&self, credentials: &Credentials) -> bool;
}

/// Link for hosts whose networking is managed by the operating system.
///
/// Any stored credentials count as a successful join.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostNetworkLink;

#[async_trait]
impl NetworkLink for HostNetworkLink {
    async fn connect(&self, credentials: &Credentials) -> bool {
        info!(
            "Network '{}' is managed by the host, assuming connected",
            credentials.ssid
        );
        true
    }
}

/// Decide the network mode at boot.
///
/// Missing credentials, unreadable credentials, a refused join or a join
/// that outlives `connect_timeout` all fall back to the configuration portal.
pub async fn provision(
    credentials: &CredentialStore,
    link: &dyn NetworkLink,
    connect_timeout: Duration,
) -> NetworkMode {
    let stored = match credentials.load().await {
        Ok(Some(stored)) => stored,
        Ok(None) => {
            info!("No stored network credentials, starting configuration portal");
            return NetworkMode::ConfigurationPortal;
        }
        Err(e) => {
            warn!("Cannot read network credentials ({}), starting configuration portal", e);
            return NetworkMode::ConfigurationPortal;
        }
    };

    info!("Connecting to network '{}'", stored.ssid);
    match timeout(connect_timeout, link.connect(&stored)).await {
        Ok(true) => {
            info!("Connected to network '{}'", stored.ssid);
            NetworkMode::Station { ssid: stored.ssid }
        }
        Ok(false) => {
            warn!("Network '{}' refused the connection", stored.ssid);
            NetworkMode::ConfigurationPortal
        }
        Err(_) => {
            warn!(
                "No connection to '{}' within {:?}",
                stored.ssid, connect_timeout
            );
            NetworkMode::ConfigurationPortal
        }
    }
}
