//! Wires the configured adapters, or placeholders when a section is absent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tradesync_core::config::OdooConfig;
use tradesync_core::{LocalId, RemoteSku, Snapshot, SyncField, TradesyncConfig};
use tradesync_sync::{
    CollaboratorError, ConnectionInfo, Erp, Marketplace, OdooClient, RestMarketplace,
};

use crate::api::ErpConnector;
use crate::error::DaemonError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Stands in for a collaborator whose config section is missing, so the
/// daemon still serves the dashboard and every sync attempt fails with a
/// clear message.
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured(pub &'static str);

impl Unconfigured {
    fn error(&self) -> CollaboratorError {
        CollaboratorError::Permanent(format!(
            "{} is not configured (add a `{}` section to config.yaml)",
            self.0, self.0
        ))
    }
}

#[async_trait]
impl Marketplace for Unconfigured {
    async fn fetch_listing(&self, _sku: &RemoteSku) -> Result<Option<Snapshot>, CollaboratorError> {
        Err(self.error())
    }

    async fn create_listing(&self, _sku: &RemoteSku, _fields: &Snapshot) -> Result<(), CollaboratorError> {
        Err(self.error())
    }

    async fn update_listing(
        &self,
        _sku: &RemoteSku,
        _fields: &Snapshot,
        _changed: &[SyncField],
    ) -> Result<(), CollaboratorError> {
        Err(self.error())
    }
}

#[async_trait]
impl Erp for Unconfigured {
    async fn fetch_product(&self, _id: &LocalId) -> Result<Option<Snapshot>, CollaboratorError> {
        Err(self.error())
    }

    async fn check_connection(&self) -> Result<ConnectionInfo, CollaboratorError> {
        Err(self.error())
    }
}

pub fn build_marketplace(config: &TradesyncConfig) -> Result<Arc<dyn Marketplace>, DaemonError> {
    match &config.marketplace {
        Some(section) => Ok(Arc::new(RestMarketplace::new(section.clone(), CONNECT_TIMEOUT)?)),
        None => {
            tracing::warn!("no marketplace section in config; sync runs will fail");
            Ok(Arc::new(Unconfigured("marketplace")))
        }
    }
}

pub fn build_erp(config: &TradesyncConfig) -> Result<Arc<dyn Erp>, DaemonError> {
    match &config.odoo {
        Some(section) => Ok(Arc::new(OdooClient::new(section.clone(), CONNECT_TIMEOUT)?)),
        None => {
            tracing::warn!("no odoo section in config; sync runs will fail");
            Ok(Arc::new(Unconfigured("odoo")))
        }
    }
}

/// Connector that builds a real [`OdooClient`] per request.
pub fn odoo_connector() -> ErpConnector {
    Arc::new(|config: OdooConfig| -> Result<Arc<dyn Erp>, CollaboratorError> {
        let client = OdooClient::new(config, CONNECT_TIMEOUT)?;
        Ok(Arc::new(client) as Arc<dyn Erp>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_sections_fail_permanently() {
        let config = TradesyncConfig::default();
        let market = build_marketplace(&config).unwrap();
        let erp = build_erp(&config).unwrap();

        let err = market.fetch_listing(&RemoteSku::from("A")).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("marketplace is not configured"));

        let err = erp.check_connection().await.unwrap_err();
        assert!(err.to_string().contains("odoo is not configured"));
    }
}
