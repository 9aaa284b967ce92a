//! Marketplace adapter for a JSON listing API with bearer-token auth.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};

use tradesync_core::config::MarketplaceConfig;
use tradesync_core::{RemoteSku, Snapshot, SyncField};

use crate::collaborator::Marketplace;
use crate::error::CollaboratorError;
use crate::http::{build_client, classify_request_error, status_error};

#[derive(Debug, Serialize, Deserialize)]
struct ListingBody {
    sku: String,
    title: String,
    quantity: i64,
    price_cents: i64,
}

#[derive(Debug, Serialize)]
struct UpdateBody<'a> {
    title: &'a str,
    quantity: i64,
    price_cents: i64,
    changed_fields: &'a [SyncField],
}

pub struct RestMarketplace {
    client: Client,
    base: Url,
    config: MarketplaceConfig,
}

impl RestMarketplace {
    pub fn new(config: MarketplaceConfig, connect_timeout: Duration) -> Result<Self, CollaboratorError> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            CollaboratorError::Permanent(format!("invalid marketplace url {}: {e}", config.base_url))
        })?;
        if base.cannot_be_a_base() {
            return Err(CollaboratorError::Permanent(format!(
                "invalid marketplace url {}: not a base url",
                config.base_url
            )));
        }
        Ok(Self {
            client: build_client(connect_timeout)?,
            base,
            config,
        })
    }

    /// Base url extended by `segments`, each percent-encoded as one path
    /// segment. A SKU such as `A/B` or `SKU#1` stays a single segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, CollaboratorError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| {
                CollaboratorError::Permanent(format!("invalid marketplace url {}", self.base))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn listing_url(&self, sku: &RemoteSku) -> Result<Url, CollaboratorError> {
        self.endpoint(&["listings", &sku.0])
    }
}

#[async_trait]
impl Marketplace for RestMarketplace {
    async fn fetch_listing(&self, sku: &RemoteSku) -> Result<Option<Snapshot>, CollaboratorError> {
        let what = format!("fetch listing {sku}");
        let response = self
            .client
            .get(self.listing_url(sku)?)
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| classify_request_error(&what, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(&what, response).await);
        }
        let body: ListingBody = response
            .json()
            .await
            .map_err(|e| classify_request_error(&what, e))?;
        Ok(Some(Snapshot {
            title: body.title,
            quantity: body.quantity,
            price_cents: body.price_cents,
        }))
    }

    async fn create_listing(&self, sku: &RemoteSku, fields: &Snapshot) -> Result<(), CollaboratorError> {
        let what = format!("create listing {sku}");
        let body = ListingBody {
            sku: sku.0.clone(),
            title: fields.title.clone(),
            quantity: fields.quantity,
            price_cents: fields.price_cents,
        };
        let response = self
            .client
            .post(self.endpoint(&["listings"])?)
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_request_error(&what, e))?;

        if !response.status().is_success() {
            return Err(status_error(&what, response).await);
        }
        Ok(())
    }

    async fn update_listing(
        &self,
        sku: &RemoteSku,
        fields: &Snapshot,
        changed: &[SyncField],
    ) -> Result<(), CollaboratorError> {
        let what = format!("update listing {sku}");
        let body = UpdateBody {
            title: &fields.title,
            quantity: fields.quantity,
            price_cents: fields.price_cents,
            changed_fields: changed,
        };
        let response = self
            .client
            .put(self.listing_url(sku)?)
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_request_error(&what, e))?;

        if !response.status().is_success() {
            return Err(status_error(&what, response).await);
        }
        Ok(())
    }
}
