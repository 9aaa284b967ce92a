//! Odoo ERP adapter over the JSON-RPC endpoint (`<url>/jsonrpc`).
//!
//! `common.login` authenticates and yields the user id that every
//! `object.execute_kw` call needs. The id is cached after the first
//! successful login.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use tradesync_core::config::OdooConfig;
use tradesync_core::{LocalId, Snapshot};

use crate::collaborator::{ConnectionInfo, Erp};
use crate::error::CollaboratorError;
use crate::http::{build_client, classify_request_error, join_url, status_error};

const PRODUCT_MODEL: &str = "product.product";
const PRODUCT_FIELDS: [&str; 3] = ["name", "qty_available", "list_price"];

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorData {
    #[serde(default)]
    message: String,
}

impl RpcError {
    fn describe(&self) -> String {
        match &self.data {
            Some(data) if !data.message.is_empty() => format!("{}: {}", self.message, data.message),
            _ => self.message.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProductRow {
    name: String,
    #[serde(default)]
    qty_available: f64,
    #[serde(default)]
    list_price: f64,
}

impl From<ProductRow> for Snapshot {
    fn from(row: ProductRow) -> Self {
        Snapshot {
            title: row.name,
            quantity: row.qty_available.floor() as i64,
            price_cents: (row.list_price * 100.0).round() as i64,
        }
    }
}

pub struct OdooClient {
    client: Client,
    config: OdooConfig,
    uid: OnceCell<i64>,
    request_id: AtomicU64,
}

impl OdooClient {
    pub fn new(config: OdooConfig, connect_timeout: Duration) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(connect_timeout)?,
            config,
            uid: OnceCell::new(),
            request_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, service: &str, method: &str, args: Value) -> Result<Value, CollaboratorError> {
        let what = format!("odoo {service}.{method}");
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": { "service": service, "method": method, "args": args },
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });

        let response = self
            .client
            .post(join_url(&self.config.url, "jsonrpc"))
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_request_error(&what, e))?;

        if !response.status().is_success() {
            return Err(status_error(&what, response).await);
        }

        let rpc: RpcResponse = response
            .json()
            .await
            .map_err(|e| classify_request_error(&what, e))?;
        if let Some(err) = rpc.error {
            return Err(CollaboratorError::Permanent(format!("{what}: {}", err.describe())));
        }
        Ok(rpc.result.unwrap_or(Value::Null))
    }

    async fn login(&self) -> Result<i64, CollaboratorError> {
        let result = self
            .call(
                "common",
                "login",
                json!([self.config.db_name, self.config.username, self.config.api_key]),
            )
            .await?;
        match result.as_i64() {
            Some(uid) if uid > 0 => Ok(uid),
            _ => Err(CollaboratorError::Permanent(
                "odoo login rejected the credentials".to_string(),
            )),
        }
    }

    async fn uid(&self) -> Result<i64, CollaboratorError> {
        self.uid.get_or_try_init(|| self.login()).await.copied()
    }
}

#[async_trait]
impl Erp for OdooClient {
    async fn fetch_product(&self, id: &LocalId) -> Result<Option<Snapshot>, CollaboratorError> {
        let product_id: i64 = id.0.trim().parse().map_err(|_| {
            CollaboratorError::Permanent(format!("odoo product id {id:?} is not an integer"))
        })?;
        let uid = self.uid().await?;

        let result = self
            .call(
                "object",
                "execute_kw",
                json!([
                    self.config.db_name,
                    uid,
                    self.config.api_key,
                    PRODUCT_MODEL,
                    "read",
                    [[product_id]],
                    { "fields": PRODUCT_FIELDS },
                ]),
            )
            .await?;

        let rows: Vec<ProductRow> = serde_json::from_value(result).map_err(|e| {
            CollaboratorError::Permanent(format!("odoo product {product_id}: malformed row: {e}"))
        })?;
        Ok(rows.into_iter().next().map(Snapshot::from))
    }

    async fn check_connection(&self) -> Result<ConnectionInfo, CollaboratorError> {
        let uid = self.login().await?;
        Ok(ConnectionInfo {
            user_id: uid,
            message: format!("Connected to Odoo as user {uid}"),
        })
    }
}
