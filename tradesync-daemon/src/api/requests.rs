use std::fmt;

use serde::Deserialize;

/// An id the dashboard may send as either a JSON number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Number(i64),
    Text(String),
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdValue::Number(n) => n.fmt(f),
            IdValue::Text(s) => f.write_str(s.trim()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSyncRequest {
    #[serde(rename = "type")]
    pub sync_type: String,
    #[serde(default)]
    pub entity_id: Option<IdValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertMappingRequest {
    pub odoo_product_id: IdValue,
    pub ebay_sku: String,
    #[serde(default)]
    pub odoo_name: String,
    #[serde(default)]
    pub entity_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOdooRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MappingsQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
}
