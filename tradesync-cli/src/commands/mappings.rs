//! `tradesync mappings` and `tradesync mapping add`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tabled::{settings::Style, Table, Tabled};

use super::client::Client;
use super::paint_status;

/// Arguments for `tradesync mappings`.
#[derive(Args, Debug)]
pub struct MappingsArgs {
    /// Only mappings in this status (Synced, Error, OutOfSync, Syncing).
    #[arg(long)]
    pub status: Option<String>,

    /// Only mappings of this entity type (Inventory, Product, Order).
    #[arg(long = "type")]
    pub entity_type: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum MappingCommand {
    /// Create or replace the mapping for an Odoo product.
    Add(AddArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Odoo product id.
    pub product_id: String,

    /// Marketplace SKU the product is listed under.
    pub sku: String,

    /// Display name; defaults to the product id.
    #[arg(long)]
    pub name: Option<String>,

    /// Entity type of the mapping.
    #[arg(long = "type", default_value = "Product")]
    pub entity_type: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct Mapping {
    id: String,
    ebay_sku: String,
    odoo_name: String,
    entity_type: String,
    last_synced_at: Option<DateTime<Utc>>,
    status: String,
    last_error: Option<String>,
}

#[derive(Tabled)]
struct MappingRow {
    #[tabled(rename = "product")]
    product: String,
    #[tabled(rename = "sku")]
    sku: String,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "type")]
    entity_type: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "last synced")]
    last_synced: String,
    #[tabled(rename = "error")]
    error: String,
}

impl MappingsArgs {
    pub fn run(self, client: &Client) -> Result<()> {
        let mut query = Vec::new();
        if let Some(status) = &self.status {
            query.push(format!("status={status}"));
        }
        if let Some(entity_type) = &self.entity_type {
            query.push(format!("type={entity_type}"));
        }
        let path = if query.is_empty() {
            "/mappings".to_string()
        } else {
            format!("/mappings?{}", query.join("&"))
        };

        let mappings: Vec<Mapping> = client.get(&path)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&mappings)
                    .context("failed to serialize mappings JSON")?
            );
            return Ok(());
        }
        if mappings.is_empty() {
            println!("No mappings match.");
            return Ok(());
        }

        let errors = mappings.iter().filter(|m| m.status == "Error").count();
        let rows: Vec<MappingRow> = mappings
            .into_iter()
            .map(|m| MappingRow {
                product: m.id,
                sku: m.ebay_sku,
                name: m.odoo_name,
                entity_type: m.entity_type,
                status: paint_status(&m.status).to_string(),
                last_synced: m
                    .last_synced_at
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string()),
                error: m.last_error.unwrap_or_default(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        if errors > 0 {
            println!("Run 'tradesync sync Inventory' to retry failed mappings.");
        }
        Ok(())
    }
}

pub fn run(command: MappingCommand, client: &Client) -> Result<()> {
    match command {
        MappingCommand::Add(args) => {
            let body = json!({
                "odooProductId": args.product_id,
                "ebaySku": args.sku,
                "odooName": args.name.unwrap_or_default(),
                "entityType": args.entity_type,
            });
            let stored: Value = client.post("/mappings", &body)?;
            println!(
                "mapped product {} to SKU {}",
                stored["id"].as_str().unwrap_or_default(),
                stored["ebaySku"].as_str().unwrap_or_default(),
            );
        }
    }
    Ok(())
}
