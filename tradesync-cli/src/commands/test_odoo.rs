//! `tradesync test-odoo`: check Odoo credentials through the daemon.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use serde_json::json;

use tradesync_core::TradesyncConfig;

use super::client::Client;

/// Flags override the `odoo` section of config.yaml.
#[derive(Args, Debug)]
pub struct TestOdooArgs {
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub db: Option<String>,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Outcome {
    success: bool,
    message: String,
}

impl TestOdooArgs {
    pub fn run(self, client: &Client) -> Result<()> {
        let saved = TradesyncConfig::load()
            .context("failed to load config.yaml")?
            .odoo;
        let pick = |flag: Option<String>, stored: Option<&String>| {
            flag.or_else(|| stored.cloned()).unwrap_or_default()
        };
        let body = json!({
            "url": pick(self.url, saved.as_ref().map(|c| &c.url)),
            "dbName": pick(self.db, saved.as_ref().map(|c| &c.db_name)),
            "username": pick(self.username, saved.as_ref().map(|c| &c.username)),
            "apiKey": pick(self.api_key, saved.as_ref().map(|c| &c.api_key)),
        });

        let outcome: Outcome = client.post("/config/test-odoo", &body)?;
        if outcome.success {
            println!("{} {}", "✓".green().bold(), outcome.message);
            Ok(())
        } else {
            println!("{} {}", "✗".red().bold(), outcome.message);
            bail!("odoo connection test failed")
        }
    }
}
