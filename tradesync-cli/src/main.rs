//! Tradesync: ERP to marketplace sync daemon and its command-line client.
//!
//! # Usage
//!
//! ```text
//! tradesync serve
//! tradesync health [--json]
//! tradesync logs [--limit <n>]
//! tradesync mappings [--status <status>] [--type <type>] [--json]
//! tradesync mapping add <product-id> <sku> [--name <name>] [--type <type>]
//! tradesync sync <Inventory|Product|Order> [--entity <id>] [--wait]
//! tradesync job <id>
//! tradesync cancel <id>
//! tradesync test-odoo [--url ..] [--db ..] [--username ..] [--api-key ..]
//! ```
//!
//! Every command except `serve` talks to a running daemon over HTTP.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    client::Client, health::HealthArgs, jobs::JobArgs, logs::LogsArgs,
    mappings::{MappingCommand, MappingsArgs},
    serve::ServeArgs,
    sync::SyncArgs,
    test_odoo::TestOdooArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tradesync",
    version,
    about = "Keep marketplace listings in sync with Odoo products",
    long_about = None,
)]
struct Cli {
    /// Daemon base URL; defaults to `server.bind` from config.yaml.
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sync daemon in the foreground.
    Serve(ServeArgs),

    /// Show queue and worker pool health.
    Health(HealthArgs),

    /// List recent sync runs.
    Logs(LogsArgs),

    /// List product mappings.
    Mappings(MappingsArgs),

    /// Manage a single product mapping.
    Mapping {
        #[command(subcommand)]
        command: MappingCommand,
    },

    /// Queue a sync job.
    Sync(SyncArgs),

    /// Show one job.
    Job(JobArgs),

    /// Cancel a queued job.
    Cancel(JobArgs),

    /// Test Odoo credentials without saving them.
    TestOdoo(TestOdooArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = || Client::connect(cli.server.as_deref());
    match cli.command {
        Commands::Serve(args) => args.run(),
        Commands::Health(args) => args.run(&client()?),
        Commands::Logs(args) => args.run(&client()?),
        Commands::Mappings(args) => args.run(&client()?),
        Commands::Mapping { command } => commands::mappings::run(command, &client()?),
        Commands::Sync(args) => args.run(&client()?),
        Commands::Job(args) => args.show(&client()?),
        Commands::Cancel(args) => args.cancel(&client()?),
        Commands::TestOdoo(args) => args.run(&client()?),
    }
}
