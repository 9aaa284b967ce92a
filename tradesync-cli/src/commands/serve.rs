//! `tradesync serve`: run the daemon in the foreground.

use anyhow::{Context, Result};
use clap::Args;

use tradesync_daemon::start_blocking;

#[derive(Args, Debug)]
pub struct ServeArgs {}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        start_blocking(&home).context("daemon exited with error")
    }
}
