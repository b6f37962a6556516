//! `factkeep init` command
//!
//! Creates `.factkeep/` with a default config and an empty project store.
//!
//! # Usage
//! ```bash
//! factkeep init                    # Initialize in current directory
//! factkeep init /path/to/project   # Initialize in specific path
//! ```

use anyhow::{bail, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;

use crate::config::{Config, DIR_NAME};
use crate::core::storage::Storage;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path to initialize (default: current directory)
    pub path: Option<PathBuf>,

    /// Force re-initialization
    #[arg(short, long)]
    pub force: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    let base_path = args.path.unwrap_or_else(|| PathBuf::from("."));
    let dir = base_path.join(DIR_NAME);

    if dir.exists() && !args.force {
        bail!(
            "{} is already initialized. Use --force to reinitialize.",
            base_path.display()
        );
    }

    fs::create_dir_all(&dir)?;

    let config_path = dir.join("config.toml");
    if !config_path.exists() || args.force {
        Config::default().save_to(&config_path)?;
    }

    let db_path = dir.join("data.db");
    Storage::open(&db_path)?;

    println!("Initialized factkeep in {}", base_path.display());
    println!("   Config: {}", config_path.display());
    println!("   Database: {}", db_path.display());
    println!("\nNext steps:");
    println!("  factkeep add \"Alice\" works_at \"Acme\" --quote \"Alice works at Acme\"");
    println!("  factkeep recall \"Acme\"");

    Ok(())
}
