// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! MDIB developer CLI.
//!
//! ```text
//! mdib [--config-dir DIR] demo [--vmds N] [--channels N] [--rounds N]
//! mdib [--config-dir DIR] prefs show|init
//! ```
//!
//! Exits with code `0` on success and non-zero on error.
#![allow(clippy::print_stdout)]

mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mdib_app_core::config::ConfigService;
use mdib_app_core::prefs::ProviderPrefs;
use mdib_config_fs::FsConfigStore;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "MDIB store developer CLI")]
struct Args {
    /// Directory holding provider prefs (defaults to the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a sample device and run scripted description and state writes
    Demo {
        /// Number of VMDs (overrides prefs)
        #[arg(long)]
        vmds: Option<usize>,
        /// Channels per VMD (overrides prefs)
        #[arg(long)]
        channels: Option<usize>,
        /// Metric update rounds (overrides prefs)
        #[arg(long)]
        rounds: Option<u64>,
    },
    /// Inspect or initialise provider prefs
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum PrefsAction {
    /// Print the effective prefs as JSON
    Show,
    /// Store the default prefs unless some are already stored
    Init,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let store = match &args.config_dir {
        Some(dir) => FsConfigStore::with_base(dir),
        None => FsConfigStore::new(),
    }
    .context("open config store")?;
    let service = ConfigService::new(store);
    let mut prefs = ProviderPrefs::load(&service).context("load provider prefs")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&prefs.log_filter))
        .context("parse log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.cmd.unwrap_or(Command::Demo {
        vmds: None,
        channels: None,
        rounds: None,
    }) {
        Command::Demo {
            vmds,
            channels,
            rounds,
        } => {
            prefs.sample_vmds = vmds.unwrap_or(prefs.sample_vmds);
            prefs.channels_per_vmd = channels.unwrap_or(prefs.channels_per_vmd);
            prefs.update_rounds = rounds.unwrap_or(prefs.update_rounds);
            let summary = demo::run(&prefs)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Prefs {
            action: PrefsAction::Show,
        } => {
            println!("{}", serde_json::to_string_pretty(&prefs)?);
        }
        Command::Prefs {
            action: PrefsAction::Init,
        } => {
            let existing: Option<ProviderPrefs> = service
                .load(mdib_app_core::prefs::PROVIDER_PREFS_KEY)
                .context("probe provider prefs")?;
            if existing.is_none() {
                ProviderPrefs::default()
                    .save(&service)
                    .context("save provider prefs")?;
            }
            println!("{}", service.store().base().display());
        }
    }
    Ok(())
}
