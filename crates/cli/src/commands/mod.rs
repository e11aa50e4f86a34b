// CLI subcommand dispatch.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Subcommand;
use draftkeep_autosave::config::{self, Config};

use crate::exit_code::ExitCode;
use crate::output::OutputFormat;

pub mod config_cmd;
pub mod edit;

#[derive(Subcommand)]
pub enum Command {
    /// Open an editing session and read edit commands from stdin
    Edit(edit::EditArgs),
    /// Inspect or initialize the config file
    Config(config_cmd::ConfigArgs),
}

/// Flags shared by every subcommand.
pub struct Context {
    pub format: OutputFormat,
    pub config_path: Option<PathBuf>,
}

impl Context {
    /// The config file in effect: `--config` or the global default.
    pub fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => config::global_config_path().context("could not determine home directory"),
        }
    }

    /// Load the effective config. A missing default file means defaults;
    /// an explicit `--config` path must exist.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let path = self.config_path()?;
        if self.config_path.is_none() && !path.exists() {
            return Ok(Config::default());
        }
        load_config_file(&path)
    }
}

fn load_config_file(path: &Path) -> anyhow::Result<Config> {
    Config::load_from(path).with_context(|| format!("failed to load config `{}`", path.display()))
}

pub fn run(cmd: Command, ctx: &Context) -> anyhow::Result<ExitCode> {
    match cmd {
        Command::Edit(args) => edit::run(args, ctx),
        Command::Config(args) => config_cmd::run(args, ctx),
    }
}
