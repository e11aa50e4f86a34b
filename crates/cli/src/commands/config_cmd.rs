// `draftkeep config`: show, locate, or initialize the config file.

use anyhow::Context as _;
use clap::{Args, Subcommand};
use draftkeep_autosave::config::{Config, TOKEN_ENV_VAR};
use serde::Serialize;

use super::Context;
use crate::exit_code::ExitCode;
use crate::output;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Write a config file with default settings
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Serialize)]
struct ConfigView {
    path: String,
    exists: bool,
    token_env_var: &'static str,
    token_set: bool,
    config: Config,
}

#[derive(Debug, Serialize)]
struct PathView {
    path: String,
    exists: bool,
}

pub fn run(args: ConfigArgs, ctx: &Context) -> anyhow::Result<ExitCode> {
    let path = ctx.config_path()?;
    match args.action {
        ConfigAction::Show => {
            let view = ConfigView {
                path: path.display().to_string(),
                exists: path.exists(),
                token_env_var: TOKEN_ENV_VAR,
                token_set: std::env::var_os(TOKEN_ENV_VAR).is_some(),
                config: ctx.load_config()?,
            };
            output::print_output(ctx.format, &view, format_show)?;
        }
        ConfigAction::Path => {
            let view = PathView { path: path.display().to_string(), exists: path.exists() };
            output::print_output(ctx.format, &view, |v| v.path.clone())?;
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "config `{}` already exists; pass --force to overwrite",
                    path.display()
                );
            }
            Config::default()
                .save_to(&path)
                .with_context(|| format!("failed to write config `{}`", path.display()))?;
            let view = PathView { path: path.display().to_string(), exists: true };
            output::print_output(ctx.format, &view, |v| format!("Wrote {}", v.path))?;
        }
    }
    Ok(ExitCode::Success)
}

fn format_show(view: &ConfigView) -> String {
    let body = toml::to_string_pretty(&view.config).unwrap_or_else(|e| format!("<{e}>"));
    let source = if view.exists { "" } else { " (not found, using defaults)" };
    let token = if view.token_set { "set" } else { "not set" };
    format!("# {}{source}\n# {} {token}\n{body}", view.path, view.token_env_var)
}
