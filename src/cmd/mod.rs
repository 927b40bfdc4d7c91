mod check;
mod rules;

use std::path::PathBuf;
use std::process::ExitCode;

use aclguard::config::PathSet;
use aclguard::logs;
use aclguard::principal::Principal;
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};

#[async_trait]
pub trait RunCommand {
    async fn run(&self) -> Result<ExitCode>;
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Directory holding `guard.toml`. Defaults to `$ACLGUARD_CONFIG`, then
    /// `$XDG_CONFIG_HOME/aclguard`, then `~/.config/aclguard`.
    #[arg(long)]
    pub config_dir: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn build_path_set(&self) -> Result<PathSet> {
        PathSet::new(self.config_dir.clone())
    }
}

#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Log level, one of: error, warn, info, debug.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl LogArgs {
    pub fn init(&self) -> Result<()> {
        logs::init(&self.log_level)
    }
}

#[derive(Args, Debug, Clone)]
pub struct PrincipalArgs {
    /// The caller's principal as a JSON object. The caller is anonymous when
    /// omitted.
    #[arg(short, long)]
    pub principal: Option<String>,
}

impl PrincipalArgs {
    pub fn parse(&self) -> Result<Option<Principal>> {
        match self.principal {
            Some(ref s) => {
                let principal = Principal::from_json(s).context("parse principal json")?;
                Ok(Some(principal))
            }
            None => Ok(None),
        }
    }
}

#[derive(Parser)]
#[command(author, version, about)]
pub struct App {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    Check(check::CheckArgs),
    Rules(rules::RulesArgs),
}

#[async_trait]
impl RunCommand for App {
    async fn run(&self) -> Result<ExitCode> {
        match &self.command {
            Commands::Check(args) => args.run().await,
            Commands::Rules(args) => args.run().await,
        }
    }
}
