use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod handlers;

/// nuops: resolves deployment configuration and cloud credentials for a
/// multi-datacenter service topology.
///
/// The app model is read from the file named by `NUOPS_APP_MODEL`; the environment
/// to operate on comes from `--environment` or `NUOPS_CURRENT_ENVIRONMENT`.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Environment to operate on. Overrides `NUOPS_CURRENT_ENVIRONMENT`.
    #[arg(short, long, global = true)]
    pub environment: Option<String>,

    /// Directory for cached tokens. Defaults to the per-user data directory.
    #[arg(long, global = true)]
    pub token_store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Lists the environments, datacenters and services of the app model.
    #[command(alias = "ls")]
    Environments,

    /// Renders the configuration template of a service.
    Render {
        /// Service name within the datacenter.
        service: String,

        /// Datacenter id. Defaults to the environment's first datacenter.
        #[arg(short, long)]
        datacenter: Option<u32>,

        /// Root directory of the file-backed secret store.
        #[arg(long)]
        secrets: PathBuf,

        /// Directory holding `<service>.cscfg.template` files.
        #[arg(long)]
        templates: PathBuf,
    },

    /// Prints a valid access token, signing in when none is cached.
    Token {
        /// Tenant to authenticate against. Defaults to the environment's subscription tenant.
        #[arg(short, long)]
        tenant: Option<String>,

        /// Only consult the cache; never sign in or refresh.
        #[arg(long)]
        cached: bool,
    },
}
