//! setup-image - provisions an Arch Linux container base image.
//!
//! Runs the provisioning steps (pacman and locale configuration, packages,
//! the user account, AUR helper and per-user tooling) as a dependency graph,
//! with independent steps running concurrently.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use setup_image::commands;
use setup_image::config::Config;

#[derive(Parser)]
#[command(name = "setup-image")]
#[command(about = "Arch Linux container image provisioner")]
#[command(
    after_help = "QUICK START:\n  setup-image preflight --strict        Check the host is ready\n  setup-image show plan --user-name me  Print the step order\n  setup-image setup --user-name me      Provision the image"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the image for the container's main user
    Setup {
        /// Container main user name
        #[arg(long, visible_alias = "userName")]
        user_name: String,

        /// Run even if preflight checks fail
        #[arg(long)]
        skip_preflight: bool,
    },

    /// Run preflight checks (verify host tools and environment)
    Preflight {
        /// User name to validate as well
        #[arg(long, visible_alias = "userName")]
        user_name: Option<String>,

        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
    /// Show the provisioning steps in execution order
    Plan {
        #[arg(long, visible_alias = "userName")]
        user_name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Setup {
            user_name,
            skip_preflight,
        } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(commands::cmd_setup(&config, &user_name, skip_preflight))?;
        }

        Commands::Preflight { user_name, strict } => {
            commands::cmd_preflight(&config, user_name.as_deref(), strict)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Plan { user_name } => commands::show::ShowTarget::Plan { user_name },
            };
            commands::cmd_show(show_target, &config)?;
        }
    }

    Ok(())
}
