//! Kiln CLI
//!
//! Developer tool for building and inspecting asset pipelines.

use anyhow::Result;
use clap::{Parser, Subcommand};
use kiln_core::Mode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Kiln - declarative asset pipeline
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file or project directory
    #[arg(short, long, default_value = "kiln.yaml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new Kiln project
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Project name (defaults to directory name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Build the project
    Build {
        /// Build mode (development or production)
        #[arg(short, long)]
        mode: Option<Mode>,

        /// Maximum number of assets processed concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Skip post-build plugins
        #[arg(long)]
        no_plugins: bool,

        /// Output directory, relative to the project root
        #[arg(short, long)]
        output_dir: Option<String>,
    },

    /// Validate configuration, stages and plugins without building
    Validate,

    /// Show project status
    Status,

    /// Remove the output directory
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { path, name } => {
            commands::init::run(&path, name.as_deref()).await?;
        }
        Commands::Build {
            mode,
            workers,
            no_plugins,
            output_dir,
        } => {
            let overrides = commands::build::Overrides {
                mode,
                workers,
                no_plugins,
                output_dir,
                verbose: cli.verbose,
            };
            commands::build::run(&cli.config, overrides).await?;
        }
        Commands::Validate => {
            commands::validate::run(&cli.config).await?;
        }
        Commands::Status => {
            commands::status::run(&cli.config).await?;
        }
        Commands::Clean => {
            commands::clean::run(&cli.config).await?;
        }
    }

    Ok(())
}
