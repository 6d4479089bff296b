use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use change_submit::{
    init_telemetry, ChangeReceipt, HermeticSubmission, InplaceSubmission, RoutingDescriptor,
    SubmitConfig, Submitter,
};

/// Exit status when another run holds the working copy.
const EXIT_LOCKED: i32 = 2;

#[derive(Parser)]
#[command(name = "change-submit")]
#[command(version)]
#[command(about = "Commit local changes and deliver them as a pull request")]
struct Cli {
    /// Configuration file (defaults to ./change-submit.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage, commit, push and open (or reuse) a pull request
    Submit {
        #[command(subcommand)]
        variant: Variant,
    },
}

#[derive(Subcommand)]
enum Variant {
    /// Fork the source repository and submit from a fresh clone
    Hermetic {
        #[command(flatten)]
        common: CommonArgs,
        /// Directory holding the changed files, copied into the clone before committing
        #[arg(long)]
        content: Option<PathBuf>,
    },
    /// Submit from an existing working copy
    Inplace {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(clap::Args)]
struct CommonArgs {
    /// Routing descriptor (TOML)
    #[arg(long)]
    routing: PathBuf,
    /// URL of a pull request already opened for this change
    #[arg(long)]
    receipt: Option<String>,
}

impl CommonArgs {
    fn load_routing(&self) -> Result<RoutingDescriptor> {
        let routing = RoutingDescriptor::from_toml_file(&self.routing)?;
        Ok(match &self.receipt {
            Some(url) => routing.with_receipt(ChangeReceipt::from(Some(url.clone()))),
            None => routing,
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Before telemetry, so RUST_LOG from .env takes effect
    let env_file = SubmitConfig::load_env_file();
    init_telemetry().context("failed to initialize logging")?;
    match env_file {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "loaded .env"),
        Ok(None) => {}
        Err(e) => tracing::warn!("ignoring unreadable .env: {}", e),
    }

    let config = SubmitConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    let code = match cli.command {
        Commands::Submit { variant } => tokio::runtime::Runtime::new()?
            .block_on(async { submit_command(&config, variant).await })?,
    };
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Runs one submission and returns the process exit status.
async fn submit_command(config: &SubmitConfig, variant: Variant) -> Result<i32> {
    let ctx = config.submission_context()?;

    let (submitter, local_path): (Box<dyn Submitter>, PathBuf) = match variant {
        Variant::Hermetic { common, content } => {
            let routing = common.load_routing()?;
            let local_path = routing.local_path.clone();
            let mut submission = HermeticSubmission::new(ctx, routing);
            if let Some(dir) = content {
                submission = submission.with_content_dir(dir);
            }
            (Box::new(submission), local_path)
        }
        Variant::Inplace { common } => {
            let routing = common.load_routing()?;
            let local_path = routing.local_path.clone();
            (Box::new(InplaceSubmission::new(ctx, routing)), local_path)
        }
    };

    match submitter.submit_changes().await {
        Ok(url) => {
            println!("{url}");
            Ok(0)
        }
        Err(e) if e.is_lock_conflict() => {
            eprintln!(
                "{} is in use by another change-submit run; try again once it finishes",
                local_path.display()
            );
            Ok(EXIT_LOCKED)
        }
        Err(e) => {
            let stage = submitter
                .failed_during()
                .unwrap_or_else(|| submitter.last_stage());
            Err(e).with_context(|| format!("submission failed during {stage}"))
        }
    }
}
