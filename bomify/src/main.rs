use std::process::{ExitCode, Termination};

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod document;
mod generate;
mod printer;

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Create an SPDX SBOM from files, images and directories
    Generate(generate::GenerateArgs),
    /// Work with existing SPDX documents
    #[command(subcommand)]
    Document(document::DocumentCommand),
}

#[derive(clap::Parser, Debug)]
#[command(
    author,
    version = env!("CARGO_PKG_VERSION"),
    about = "bomify → SPDX SBOMs for your releases",
    long_about = None
)]
pub struct Bomify {
    #[command(subcommand)]
    pub(crate) command: Command,

    /// Log filter, e.g. "info" or "bomify=debug"
    #[arg(long, env = "BOMIFY_LOG", default_value = "info", global = true)]
    log: String,
}

impl Bomify {
    async fn run(self) -> anyhow::Result<ExitCode> {
        match self.command {
            Command::Generate(args) => generate::run(args).await,
            Command::Document(cmd) => document::run(cmd).await,
        }
    }
}

#[tokio::main]
async fn main() -> impl Termination {
    let cli = Bomify::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err}");
            for (n, err) in err.chain().skip(1).enumerate() {
                if n == 0 {
                    eprintln!("Caused by:");
                }
                eprintln!("\t{err}");
            }
            ExitCode::FAILURE
        }
    }
}
