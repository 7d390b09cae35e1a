//! Recruiter: conversational recruitment-screening service

use clap::{Args, Parser, Subcommand};
use recruiter_core::{BindMode, RecruiterConfig};
use recruiter_gateway::{init_logging, provider_from_config, start_gateway};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "recruiter",
    about = "Recruitment screening agent: posting lookup, candidate resolution and scripted interviews"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve,
    /// Print the effective configuration as TOML
    PrintConfig,
    /// Show version
    Version,
}

#[derive(Args)]
struct Overrides {
    /// Config file (missing file means defaults)
    #[arg(short, long, global = true, default_value = "recruiter.toml")]
    config: PathBuf,
    #[arg(short, long, global = true)]
    port: Option<u16>,
    /// loopback or lan
    #[arg(short, long, global = true)]
    bind: Option<String>,
    /// Directory holding vagas.json, prospects.json and applicants.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[arg(short, long, global = true)]
    model: Option<String>,
    /// Answer with an echoing mock instead of calling the model API
    #[arg(long, global = true)]
    offline: bool,
}

impl Overrides {
    fn apply(&self, config: &mut RecruiterConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = &self.bind {
            config.server.bind = BindMode::parse(bind);
        }
        if let Some(dir) = &self.data_dir {
            config.data.dir = dir.clone();
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone());
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RecruiterConfig::load(&cli.overrides.config)?;
    cli.overrides.apply(&mut config);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let _guard = init_logging(&config.logging)?;
            let provider = provider_from_config(&config.llm, cli.overrides.offline)?;
            start_gateway(config, provider).await?;
        }

        Commands::PrintConfig => {
            print!("{}", config.to_toml());
        }

        Commands::Version => {
            println!("recruiter v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
