use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "devgrid",
    about = "devgrid — node-local session admission for device grids",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a node config and list its slots
    Check {
        /// Path to node.toml
        #[arg(short, long, default_value = "node.toml")]
        config: String,
    },
    /// Show which slots would serve a request, without contacting the farm.
    ///
    /// The request is a JSON object of capabilities, e.g.
    /// '{"platformName":"ANDROID","deviceName":"Pixel 7"}'.
    Match {
        /// Path to node.toml
        #[arg(short, long, default_value = "node.toml")]
        config: String,
        /// Requested capabilities as JSON
        #[arg(short, long)]
        request: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("devgrid=info".parse()?)
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => commands::check(&config),
        Commands::Match {
            config,
            request,
            format,
        } => commands::dry_run(&config, &request, &format),
    }
}
