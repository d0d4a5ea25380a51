//! Depviz CLI entry point

use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "depviz")]
#[command(about = "Render dependency graphs of Go packages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Go installation holding the standard library
    #[arg(long, env = "GOROOT", default_value = "/usr/local/go", global = true)]
    goroot: PathBuf,

    /// Workspace that downloaded packages are cloned into
    #[arg(long, env = "GOPATH", global = true)]
    gopath: Option<PathBuf>,

    /// Include files that import "C"
    #[arg(long, env = "CGO_ENABLED", value_parser = BoolishValueParser::new(), global = true)]
    cgo: bool,

    /// Where rendered images are cached (defaults to $HOME/.depviz)
    #[arg(long, env = "DEPVIZ_CACHE_DIR", global = true)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (the default)
    Serve {
        /// Address to listen on
        #[arg(short, long, env = "LISTEN_ADDR", default_value = "localhost:3245")]
        listen: String,
    },
    /// Render one graph to a file
    Render {
        /// Import path of the package
        package: String,

        /// Include one node per source file
        #[arg(long)]
        leaf: bool,

        /// Maximum import depth
        #[arg(long, default_value_t = depviz_core::DEFAULT_MAX_DEPTH)]
        depth: usize,

        /// Draw the packages that import this one instead
        #[arg(long)]
        reversed: Option<String>,

        /// Output file
        #[arg(short, long, default_value = "graph.png")]
        output: PathBuf,
    },
    /// Clear the image cache
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "depviz={0},tower_http={0}",
            log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = cli.command.unwrap_or(Commands::Serve {
        listen: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "localhost:3245".to_string()),
    });

    if let Commands::Version = command {
        println!("depviz v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing::info!("depviz v{}", env!("CARGO_PKG_VERSION"));
    let config = commands::build_config(cli.gopath, cli.goroot, cli.cgo, cli.cache_dir)?;

    match command {
        Commands::Serve { listen } => commands::serve(config, listen).await,
        Commands::Render {
            package,
            leaf,
            depth,
            reversed,
            output,
        } => commands::render(config, package, leaf, depth, reversed, output).await,
        Commands::Clear => commands::clear(config),
        Commands::Version => Ok(()),
    }
}
