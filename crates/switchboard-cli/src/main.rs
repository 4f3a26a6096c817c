mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, crumbs::CrumbsSubcommand, rotation::RotationSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "switchboard",
    about = "Signal-priority coordination: admit signals, rotate channels, query breadcrumbs",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .switchboard/ or .git/)
    #[arg(long, global = true, env = "SWITCHBOARD_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize .switchboard/ in the current project
    Init,

    /// Show or validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Show the priority tier a signal type resolves to
    Priority {
        signal_type: String,
        /// Fail if the type is neither configured nor built in
        #[arg(long)]
        strict: bool,
    },

    /// Submit a signal to the gate and run it if admitted
    Signal {
        signal_type: String,
        /// Producer name recorded with the signal
        #[arg(long, default_value = "cli")]
        source: String,
        /// Metadata entry (repeatable): key=value
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
        /// Decide only; do not execute
        #[arg(long)]
        dry_run: bool,
    },

    /// Drive the channel rotation
    Rotation {
        #[command(subcommand)]
        subcommand: RotationSubcommand,
    },

    /// Query and maintain the breadcrumb log
    Crumbs {
        #[command(subcommand)]
        subcommand: CrumbsSubcommand,
    },

    /// Rotation position and recent signal activity
    Status,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Priority {
            signal_type,
            strict,
        } => cmd::priority::run(&root, &signal_type, strict, cli.json),
        Commands::Signal {
            signal_type,
            source,
            meta,
            dry_run,
        } => cmd::signal::run(&root, &signal_type, &source, &meta, dry_run, cli.json),
        Commands::Rotation { subcommand } => cmd::rotation::run(&root, subcommand, cli.json),
        Commands::Crumbs { subcommand } => cmd::crumbs::run(&root, subcommand, cli.json),
        Commands::Status => cmd::status::run(&root, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
