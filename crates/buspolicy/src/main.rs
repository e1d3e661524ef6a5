use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use buspolicy::{
    check_status, export_json, render_summary, run_load, AppConfig, AppError,
};

/// buspolicy: D-Bus bus access policy compiler
///
/// Compiles busconfig XML fragments into the layered rule model a bus
/// proxy enforces, and reports what loaded, what was skipped and what
/// failed.
#[derive(Parser, Debug)]
#[command(name = "buspolicy", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile the fragment set and print a load summary
    Check {
        /// Fragment files to compile in order, instead of the configured set
        files: Vec<PathBuf>,

        /// Exit non-zero when any fragment failed
        #[arg(long)]
        strict: bool,
    },

    /// Compile the fragment set and print the rule model as JSON
    Export {
        /// Fragment files to compile in order, instead of the configured set
        files: Vec<PathBuf>,
    },

    /// Write a default configuration file
    InitConfig {
        /// Where to write it (defaults to --config or the system path)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("buspolicy=debug,buspolicy_compiler=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("buspolicy=info,buspolicy_compiler=warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig, AppError> {
    match path {
        Some(p) => AppConfig::load(p),
        None => {
            let default_path = AppConfig::default_config_path();
            AppConfig::load(&default_path)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Commands::Check { files, strict } => cmd_check(cli.config.as_ref(), &files, strict),
        Commands::Export { files } => cmd_export(cli.config.as_ref(), &files),
        Commands::InitConfig { path } => cmd_init_config(cli.config.as_ref(), path),
    }
}

fn cmd_check(config_path: Option<&PathBuf>, files: &[PathBuf], strict: bool) -> Result<(), AppError> {
    let config = load_config(config_path)?;
    let report = run_load(&config, files);
    print!("{}", render_summary(&report));
    check_status(&report, &config, strict)
}

fn cmd_export(config_path: Option<&PathBuf>, files: &[PathBuf]) -> Result<(), AppError> {
    let config = load_config(config_path)?;
    let report = run_load(&config, files);
    println!("{}", export_json(&report.store)?);
    check_status(&report, &config, false)
}

fn cmd_init_config(config_path: Option<&PathBuf>, path: Option<PathBuf>) -> Result<(), AppError> {
    let save_path = path
        .or_else(|| config_path.cloned())
        .unwrap_or_else(AppConfig::default_config_path);
    if save_path.exists() {
        return Err(AppError::Config(format!(
            "{} already exists, not overwriting",
            save_path.display()
        )));
    }

    let config = AppConfig::default();
    config.save(&save_path)?;
    info!(path = %save_path.display(), "wrote default configuration");
    println!("Configuration written to {}", save_path.display());
    Ok(())
}
