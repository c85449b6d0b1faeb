//! Filmstack command-line interface.
//!
//! Evaluate and optimise thin-film coatings from TOML job files:
//! ```sh
//! filmstack init-db coatings.db
//! filmstack structures --db coatings.db
//! filmstack spectrum job.toml
//! filmstack optimize job.toml -o results/
//! ```
//!
//! Logging goes through `env_logger`; set `RUST_LOG=debug` for per-iteration
//! optimizer output.

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DatabaseConfig;

#[derive(Parser)]
#[command(name = "filmstack")]
#[command(about = "Filmstack: multilayer thin-film coating spectra and thickness optimisation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the transmission/reflection spectrum of a stored structure.
    Spectrum {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Tune layer thicknesses towards the job's target reflection.
    Optimize {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file without running it.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// List stored structures.
    Structures {
        /// SQLite database (default: built-in catalogue).
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List stored materials and substrates.
    Materials {
        /// SQLite database (default: built-in catalogue).
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Create an SQLite database seeded with the built-in catalogue.
    InitDb {
        /// Database file to create.
        path: PathBuf,
        /// Import into an existing database, replacing entries of the same name.
        #[arg(long)]
        force: bool,
    },
}

fn database(db: Option<PathBuf>) -> DatabaseConfig {
    DatabaseConfig {
        path: db,
        cache_capacity: None,
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Spectrum { config, output } => {
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let result = runner::run_spectrum(&job)?;
            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            if job.output.save_csv {
                runner::write_spectrum_csv(
                    &out_dir.join("spectrum.csv"),
                    &result.structure,
                    &result.wavelengths,
                    &result.spectrum,
                )?;
            }
            if job.output.save_json {
                runner::write_json(&result.spectrum, &out_dir.join("spectrum.json"))?;
            }
            Ok(())
        }
        Commands::Optimize { config, output } => {
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let result = runner::run_optimize(&job)?;
            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));

            if job.output.save_csv {
                runner::write_spectrum_csv(
                    &out_dir.join("optimized_spectrum.csv"),
                    &result.report.structure,
                    &result.wavelengths,
                    &result.spectrum,
                )?;
            }
            if job.output.save_json {
                runner::write_json(&result.initial, &out_dir.join("initial_structure.json"))?;
                runner::write_json(&result.report, &out_dir.join("optimization.json"))?;
            }
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            runner::validate_job(&job)?;
            println!("Configuration is valid: {}", config.display());
            Ok(())
        }
        Commands::Structures { db } => runner::list_structures(&database(db)),
        Commands::Materials { db } => runner::list_materials(&database(db)),
        Commands::InitDb { path, force } => runner::init_database(&path, force),
    }
}
