//! Application entry point for the procedural forest viewer.
//!
//! This binary parses the command line, sets up logging and eframe/egui,
//! and delegates all interactive logic and rendering to [`Viewer`] from
//! the `viewer` module.

mod camera;
mod viewer;

use clap::Parser;
use forest_core::config::ForestConfig;
use forest_core::error::Result;
use std::path::PathBuf;
use std::process::ExitCode;
use viewer::Viewer;

#[derive(Parser, Debug)]
#[command(name = "forest-view")]
#[command(version = "0.1.0")]
#[command(about = "Grow a procedural forest and fell its trees", long_about = None)]
struct Args {
    /// TOML forest config; the default broadleaf forest is used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fixed planting seed, overriding the config's
    #[arg(short, long)]
    seed: Option<u64>,
}

impl Args {
    /// Reads `--config` if given and applies command-line overrides.
    fn forest_config(&self) -> Result<ForestConfig> {
        let mut cfg = match &self.config {
            Some(path) => ForestConfig::from_path(path)?,
            None => ForestConfig::default(),
        };
        if self.seed.is_some() {
            cfg.population.seed = self.seed;
        }
        Ok(cfg)
    }
}

/// Starts the native eframe application.
///
/// ### Returns
/// - `ExitCode::SUCCESS` if the application runs to completion.
/// - `ExitCode::FAILURE` if the config cannot be loaded or eframe fails
///   to create the native window or event loop.
fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let cfg = match args.forest_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            let path = args.config.as_deref().unwrap_or(std::path::Path::new("<none>"));
            eprintln!("forest-view: cannot use config {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let options = eframe::NativeOptions::default();
    let run = eframe::run_native(
        "Procedural Forest",
        options,
        Box::new(move |_cc| Ok(Box::new(Viewer::with_config(cfg)))),
    );
    match run {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("viewer failed: {e}");
            ExitCode::FAILURE
        }
    }
}
