//! Command line arguments and the headless `shoot` command

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::camera;
use crate::capture::CapturePipeline;
use crate::config::{CaptureMode, Config, DEFAULT_CONFIG_FILE};
use crate::orchestrator::SaveOrchestrator;

#[derive(Parser, Debug)]
#[command(name = "labelcam", version, about = "Photograph items and file them by label")]
pub struct Args {
    /// Configuration file (defaults to ./labelcam_config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Capture preset: native, square_224, square_512, square_1024, burst
    #[arg(short, long, global = true)]
    pub preset: Option<String>,

    /// Use a synthetic test pattern instead of the camera
    #[arg(long, global = true)]
    pub simulate: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Take one labelled shot (or burst) without opening the window
    Shoot {
        /// Primary label
        #[arg(short, long)]
        label: String,

        /// Sub-label, required for the distinguished label
        #[arg(short, long)]
        sub: Option<String>,

        /// Base folder; without it the shot goes to the download folder
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Capture a burst regardless of the configured mode
        #[arg(long)]
        burst: bool,
    },

    /// Write the default configuration file
    InitConfig {
        path: Option<PathBuf>,
    },
}

impl Args {
    /// Config file, then preset, then flags
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from_file(path)?,
            None => Config::load()?,
        };

        if let Some(name) = &self.preset {
            let preset = Config::preset(name).ok_or_else(|| {
                anyhow!("Unknown preset '{}', expected one of: {}", name, Config::preset_names().join(", "))
            })?;
            config.capture = preset.capture;
            config.labels = preset.labels;
        }

        if self.simulate {
            config.camera.simulate = true;
        }

        config.validate()?;
        Ok(config)
    }
}

pub fn init_config(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = Config::default();
    config.paths.config_file = path.clone();
    config.save_to_file(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

pub async fn run_shoot(
    mut config: Config,
    label: &str,
    sub: Option<&str>,
    output: Option<PathBuf>,
    burst: bool,
) -> Result<()> {
    if output.is_some() {
        config.paths.base_dir = output;
    }
    if burst {
        config.capture.mode = CaptureMode::Burst;
    }

    let source = camera::open_source(&config.camera);
    let pipeline = CapturePipeline::new(source, config.capture.clone());
    let mut orchestrator = SaveOrchestrator::new(pipeline, &config);

    if !orchestrator.select_primary(label) {
        return Err(anyhow!(
            "Unknown label '{}', expected one of: {}",
            label,
            config.labels.primary.join(", ")
        ));
    }
    if let Some(sub) = sub {
        if !orchestrator.select_sub(sub) {
            return Err(anyhow!(
                "Sub-label '{}' not valid for '{}' (sub-labels apply to {}: {})",
                sub,
                label,
                config.labels.distinguished,
                config.labels.sub_labels.join(", ")
            ));
        }
    }

    let report = orchestrator
        .shoot()
        .await
        .with_context(|| orchestrator.session().status.clone())?;

    for shot in &report.shots {
        println!("{}", shot.path.display());
    }
    println!("{} ({} saved this run)", report.tier, report.shot_count);
    Ok(())
}
