use anyhow::Result;
use clap::Parser;
use eframe::egui;
use log::info;

use labelcam::camera;
use labelcam::cli::{self, Args, Command};
use labelcam::ui::LabelCamApp;
use labelcam::{CapturePipeline, Config, SaveOrchestrator};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let mut args = Args::parse();

    match args.command.take() {
        Some(Command::InitConfig { path }) => cli::init_config(path),
        Some(Command::Shoot { label, sub, output, burst }) => {
            let config = args.resolve_config()?;
            cli::run_shoot(config, &label, sub.as_deref(), output, burst).await
        }
        None => run_gui(args.resolve_config()?),
    }
}

fn run_gui(config: Config) -> Result<()> {
    info!("📷 Starting labelcam");
    info!(
        "Capture: crop_to_square={} target_size={:?} mode={:?}",
        config.capture.crop_to_square, config.capture.target_size, config.capture.mode
    );

    let source = camera::open_source(&config.camera);
    if source.is_none() {
        log::warn!("No camera available, captures will be refused");
    }
    let pipeline = CapturePipeline::new(source, config.capture.clone());
    let orchestrator = SaveOrchestrator::new(pipeline, &config);
    let runtime = tokio::runtime::Handle::current();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1024.0, 768.0])
            .with_min_inner_size([640.0, 480.0]),
        ..Default::default()
    };

    info!("Launching GUI application...");

    eframe::run_native(
        "labelcam",
        options,
        Box::new(move |cc| {
            setup_style(&cc.egui_ctx);
            Box::new(LabelCamApp::new(orchestrator, &config, runtime))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))?;

    info!("Application shut down gracefully");
    Ok(())
}

fn setup_style(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();

    // Larger buttons for quick tapping at the capture bench
    style.spacing.button_padding = egui::vec2(16.0, 12.0);
    style.spacing.item_spacing = egui::vec2(12.0, 8.0);

    style.text_styles.insert(
        egui::TextStyle::Button,
        egui::FontId::new(18.0, egui::FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Body,
        egui::FontId::new(16.0, egui::FontFamily::Proportional),
    );

    ctx.set_style(style);
}
