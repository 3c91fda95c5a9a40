use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use crate::camera::{SourceCapabilities, VideoSource};
use crate::config::CameraConfig;

/// Camera controller driving libcamera through `rpicam-still`.
///
/// A looping `rpicam-still` keeps the preview file fresh. Stills pause the
/// preview, since libcamera only lets one process own the sensor.
pub struct CameraController {
    config: CameraConfig,
    /// Still program actually found on this machine
    still_program: Option<String>,
    grab_available: bool,
    preview_image_path: PathBuf,
    still_image_path: PathBuf,
    preview_process: Mutex<Option<Child>>,
    /// Last frame that decoded cleanly, served while the file is being rewritten
    last_preview: Mutex<Option<RgbImage>>,
}

impl CameraController {
    pub fn new(config: &CameraConfig) -> Result<Self> {
        let temp = std::env::temp_dir();
        let mut controller = CameraController {
            config: config.clone(),
            still_program: None,
            grab_available: false,
            preview_image_path: temp.join("labelcam_preview.jpg"),
            still_image_path: temp.join("labelcam_still.png"),
            preview_process: Mutex::new(None),
            last_preview: Mutex::new(None),
        };

        controller.initialize();
        if controller.still_program.is_none() {
            return Err(anyhow!("No camera program found ({} or raspistill)", config.still_command));
        }
        controller.start_preview()?;
        Ok(controller)
    }

    /// Probe which camera programs exist
    fn initialize(&mut self) {
        log::info!("Initializing camera controller...");

        if program_exists(&self.config.still_command, "--help") {
            log::info!("Camera initialized (using {})", self.config.still_command);
            self.still_program = Some(self.config.still_command.clone());
        } else if program_exists("raspistill", "-?") {
            log::info!("Camera initialized (using legacy raspistill)");
            self.still_program = Some("raspistill".to_string());
        } else {
            log::error!("Camera initialization failed - {} not found", self.config.still_command);
        }

        self.grab_available = program_exists(&self.config.grab_command, "-version")
            && Path::new(&self.config.device).exists();
        log::debug!("Frame grab available: {}", self.grab_available);
    }

    pub fn start_preview(&self) -> Result<()> {
        let program = self
            .still_program
            .as_deref()
            .ok_or_else(|| anyhow!("Camera not available"))?;
        self.stop_preview();

        let width = self.config.preview_width.to_string();
        let height = self.config.preview_height.to_string();
        let output = self.preview_image_path.to_string_lossy().to_string();
        let args: Vec<&str> = if program == "raspistill" {
            vec!["-o", output.as_str(), "-w", width.as_str(), "-h", height.as_str(), "-q", "70", "-t", "0", "-tl", "100", "-n"]
        } else {
            vec![
                "-o", output.as_str(),
                "--width", width.as_str(),
                "--height", height.as_str(),
                "--quality", "70",
                "--timeout", "0",
                "--timelapse", "100",
                "--nopreview",
            ]
        };
        log::info!("Preview command: {} {}", program, args.join(" "));

        let child = Command::new(program)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start preview with {}", program))?;

        if let Ok(mut guard) = self.preview_process.lock() {
            *guard = Some(child);
        }
        log::info!("Camera preview started");
        Ok(())
    }

    pub fn stop_preview(&self) {
        if let Ok(mut guard) = self.preview_process.lock() {
            if let Some(mut process) = guard.take() {
                let _ = process.kill();
                let _ = process.wait();
                log::info!("Camera preview stopped");
            }
        }
    }

    async fn run_still(&self, program: &str) -> Result<RgbImage> {
        let _ = tokio::fs::remove_file(&self.still_image_path).await;
        let output_path = self.still_image_path.to_string_lossy().to_string();

        // No size arguments: the sensor's full resolution is wanted
        let args: Vec<&str> = if program == "raspistill" {
            vec!["-o", output_path.as_str(), "-e", "png", "-t", "1000", "-n"]
        } else {
            vec!["-o", output_path.as_str(), "--encoding", "png", "--timeout", "1000", "--nopreview"]
        };
        log::info!("Capture command: {} {}", program, args.join(" "));

        let output = tokio::process::Command::new(program)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", program))?;

        if !output.status.success() {
            return Err(anyhow!(
                "{} failed with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let image = image::open(&self.still_image_path)
            .context("Failed to load captured still")?
            .to_rgb8();
        let _ = tokio::fs::remove_file(&self.still_image_path).await;
        Ok(image)
    }
}

/// Run blocking work without stalling other tasks on a multi-threaded runtime
fn off_worker<R>(f: impl FnOnce() -> R) -> R {
    use tokio::runtime::{Handle, RuntimeFlavor};
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

fn program_exists(program: &str, probe_arg: &str) -> bool {
    Command::new(program)
        .arg(probe_arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

#[async_trait::async_trait]
impl VideoSource for CameraController {
    fn is_active(&self) -> bool {
        match self.preview_process.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(child) => matches!(child.try_wait(), Ok(None)),
                None => false,
            },
            Err(_) => false,
        }
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            still_photo: self.still_program.is_some(),
            frame_grab: self.grab_available,
        }
    }

    fn preview_frame(&self) -> Result<RgbImage> {
        let mut cached = self
            .last_preview
            .lock()
            .map_err(|_| anyhow!("Preview cache poisoned"))?;

        match image::open(&self.preview_image_path) {
            Ok(img) => {
                let rgb_img = img.to_rgb8();
                *cached = Some(rgb_img.clone());
                Ok(rgb_img)
            }
            Err(e) => {
                // Mid-write reads fail to decode; fall back to the last good frame
                log::debug!("Preview decode failed: {}", e);
                cached.clone().ok_or_else(|| anyhow!("No preview frame available yet"))
            }
        }
    }

    async fn take_still(&self) -> Result<RgbImage> {
        let program = self
            .still_program
            .clone()
            .ok_or_else(|| anyhow!("Camera not available"))?;

        // Reaping the preview child blocks
        off_worker(|| self.stop_preview());
        let result = self.run_still(&program).await;
        if let Err(e) = self.start_preview() {
            log::error!("Failed to restart preview: {}", e);
        }

        let image = result?;
        log::info!("Still captured: {}x{}", image.width(), image.height());
        Ok(image)
    }

    async fn grab_frame(&self) -> Result<RgbImage> {
        if !self.grab_available {
            return Err(anyhow!("Frame grab not available"));
        }

        let output = tokio::process::Command::new(&self.config.grab_command)
            .args([
                "-loglevel", "error",
                "-f", "video4linux2",
                "-i", self.config.device.as_str(),
                "-frames:v", "1",
                "-f", "image2pipe",
                "-vcodec", "png",
                "-",
            ])
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.config.grab_command))?;

        if !output.status.success() {
            return Err(anyhow!(
                "Frame grab failed with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let image = image::load_from_memory(&output.stdout)
            .context("Failed to decode grabbed frame")?
            .to_rgb8();
        log::info!("Frame grabbed: {}x{}", image.width(), image.height());
        Ok(image)
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        self.stop_preview();

        // Clean up any remaining temp files
        for path in [&self.preview_image_path, &self.still_image_path] {
            if path.exists() {
                let _ = std::fs::remove_file(path);
            }
        }
        log::info!("Camera controller dropped");
    }
}
