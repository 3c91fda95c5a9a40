use anyhow::{anyhow, Result};
use image::{ImageBuffer, Rgb, RgbImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::CameraConfig;

/// What a video source can deliver besides its live preview
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCapabilities {
    /// Discrete full-resolution still photos
    pub still_photo: bool,
    /// Direct raw frame grabs without a photo capture event
    pub frame_grab: bool,
}

/// The single active camera of a capture session
#[async_trait::async_trait]
pub trait VideoSource: Send + Sync {
    fn is_active(&self) -> bool;

    fn capabilities(&self) -> SourceCapabilities;

    /// Latest frame of the live preview
    fn preview_frame(&self) -> Result<RgbImage>;

    /// Native size of the live preview, if a frame is available
    fn native_size(&self) -> Option<(u32, u32)> {
        self.preview_frame().ok().map(|frame| frame.dimensions())
    }

    async fn take_still(&self) -> Result<RgbImage> {
        Err(anyhow!("Still capture not supported"))
    }

    async fn grab_frame(&self) -> Result<RgbImage> {
        Err(anyhow!("Frame grab not supported"))
    }
}

/// Start the configured source; `None` when no camera could be opened
pub fn open_source(config: &CameraConfig) -> Option<Arc<dyn VideoSource>> {
    if config.simulate {
        return Some(Arc::new(TestPatternSource::new(config.preview_width, config.preview_height)));
    }

    #[cfg(feature = "camera")]
    {
        match crate::camera_controller::CameraController::new(config) {
            Ok(controller) => return Some(Arc::new(controller)),
            Err(e) => log::warn!("Camera initialization failed: {:#}", e),
        }
    }

    None
}

/// Synthetic source for development machines without a camera
pub struct TestPatternSource {
    width: u32,
    height: u32,
    started: Instant,
    active: AtomicBool,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        log::info!("Using {}x{} test pattern instead of a camera", width, height);
        Self {
            width,
            height,
            started: Instant::now(),
            active: AtomicBool::new(true),
        }
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    fn render(&self) -> RgbImage {
        let time = self.started.elapsed().as_secs_f32();
        let (width, height) = (self.width, self.height);
        ImageBuffer::from_fn(width, height, |x, y| {
            let r = ((x as f32 / width as f32 * 255.0) + (time * 0.8).sin() * 50.0) as u8;
            let g = ((y as f32 / height as f32 * 255.0) + (time * 0.5).cos() * 50.0) as u8;
            let b = (((x + y) as f32 / (width + height) as f32 * 255.0) + (time * 1.1).sin() * 50.0) as u8;
            Rgb([r.saturating_add(60), g.saturating_add(60), b.saturating_add(60)])
        })
    }
}

#[async_trait::async_trait]
impl VideoSource for TestPatternSource {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::default()
    }

    fn preview_frame(&self) -> Result<RgbImage> {
        if !self.is_active() {
            return Err(anyhow!("Test pattern stopped"));
        }
        Ok(self.render())
    }

    fn native_size(&self) -> Option<(u32, u32)> {
        self.is_active().then_some((self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pattern_source_preview_only() {
        let source = TestPatternSource::new(64, 48);
        assert!(source.is_active());
        assert_eq!(source.capabilities(), SourceCapabilities::default());
        assert_eq!(source.preview_frame().unwrap().dimensions(), (64, 48));
        assert_eq!(source.native_size(), Some((64, 48)));
        assert!(source.take_still().await.is_err());
        assert!(source.grab_frame().await.is_err());
    }

    #[test]
    fn test_open_simulated_source() {
        let config = CameraConfig {
            simulate: true,
            preview_width: 32,
            preview_height: 16,
            ..crate::config::Config::default().camera
        };
        let source = open_source(&config).unwrap();
        assert_eq!(source.native_size(), Some((32, 16)));
    }

    #[test]
    fn test_pattern_source_stop() {
        let source = TestPatternSource::new(8, 8);
        source.stop();
        assert!(!source.is_active());
        assert!(source.preview_frame().is_err());
        assert_eq!(source.native_size(), None);
    }
}
