use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbImage};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{sleep, Duration};

use crate::camera::VideoSource;
use crate::config::CaptureConfig;
use crate::crop;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("No active video source")]
    NoActiveSource,

    /// The source is live but no rung produced a frame
    #[error("No frame available: {0}")]
    NoFrame(String),

    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
}

/// Which rung of the quality ladder produced a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTier {
    StillPhoto,
    FrameGrab,
    Preview,
}

impl CaptureTier {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureTier::StillPhoto => "still-photo",
            CaptureTier::FrameGrab => "frame-grab",
            CaptureTier::Preview => "preview",
        }
    }
}

impl fmt::Display for CaptureTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mode: {}", self.name())
    }
}

/// PNG bytes plus the dimensions they decode to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl EncodedImage {
    pub fn encode_png(image: &RgbImage) -> Result<Self, CaptureError> {
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ColorType::Rgb8,
        )?;
        Ok(Self {
            bytes: bytes.into(),
            width: image.width(),
            height: image.height(),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct Capture {
    pub image: EncodedImage,
    pub tier: CaptureTier,
}

/// One rung of the capture ladder
#[async_trait::async_trait]
pub trait TierProvider: Send + Sync {
    fn tier(&self) -> CaptureTier;

    fn is_available(&self, source: &dyn VideoSource) -> bool;

    async fn grab(&self, source: &dyn VideoSource) -> anyhow::Result<RgbImage>;
}

pub struct StillPhotoTier;

#[async_trait::async_trait]
impl TierProvider for StillPhotoTier {
    fn tier(&self) -> CaptureTier {
        CaptureTier::StillPhoto
    }

    fn is_available(&self, source: &dyn VideoSource) -> bool {
        source.capabilities().still_photo
    }

    async fn grab(&self, source: &dyn VideoSource) -> anyhow::Result<RgbImage> {
        source.take_still().await
    }
}

pub struct FrameGrabTier;

#[async_trait::async_trait]
impl TierProvider for FrameGrabTier {
    fn tier(&self) -> CaptureTier {
        CaptureTier::FrameGrab
    }

    fn is_available(&self, source: &dyn VideoSource) -> bool {
        source.capabilities().frame_grab
    }

    async fn grab(&self, source: &dyn VideoSource) -> anyhow::Result<RgbImage> {
        source.grab_frame().await
    }
}

pub struct PreviewTier;

#[async_trait::async_trait]
impl TierProvider for PreviewTier {
    fn tier(&self) -> CaptureTier {
        CaptureTier::Preview
    }

    fn is_available(&self, _source: &dyn VideoSource) -> bool {
        true
    }

    async fn grab(&self, source: &dyn VideoSource) -> anyhow::Result<RgbImage> {
        source.preview_frame()
    }
}

/// Turns "what the camera sees right now" into an encoded image
pub struct CapturePipeline {
    source: Option<Arc<dyn VideoSource>>,
    tiers: Vec<Box<dyn TierProvider>>,
    config: CaptureConfig,
}

impl CapturePipeline {
    /// Pipeline with the standard still → grab → preview ladder
    pub fn new(source: Option<Arc<dyn VideoSource>>, config: CaptureConfig) -> Self {
        let tiers: Vec<Box<dyn TierProvider>> =
            vec![Box::new(StillPhotoTier), Box::new(FrameGrabTier), Box::new(PreviewTier)];
        Self::with_tiers(source, tiers, config)
    }

    pub fn with_tiers(
        source: Option<Arc<dyn VideoSource>>,
        tiers: Vec<Box<dyn TierProvider>>,
        config: CaptureConfig,
    ) -> Self {
        Self { source, tiers, config }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn source(&self) -> Option<&Arc<dyn VideoSource>> {
        self.source.as_ref()
    }

    pub fn has_active_source(&self) -> bool {
        self.source.as_ref().map(|s| s.is_active()).unwrap_or(false)
    }

    /// Size tag for filenames when output is a fixed square
    pub fn square_size(&self) -> Option<u32> {
        if self.config.crop_to_square {
            self.config.target_size
        } else {
            None
        }
    }

    /// Settle, then capture one frame
    pub async fn capture(&self) -> Result<Capture, CaptureError> {
        if !self.has_active_source() {
            return Err(CaptureError::NoActiveSource);
        }
        self.settle().await;
        self.capture_now().await
    }

    /// Give auto focus and exposure time to converge
    pub async fn settle(&self) {
        if self.config.settle_ms > 0 {
            sleep(Duration::from_millis(self.config.settle_ms)).await;
        }
    }

    /// Capture one frame without the settle delay
    pub async fn capture_now(&self) -> Result<Capture, CaptureError> {
        let source = match &self.source {
            Some(source) if source.is_active() => Arc::clone(source),
            _ => return Err(CaptureError::NoActiveSource),
        };

        let (frame, tier) = self.grab_first(source.as_ref()).await?;
        log::debug!("Raw frame {}x{} via {}", frame.width(), frame.height(), tier.name());

        let processed = crop::crop_and_resample(&frame, self.config.crop_to_square, self.config.target_size);
        let image = EncodedImage::encode_png(&processed)?;

        Ok(Capture { image, tier })
    }

    async fn grab_first(&self, source: &dyn VideoSource) -> Result<(RgbImage, CaptureTier), CaptureError> {
        let mut last_error = None;
        for provider in &self.tiers {
            if !provider.is_available(source) {
                continue;
            }
            match provider.grab(source).await {
                Ok(frame) => return Ok((frame, provider.tier())),
                Err(e) => {
                    log::warn!("{} capture failed: {:#}", provider.tier().name(), e);
                    last_error = Some(format!("{:#}", e));
                }
            }
        }
        Err(CaptureError::NoFrame(
            last_error.unwrap_or_else(|| "no capture tier available".to_string()),
        ))
    }
}
