use image::imageops::{self, FilterType};
use image::RgbImage;

/// Region of a frame in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    /// Largest square centered in a `width` x `height` frame.
    ///
    /// Offsets round toward zero, so an odd difference leaves the extra
    /// pixel on the right/bottom edge.
    pub fn center_square(width: u32, height: u32) -> Self {
        let side = width.min(height);
        Self {
            x: (width - side) / 2,
            y: (height - side) / 2,
            width: side,
            height: side,
        }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }

    pub fn is_square(&self) -> bool {
        self.width == self.height
    }
}

/// Apply the square crop and optional resample to a raw frame
pub fn crop_and_resample(frame: &RgbImage, crop_to_square: bool, target_size: Option<u32>) -> RgbImage {
    let (width, height) = frame.dimensions();
    let region = if crop_to_square {
        CropRegion::center_square(width, height)
    } else {
        CropRegion::full(width, height)
    };

    let cropped = if region == CropRegion::full(width, height) {
        frame.clone()
    } else {
        imageops::crop_imm(frame, region.x, region.y, region.width, region.height).to_image()
    };

    match target_size {
        Some(size) if region.is_square() && region.width != size => {
            imageops::resize(&cropped, size, size, FilterType::Lanczos3)
        }
        Some(size) if !region.is_square() => {
            log::debug!("Ignoring target size {} for non-square {}x{} frame", size, width, height);
            cropped
        }
        _ => cropped,
    }
}
