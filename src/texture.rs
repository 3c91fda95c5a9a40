use egui::{Context, TextureOptions};
use image::RgbImage;

use crate::ui::LabelCamApp;

impl LabelCamApp {
    pub fn update_preview_texture(&mut self, ctx: &Context, image: &RgbImage) {
        // Skip invalid frames to prevent a white flash
        if image.width() == 0 || image.height() == 0 {
            return;
        }

        let size = [image.width() as usize, image.height() as usize];
        let pixels = image.as_flat_samples();
        let color_image = egui::ColorImage::from_rgb(size, pixels.as_slice());

        // Reuse the texture while the frame size is stable
        let reusable = self.preview_texture.as_ref().map(|t| t.size() == size).unwrap_or(false);
        if reusable {
            if let Some(texture) = &mut self.preview_texture {
                texture.set(color_image, TextureOptions::LINEAR);
            }
        } else {
            self.preview_texture = Some(ctx.load_texture("camera_preview", color_image, TextureOptions::LINEAR));
        }
    }
}
