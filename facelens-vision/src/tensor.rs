//! Image to tensor conversion shared by every model in the pipeline.

use anyhow::Result;
use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Per-channel `(pixel * scale - mean) / std`, applied in RGB order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub scale: f32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Normalization {
    /// Raw pixel values in [0, 255].
    pub const RAW: Self = Self {
        scale: 1.0,
        mean: [0.0; 3],
        std: [1.0; 3],
    };

    /// Pixel values in [0, 1].
    pub const UNIT: Self = Self {
        scale: 1.0 / 255.0,
        mean: [0.0; 3],
        std: [1.0; 3],
    };

    fn apply(&self, channel: usize, value: u8) -> f32 {
        (value as f32 * self.scale - self.mean[channel]) / self.std[channel]
    }
}

/// Planar `[1, 3, H, W]` tensor.
pub fn to_nchw(img: &RgbImage, order: ChannelOrder, norm: Normalization) -> Result<Array4<f32>> {
    let (width, height) = img.dimensions();
    let pixel_count = (width * height) as usize;
    let mut input_data = vec![0.0f32; 3 * pixel_count];

    // Split into channel planes for better cache locality
    let (first, rest) = input_data.split_at_mut(pixel_count);
    let (second, third) = rest.split_at_mut(pixel_count);
    let (r_plane, g_plane, b_plane) = match order {
        ChannelOrder::Rgb => (first, second, third),
        ChannelOrder::Bgr => (third, second, first),
    };

    for (i, px) in img.pixels().enumerate() {
        r_plane[i] = norm.apply(0, px[0]);
        g_plane[i] = norm.apply(1, px[1]);
        b_plane[i] = norm.apply(2, px[2]);
    }

    Ok(Array4::from_shape_vec(
        (1, 3, height as usize, width as usize),
        input_data,
    )?)
}

/// Interleaved `[1, H, W, 3]` RGB tensor, the layout MediaPipe models take.
pub fn to_nhwc(img: &RgbImage, norm: Normalization) -> Result<Array4<f32>> {
    let (width, height) = img.dimensions();
    let data = img
        .as_raw()
        .iter()
        .enumerate()
        .map(|(i, &v)| norm.apply(i % 3, v))
        .collect();

    Ok(Array4::from_shape_vec(
        (1, height as usize, width as usize, 3),
        data,
    )?)
}

/// An image scaled to fit a square canvas with black padding.
#[derive(Debug, Clone)]
pub struct Letterbox {
    pub image: RgbImage,
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Letterbox {
    pub fn new(img: &DynamicImage, target_size: u32) -> Self {
        let (orig_width, orig_height) = img.dimensions();
        let max_dim = orig_width.max(orig_height).max(1);
        let scale = target_size as f32 / max_dim as f32;
        let new_width = ((orig_width as f32 * scale) as u32).clamp(1, target_size);
        let new_height = ((orig_height as f32 * scale) as u32).clamp(1, target_size);

        let resized = img.resize_exact(new_width, new_height, FilterType::Triangle);

        let mut canvas = DynamicImage::new_rgb8(target_size, target_size);
        let offset_x = (target_size - new_width) / 2;
        let offset_y = (target_size - new_height) / 2;
        image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

        Self {
            image: canvas.to_rgb8(),
            scale,
            offset_x,
            offset_y,
        }
    }

    /// Map a point on the padded canvas back to source image pixels.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.offset_x as f32) / self.scale,
            (y - self.offset_y as f32) / self.scale,
        )
    }
}
