use serde::Serialize;

/// A landmark in coordinates normalized to the source image, x and y in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
            presence: None,
        }
    }

    /// Pixel position in an image of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }

    /// Drawn only when every score the model gave exceeds `threshold`.
    pub fn is_drawable(&self, threshold: f32) -> bool {
        self.visibility.map_or(true, |v| v > threshold)
            && self.presence.map_or(true, |p| p > threshold)
    }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
