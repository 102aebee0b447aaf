//! Landmark drawing on a black canvas, the classifier's input.

use std::path::Path;

use anyhow::{bail, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};

use crate::landmarks::Landmark;

/// Face mesh contours: lips, eyes, eyebrows and face oval. Drawn when no
/// tesselation table is configured.
pub const FACE_CONTOURS: [(usize, usize); 124] = [
    // Lips
    (61, 146), (146, 91), (91, 181), (181, 84), (84, 17), (17, 314),
    (314, 405), (405, 321), (321, 375), (375, 291), (61, 185), (185, 40),
    (40, 39), (39, 37), (37, 0), (0, 267), (267, 269), (269, 270),
    (270, 409), (409, 291), (78, 95), (95, 88), (88, 178), (178, 87),
    (87, 14), (14, 317), (317, 402), (402, 318), (318, 324), (324, 308),
    (78, 191), (191, 80), (80, 81), (81, 82), (82, 13), (13, 312),
    (312, 311), (311, 310), (310, 415), (415, 308),
    // Left eye
    (33, 7), (7, 163), (163, 144), (144, 145), (145, 153), (153, 154),
    (154, 155), (155, 133), (33, 246), (246, 161), (161, 160), (160, 159),
    (159, 158), (158, 157), (157, 173), (173, 133),
    // Left eyebrow
    (46, 53), (53, 52), (52, 65), (65, 55), (70, 63), (63, 105),
    (105, 66), (66, 107),
    // Right eye
    (263, 249), (249, 390), (390, 373), (373, 374), (374, 380), (380, 381),
    (381, 382), (382, 362), (263, 466), (466, 388), (388, 387), (387, 386),
    (386, 385), (385, 384), (384, 398), (398, 362),
    // Right eyebrow
    (276, 283), (283, 282), (282, 295), (295, 285), (300, 293), (293, 334),
    (334, 296), (296, 336),
    // Face oval
    (10, 338), (338, 297), (297, 332), (332, 284), (284, 251), (251, 389),
    (389, 356), (356, 454), (454, 323), (323, 361), (361, 288), (288, 397),
    (397, 365), (365, 379), (379, 378), (378, 400), (400, 377), (377, 152),
    (152, 148), (148, 176), (176, 149), (149, 150), (150, 136), (136, 172),
    (172, 58), (58, 132), (132, 93), (93, 234), (234, 127), (127, 162),
    (162, 21), (21, 54), (54, 103), (103, 67), (67, 109), (109, 10),
];

pub const POSE_CONNECTIONS: [(usize, usize); 35] = [
    // Face
    (0, 1), (1, 2), (2, 3), (3, 7), (0, 4), (4, 5), (5, 6), (6, 8), (9, 10),
    // Arms and hands
    (11, 12), (11, 13), (13, 15), (15, 17), (15, 19), (15, 21), (17, 19),
    (12, 14), (14, 16), (16, 18), (16, 20), (16, 22), (18, 20),
    // Torso and legs
    (11, 23), (12, 24), (23, 24), (23, 25), (24, 26), (25, 27), (26, 28),
    (27, 29), (28, 30), (29, 31), (30, 32), (27, 31), (28, 32),
];

pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    // Palm
    (0, 1), (0, 5), (9, 13), (13, 17), (5, 9), (0, 17),
    // Fingers, thumb to pinky
    (1, 2), (2, 3), (3, 4), (5, 6), (6, 7), (7, 8), (9, 10), (10, 11),
    (11, 12), (13, 14), (14, 15), (15, 16), (17, 18), (18, 19), (19, 20),
];

/// Edge count of the MediaPipe face mesh tesselation.
pub const TESSELATION_EDGES: usize = 2556;

/// Default score a landmark's visibility and presence must exceed to be drawn.
pub const DRAW_THRESHOLD: f32 = 0.5;

/// Edges between landmark indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connections(Vec<(usize, usize)>);

impl Connections {
    pub fn face_contours() -> Self {
        Self(FACE_CONTOURS.to_vec())
    }

    /// Load an edge table, e.g. the face mesh tesselation exported with
    /// `json.dumps(sorted(mp.solutions.face_mesh.FACEMESH_TESSELATION))`.
    ///
    /// `.json` files hold `[[a, b], ...]`; anything else is read as one
    /// `a,b` or `a b` pair per line. Every index must be below `points`.
    pub fn load(path: &Path, points: usize) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading connections {}", path.display()))?;
        let edges = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str::<Vec<(usize, usize)>>(&raw)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            parse_pairs(&raw).with_context(|| format!("parsing {}", path.display()))?
        };
        let connections = Self(edges);
        connections.check(points)?;
        Ok(connections)
    }

    fn check(&self, points: usize) -> Result<()> {
        if self.0.is_empty() {
            bail!("connection table is empty");
        }
        if let Some(&(a, b)) = self.0.iter().find(|&&(a, b)| a >= points || b >= points) {
            bail!("connection ({}, {}) is out of range for {} landmarks", a, b, points);
        }
        Ok(())
    }

    pub fn as_slice(&self) -> &[(usize, usize)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn parse_pairs(raw: &str) -> Result<Vec<(usize, usize)>> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| -> Result<(usize, usize)> {
            let mut parts = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|p| !p.is_empty());
            match (parts.next(), parts.next(), parts.next()) {
                (Some(a), Some(b), None) => Ok((a.parse()?, b.parse()?)),
                _ => bail!("expected two indices, got {:?}", line),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawStyle {
    pub point: Rgb<u8>,
    pub point_border: Rgb<u8>,
    pub radius: i32,
    pub line: Rgb<u8>,
    pub line_thickness: i32,
    /// Visibility and presence must exceed this for a landmark to be drawn.
    pub threshold: f32,
}

impl Default for DrawStyle {
    fn default() -> Self {
        Self {
            point: Rgb([128, 128, 128]),
            point_border: Rgb([224, 224, 224]),
            radius: 2,
            line: Rgb([224, 224, 224]),
            line_thickness: 2,
            threshold: DRAW_THRESHOLD,
        }
    }
}

impl DrawStyle {
    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }
}

pub fn blank_canvas(width: u32, height: u32) -> RgbImage {
    RgbImage::new(width, height)
}

/// Draw connections first, then points on top.
pub fn draw_landmarks(
    canvas: &mut RgbImage,
    landmarks: &[Landmark],
    connections: &[(usize, usize)],
    style: &DrawStyle,
) {
    let (width, height) = canvas.dimensions();
    let visible = |idx: usize| {
        landmarks
            .get(idx)
            .filter(|lm| lm.is_drawable(style.threshold))
            .map(|lm| lm.to_pixels(width, height))
    };

    for &(from, to) in connections {
        if let (Some(start), Some(end)) = (visible(from), visible(to)) {
            draw_thick_line(canvas, start, end, style.line_thickness, style.line);
        }
    }

    for idx in 0..landmarks.len() {
        if let Some((x, y)) = visible(idx) {
            let center = (x.round() as i32, y.round() as i32);
            let border = (style.radius + 1).max((style.radius as f32 * 1.2) as i32);
            draw_hollow_circle_mut(canvas, center, border, style.point_border);
            draw_hollow_circle_mut(canvas, center, style.radius, style.point);
        }
    }
}

/// Parallel one-pixel lines, stacked across the line's minor axis.
fn draw_thick_line(
    canvas: &mut RgbImage,
    start: (f32, f32),
    end: (f32, f32),
    thickness: i32,
    color: Rgb<u8>,
) {
    let steep = (end.1 - start.1).abs() > (end.0 - start.0).abs();
    for k in 0..thickness.max(1) {
        let offset = (k - (thickness - 1) / 2) as f32;
        let (dx, dy) = if steep { (offset, 0.0) } else { (0.0, offset) };
        draw_line_segment_mut(
            canvas,
            (start.0 + dx, start.1 + dy),
            (end.0 + dx, end.1 + dy),
            color,
        );
    }
}
