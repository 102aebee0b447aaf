/// Rendering landmark sets onto the classifier canvas
use facelens_vision::pipeline::{FrameLandmarks, CLASSIFIER_CANVAS_SIZE};
use facelens_vision::render::{Connections, DrawStyle, FACE_CONTOURS, POSE_CONNECTIONS};
use facelens_vision::Landmark;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};

fn lit_pixels(canvas: &RgbImage) -> usize {
    canvas.pixels().filter(|p| **p != Rgb([0, 0, 0])).count()
}

/// Points spread on an ellipse so every contour segment has some length.
fn ring(count: usize, cx: f32, cy: f32, rx: f32, ry: f32) -> Vec<Landmark> {
    (0..count)
        .map(|i| {
            let t = i as f32 / count as f32 * std::f32::consts::TAU;
            Landmark::new(cx + rx * t.cos(), cy + ry * t.sin(), 0.0)
        })
        .collect()
}

fn render(frame: &FrameLandmarks, width: u32, height: u32) -> RgbImage {
    frame.render(
        width,
        height,
        &Connections::face_contours(),
        &DrawStyle::default(),
    )
}

#[test]
fn test_empty_frame_renders_black() {
    let canvas = render(&FrameLandmarks::default(), 320, 180);
    assert_eq!(canvas.dimensions(), (320, 180));
    assert_eq!(lit_pixels(&canvas), 0);
}

#[test]
fn test_face_contours_are_drawn() {
    let frame = FrameLandmarks {
        face: Some(ring(468, 0.5, 0.5, 0.2, 0.3)),
        ..Default::default()
    };
    let canvas = render(&frame, 1920, 1080);
    let lit = lit_pixels(&canvas);
    println!("face pixels lit: {}", lit);
    assert!(lit > FACE_CONTOURS.len());

    // nothing is drawn outside the ring's bounding box
    assert_eq!(canvas.get_pixel(10, 10), &Rgb([0, 0, 0]));
    assert_eq!(canvas.get_pixel(1900, 1070), &Rgb([0, 0, 0]));
}

#[test]
fn test_loaded_tesselation_draws_more_than_contours() {
    // spokes from the first point to every other one cross the ring's interior
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tesselation.json");
    let edges: Vec<[usize; 2]> = (1..468).map(|i| [0, i]).collect();
    std::fs::write(&path, serde_json::to_string(&edges).unwrap()).unwrap();
    let tesselation = Connections::load(&path, 468).unwrap();

    let frame = FrameLandmarks {
        face: Some(ring(468, 0.5, 0.5, 0.2, 0.3)),
        ..Default::default()
    };
    let meshed = frame.render(1920, 1080, &tesselation, &DrawStyle::default());
    assert!(lit_pixels(&meshed) > lit_pixels(&render(&frame, 1920, 1080)));
    // the ring's center lies on a spoke
    assert_eq!(meshed.get_pixel(960, 540), &Rgb([224, 224, 224]));
}

#[test]
fn test_hidden_pose_landmarks_are_skipped() {
    let mut pose = ring(33, 0.5, 0.5, 0.3, 0.3);
    for lm in &mut pose {
        lm.visibility = Some(0.1);
    }
    let hidden = FrameLandmarks {
        pose: Some(pose.clone()),
        ..Default::default()
    };
    assert_eq!(lit_pixels(&render(&hidden, 640, 480)), 0);

    for lm in &mut pose {
        lm.visibility = Some(0.9);
    }
    let visible = FrameLandmarks {
        pose: Some(pose),
        ..Default::default()
    };
    assert!(lit_pixels(&render(&visible, 640, 480)) > POSE_CONNECTIONS.len());
}

#[test]
fn test_canvas_survives_downscale_for_classifier() {
    let frame = FrameLandmarks {
        face: Some(ring(468, 0.5, 0.5, 0.25, 0.35)),
        ..Default::default()
    };
    let canvas = DynamicImage::ImageRgb8(render(&frame, 1920, 1080));
    let small = canvas
        .resize_exact(
            CLASSIFIER_CANVAS_SIZE,
            CLASSIFIER_CANVAS_SIZE,
            FilterType::Triangle,
        )
        .to_rgb8();
    assert!(lit_pixels(&small) > 0);
}
