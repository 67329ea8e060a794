use crate::types::{BoundingBox, FrameSize, PositiveSample};

/// Convert raw descriptor extents (x_max, y_max, x_min, y_min, inclusive,
/// top-left origin) into an x/y/width/height box clamped inside the frame.
///
/// The clamp leaves a one-pixel margin at the right and bottom edges; the
/// downstream sample generator requires boxes that never touch the frame
/// boundary. Non-positive extents are passed through for the caller to
/// judge.
pub fn clamped_bbox(raw: [f32; 4], frame: FrameSize) -> BoundingBox {
    let x_max = raw[0].floor() as i32;
    let y_max = raw[1].floor() as i32;
    let x_min = raw[2].floor() as i32;
    let y_min = raw[3].floor() as i32;

    let mut bbox = BoundingBox::new(x_min, y_min, x_max - x_min, y_max - y_min);
    if bbox.x + bbox.width >= frame.width as i32 {
        bbox.width = frame.width as i32 - bbox.x - 1;
    }
    if bbox.y + bbox.height >= frame.height as i32 {
        bbox.height = frame.height as i32 - bbox.y - 1;
    }
    bbox
}

/// Render one positive list entry: `<path> <count> <x1> <y1> <w1> <h1> ...`.
pub fn format_positive_line(sample: &PositiveSample) -> String {
    let mut line = format!("{} {}", sample.image_path.display(), sample.boxes.len());
    for bbox in &sample.boxes {
        line.push_str(&format!(
            " {} {} {} {}",
            bbox.x, bbox.y, bbox.width, bbox.height
        ));
    }
    line
}
