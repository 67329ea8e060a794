use std::path::PathBuf;

// Tags the dataset uses in the first descriptor field.
pub const MISC_TAG: &str = "MISC_SIGNS";
// Sentinel appearing in the last descriptor field for unusable instances.
pub const OTHER_SENTINEL: &str = "OTHER";

/// Visibility tag of one labeled sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Blurred,
    Occluded,
    SideRoad,
    Misc,
    Other(String),
}

impl Visibility {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "VISIBLE" => Visibility::Visible,
            "BLURRED" => Visibility::Blurred,
            "OCCLUDED" => Visibility::Occluded,
            "SIDE_ROAD" => Visibility::SideRoad,
            MISC_TAG => Visibility::Misc,
            other => Visibility::Other(other.to_string()),
        }
    }

    pub fn is_visible(&self) -> bool {
        matches!(self, Visibility::Visible)
    }
}

/// One labeled sign entry within an annotation line.
///
/// Sentinel entries (MISC_SIGNS / OTHER) are never materialized as
/// descriptors, so `category` and `name` are always present here.
#[derive(Debug, Clone, PartialEq)]
pub struct SignDescriptor {
    pub visibility: Visibility,
    /// Raw extents in source order: x_max, y_max, x_min, y_min.
    pub raw_coords: [f32; 4],
    pub category: String,
    pub name: String,
}

/// Parsed form of one annotation line.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    pub image_name: String,
    /// Descriptors surviving the sentinel (and, if enabled, visibility)
    /// filters, in line order.
    pub signs: Vec<SignDescriptor>,
    /// True when the line carried at least one non-sentinel descriptor,
    /// even if every one of them was filtered from `signs`.
    pub has_labeled_sign: bool,
}

impl AnnotationRecord {
    /// An image with no usable sign at all belongs in the negative set.
    pub fn is_negative(&self) -> bool {
        !self.has_labeled_sign
    }
}

/// Frame dimensions of the source footage.
///
/// The STS dataset is 1280x960 throughout, but the geometry must not assume
/// that, so every consumer takes this as a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 960,
        }
    }
}

/// Axis-aligned box in pixel coordinates, top-left origin.
///
/// Width and height may come out non-positive from the coordinate
/// transform; consumers check `is_usable` before relying on the box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    /// A box the downstream consumers can actually crop: positive extent,
    /// fully inside the frame.
    pub fn is_usable(&self, frame: FrameSize) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.width > 0
            && self.height > 0
            && self.x + self.width < frame.width as i32
            && self.y + self.height < frame.height as i32
    }
}

/// One entry of the positive sample list.
#[derive(Debug, Clone)]
pub struct PositiveSample {
    pub image_path: PathBuf,
    pub boxes: Vec<BoundingBox>,
}

/// The two derived sample lists, the pipeline's terminal artifact.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    pub positives: Vec<PositiveSample>,
    pub negatives: Vec<PathBuf>,
}

impl SampleSet {
    pub fn object_count(&self) -> usize {
        self.positives.iter().map(|p| p.boxes.len()).sum()
    }
}

// Struct to hold processing statistics
#[derive(Debug, Default, Clone)]
pub struct ProcessingStats {
    pub lines_read: usize,
    pub parse_faults: usize,
    pub images_with_sign: usize,
    pub images_without_sign: usize,
    pub missing_images: usize,
    pub degenerate_boxes: usize,
    pub degenerate_regions: usize,
    pub positive_objects: usize,
    pub crops_written: usize,
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_summary(&self) {
        log::info!("=== Processing Summary ===");
        log::info!("Annotation lines read: {}", self.lines_read);
        log::info!("Images with sign: {}", self.images_with_sign);
        log::info!("Images without sign: {}", self.images_without_sign);
        log::info!("Positive objects collected: {}", self.positive_objects);
        log::info!("Background crops written: {}", self.crops_written);

        if self.parse_faults > 0 {
            log::warn!("Malformed annotation lines skipped: {}", self.parse_faults);
        }
        if self.missing_images > 0 {
            log::warn!("Missing or undecodable images: {}", self.missing_images);
        }
        if self.degenerate_boxes > 0 {
            log::warn!(
                "Boxes dropped for non-positive extent: {}",
                self.degenerate_boxes
            );
        }
        if self.degenerate_regions > 0 {
            log::warn!(
                "Regions skipped for zero dynamic range: {}",
                self.degenerate_regions
            );
        }
    }
}
