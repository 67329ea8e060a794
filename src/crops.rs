use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::brightness::{dynamic_range, luminance, LumaPlane};
use crate::error::PrepResult;
use crate::io::{load_rgb, save_bbox_crop};
use crate::types::{BoundingBox, FrameSize};

// Crops narrower than 1:2 in either direction make degenerate slivers,
// unusable as negative training patches.
pub const MIN_ASPECT: f32 = 0.5;
pub const MAX_ASPECT: f32 = 2.0;

/// Parameters of the background rejection sampler.
#[derive(Debug, Clone, Copy)]
pub struct CropParams {
    /// Smallest crop edge, inclusive.
    pub min_size: u32,
    /// Largest crop edge, exclusive.
    pub max_size: u32,
    /// Crops requested per image.
    pub num_crops: u32,
    /// Draw budget per requested crop; an exhausted budget yields fewer
    /// crops and a warning instead of looping forever on an unlucky image.
    pub max_attempts: u32,
    /// Dynamic-range score above which a crop is assumed to be sky or road
    /// glare and rejected.
    pub brightness_ceiling: f32,
    /// Square edge accepted crops are resized to before saving.
    pub resize: u32,
}

impl Default for CropParams {
    fn default() -> Self {
        Self {
            min_size: 50,
            max_size: 300,
            num_crops: 5,
            max_attempts: 1000,
            brightness_ceiling: 0.70,
            resize: 100,
        }
    }
}

/// Rejection-sample up to `num_crops` background boxes from one frame.
///
/// Each draw picks the extent, rejects degenerate aspect ratios, places the
/// box fully inside the frame, then rejects overly bright regions (outlier
/// clipping disabled, matching how the footage statistics were gathered).
/// Pure sampling stage: no disk I/O, deterministic for a given RNG state.
pub fn sample_crop_boxes(
    luma: &LumaPlane,
    frame: FrameSize,
    params: &CropParams,
    rng: &mut StdRng,
) -> Vec<BoundingBox> {
    let mut accepted = Vec::with_capacity(params.num_crops as usize);
    let budget = params.max_attempts as u64 * params.num_crops as u64;
    let mut attempts = 0u64;

    while (accepted.len() as u32) < params.num_crops && attempts < budget {
        attempts += 1;

        let crop_width = rng.gen_range(params.min_size..params.max_size);
        let crop_height = rng.gen_range(params.min_size..params.max_size);

        let ratio = crop_width as f32 / crop_height as f32;
        if !(MIN_ASPECT..=MAX_ASPECT).contains(&ratio) {
            continue;
        }
        if crop_width >= frame.width || crop_height >= frame.height {
            continue;
        }

        let x = rng.gen_range(0..frame.width - crop_width);
        let y = rng.gen_range(0..frame.height - crop_height);
        let bbox = BoundingBox::new(x as i32, y as i32, crop_width as i32, crop_height as i32);

        match dynamic_range(luma, &bbox, false) {
            Ok(score) if score > params.brightness_ceiling => continue,
            Ok(_) => accepted.push(bbox),
            // a zero-range region is non-scorable, treat it as rejected
            Err(_) => continue,
        }
    }
    accepted
}

/// Output path for crop `idx` of `.../img/name.jpg`:
/// `.../img_cropped/name_<idx>.jpg`.
pub fn derive_crop_path(image_path: &Path, idx: usize) -> PathBuf {
    let parent = image_path.parent().unwrap_or_else(|| Path::new(""));
    let dir_name = parent
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cropped_dir = parent
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(format!("{}_cropped", dir_name));

    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match image_path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, idx, ext.to_string_lossy()),
        None => format!("{}_{}", stem, idx),
    };
    cropped_dir.join(file_name)
}

/// Generate and persist background crops for one sign-free image, returning
/// the saved paths in acceptance order.
///
/// Crops from different source images are fully independent, so callers may
/// fan this out across a worker pool; the derived names cannot collide.
pub fn save_random_crops(
    image_path: &Path,
    frame: FrameSize,
    params: &CropParams,
    seed: u64,
) -> PrepResult<Vec<PathBuf>> {
    let rgb = load_rgb(image_path)?;
    let luma = luminance(&rgb);
    let mut rng = StdRng::seed_from_u64(seed);

    let boxes = sample_crop_boxes(&luma, frame, params, &mut rng);
    if (boxes.len() as u32) < params.num_crops {
        log::warn!(
            "{}: accepted only {}/{} background crops within the attempt budget",
            image_path.display(),
            boxes.len(),
            params.num_crops
        );
    }

    let mut saved = Vec::with_capacity(boxes.len());
    for (idx, bbox) in boxes.iter().enumerate() {
        let out_path = derive_crop_path(image_path, idx);
        save_bbox_crop(&rgb, bbox, Some(params.resize), &out_path)?;
        saved.push(out_path);
    }
    Ok(saved)
}
