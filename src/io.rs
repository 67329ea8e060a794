use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::{PrepError, PrepResult};
use crate::types::BoundingBox;

/// Load an image as RGB. A missing or undecodable file surfaces as an
/// `ImageAccess` fault for the caller to record and skip.
pub fn load_rgb(path: &Path) -> PrepResult<RgbImage> {
    let img = image::open(path).map_err(|source| PrepError::ImageAccess {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgb8())
}

/// Crop the boxed region out of an image, optionally resize it to a square,
/// and save it, creating the parent directory when needed.
pub fn save_bbox_crop(
    rgb: &RgbImage,
    bbox: &BoundingBox,
    resize: Option<u32>,
    path: &Path,
) -> PrepResult<()> {
    debug_assert!(bbox.x >= 0 && bbox.y >= 0 && bbox.width > 0 && bbox.height > 0);
    let crop = imageops::crop_imm(
        rgb,
        bbox.x as u32,
        bbox.y as u32,
        bbox.width as u32,
        bbox.height as u32,
    )
    .to_image();
    let crop = match resize {
        Some(edge) => imageops::resize(&crop, edge, edge, FilterType::Triangle),
        None => crop,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    crop.save(path).map_err(|source| PrepError::ImageWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a sample list, one entry per line. Failure here is fatal to the
/// run: the lists are the pipeline's terminal artifact.
pub fn write_sample_list<S: AsRef<str>>(path: &Path, lines: &[S]) -> PrepResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for line in lines {
        writer.write_all(line.as_ref().as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Record the positive object count next to the positive list; the cascade
/// trainer reads it back for its -numPos argument.
pub fn write_count_file(path: &Path, count: usize) -> PrepResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    write!(writer, "{}", count)?;
    writer.flush()?;
    Ok(())
}
