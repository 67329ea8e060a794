use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

use crate::types::FrameSize;

/// Command-line arguments for preparing cascade training data from an
/// STS-style annotation corpus.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct Args {
    /// Directory containing the source images
    #[arg(short = 'i', long = "image_dir")]
    pub image_dir: PathBuf,

    /// Annotation corpus, one line per image
    #[arg(short = 'a', long = "annotation_file")]
    pub annotation_file: PathBuf,

    /// Directory receiving the sample lists and seed crops
    #[arg(short = 'o', long = "output_dir", default_value = ".")]
    pub output_dir: PathBuf,

    /// Only use signs tagged as visible, excluding blurred or occluded ones
    #[arg(long = "visible_only")]
    pub visible_only: bool,

    /// Prepare data for this sign only; without it all signs are united
    /// under a general signness category
    #[arg(long = "sign_filter")]
    pub sign_filter: Option<String>,

    /// How positive samples are produced
    #[arg(long = "mode", value_enum, default_value = "direct")]
    pub mode: CollectionMode,

    /// Crop the sign-free images into extra background samples
    #[arg(long = "extra_background")]
    pub extra_background: bool,

    /// Do not write the negative sample list
    #[arg(long = "skip_negatives")]
    pub skip_negatives: bool,

    /// Frame width of the source footage
    #[arg(long = "frame_width", default_value_t = 1280)]
    pub frame_width: u32,

    /// Frame height of the source footage
    #[arg(long = "frame_height", default_value_t = 960)]
    pub frame_height: u32,

    /// Smallest background crop edge, in pixels
    #[arg(long = "min_crop", default_value_t = 50)]
    pub min_crop: u32,

    /// Largest background crop edge, in pixels (exclusive)
    #[arg(long = "max_crop", default_value_t = 300)]
    pub max_crop: u32,

    /// Background crops requested per sign-free image
    #[arg(long = "crops_per_image", default_value_t = 5)]
    pub crops_per_image: u32,

    /// Sampling attempts allowed per requested crop before giving up
    #[arg(long = "max_crop_attempts", default_value_t = 1000)]
    pub max_crop_attempts: u32,

    /// Square edge background crops are resized to
    #[arg(long = "crop_resize", default_value_t = 100)]
    pub crop_resize: u32,

    /// Brightness score above which a background crop is rejected
    #[arg(long = "brightness_ceiling", default_value_t = 0.70, value_parser = validate_score)]
    pub brightness_ceiling: f32,

    /// Seed for the background crop sampler
    #[arg(long = "seed", default_value_t = 42)]
    pub seed: u64,

    /// Prepare data for every sign at or above the frequency threshold
    #[arg(long = "all_common", conflicts_with = "sign_filter")]
    pub all_common: bool,

    /// Frequency threshold used by --all_common
    #[arg(long = "min_frequency", default_value_t = 50)]
    pub min_frequency: usize,

    /// JSON file mapping sign names to corpus frequencies; computed from
    /// the corpus when not given
    #[arg(long = "frequency_table")]
    pub frequency_table: Option<PathBuf>,

    /// Run opencv_createsamples on the produced artifacts
    #[arg(long = "create_samples")]
    pub create_samples: bool,

    /// Run opencv_traincascade over the produced vec files
    #[arg(long = "train")]
    pub train: bool,
}

// Enumeration for the positive sample production mode
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CollectionMode {
    /// Feed the labeled boxes to the trainer directly
    Direct,
    /// Seed synthetic samples from the best real crop of the filtered sign
    Augmented,
    /// Seed synthetic samples from a prepared template image
    Template,
}

impl Args {
    pub fn frame(&self) -> FrameSize {
        FrameSize::new(self.frame_width, self.frame_height)
    }

    /// A sign filter implies visible-only collection: occluded or blurred
    /// instances make poor candidates for a single-sign cascade.
    pub fn effective_visible_only(&self) -> bool {
        self.visible_only || self.sign_filter.is_some() || self.all_common
    }

    /// Cross-flag checks clap cannot express on its own.
    pub fn validate(&self) -> Result<(), String> {
        if self.mode != CollectionMode::Direct && self.sign_filter.is_none() && !self.all_common {
            return Err(format!(
                "--mode {:?} requires --sign_filter or --all_common",
                self.mode
            ));
        }
        if self.min_crop == 0 {
            return Err("--min_crop must be at least 1".to_string());
        }
        if self.max_crop <= self.min_crop {
            return Err("--max_crop must be greater than --min_crop".to_string());
        }
        if self.crop_resize == 0 {
            return Err("--crop_resize must be at least 1".to_string());
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err("frame dimensions must be non-zero".to_string());
        }
        Ok(())
    }
}

// Validate that the score threshold is between 0.0 and 1.0
fn validate_score(s: &str) -> Result<f32, String> {
    match f32::from_str(s) {
        Ok(val) if (0.0..=1.0).contains(&val) => Ok(val),
        _ => Err("SCORE must be between 0.0 and 1.0".to_string()),
    }
}
