use std::path::Path;

use rayon::prelude::*;

use crate::brightness::{dynamic_range, luminance};
use crate::error::PrepError;
use crate::io::load_rgb;
use crate::types::BoundingBox;

/// Minimum clamped box area for an augmentation seed, in square pixels.
/// Smaller instances carry too little texture to paste onto backgrounds.
pub const MIN_CANDIDATE_AREA: i64 = 4000;

/// The best-seen bounding box for a sign filter across the corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub image_name: String,
    pub bbox: BoundingBox,
    pub score: f32,
}

/// Scoring input for one image: its boxes already filtered to the target
/// sign, in corpus order.
#[derive(Debug, Clone)]
pub struct CandidateInput {
    pub image_name: String,
    pub boxes: Vec<BoundingBox>,
}

/// Result of a selection pass, including the faults absorbed along the way.
#[derive(Debug, Default)]
pub struct SelectionOutcome {
    pub candidate: Option<Candidate>,
    pub missing_images: usize,
    pub degenerate_regions: usize,
}

#[derive(Debug, Default)]
struct RecordScore {
    best: Option<Candidate>,
    missing: bool,
    degenerate_regions: usize,
}

/// Pick the highest-scoring box across the corpus.
///
/// Records are scored in parallel, then reduced in corpus order with a
/// strict `>` comparison, so the first-seen candidate wins ties no matter
/// how many workers ran the scoring. Zero candidates is a valid outcome
/// ("augmentation unavailable"), not an error.
pub fn select_candidate(inputs: &[CandidateInput], image_dir: &Path) -> SelectionOutcome {
    let scored: Vec<RecordScore> = inputs
        .par_iter()
        .map(|input| score_record(input, image_dir))
        .collect();

    let mut outcome = SelectionOutcome::default();
    for record in scored {
        outcome.missing_images += record.missing as usize;
        outcome.degenerate_regions += record.degenerate_regions;
        if let Some(candidate) = record.best {
            let better = match &outcome.candidate {
                Some(best) => candidate.score > best.score,
                None => true,
            };
            if better {
                outcome.candidate = Some(candidate);
            }
        }
    }
    outcome
}

fn score_record(input: &CandidateInput, image_dir: &Path) -> RecordScore {
    // The area gate comes before any decode work: a record with no
    // large-enough box never touches the image file.
    let eligible: Vec<&BoundingBox> = input
        .boxes
        .iter()
        .filter(|bbox| bbox.area() > MIN_CANDIDATE_AREA)
        .collect();
    if eligible.is_empty() {
        return RecordScore::default();
    }

    let image_path = image_dir.join(&input.image_name);
    let rgb = match load_rgb(&image_path) {
        Ok(rgb) => rgb,
        Err(e) => {
            log::warn!("candidate scoring: {}", e);
            return RecordScore {
                missing: true,
                ..RecordScore::default()
            };
        }
    };
    let luma = luminance(&rgb);

    let mut record = RecordScore::default();
    for bbox in eligible {
        match dynamic_range(&luma, bbox, true) {
            Ok(score) => {
                let better = match &record.best {
                    Some(best) => score > best.score,
                    None => true,
                };
                if better {
                    record.best = Some(Candidate {
                        image_name: input.image_name.clone(),
                        bbox: *bbox,
                        score,
                    });
                }
            }
            Err(PrepError::DegenerateRegion) => record.degenerate_regions += 1,
            Err(e) => log::warn!("candidate scoring {}: {}", input.image_name, e),
        }
    }
    record
}
