use std::path::{Path, PathBuf};

use dashmap::DashSet;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::candidate::{select_candidate, CandidateInput};
use crate::config::{Args, CollectionMode};
use crate::conversion::{clamped_bbox, format_positive_line};
use crate::crops::{save_random_crops, CropParams};
use crate::error::PrepResult;
use crate::io::{load_rgb, save_bbox_crop, write_count_file, write_sample_list};
use crate::parser::{CorpusReader, ParseOptions};
use crate::types::{PositiveSample, ProcessingStats, SampleSet};

/// A positive list with this many objects or fewer is too sparse to train
/// on; no positive artifact is produced for it.
pub const MIN_POSITIVE_OBJECTS: usize = 10;

/// What one preparation run produced, for the trainer hand-off.
#[derive(Debug, Default)]
pub struct PrepOutcome {
    /// Sign name the run was filtered to, or `ALLSIGNS`.
    pub sign_label: String,
    pub positive_list: Option<PathBuf>,
    pub negative_list: Option<PathBuf>,
    pub seed_image: Option<PathBuf>,
    pub object_count: usize,
    pub stats: ProcessingStats,
}

struct Collected {
    samples: SampleSet,
    candidate_feed: Vec<CandidateInput>,
    stats: ProcessingStats,
}

/// One full preparation pass: collect positives and negatives from the
/// corpus, optionally mine background crops and pick an augmentation seed,
/// then write the sample-list artifacts.
///
/// Per-line and per-image faults are logged and counted; only artifact
/// writes can fail the run.
pub fn prepare_training_data(
    args: &Args,
    sign_filter: Option<&str>,
    write_negatives: bool,
) -> PrepResult<PrepOutcome> {
    let sign_label = sign_filter.unwrap_or("ALLSIGNS").to_string();
    log::info!("Preparing training data for {}", sign_label);

    let mut collected = collect_samples(args, sign_filter)?;

    if args.extra_background {
        let crops = generate_background_crops(
            &collected.samples.negatives,
            args,
            &mut collected.stats,
        );
        collected.samples.negatives = crops;
    }

    let mut outcome = PrepOutcome {
        sign_label,
        object_count: collected.samples.object_count(),
        ..PrepOutcome::default()
    };

    // Augmentation picks one seed crop instead of a positive list.
    if args.mode == CollectionMode::Augmented {
        match run_candidate_selection(
            &collected.candidate_feed,
            args,
            &outcome.sign_label,
            &mut collected.stats,
        )? {
            Some(seed_path) => outcome.seed_image = Some(seed_path),
            None => log::warn!(
                "no candidate box met the area threshold for {}; augmentation unavailable",
                outcome.sign_label
            ),
        }
    } else if args.mode == CollectionMode::Direct {
        if outcome.object_count > MIN_POSITIVE_OBJECTS {
            let list_path = args
                .output_dir
                .join(format!("positive_samples_{}.txt", outcome.sign_label));
            let lines: Vec<String> = collected
                .samples
                .positives
                .iter()
                .map(format_positive_line)
                .collect();
            write_sample_list(&list_path, &lines)?;
            write_count_file(
                &args
                    .output_dir
                    .join(format!("count_{}.txt", outcome.sign_label)),
                outcome.object_count,
            )?;
            outcome.positive_list = Some(list_path);
        } else {
            log::warn!(
                "only {} positive objects for {}; corpus too sparse, skipping the positive list",
                outcome.object_count,
                outcome.sign_label
            );
        }
    }

    if write_negatives && !args.skip_negatives {
        let negative_path = args.output_dir.join("negative_samples.txt");
        let lines: Vec<String> = collected
            .samples
            .negatives
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        write_sample_list(&negative_path, &lines)?;
        outcome.negative_list = Some(negative_path);
    }

    collected.stats.positive_objects = outcome.object_count;
    collected.stats.print_summary();
    outcome.stats = collected.stats;
    Ok(outcome)
}

/// Stream the corpus once, routing every image into the positive set, the
/// candidate feed, or the negative set.
fn collect_samples(args: &Args, sign_filter: Option<&str>) -> PrepResult<Collected> {
    let opts = ParseOptions {
        visible_only: args.effective_visible_only(),
    };
    let frame = args.frame();

    let mut samples = SampleSet::default();
    let mut candidate_feed = Vec::new();
    let mut stats = ProcessingStats::new();

    for parsed in CorpusReader::open(&args.annotation_file, opts)? {
        stats.lines_read += 1;
        let record = match parsed {
            Ok(record) => record,
            Err(e) => {
                stats.parse_faults += 1;
                log::warn!("{}", e);
                continue;
            }
        };

        if record.is_negative() {
            stats.images_without_sign += 1;
            samples.negatives.push(args.image_dir.join(&record.image_name));
            continue;
        }
        stats.images_with_sign += 1;

        // Template mode pastes prepared artwork instead; the labeled boxes
        // are not collected at all.
        if args.mode == CollectionMode::Template {
            continue;
        }

        let mut boxes = Vec::new();
        for sign in &record.signs {
            if let Some(filter) = sign_filter {
                if sign.name != filter {
                    continue;
                }
            }
            let bbox = clamped_bbox(sign.raw_coords, frame);
            if !bbox.is_usable(frame) {
                stats.degenerate_boxes += 1;
                continue;
            }
            boxes.push(bbox);
        }
        if boxes.is_empty() {
            continue;
        }

        match args.mode {
            CollectionMode::Augmented => candidate_feed.push(CandidateInput {
                image_name: record.image_name,
                boxes,
            }),
            _ => samples.positives.push(PositiveSample {
                image_path: args.image_dir.join(&record.image_name),
                boxes,
            }),
        }
    }

    Ok(Collected {
        samples,
        candidate_feed,
        stats,
    })
}

/// Mine background crops from the sign-free images, replacing the negative
/// list with the crop paths.
///
/// Images are independent, so the work fans out over the rayon pool; each
/// image gets its own RNG stream derived from the seed and its corpus
/// position, keeping the output identical for any worker count.
fn generate_background_crops(
    negatives: &[PathBuf],
    args: &Args,
    stats: &mut ProcessingStats,
) -> Vec<PathBuf> {
    let params = CropParams {
        min_size: args.min_crop,
        max_size: args.max_crop,
        num_crops: args.crops_per_image,
        max_attempts: args.max_crop_attempts,
        brightness_ceiling: args.brightness_ceiling,
        resize: args.crop_resize,
    };
    let frame = args.frame();

    let pb = ProgressBar::new(negatives.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [Crops] [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .progress_chars("#>-"),
    );
    let unreadable: DashSet<PathBuf> = DashSet::new();

    let crops: Vec<Vec<PathBuf>> = negatives
        .par_iter()
        .enumerate()
        .map(|(index, image_path)| {
            let seed = args.seed.wrapping_add(index as u64);
            let saved = match save_random_crops(image_path, frame, &params, seed) {
                Ok(saved) => saved,
                Err(e) => {
                    log::warn!("background crops: {}", e);
                    unreadable.insert(image_path.clone());
                    Vec::new()
                }
            };
            pb.inc(1);
            saved
        })
        .collect();
    pb.finish_with_message("Background cropping complete");

    stats.missing_images += unreadable.len();
    let flat: Vec<PathBuf> = crops.into_iter().flatten().collect();
    stats.crops_written += flat.len();
    flat
}

/// Score the candidate feed and persist the winning crop as the
/// augmentation seed image.
fn run_candidate_selection(
    feed: &[CandidateInput],
    args: &Args,
    sign_label: &str,
    stats: &mut ProcessingStats,
) -> PrepResult<Option<PathBuf>> {
    let outcome = select_candidate(feed, &args.image_dir);
    stats.missing_images += outcome.missing_images;
    stats.degenerate_regions += outcome.degenerate_regions;

    let Some(candidate) = outcome.candidate else {
        return Ok(None);
    };
    let seed_path = seed_image_path(&args.output_dir, sign_label);
    let rgb = match load_rgb(&args.image_dir.join(&candidate.image_name)) {
        Ok(rgb) => rgb,
        Err(e) => {
            // the winning image disappeared between scoring and saving
            log::warn!("{}", e);
            stats.missing_images += 1;
            return Ok(None);
        }
    };
    // saved at native resolution; the sample generator scales it itself
    save_bbox_crop(&rgb, &candidate.bbox, None, &seed_path)?;
    log::info!(
        "augmentation seed for {}: cropped from {} (score {:.3})",
        sign_label,
        candidate.image_name,
        candidate.score
    );
    Ok(Some(seed_path))
}

/// Where the best-candidate crop for a sign is saved.
pub fn seed_image_path(output_dir: &Path, sign: &str) -> PathBuf {
    output_dir.join("largest_sign").join(format!("{}.jpg", sign))
}
