//! Thin shell around the prebuilt OpenCV cascade tools. This module only
//! assembles and launches their command lines; everything the tools consume
//! is produced by the preparation pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use glob::glob;

use crate::config::CollectionMode;
use crate::dataset::PrepOutcome;
use crate::error::PrepResult;

// Sample grid the synthetic generator renders seeds at.
const SEED_SAMPLE_EDGE: u32 = 64;
// Sample grid used for directly collected boxes and cascade training.
const DIRECT_SAMPLE_EDGE: u32 = 32;
// Synthetic samples generated from one seed or template image.
const SYNTHETIC_SAMPLE_COUNT: u32 = 3000;
// Fallback -numPos when no count file sits next to a vec file.
const DEFAULT_NUM_POS: u32 = 2000;

/// A fully assembled external command, kept as data so tests can inspect it
/// without spawning anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    fn new(program: &str, args: Vec<String>) -> Self {
        Self {
            program: program.to_string(),
            args,
        }
    }

    pub fn run(&self) -> PrepResult<()> {
        log::info!("running: {} {}", self.program, self.args.join(" "));
        let status = Command::new(&self.program).args(&self.args).status()?;
        if !status.success() {
            log::warn!("{} exited with {}", self.program, status);
        }
        Ok(())
    }
}

/// Name of the vec file a run produces, e.g. `vec_STOP_augmented.vec`.
pub fn vec_file_name(sign_label: &str, mode: CollectionMode) -> String {
    let kind = match mode {
        CollectionMode::Direct => "real",
        CollectionMode::Augmented => "augmented",
        CollectionMode::Template => "template",
    };
    format!("vec_{}_{}.vec", sign_label, kind)
}

/// Build the `opencv_createsamples` call for one preparation outcome.
///
/// Returns `None` when the run produced nothing to feed the generator
/// (sparse corpus, or augmentation without a usable seed).
pub fn createsamples_invocation(
    outcome: &PrepOutcome,
    mode: CollectionMode,
    output_dir: &Path,
) -> Option<Invocation> {
    let vec_path = output_dir.join(vec_file_name(&outcome.sign_label, mode));
    match mode {
        CollectionMode::Augmented | CollectionMode::Template => {
            let source = match mode {
                CollectionMode::Template => {
                    output_dir.join(format!("templates/{}.png", outcome.sign_label))
                }
                _ => outcome.seed_image.clone()?,
            };
            Some(Invocation::new(
                "opencv_createsamples",
                vec![
                    "-img".into(),
                    source.display().to_string(),
                    "-vec".into(),
                    vec_path.display().to_string(),
                    "-num".into(),
                    SYNTHETIC_SAMPLE_COUNT.to_string(),
                    "-w".into(),
                    SEED_SAMPLE_EDGE.to_string(),
                    "-h".into(),
                    SEED_SAMPLE_EDGE.to_string(),
                ],
            ))
        }
        CollectionMode::Direct => {
            let info = outcome.positive_list.as_ref()?;
            Some(Invocation::new(
                "opencv_createsamples",
                vec![
                    "-info".into(),
                    info.display().to_string(),
                    "-vec".into(),
                    vec_path.display().to_string(),
                    "-num".into(),
                    outcome.object_count.to_string(),
                    "-w".into(),
                    DIRECT_SAMPLE_EDGE.to_string(),
                    "-h".into(),
                    DIRECT_SAMPLE_EDGE.to_string(),
                ],
            ))
        }
    }
}

/// Build one `opencv_traincascade` call.
pub fn traincascade_invocation(
    cascade_dir: &Path,
    vec_file: &Path,
    background_list: &Path,
    num_pos: u32,
) -> Invocation {
    Invocation::new(
        "opencv_traincascade",
        vec![
            "-data".into(),
            cascade_dir.display().to_string(),
            "-vec".into(),
            vec_file.display().to_string(),
            "-bg".into(),
            background_list.display().to_string(),
            "-numPos".into(),
            num_pos.to_string(),
            "-w".into(),
            DIRECT_SAMPLE_EDGE.to_string(),
            "-h".into(),
            DIRECT_SAMPLE_EDGE.to_string(),
            "-mode".into(),
            "ALL".into(),
            "-acceptanceRatioBreakValue".into(),
            "10e-5".into(),
            "-numStages".into(),
            "20".into(),
            "-maxFalseAlarmRate".into(),
            "0.5".into(),
        ],
    )
}

/// Split `vec_<SIGN>_<kind>.vec` back into its sign name and kind.
pub fn parse_vec_name(vec_file: &Path) -> Option<(String, String)> {
    let stem = vec_file.file_stem()?.to_str()?;
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 3 || parts[0] != "vec" {
        return None;
    }
    let kind = parts[parts.len() - 1].to_string();
    let sign = parts[1..parts.len() - 1].join("_");
    Some((sign, kind))
}

/// Train one cascade per vec file found in the dataset directory.
///
/// Directly collected vec files read their positive count back from the
/// `count_<SIGN>.txt` artifact; synthetic ones fall back to a fixed count.
pub fn train_all_cascades(dataset_dir: &Path) -> PrepResult<()> {
    let pattern = dataset_dir.join("*.vec");
    let vec_files: Vec<PathBuf> = glob(&pattern.to_string_lossy())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?
        .filter_map(|entry| entry.ok())
        .collect();
    if vec_files.is_empty() {
        log::warn!(
            "no vec files under {}; run the preparation step first",
            dataset_dir.display()
        );
        return Ok(());
    }

    let background_list = dataset_dir.join("negative_samples.txt");
    for vec_file in vec_files {
        let Some((sign, kind)) = parse_vec_name(&vec_file) else {
            log::warn!("skipping unrecognized vec file {}", vec_file.display());
            continue;
        };
        let family = if kind == "real" { "real" } else { "augmented" };
        let cascade_dir = dataset_dir.join("cascades").join(family).join(&sign);
        fs::create_dir_all(&cascade_dir)?;

        let num_pos = if kind == "real" {
            read_count_file(&dataset_dir.join(format!("count_{}.txt", sign)))
        } else {
            DEFAULT_NUM_POS
        };
        traincascade_invocation(&cascade_dir, &vec_file, &background_list, num_pos).run()?;
    }
    Ok(())
}

fn read_count_file(path: &Path) -> u32 {
    match fs::read_to_string(path) {
        Ok(content) => match content.trim().parse() {
            Ok(count) => count,
            Err(_) => {
                log::warn!("unparseable count file {}", path.display());
                DEFAULT_NUM_POS
            }
        },
        Err(e) => {
            log::warn!("cannot read count file {}: {}", path.display(), e);
            DEFAULT_NUM_POS
        }
    }
}
