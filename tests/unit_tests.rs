use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use image::RgbImage;
use rand::rngs::StdRng;
use rand::SeedableRng;

use sts2cascade::brightness::{dynamic_range, luminance};
use sts2cascade::candidate::{select_candidate, CandidateInput};
use sts2cascade::config::{Args, CollectionMode};
use sts2cascade::conversion::{clamped_bbox, format_positive_line};
use sts2cascade::crops::{derive_crop_path, sample_crop_boxes, save_random_crops, CropParams};
use sts2cascade::dataset::{prepare_training_data, seed_image_path};
use sts2cascade::parser::{
    load_frequency_table, parse_line, sign_frequencies, CorpusReader, ParseOptions,
};
use sts2cascade::trainer::{
    createsamples_invocation, parse_vec_name, traincascade_invocation, vec_file_name,
};
use sts2cascade::types::{BoundingBox, FrameSize, PositiveSample, Visibility};
use sts2cascade::PrepOutcome;

fn default_opts() -> ParseOptions {
    ParseOptions::default()
}

fn visible_opts() -> ParseOptions {
    ParseOptions { visible_only: true }
}

// ---------------------------------------------------------------- parser

#[test]
fn test_parse_line_with_two_signs() {
    let line = "img001.jpg:VISIBLE,1216.76,583.40,1172.44,539.08,PROHIBITORY,50_SIGN;\
                OCCLUDED,300.0,200.0,250.0,150.0,MANDATORY,PASS_RIGHT_SIDE;";
    let record = parse_line(line, 1, default_opts()).unwrap();

    assert_eq!(record.image_name, "img001.jpg");
    assert!(record.has_labeled_sign);
    assert_eq!(record.signs.len(), 2);

    let mut names: Vec<&str> = record.signs.iter().map(|s| s.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["50_SIGN", "PASS_RIGHT_SIDE"]);
    let mut categories: Vec<&str> = record.signs.iter().map(|s| s.category.as_str()).collect();
    categories.sort();
    assert_eq!(categories, vec!["MANDATORY", "PROHIBITORY"]);

    assert_eq!(record.signs[0].visibility, Visibility::Visible);
    assert_eq!(record.signs[0].raw_coords, [1216.76, 583.40, 1172.44, 539.08]);
}

#[test]
fn test_parse_line_empty_annotation_is_negative() {
    let record = parse_line("img002.jpg:", 1, default_opts()).unwrap();
    assert!(record.signs.is_empty());
    assert!(!record.has_labeled_sign);
    assert!(record.is_negative());
}

#[test]
fn test_parse_line_all_misc_is_negative() {
    let record = parse_line("img003.jpg:MISC_SIGNS;MISC_SIGNS;", 1, default_opts()).unwrap();
    assert!(record.signs.is_empty());
    assert!(record.is_negative());
}

#[test]
fn test_parse_line_misc_mixed_with_real_sign() {
    let line = "img004.jpg:MISC_SIGNS;VISIBLE,100.0,100.0,50.0,50.0,PROHIBITORY,STOP;";
    let record = parse_line(line, 1, default_opts()).unwrap();
    assert!(record.has_labeled_sign);
    assert_eq!(record.signs.len(), 1);
    assert_eq!(record.signs[0].name, "STOP");
}

#[test]
fn test_parse_line_other_sentinel_excluded() {
    let line = "img005.jpg:VISIBLE,100.0,100.0,50.0,50.0,UNKNOWN,OTHER;";
    let record = parse_line(line, 1, default_opts()).unwrap();
    assert!(record.signs.is_empty());
    // a line carrying only sentinels lands in the negative bucket
    assert!(record.is_negative());
}

#[test]
fn test_parse_line_visible_only_drops_occluded() {
    let line = "img006.jpg:OCCLUDED,100.0,100.0,50.0,50.0,PROHIBITORY,STOP;";
    let record = parse_line(line, 1, visible_opts()).unwrap();
    assert!(record.signs.is_empty());
    // the image still had a labeled sign, so it is not a negative
    assert!(record.has_labeled_sign);
    assert!(!record.is_negative());
}

#[test]
fn test_parse_line_faults() {
    assert!(parse_line("no delimiter here", 3, default_opts()).is_err());
    assert!(parse_line("img.jpg:VISIBLE,1.0,2.0;", 4, default_opts()).is_err());
    assert!(parse_line(
        "img.jpg:VISIBLE,1.0,abc,3.0,4.0,PROHIBITORY,STOP;",
        5,
        default_opts()
    )
    .is_err());
}

#[test]
fn test_corpus_reader_survives_malformed_lines_and_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = dir.path().join("annotations.txt");
    let mut file = fs::File::create(&corpus).unwrap();
    writeln!(file, "img001.jpg:VISIBLE,100.0,100.0,50.0,50.0,PROHIBITORY,STOP;").unwrap();
    writeln!(file, "garbage without delimiter").unwrap();
    writeln!(file, "img002.jpg:").unwrap();
    drop(file);

    let read_names = || -> Vec<String> {
        CorpusReader::open(&corpus, default_opts())
            .unwrap()
            .filter_map(|r| r.ok())
            .map(|r| r.image_name)
            .collect()
    };
    let first = read_names();
    assert_eq!(first, vec!["img001.jpg", "img002.jpg"]);

    let faults = CorpusReader::open(&corpus, default_opts())
        .unwrap()
        .filter(|r| r.is_err())
        .count();
    assert_eq!(faults, 1);

    // the corpus is a static file; re-opening yields the same sequence
    assert_eq!(read_names(), first);
}

#[test]
fn test_sign_frequencies_ordering() {
    let lines = [
        "a.jpg:VISIBLE,100.0,100.0,50.0,50.0,P,GIVE_WAY;",
        "b.jpg:VISIBLE,100.0,100.0,50.0,50.0,P,STOP;VISIBLE,90.0,90.0,40.0,40.0,P,STOP;",
        "c.jpg:VISIBLE,100.0,100.0,50.0,50.0,P,50_SIGN;",
    ];
    let records: Vec<_> = lines
        .iter()
        .enumerate()
        .map(|(i, l)| parse_line(l, i + 1, default_opts()).unwrap())
        .collect();

    let freqs = sign_frequencies(&records);
    assert_eq!(
        freqs,
        vec![
            ("STOP".to_string(), 2),
            ("50_SIGN".to_string(), 1),
            ("GIVE_WAY".to_string(), 1),
        ]
    );
}

#[test]
fn test_load_frequency_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("freqs.json");
    fs::write(&path, r#"{"STOP": 21, "PRIORITY_ROAD": 470}"#).unwrap();

    let freqs = load_frequency_table(&path).unwrap();
    assert_eq!(
        freqs,
        vec![("PRIORITY_ROAD".to_string(), 470), ("STOP".to_string(), 21)]
    );
}

// ------------------------------------------------------------ conversion

#[test]
fn test_clamped_bbox_plain() {
    let frame = FrameSize::default();
    let bbox = clamped_bbox([100.0, 100.0, 50.0, 50.0], frame);
    assert_eq!(bbox, BoundingBox::new(50, 50, 50, 50));
}

#[test]
fn test_clamped_bbox_keeps_margin_off_the_edge() {
    let frame = FrameSize::default();
    let bbox = clamped_bbox([1400.9, 1000.2, 100.0, 50.0], frame);
    assert_eq!(bbox.x, 100);
    assert_eq!(bbox.y, 50);
    assert!(bbox.x + bbox.width < frame.width as i32);
    assert!(bbox.y + bbox.height < frame.height as i32);
    assert_eq!(bbox.width, 1280 - 100 - 1);
    assert_eq!(bbox.height, 960 - 50 - 1);
}

#[test]
fn test_clamped_bbox_any_frame_size() {
    let frame = FrameSize::new(100, 80);
    let bbox = clamped_bbox([120.0, 90.0, 10.0, 5.0], frame);
    assert_eq!(bbox.width, 100 - 10 - 1);
    assert_eq!(bbox.height, 80 - 5 - 1);
    assert!(bbox.x + bbox.width < 100);
    assert!(bbox.y + bbox.height < 80);
}

#[test]
fn test_clamped_bbox_passes_degenerate_extent_through() {
    let frame = FrameSize::default();
    // x_max < x_min comes out as a negative width, left for callers
    let bbox = clamped_bbox([40.0, 100.0, 50.0, 50.0], frame);
    assert_eq!(bbox.width, -10);
    assert!(!bbox.is_usable(frame));
}

#[test]
fn test_format_positive_line() {
    let sample = PositiveSample {
        image_path: PathBuf::from("data/img/img001.jpg"),
        boxes: vec![
            BoundingBox::new(50, 50, 50, 50),
            BoundingBox::new(10, 20, 30, 40),
        ],
    };
    assert_eq!(
        format_positive_line(&sample),
        "data/img/img001.jpg 2 50 50 50 50 10 20 30 40"
    );
}

// ------------------------------------------------------------ brightness

#[test]
fn test_luminance_weights() {
    let mut rgb = RgbImage::new(1, 1);
    rgb.put_pixel(0, 0, image::Rgb([255, 0, 0]));
    let luma = luminance(&rgb);
    assert!((luma.get_pixel(0, 0).0[0] - 0.299 * 255.0).abs() < 1e-3);
}

#[test]
fn test_dynamic_range_deterministic_over_gradient() {
    let rgb = RgbImage::from_fn(64, 64, |x, y| {
        let v = ((x + y) * 2) as u8;
        image::Rgb([v, v, v])
    });
    let luma = luminance(&rgb);
    let bbox = BoundingBox::new(4, 4, 50, 50);
    let a = dynamic_range(&luma, &bbox, true).unwrap();
    let b = dynamic_range(&luma, &bbox, true).unwrap();
    assert_eq!(a, b);
    assert!((0.0..=1.0).contains(&a));
}

// ------------------------------------------------------------- candidate

// Two-tone diagonal stripes: `base` everywhere, `accent` on every tenth
// anti-diagonal. The dynamic-range score tracks where the log-mass sits
// between min and max, so a bright field with dark accents scores high and
// a dark field with bright accents scores low.
fn write_two_tone_png(path: &Path, base: u8, accent: u8) {
    let img = RgbImage::from_fn(100, 100, |x, y| {
        let v = if (x + y) % 10 == 0 { accent } else { base };
        image::Rgb([v, v, v])
    });
    img.save(path).unwrap();
}

#[test]
fn test_candidate_selection_prefers_higher_score() {
    let dir = tempfile::tempdir().unwrap();
    // dark-skewed region scores ~0.1, bright-skewed ~0.9
    write_two_tone_png(&dir.path().join("low.png"), 10, 200);
    write_two_tone_png(&dir.path().join("high.png"), 200, 10);

    let bbox = BoundingBox::new(10, 10, 70, 70);
    let feed = vec![
        CandidateInput {
            image_name: "low.png".to_string(),
            boxes: vec![bbox],
        },
        CandidateInput {
            image_name: "high.png".to_string(),
            boxes: vec![bbox],
        },
    ];

    let outcome = select_candidate(&feed, dir.path());
    let candidate = outcome.candidate.expect("a candidate should be selected");
    assert_eq!(candidate.image_name, "high.png");
    assert_eq!(candidate.bbox, bbox);
}

#[test]
fn test_candidate_selection_first_seen_wins_ties() {
    let dir = tempfile::tempdir().unwrap();
    write_two_tone_png(&dir.path().join("first.png"), 120, 30);
    write_two_tone_png(&dir.path().join("second.png"), 120, 30);

    let bbox = BoundingBox::new(10, 10, 70, 70);
    let feed = vec![
        CandidateInput {
            image_name: "first.png".to_string(),
            boxes: vec![bbox],
        },
        CandidateInput {
            image_name: "second.png".to_string(),
            boxes: vec![bbox],
        },
    ];

    let outcome = select_candidate(&feed, dir.path());
    assert_eq!(outcome.candidate.unwrap().image_name, "first.png");
}

#[test]
fn test_candidate_selection_area_gate_and_missing_images() {
    let dir = tempfile::tempdir().unwrap();
    write_two_tone_png(&dir.path().join("small.png"), 120, 30);

    let feed = vec![
        // 60*60 = 3600 px^2, below the 4000 threshold: skipped unscored
        CandidateInput {
            image_name: "small.png".to_string(),
            boxes: vec![BoundingBox::new(10, 10, 60, 60)],
        },
        CandidateInput {
            image_name: "missing.png".to_string(),
            boxes: vec![BoundingBox::new(10, 10, 70, 70)],
        },
    ];

    let outcome = select_candidate(&feed, dir.path());
    assert!(outcome.candidate.is_none());
    assert_eq!(outcome.missing_images, 1);
}

// ----------------------------------------------------------------- crops

// Dark field with sparse bright accents: every crop has spread (never
// degenerate) but its log-mass sits near the minimum, so the brightness
// gate accepts it.
fn textured_dark_plane(width: u32, height: u32) -> sts2cascade::brightness::LumaPlane {
    let rgb = RgbImage::from_fn(width, height, |x, y| {
        let v = if (x + y) % 10 == 0 { 180 } else { 20 };
        image::Rgb([v, v, v])
    });
    luminance(&rgb)
}

#[test]
fn test_sample_crop_boxes_respects_all_gates() {
    let frame = FrameSize::new(400, 300);
    let luma = textured_dark_plane(400, 300);
    let params = CropParams {
        min_size: 50,
        max_size: 150,
        num_crops: 4,
        max_attempts: 500,
        ..CropParams::default()
    };
    let mut rng = StdRng::seed_from_u64(7);

    let boxes = sample_crop_boxes(&luma, frame, &params, &mut rng);
    assert_eq!(boxes.len(), 4);
    for bbox in &boxes {
        let ratio = bbox.width as f32 / bbox.height as f32;
        assert!((0.5..=2.0).contains(&ratio), "bad aspect {}", ratio);
        assert!(bbox.x >= 0 && bbox.y >= 0);
        assert!(bbox.x + bbox.width <= 400);
        assert!(bbox.y + bbox.height <= 300);
        let score = dynamic_range(&luma, bbox, false).unwrap();
        assert!(score <= params.brightness_ceiling, "score {}", score);
    }

    // identical seed, identical draws
    let mut rng = StdRng::seed_from_u64(7);
    assert_eq!(sample_crop_boxes(&luma, frame, &params, &mut rng), boxes);
}

#[test]
fn test_sample_crop_boxes_gives_up_on_uniform_frame() {
    let frame = FrameSize::new(400, 300);
    let rgb = RgbImage::from_pixel(400, 300, image::Rgb([255, 255, 255]));
    let luma = luminance(&rgb);
    let params = CropParams {
        min_size: 50,
        max_size: 150,
        num_crops: 3,
        max_attempts: 50,
        ..CropParams::default()
    };
    let mut rng = StdRng::seed_from_u64(1);

    // every region is degenerate, so the attempt budget runs dry
    let boxes = sample_crop_boxes(&luma, frame, &params, &mut rng);
    assert!(boxes.is_empty());
}

#[test]
fn test_derive_crop_path() {
    let path = derive_crop_path(Path::new("/data/img/001.jpg"), 2);
    assert_eq!(path, PathBuf::from("/data/img_cropped/001_2.jpg"));
}

#[test]
fn test_save_random_crops_writes_resized_files() {
    let dir = tempfile::tempdir().unwrap();
    let img_dir = dir.path().join("img");
    fs::create_dir_all(&img_dir).unwrap();
    let source = img_dir.join("neg.png");
    let rgb = RgbImage::from_fn(400, 300, |x, y| {
        let v = if (x * 3 + y) % 7 == 0 { 160 } else { 25 };
        image::Rgb([v, v, v])
    });
    rgb.save(&source).unwrap();

    let params = CropParams {
        min_size: 50,
        max_size: 150,
        num_crops: 3,
        max_attempts: 500,
        resize: 100,
        ..CropParams::default()
    };
    let saved = save_random_crops(&source, FrameSize::new(400, 300), &params, 42).unwrap();

    assert_eq!(saved.len(), 3);
    for (idx, path) in saved.iter().enumerate() {
        assert_eq!(*path, dir.path().join(format!("img_cropped/neg_{}.png", idx)));
        let crop = image::open(path).unwrap();
        assert_eq!((crop.width(), crop.height()), (100, 100));
    }
}

// --------------------------------------------------------------- dataset

fn base_args(image_dir: &Path, annotation_file: &Path, output_dir: &Path) -> Args {
    Args {
        image_dir: image_dir.to_path_buf(),
        annotation_file: annotation_file.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        visible_only: false,
        sign_filter: None,
        mode: CollectionMode::Direct,
        extra_background: false,
        skip_negatives: false,
        frame_width: 1280,
        frame_height: 960,
        min_crop: 50,
        max_crop: 300,
        crops_per_image: 5,
        max_crop_attempts: 1000,
        crop_resize: 100,
        brightness_ceiling: 0.70,
        seed: 42,
        all_common: false,
        min_frequency: 50,
        frequency_table: None,
        create_samples: false,
        train: false,
    }
}

fn write_corpus(path: &Path, positive_lines: usize) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    for i in 0..positive_lines {
        writeln!(
            file,
            "img{:03}.jpg:VISIBLE,100,100,50,50,CAT,STOP;",
            i + 1
        )?;
    }
    writeln!(file, "background.jpg:")?;
    Ok(())
}

#[test]
fn test_prepare_direct_mode_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let img_dir = dir.path().join("img");
    let out_dir = dir.path().join("out");
    fs::create_dir_all(&img_dir).unwrap();
    let corpus = dir.path().join("annotations.txt");
    write_corpus(&corpus, 11).unwrap();

    let args = base_args(&img_dir, &corpus, &out_dir);
    let outcome = prepare_training_data(&args, None, true).unwrap();

    assert_eq!(outcome.object_count, 11);
    let positive_list = outcome.positive_list.expect("positive list written");
    let content = fs::read_to_string(&positive_list).unwrap();
    let first_line = content.lines().next().unwrap();
    assert_eq!(
        first_line,
        format!("{} 1 50 50 50 50", img_dir.join("img001.jpg").display())
    );
    assert_eq!(content.lines().count(), 11);

    let negatives = fs::read_to_string(outcome.negative_list.unwrap()).unwrap();
    assert_eq!(
        negatives.trim(),
        img_dir.join("background.jpg").display().to_string()
    );

    let count = fs::read_to_string(out_dir.join("count_ALLSIGNS.txt")).unwrap();
    assert_eq!(count, "11");
}

#[test]
fn test_prepare_sparse_corpus_skips_positive_list() {
    let dir = tempfile::tempdir().unwrap();
    let img_dir = dir.path().join("img");
    let out_dir = dir.path().join("out");
    fs::create_dir_all(&img_dir).unwrap();
    let corpus = dir.path().join("annotations.txt");
    // exactly the threshold: 10 objects is still too sparse
    write_corpus(&corpus, 10).unwrap();

    let args = base_args(&img_dir, &corpus, &out_dir);
    let outcome = prepare_training_data(&args, None, true).unwrap();

    assert!(outcome.positive_list.is_none());
    assert!(!out_dir.join("positive_samples_ALLSIGNS.txt").exists());
    assert!(outcome.negative_list.unwrap().exists());
}

#[test]
fn test_prepare_sign_filter_routes_only_matching_boxes() {
    let dir = tempfile::tempdir().unwrap();
    let img_dir = dir.path().join("img");
    let out_dir = dir.path().join("out");
    fs::create_dir_all(&img_dir).unwrap();
    let corpus = dir.path().join("annotations.txt");
    let mut file = fs::File::create(&corpus).unwrap();
    for i in 0..12 {
        writeln!(
            file,
            "img{:03}.jpg:VISIBLE,100,100,50,50,CAT,STOP;VISIBLE,400,400,300,300,CAT,GIVE_WAY;",
            i + 1
        )
        .unwrap();
    }
    drop(file);

    let args = base_args(&img_dir, &corpus, &out_dir);
    let outcome = prepare_training_data(&args, Some("STOP"), true).unwrap();

    assert_eq!(outcome.object_count, 12);
    assert_eq!(outcome.sign_label, "STOP");
    let content = fs::read_to_string(out_dir.join("positive_samples_STOP.txt")).unwrap();
    assert!(content.lines().all(|l| l.contains(" 1 50 50 50 50")));
}

#[test]
fn test_prepare_augmented_mode_saves_seed_crop() {
    let dir = tempfile::tempdir().unwrap();
    let img_dir = dir.path().join("img");
    let out_dir = dir.path().join("out");
    fs::create_dir_all(&img_dir).unwrap();
    write_two_tone_png(&img_dir.join("img001.png"), 120, 30);
    let corpus = dir.path().join("annotations.txt");
    fs::write(
        &corpus,
        "img001.png:VISIBLE,95,95,10,10,PROHIBITORY,STOP;\n",
    )
    .unwrap();

    let mut args = base_args(&img_dir, &corpus, &out_dir);
    args.mode = CollectionMode::Augmented;
    args.sign_filter = Some("STOP".to_string());
    args.frame_width = 100;
    args.frame_height = 100;

    let outcome = prepare_training_data(&args, Some("STOP"), true).unwrap();
    let seed = outcome.seed_image.expect("seed crop saved");
    assert_eq!(seed, seed_image_path(&out_dir, "STOP"));
    let crop = image::open(&seed).unwrap();
    assert_eq!((crop.width(), crop.height()), (85, 85));
    // augmented runs never emit a positive list
    assert!(outcome.positive_list.is_none());
}

// --------------------------------------------------------------- trainer

#[test]
fn test_vec_file_name_round_trip() {
    assert_eq!(vec_file_name("STOP", CollectionMode::Direct), "vec_STOP_real.vec");
    assert_eq!(
        vec_file_name("PRIORITY_ROAD", CollectionMode::Augmented),
        "vec_PRIORITY_ROAD_augmented.vec"
    );
    assert_eq!(
        parse_vec_name(Path::new("vec_PRIORITY_ROAD_augmented.vec")),
        Some(("PRIORITY_ROAD".to_string(), "augmented".to_string()))
    );
    assert_eq!(parse_vec_name(Path::new("unrelated.vec")), None);
}

#[test]
fn test_createsamples_invocation_direct() {
    let outcome = PrepOutcome {
        sign_label: "ALLSIGNS".to_string(),
        positive_list: Some(PathBuf::from("out/positive_samples_ALLSIGNS.txt")),
        object_count: 42,
        ..PrepOutcome::default()
    };
    let invocation =
        createsamples_invocation(&outcome, CollectionMode::Direct, Path::new("out")).unwrap();

    assert_eq!(invocation.program, "opencv_createsamples");
    assert_eq!(
        invocation.args,
        vec![
            "-info",
            "out/positive_samples_ALLSIGNS.txt",
            "-vec",
            "out/vec_ALLSIGNS_real.vec",
            "-num",
            "42",
            "-w",
            "32",
            "-h",
            "32",
        ]
    );
}

#[test]
fn test_createsamples_invocation_augmented_requires_seed() {
    let mut outcome = PrepOutcome {
        sign_label: "STOP".to_string(),
        ..PrepOutcome::default()
    };
    assert!(createsamples_invocation(&outcome, CollectionMode::Augmented, Path::new("out")).is_none());

    outcome.seed_image = Some(PathBuf::from("out/largest_sign/STOP.jpg"));
    let invocation =
        createsamples_invocation(&outcome, CollectionMode::Augmented, Path::new("out")).unwrap();
    assert_eq!(
        invocation.args,
        vec![
            "-img",
            "out/largest_sign/STOP.jpg",
            "-vec",
            "out/vec_STOP_augmented.vec",
            "-num",
            "3000",
            "-w",
            "64",
            "-h",
            "64",
        ]
    );
}

#[test]
fn test_traincascade_invocation_flags() {
    let invocation = traincascade_invocation(
        Path::new("cascades/real/STOP"),
        Path::new("vec_STOP_real.vec"),
        Path::new("negative_samples.txt"),
        21,
    );
    assert_eq!(invocation.program, "opencv_traincascade");
    assert_eq!(
        invocation.args,
        vec![
            "-data",
            "cascades/real/STOP",
            "-vec",
            "vec_STOP_real.vec",
            "-bg",
            "negative_samples.txt",
            "-numPos",
            "21",
            "-w",
            "32",
            "-h",
            "32",
            "-mode",
            "ALL",
            "-acceptanceRatioBreakValue",
            "10e-5",
            "-numStages",
            "20",
            "-maxFalseAlarmRate",
            "0.5",
        ]
    );
}
