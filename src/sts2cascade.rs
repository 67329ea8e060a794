use clap::Parser;
use log::{error, info, warn};

use sts2cascade::parser::{load_frequency_table, scan_frequencies, ParseOptions};
use sts2cascade::trainer::{createsamples_invocation, train_all_cascades};
use sts2cascade::{prepare_training_data, Args, PrepOutcome, PrepResult};

fn main() {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(reason) = args.validate() {
        error!("{}", reason);
        std::process::exit(2);
    }
    if !args.annotation_file.exists() {
        error!(
            "The annotation file does not exist: {}",
            args.annotation_file.display()
        );
        std::process::exit(2);
    }
    if !args.image_dir.exists() {
        error!(
            "The image directory does not exist: {}",
            args.image_dir.display()
        );
        std::process::exit(2);
    }

    info!("Starting data preparation...");
    if let Err(e) = run(&args) {
        error!("Failed to prepare training data: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> PrepResult<()> {
    if args.all_common {
        let frequencies = match &args.frequency_table {
            Some(path) => load_frequency_table(path)?,
            None => scan_frequencies(&args.annotation_file, ParseOptions { visible_only: true })?,
        };
        info!("Signs and frequencies: {:?}", frequencies);

        // The negative list is shared by every cascade; produce it once on
        // the first sign and reuse it afterwards.
        let mut first_run = true;
        for (sign, frequency) in frequencies {
            if frequency < args.min_frequency {
                continue;
            }
            let outcome = prepare_training_data(args, Some(&sign), first_run)?;
            first_run = false;
            maybe_create_samples(args, &outcome)?;
        }
    } else {
        let outcome = prepare_training_data(args, args.sign_filter.as_deref(), true)?;
        maybe_create_samples(args, &outcome)?;
    }

    if args.train {
        train_all_cascades(&args.output_dir)?;
    }
    Ok(())
}

fn maybe_create_samples(args: &Args, outcome: &PrepOutcome) -> PrepResult<()> {
    if !args.create_samples {
        return Ok(());
    }
    match createsamples_invocation(outcome, args.mode, &args.output_dir) {
        Some(invocation) => invocation.run(),
        None => {
            warn!(
                "nothing to generate samples from for {}",
                outcome.sign_label
            );
            Ok(())
        }
    }
}
