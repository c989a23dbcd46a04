#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

use clap::App;
use dialoguer::console::{Emoji, style};
use num_format::{Locale, ToFormattedString};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use nids_pipeline::cli::{self, CliError};
use nids_pipeline::feature_extraction::{encode, EncodingScheme, FeatureVector};
use nids_pipeline::model::{artifact, Classifier, NearestCentroid, TrainedModel};
use nids_pipeline::model::evaluate::{ClassificationReport, train_test_split};
use nids_pipeline::normalize::normalize;
use nids_pipeline::reconcile::reconcile;
use nids_pipeline::shared_interface::{Label, LabeledRawRecord};
use nids_pipeline::synthetic::SyntheticTraffic;

static LOADING: Emoji<'_, '_> = Emoji("⏳ ", "");
static WORKING: Emoji<'_, '_> = Emoji("🛠️  ", "");
static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

enum Source {
    Csv(File),
    Synthetic(usize),
}

struct Opts {
    source: Source,
    out_model: PathBuf,
    scheme: EncodingScheme,
    test_size: f64,
    seed: u64,
    quiet: bool,
}

fn parse_opts() -> Result<Opts, CliError> {
    let yml = load_yaml!("cli_args.yaml");
    let m = App::from_yaml(yml).get_matches();

    let quiet = m.is_present("quiet");
    cli::init_logging(quiet);

    let source = if m.is_present("synthetic") {
        let n = value_t_or_exit!(m, "synthetic", usize);
        if n == 0 { return Err(CliError::InvalidArg("synthetic".to_owned(), "need at least one record".to_owned())); }
        Source::Synthetic(n)
    } else {
        match m.value_of("in_labeled") {
            Some(path) => Source::Csv(cli::parse_input_file(path)?),
            None => return Err(CliError::MissingInputArg("in_labeled".to_owned())),
        }
    };

    let test_size = value_t_or_exit!(m, "test_size", f64);
    if !(0.0..1.0).contains(&test_size) {
        return Err(CliError::InvalidArg("test_size".to_owned(), format!("{} is not in [0, 1)", test_size)));
    }

    let out_model = match m.value_of("out_model") {
        Some(path) => cli::parse_output_path(path, m.is_present("force"))?,
        None => return Err(CliError::MissingInputArg("out_model".to_owned())),
    };

    Ok(Opts {
        source,
        out_model,
        scheme: cli::parse_scheme(m.value_of("scheme").unwrap_or("v2"))?,
        test_size,
        seed: value_t_or_exit!(m, "seed", u64),
        quiet,
    })
}

fn load_rows(opts: &Opts) -> Result<Vec<LabeledRawRecord>, CliError> {
    cli::print_output(format!("\n{}   {}Loading labeled records...\n", style("[1/3]").bold().dim(), LOADING), opts.quiet);

    match &opts.source {
        Source::Csv(file) => {
            let loaded = cli::read_csv_rows(BufReader::new(file))?;
            if loaded.skipped > 0 {
                warn!("Skipped {} unreadable row(s)", loaded.skipped);
            }
            Ok(loaded.rows)
        }
        Source::Synthetic(n) => {
            warn!("Training on {} synthetic records with random labels", n);
            Ok(SyntheticTraffic::new(opts.seed).labeled_rows(*n))
        }
    }
}

/// Normalize and encode every row; rows that fail to normalize are skipped.
fn encode_rows(opts: &Opts, rows: Vec<LabeledRawRecord>) -> Vec<(FeatureVector, Label)> {
    cli::print_output(format!("\n{}   {}Encoding features...\n", style("[2/3]").bold().dim(), WORKING), opts.quiet);

    let pb = cli::make_progress_bar(rows.len() as u64, opts.quiet);
    let scheme = &opts.scheme;

    // Order is preserved by the indexed parallel collect
    let encoded = rows.into_par_iter()
        .map(|row| {
            let (raw, label) = row.split();
            let result = normalize(&raw, &scheme.thresholds).map(|record| (encode(&record, scheme), label));

            if let Some(pb) = &pb { pb.inc(1); }
            result
        })
        .collect::<Vec<_>>();

    if let Some(pb) = &pb { pb.finish(); }

    encoded.into_iter().enumerate()
        .filter_map(|(i, result)| match result {
            Ok(pair) => Some(pair),
            Err(reason) => {
                warn!("Skipping row {}: {}", i + 1, reason);
                None
            }
        })
        .collect()
}

fn run() -> Result<(), CliError> {
    let opts = parse_opts()?;
    let start = Instant::now();

    let rows = load_rows(&opts)?;
    let n_rows = rows.len();

    let encoded = encode_rows(&opts, rows);
    let n_encoded = encoded.len();

    cli::print_output(format!("\n{}   {}Training classifier...\n", style("[3/3]").bold().dim(), WORKING), opts.quiet);

    let (train, test) = train_test_split(encoded, opts.test_size, opts.seed);
    let (train_x, train_y): (Vec<FeatureVector>, Vec<Label>) = train.into_iter().unzip();
    let model = NearestCentroid::default().fit(&train_x, &train_y)?;

    if !test.is_empty() {
        let (test_x, test_y): (Vec<FeatureVector>, Vec<Label>) = test.into_iter().unzip();
        let predicted = model.predict(&reconcile(&test_x, model.schema())?)?;
        let report = ClassificationReport::compute(&test_y, &predicted)?;
        cli::print_output(format!("\n{}\n", report), opts.quiet);
    }

    // Only a fitted model replaces an existing artifact
    artifact::save(&model, &opts.scheme, &opts.out_model)?;

    cli::print_output(format!("\n        Input rows:       {}\n", n_rows.to_formatted_string(&Locale::en)), opts.quiet);
    cli::print_output(format!("        Encoded rows:     {}\n", n_encoded.to_formatted_string(&Locale::en)), opts.quiet);
    cli::print_output(format!("        Training rows:    {}\n", train_x.len().to_formatted_string(&Locale::en)), opts.quiet);
    cli::print_output(format!("        Features:         {}\n", model.schema().len()), opts.quiet);
    cli::print_output(format!("\n        {}Finished in {:.1?}\n", SPARKLE, start.elapsed()), opts.quiet);

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        cli::exit_with_error(Box::new(e));
    }
}
