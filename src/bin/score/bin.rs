#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::sync::Arc;
use std::time::Instant;

use clap::App;
use dialoguer::console::{Emoji, style};
use num_format::{Locale, ToFormattedString};
use serde::Serialize;

use nids_pipeline::cli::{self, CliError};
use nids_pipeline::feature_extraction::EncodingScheme;
use nids_pipeline::model::{artifact, NearestCentroidModel};
use nids_pipeline::model::artifact::LoadedArtifact;
use nids_pipeline::pipeline::{BatchReport, Detector, DetectorConfig};
use nids_pipeline::shared_interface::{Label, Protocol, RawRecord};
use nids_pipeline::synthetic::SyntheticTraffic;

static LOADING: Emoji<'_, '_> = Emoji("⏳ ", "");
static WORKING: Emoji<'_, '_> = Emoji("🛠️  ", "");
static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

enum Source {
    Csv(File),
    Synthetic(usize),
}

struct Opts {
    model: File,
    source: Source,
    out_predictions: Option<File>,
    /// Overrides the scheme stored in the artifact.
    scheme: Option<EncodingScheme>,
    batch_size: usize,
    trend_capacity: usize,
    seed: u64,
    quiet: bool,
}

#[derive(Serialize)]
struct PredictionRow<'a> {
    batch: usize,
    record: usize,
    src_ip: &'a str,
    dst_ip: &'a str,
    protocol: Protocol,
    length: u32,
    src_port: Option<u16>,
    dst_port: Option<u16>,
    prediction: Label,
}

fn parse_opts() -> Result<Opts, CliError> {
    let yml = load_yaml!("cli_args.yaml");
    let m = App::from_yaml(yml).get_matches();

    let quiet = m.is_present("quiet");
    cli::init_logging(quiet);

    let source = if m.is_present("synthetic") {
        Source::Synthetic(value_t_or_exit!(m, "synthetic", usize))
    } else {
        match m.value_of("in_packets") {
            Some(path) => Source::Csv(cli::parse_input_file(path)?),
            None => return Err(CliError::MissingInputArg("in_packets".to_owned())),
        }
    };

    let batch_size = value_t_or_exit!(m, "batch_size", usize);
    if batch_size == 0 { return Err(CliError::InvalidArg("batch_size".to_owned(), "must be at least 1".to_owned())); }

    let model = match m.value_of("model") {
        Some(path) => cli::parse_input_file(path)?,
        None => return Err(CliError::MissingInputArg("model".to_owned())),
    };

    let out_predictions = match m.value_of("out_predictions") {
        Some(path) => Some(cli::parse_output_file(path, m.is_present("force"))?),
        None => None,
    };

    Ok(Opts {
        model,
        source,
        out_predictions,
        scheme: m.value_of("scheme").map(cli::parse_scheme).transpose()?,
        batch_size,
        trend_capacity: value_t_or_exit!(m, "trend", usize),
        seed: value_t_or_exit!(m, "seed", u64),
        quiet,
    })
}

/// Records to score and the number of input rows that could not be read.
fn load_records(opts: &Opts) -> Result<(Vec<RawRecord>, usize), CliError> {
    match &opts.source {
        Source::Csv(file) => {
            let loaded = cli::read_csv_rows(BufReader::new(file))?;
            Ok((loaded.rows, loaded.skipped))
        }
        Source::Synthetic(n) => Ok((SyntheticTraffic::new(opts.seed).packets(*n), 0)),
    }
}

/// Score with the scheme the model was trained under unless overridden.
fn select_scheme(trained: EncodingScheme, requested: Option<&EncodingScheme>) -> EncodingScheme {
    match requested {
        None => trained,
        Some(scheme) if *scheme == trained => trained,
        Some(scheme) => {
            let conflicts = scheme.conflicting_columns(&trained);
            if conflicts.is_empty() {
                info!("Model was trained with encoding {:?}, scoring with {:?}; columns are reconciled",
                      trained.version, scheme.version);
            } else {
                warn!("Columns {} are computed with different thresholds than the model was trained with; \
                       predictions on them are unreliable", conflicts.join(", "));
            }
            scheme.clone()
        }
    }
}

fn print_batch(batch: usize, report: &BatchReport, quiet: bool) {
    let s = &report.summary;
    let counts = s.counts.iter().map(|(label, n)| format!("{}={}", label, n)).collect::<Vec<_>>().join(" ");
    cli::print_output(format!("        batch {:>4}  {:>4} scored  {:>3} malformed  {}\n",
                              batch, s.total, report.failed.len(), counts), quiet);

    for (protocol, per_label) in s.protocol_counts.iter() {
        let malicious: usize = per_label.iter().filter(|(l, _)| l.is_malicious()).map(|(_, n)| n).sum();
        cli::print_output(format!("                     {:<5} {:>4} malicious\n", protocol, malicious), quiet);
    }

    let talkers = s.top_talkers.iter().map(|(ip, n)| format!("{} ({})", ip, n)).collect::<Vec<_>>().join(", ");
    cli::print_output(format!("                     top talkers: {}\n", talkers), quiet);
}

fn print_trend(trend: &[(usize, usize)], quiet: bool) {
    cli::print_output(format!("\n        {}\n", style("Malicious trend").bold()), quiet);
    for (batch, count) in trend.iter() {
        cli::print_output(format!("        {:>6} {:>4} {}\n", batch, count, "#".repeat(*count)), quiet);
    }
}

fn run() -> Result<(), CliError> {
    let opts = parse_opts()?;
    let start = Instant::now();

    cli::print_output(format!("\n{}   {}Loading model and records...\n", style("[1/2]").bold().dim(), LOADING), opts.quiet);

    let LoadedArtifact { scheme: trained_scheme, model } =
        artifact::read_from::<NearestCentroidModel, _>(BufReader::new(&opts.model))?;
    let scheme = select_scheme(trained_scheme, opts.scheme.as_ref());

    let detector = Detector::new(DetectorConfig {
        scheme,
        trend_capacity: opts.trend_capacity,
        ..DetectorConfig::default()
    })?;
    detector.load_model(Arc::new(model));

    let (records, n_unreadable) = load_records(&opts)?;

    cli::print_output(format!("\n{}   {}Scoring {} records...\n\n", style("[2/2]").bold().dim(), WORKING,
                              records.len().to_formatted_string(&Locale::en)), opts.quiet);

    let mut writer = opts.out_predictions.as_ref().map(|file| csv::Writer::from_writer(BufWriter::new(file)));
    let mut n_scored = 0;
    let mut n_malicious = 0;
    let mut n_failed = n_unreadable;

    for (batch_idx, chunk) in records.chunks(opts.batch_size).enumerate() {
        let report = detector.score(chunk)?;
        let offset = batch_idx * opts.batch_size;

        if let Some(w) = writer.as_mut() {
            for scored in report.scored.iter() {
                w.serialize(PredictionRow {
                    batch: batch_idx + 1,
                    record: offset + scored.index,
                    src_ip: &scored.packet.src_ip,
                    dst_ip: &scored.packet.dst_ip,
                    protocol: scored.packet.protocol,
                    length: scored.packet.length,
                    src_port: scored.packet.src_port,
                    dst_port: scored.packet.dst_port,
                    prediction: scored.label,
                })?;
            }
        }

        n_scored += report.summary.total;
        n_malicious += report.summary.malicious;
        n_failed += report.failed.len();
        print_batch(batch_idx + 1, &report, opts.quiet);
    }

    if let Some(w) = writer.as_mut() {
        w.flush().map_err(|e| CliError::IO("predictions".to_owned(), e))?;
    }

    print_trend(&detector.trend(), opts.quiet);

    cli::print_output(format!("\n        Scored:     {}\n", n_scored.to_formatted_string(&Locale::en)), opts.quiet);
    cli::print_output(format!("        Malicious:  {}\n", n_malicious.to_formatted_string(&Locale::en)), opts.quiet);
    cli::print_output(format!("        Malformed:  {}\n", n_failed.to_formatted_string(&Locale::en)), opts.quiet);
    cli::print_output(format!("\n        {}Finished in {:.1?}\n", SPARKLE, start.elapsed()), opts.quiet);

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        cli::exit_with_error(Box::new(e));
    }
}
