use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::PathBuf;

use dialoguer::Confirm;
use dialoguer::theme::ColorfulTheme;
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::error::PipelineError;
use crate::feature_extraction::{EncodingScheme, SchemeVersion};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Missing input argument: {0}.")]
    MissingInputArg(String),
    #[error("Invalid value for {0}: {1}.")]
    InvalidArg(String, String),
    #[error("Could not find file \"{0}\".")]
    FileNotFound(String),
    #[error("Provided file \"{0}\" is a directory.")]
    FileIsDirectory(String),
    #[error("File \"{0}\" already exists.")]
    FileExists(String),
    #[error("I/O error for {0}: {1}.")]
    IO(String, std::io::Error),
    #[error("CSV error: {0}.")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Pipeline(#[from] PipelineError),
}

/// Check that `input` may be written. An existing file is only accepted with
/// `force` or after the user confirms. Nothing is opened or truncated.
pub fn parse_output_path(input: &str, force: bool) -> Result<PathBuf, CliError> {
    let path = PathBuf::from(input);

    if path.is_dir() {
        Err(CliError::FileIsDirectory(input.to_string()))
    } else if path.exists() {
        let overwrite = force || matches!(
            Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(format!("File \"{}\" exists, overwrite?", input))
                .default(false).wait_for_newline(true).interact_opt(),
            Ok(Some(true))
        );

        if overwrite { Ok(path) } else { Err(CliError::FileExists(input.to_string())) }
    } else {
        Ok(path)
    }
}

/// Open `input` for writing, see [`parse_output_path`].
pub fn parse_output_file(input: &str, force: bool) -> Result<File, CliError> {
    let path = parse_output_path(input, force)?;
    OpenOptions::new().write(true).create(true).truncate(true).open(&path)
        .map_err(|io_err| CliError::IO(input.to_string(), io_err))
}

pub fn parse_input_file(input: &str) -> Result<File, CliError> {
    let path = PathBuf::from(input);

    if !path.exists() {
        Err(CliError::FileNotFound(input.to_string()))
    } else if path.is_dir() {
        Err(CliError::FileIsDirectory(input.to_string()))
    } else {
        File::open(path).map_err(|io_err| CliError::IO(input.to_string(), io_err))
    }
}

/// `v1`/`v2` select a built-in scheme, anything else is read as a JSON scheme file.
pub fn parse_scheme(input: &str) -> Result<EncodingScheme, CliError> {
    match SchemeVersion::parse(input) {
        Some(version) => Ok(EncodingScheme::builtin(version).clone()),
        None => {
            parse_input_file(input)?;
            Ok(EncodingScheme::from_json_file(&PathBuf::from(input))?)
        }
    }
}

/// Rows of a CSV file with a header.
#[derive(Debug)]
pub struct CsvRows<T> {
    pub rows: Vec<T>,
    /// Rows that could not be deserialized.
    pub skipped: usize,
}

/// Deserialize every row of `reader`. A row that does not parse is logged and
/// skipped; only I/O errors abort.
pub fn read_csv_rows<T: DeserializeOwned, R: Read>(reader: R) -> Result<CsvRows<T>, CliError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    let mut skipped = 0;

    for (i, result) in csv_reader.deserialize().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                warn!("Skipping CSV row {}: {}", i + 1, e);
                skipped += 1;
            }
        }
    }

    Ok(CsvRows { rows, skipped })
}

pub fn make_progress_bar(len: u64, quiet: bool) -> Option<ProgressBar> {
    if quiet { return None; }

    let pb = ProgressBar::new(len);
    pb.set_style(ProgressStyle::default_bar()
        .template("        {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        .progress_chars("##-"));
    Some(pb)
}

pub fn print_output<S: AsRef<str>>(msg: S, quiet: bool) {
    if !quiet { eprint!("{}", msg.as_ref()); }
}

pub fn init_logging(quiet: bool) {
    let default_filter = if quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

pub fn exit_with_error(e: Box<dyn std::error::Error>) -> ! {
    error!("{}", e);
    eprintln!("Error: {}", e);
    std::process::exit(1)
}


#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::cli::{CliError, parse_input_file, parse_output_file, parse_output_path, parse_scheme, read_csv_rows};
    use crate::feature_extraction::SchemeVersion;
    use crate::shared_interface::RawRecord;

    #[test]
    fn input_file_checks() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_str().unwrap();

        assert!(matches!(parse_input_file(&format!("{}/absent.csv", dir_path)), Err(CliError::FileNotFound(_))));
        assert!(matches!(parse_input_file(dir_path), Err(CliError::FileIsDirectory(_))));
    }

    #[test]
    fn forced_overwrite() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"old").unwrap();

        let path = file.path().to_str().unwrap().to_owned();
        assert!(parse_output_file(&path, true).is_ok());
        assert_eq!(0, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn output_path_check_keeps_existing_content() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"previous model").unwrap();

        let path = file.path().to_str().unwrap().to_owned();
        assert_eq!(file.path(), parse_output_path(&path, true).unwrap().as_path());
        assert_eq!(b"previous model".to_vec(), std::fs::read(&path).unwrap());
    }

    #[test]
    fn bad_csv_row_is_skipped() {
        let data = "src_ip,dst_ip,protocol,length,src_port,dst_port,flags\n\
                    192.168.1.2,10.0.0.1,6,60,40000,443,2\n\
                    192.168.1.3,10.0.0.1,6,70,40001,443.0,2.0\n\
                    192.168.1.4,10.0.0.1,17,80,53,5353,\n";

        let loaded = read_csv_rows::<RawRecord, _>(data.as_bytes()).unwrap();
        assert_eq!(1, loaded.skipped);
        assert_eq!(vec!["192.168.1.2", "192.168.1.4"], loaded.rows.iter().map(|r| r.src_ip.as_str()).collect::<Vec<_>>());
        assert_eq!(None, loaded.rows[1].flags);
    }

    #[test]
    fn builtin_schemes() {
        assert_eq!(SchemeVersion::V1, parse_scheme("v1").unwrap().version);
        assert_eq!(SchemeVersion::V2, parse_scheme("2").unwrap().version);
        assert!(matches!(parse_scheme("/no/such/scheme.json"), Err(CliError::FileNotFound(_))));
    }
}
