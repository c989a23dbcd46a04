//! Model artifacts: gzip-compressed bincode of the model together with the
//! encoding scheme it was trained under.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{PipelineError, Result};
use crate::feature_extraction::EncodingScheme;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, M> {
    format_version: u32,
    scheme: &'a EncodingScheme,
    model: &'a M,
}

#[derive(Deserialize)]
struct Envelope<M> {
    format_version: u32,
    scheme: EncodingScheme,
    model: M,
}

#[derive(Debug)]
pub struct LoadedArtifact<M> {
    /// Scheme the training features were encoded with.
    pub scheme: EncodingScheme,
    pub model: M,
}

/// Write the artifact next to `path` and move it into place once complete,
/// so an existing artifact is only replaced by a whole one.
pub fn save<M: Serialize>(model: &M, scheme: &EncodingScheme, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    write_to(model, scheme, BufWriter::new(tmp.as_file_mut()))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    info!("Saved model artifact to {}", path.display());
    Ok(())
}

pub fn write_to<M: Serialize, W: Write>(model: &M, scheme: &EncodingScheme, writer: W) -> Result<()> {
    let mut gz = GzEncoder::new(writer, Compression::default());
    bincode::serialize_into(&mut gz, &EnvelopeRef { format_version: FORMAT_VERSION, scheme, model })?;
    gz.finish()?.flush()?;
    Ok(())
}

pub fn load<M: DeserializeOwned>(path: &Path) -> Result<LoadedArtifact<M>> {
    let artifact = read_from(BufReader::new(File::open(path)?))?;
    info!("Loaded model artifact from {} (encoding {:?})", path.display(), artifact.scheme.version);
    Ok(artifact)
}

pub fn read_from<M: DeserializeOwned, R: Read>(reader: R) -> Result<LoadedArtifact<M>> {
    let envelope: Envelope<M> = bincode::deserialize_from(GzDecoder::new(reader))?;

    if envelope.format_version != FORMAT_VERSION {
        return Err(PipelineError::Artifact(format!(
            "unsupported artifact format version {} (expected {})", envelope.format_version, FORMAT_VERSION)));
    }

    Ok(LoadedArtifact { scheme: envelope.scheme, model: envelope.model })
}
