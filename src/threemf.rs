//! Retrieval of the gcode stream packaged inside a sliced 3MF project.
//!
//! Sliced projects carry one gcode file per build plate. The plate layout is
//! described by `Metadata/model_settings.config`, whose `<plate>` elements
//! name their gcode file through a `<metadata key="gcode_file"/>` entry.

use std::{
    fs::File,
    io::BufReader,
    path::{Component, Path, PathBuf},
};

use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};
use zip::ZipArchive;

/// Location of the plate configuration inside the archive.
pub const MODEL_SETTINGS: &str = "Metadata/model_settings.config";

/// Why no gcode could be extracted from an archive.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The archive could not be opened.
    #[error("failed to open archive {path}: {source}")]
    Open {
        /// Path of the archive.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The archive is not a readable zip file.
    #[error("failed to unpack archive {path}: {source}")]
    Archive {
        /// Path of the archive.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: zip::result::ZipError,
    },

    /// The scratch directory could not be created.
    #[error("failed to create scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    /// The archive has no plate configuration.
    #[error("archive has no Metadata/model_settings.config")]
    MissingConfig,

    /// The plate configuration is not valid XML.
    #[error("malformed plate configuration: {0}")]
    MalformedConfig(String),

    /// The first plate does not name a gcode file (the project was not sliced).
    #[error("the first plate does not name a gcode file")]
    NoGcodeFile,

    /// The named gcode stream is not in the archive.
    #[error("gcode stream {0} not found in archive")]
    MissingStream(String),

    /// A file inside the archive could not be read.
    #[error("failed to read {name}: {source}")]
    Read {
        /// Path of the file, relative to the archive root.
        name: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// The gcode of one plate, with the archive-internal name it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedGcode {
    /// Path of the stream inside the archive, e.g. `Metadata/plate_1.gcode`.
    pub name: String,
    /// The gcode text.
    pub gcode: String,
}

/// Extract the gcode stream from a 3MF archive.
///
/// The archive is unpacked into a scratch directory which is removed again
/// before returning, whatever the outcome. Without an explicit `gcode_file`
/// the stream of the first plate is used.
pub fn extract_gcode(archive: &Path, gcode_file: Option<&str>) -> Result<ExtractedGcode, ExtractError> {
    tracing::debug!(archive = archive.display().to_string(), "extracting gcode");

    let file = File::open(archive).map_err(|source| ExtractError::Open {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(|source| ExtractError::Archive {
        path: archive.to_path_buf(),
        source,
    })?;

    let scratch = tempfile::Builder::new()
        .prefix("spool-tracker-")
        .tempdir()
        .map_err(ExtractError::Scratch)?;
    zip.extract(scratch.path()).map_err(|source| ExtractError::Archive {
        path: archive.to_path_buf(),
        source,
    })?;

    let name = match gcode_file {
        Some(name) => name.trim_start_matches('/').to_owned(),
        None => default_gcode_file(scratch.path())?,
    };
    tracing::debug!(name = name.as_str(), "found gcode stream");

    let path = resolve(scratch.path(), &name).ok_or_else(|| ExtractError::MissingStream(name.clone()))?;
    if !path.is_file() {
        return Err(ExtractError::MissingStream(name));
    }

    let gcode = std::fs::read_to_string(&path).map_err(|source| ExtractError::Read {
        name: name.clone(),
        source,
    })?;
    tracing::debug!(bytes = gcode.len(), "read gcode");

    Ok(ExtractedGcode { name, gcode })
}

fn default_gcode_file(root: &Path) -> Result<String, ExtractError> {
    let xml = match std::fs::read_to_string(root.join(MODEL_SETTINGS)) {
        Ok(xml) => xml,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(ExtractError::MissingConfig),
        Err(source) => {
            return Err(ExtractError::Read {
                name: MODEL_SETTINGS.to_owned(),
                source,
            })
        }
    };

    plate_gcode_file(&xml)?.ok_or(ExtractError::NoGcodeFile)
}

/// Join `name` onto `root`, refusing names which would leave `root`.
fn resolve(root: &Path, name: &str) -> Option<PathBuf> {
    let relative = Path::new(name);
    relative
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
        .then(|| root.join(relative))
}

/// Find the `gcode_file` metadata entry of the first `<plate>`.
fn plate_gcode_file(xml: &str) -> Result<Option<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // Depth below the first <plate>, once we are inside it.
    let mut plate_depth: Option<usize> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| ExtractError::MalformedConfig(err.to_string()))?;

        match (event, plate_depth) {
            (Event::Start(element), None) => {
                if element.local_name().as_ref() == b"plate" {
                    plate_depth = Some(0);
                }
            }
            (Event::Start(element), Some(depth)) => {
                if depth == 0 {
                    if let Some(file) = gcode_file_entry(&element)? {
                        return Ok(Some(file));
                    }
                }
                plate_depth = Some(depth + 1);
            }
            (Event::Empty(element), Some(0)) => {
                if let Some(file) = gcode_file_entry(&element)? {
                    return Ok(Some(file));
                }
            }
            (Event::End(_), Some(0)) => return Ok(None),
            (Event::End(_), Some(depth)) => plate_depth = Some(depth - 1),
            (Event::Eof, _) => return Ok(None),
            _ => {}
        }
    }
}

fn gcode_file_entry(element: &BytesStart) -> Result<Option<String>, ExtractError> {
    if element.local_name().as_ref() != b"metadata" {
        return Ok(None);
    }
    if attribute(element, b"key")?.as_deref() != Some("gcode_file") {
        return Ok(None);
    }

    Ok(attribute(element, b"value")?.filter(|value| !value.is_empty()))
}

fn attribute(element: &BytesStart, key: &[u8]) -> Result<Option<String>, ExtractError> {
    let attribute = element
        .try_get_attribute(key)
        .map_err(|err| ExtractError::MalformedConfig(err.to_string()))?;

    attribute
        .map(|attribute| {
            attribute
                .unescape_value()
                .map(|value| value.into_owned())
                .map_err(|err| ExtractError::MalformedConfig(err.to_string()))
        })
        .transpose()
}
