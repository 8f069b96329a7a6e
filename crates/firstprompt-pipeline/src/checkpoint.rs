//! Append-only CSV checkpoints shared by concurrent completion callbacks.

use std::fs::{self, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use firstprompt_common::{Error, Result, SuggestedMessage, TopicRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

/// A row type with a fixed checkpoint header.
///
/// The header must list the columns in the order serde serializes the fields.
pub trait CheckpointRow: Serialize {
    const HEADER: &'static [&'static str];
}

impl CheckpointRow for TopicRecord {
    const HEADER: &'static [&'static str] = &["country_id", "grade_id", "subject_id", "topic"];
}

impl CheckpointRow for SuggestedMessage {
    const HEADER: &'static [&'static str] = &[
        "uuid",
        "created_on",
        "message",
        "language_id",
        "country_id",
        "grade_id",
        "subject_id",
    ];
}

/// Appends rows of `R` to a single CSV file.
///
/// Every [`append`](Self::append) holds one lock for the whole
/// open/write/flush/close cycle, so rows from different callers never
/// interleave and the header is only ever written by the constructor.
#[derive(Debug)]
pub struct CheckpointWriter<R> {
    path: PathBuf,
    lock: Mutex<()>,
    _row: PhantomData<fn(&R)>,
}

impl<R: CheckpointRow> CheckpointWriter<R> {
    /// Start a fresh checkpoint, truncating any existing file.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_parent(&path)?;
        let file = fs::File::create(&path).map_err(|e| open_error(&path, e))?;
        write_header(file, R::HEADER, &path)?;
        info!("created checkpoint {}", path.display());
        Ok(Self::at(path))
    }

    /// Continue an existing checkpoint. The header is written only when the
    /// file is missing or empty; existing rows are kept.
    pub fn resume(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let is_empty = match fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(open_error(&path, e)),
        };

        if is_empty {
            return Self::create(path);
        }
        info!("resuming checkpoint {}", path.display());
        Ok(Self::at(path))
    }

    fn at(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
            _row: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `rows` and flush. Returns the number of rows written.
    pub fn append(&self, rows: &[R]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let _guard = self
            .lock
            .lock()
            .map_err(|_| Error::Persistence("checkpoint lock poisoned".into()))?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| open_error(&self.path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for row in rows {
            writer.serialize(row).map_err(|e| write_error(&self.path, e))?;
        }
        writer
            .flush()
            .map_err(|e| write_error(&self.path, e))?;

        debug!("appended {} rows to {}", rows.len(), self.path.display());
        Ok(rows.len())
    }
}

/// Load every row of a checkpoint file.
pub fn read_checkpoint<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>> {
    if !path.exists() {
        return Err(Error::NotFound(format!(
            "checkpoint {} does not exist",
            path.display()
        )));
    }

    let mut reader = csv::Reader::from_path(path)?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<R>, csv::Error>>()
        .map_err(|e| Error::Persistence(format!("failed to read checkpoint {}: {e}", path.display())))
}

/// Load a checkpoint that is about to be resumed.
///
/// A crash during [`CheckpointWriter::append`] can leave the last row torn:
/// unparseable, or missing its line terminator. That row is logged, cut
/// from the file so the next append starts on a fresh line, and left out of
/// the result. A malformed row anywhere else is still an error.
pub fn recover_checkpoint<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(format!(
                "checkpoint {} does not exist",
                path.display()
            )));
        }
        Err(e) => return Err(open_error(path, e)),
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data.as_slice());
    let headers = reader
        .byte_headers()
        .map_err(|e| read_error(path, e))?
        .clone();

    let mut parsed = Vec::new();
    let mut record = csv::ByteRecord::new();
    while reader
        .read_byte_record(&mut record)
        .map_err(|e| read_error(path, e))?
    {
        let start = record.position().map_or(0, csv::Position::byte);
        let row = if record.len() == headers.len() {
            record
                .deserialize::<R>(Some(&headers))
                .map_err(|e| e.to_string())
        } else {
            Err(format!(
                "expected {} fields, found {}",
                headers.len(),
                record.len()
            ))
        };
        parsed.push((start, row));
    }

    let torn = match parsed.last() {
        Some((_, Err(e))) => Some(e.clone()),
        Some((_, Ok(_))) if !data.ends_with(b"\n") => Some("row is not terminated".to_string()),
        _ => None,
    };
    if let Some(reason) = torn {
        let start = parsed.pop().map_or(0, |(start, _)| start);
        warn!(
            "dropping torn last row of {} at byte {start}: {reason}",
            path.display()
        );
        OpenOptions::new()
            .write(true)
            .open(path)
            .and_then(|file| file.set_len(start))
            .map_err(|e| write_error(path, e))?;
    }

    parsed
        .into_iter()
        .map(|(_, row)| row.map_err(|e| read_error(path, e)))
        .collect()
}

pub fn read_topic_checkpoint(path: &Path) -> Result<Vec<TopicRecord>> {
    read_checkpoint(path)
}

pub fn read_message_checkpoint(path: &Path) -> Result<Vec<SuggestedMessage>> {
    read_checkpoint(path)
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| open_error(parent, e))
        }
        _ => Ok(()),
    }
}

fn write_header(file: fs::File, header: &[&str], path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer
        .write_record(header)
        .map_err(|e| write_error(path, e))?;
    writer.flush().map_err(|e| write_error(path, e))
}

fn read_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Persistence(format!("failed to read checkpoint {}: {err}", path.display()))
}

fn open_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Persistence(format!("failed to open checkpoint {}: {err}", path.display()))
}

fn write_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Persistence(format!("failed to write checkpoint {}: {err}", path.display()))
}
