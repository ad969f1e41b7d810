//! Scoped temp staging for one gateway call.
//!
//! A [`TransferSession`] owns one temp file. The file is deleted when the
//! session is dropped, whichever way the call ends: success, error, or the
//! call's future being dropped by a cancelled client. A failed delete is
//! logged and otherwise ignored.

use crate::io::Format;
use crate::{Error, Result};
use futures::stream;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tempfile::TempPath;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

/// A stream of payload chunks.
pub type ChunkStream = Pin<Box<dyn futures::Stream<Item = Result<Vec<u8>>> + Send>>;

/// Temp staging for a single transfer.
pub struct TransferSession {
    id: Uuid,
    profile: String,
    format: Format,
    path: PathBuf,
    temp: Option<TempPath>,
    file: Option<tokio::fs::File>,
    written: u64,
}

impl TransferSession {
    /// Creates a session with an empty temp file in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp file cannot be created.
    pub fn create(dir: &Path, profile: &str, format: Format) -> Result<Self> {
        let id = Uuid::now_v7();
        let named = tempfile::Builder::new()
            .prefix(&format!("dataport-{id}-"))
            .suffix(&format!(".{}", format.extension()))
            .tempfile_in(dir)
            .map_err(|e| Error::operation("create_temp_file", e))?;
        let (file, temp) = named.into_parts();
        let path = temp.to_path_buf();
        debug!(transfer_session = %id, path = %path.display(), "Opened transfer session");
        Ok(Self {
            id,
            profile: profile.to_string(),
            format,
            path,
            temp: Some(temp),
            file: Some(tokio::fs::File::from_std(file)),
            written: 0,
        })
    }

    /// Session id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Profile name the session was opened for.
    #[must_use]
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Payload format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Location of the staged file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes appended so far.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Appends bytes to the staged file, in call order.
    ///
    /// # Errors
    ///
    /// Returns an error if the session was already sealed or the write fails.
    pub async fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::operation("stage_bytes", "session is sealed"))?;
        file.write_all(bytes)
            .await
            .map_err(|e| Error::operation("stage_bytes", e))?;
        self.written += bytes.len() as u64;
        metrics::counter!("dataport_transfer_bytes_total", "direction" => "in")
            .increment(bytes.len() as u64);
        Ok(())
    }

    /// Flushes and closes the append handle. Later appends fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub async fn seal(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| Error::operation("flush_staged_bytes", e))?;
        }
        Ok(())
    }

    /// Opens the staged file for decoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn reader(&self) -> Result<BufReader<File>> {
        File::open(&self.path)
            .map(BufReader::new)
            .map_err(|e| Error::operation("open_staged_file", e))
    }

    /// Opens the staged file for encoding, truncating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn writer(&mut self) -> Result<BufWriter<File>> {
        self.file = None;
        File::create(&self.path)
            .map(BufWriter::new)
            .map_err(|e| Error::operation("open_staged_file", e))
    }

    /// Re-reads the staged size after writing through [`Self::writer`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read.
    pub async fn refresh_size(&mut self) -> Result<()> {
        self.written = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| Error::operation("stat_staged_file", e))?
            .len();
        Ok(())
    }

    /// Reads the whole staged file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn read_all(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| Error::operation("read_staged_file", e))
    }

    /// Turns the session into a stream of `chunk_size` chunks of the staged
    /// file. Every chunk but the last is full. The file is deleted when the
    /// stream ends or is dropped.
    #[must_use]
    pub fn into_chunks(self, chunk_size: usize) -> ChunkStream {
        let chunk_size = chunk_size.max(1);
        Box::pin(stream::try_unfold(
            (self, None::<tokio::fs::File>),
            move |(session, file)| next_chunk(session, file, chunk_size),
        ))
    }
}

type ChunkState = (TransferSession, Option<tokio::fs::File>);

async fn next_chunk(
    session: TransferSession,
    file: Option<tokio::fs::File>,
    chunk_size: usize,
) -> Result<Option<(Vec<u8>, ChunkState)>> {
    let mut file = match file {
        Some(file) => file,
        None => tokio::fs::File::open(&session.path)
            .await
            .map_err(|e| Error::operation("open_staged_file", e))?,
    };
    let mut chunk = vec![0; chunk_size];
    let mut filled = 0;
    while filled < chunk_size {
        let read = file
            .read(&mut chunk[filled..])
            .await
            .map_err(|e| Error::operation("read_staged_file", e))?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    if filled == 0 {
        return Ok(None);
    }
    chunk.truncate(filled);
    metrics::counter!("dataport_transfer_bytes_total", "direction" => "out")
        .increment(filled as u64);
    Ok(Some((chunk, (session, Some(file)))))
}

impl Drop for TransferSession {
    fn drop(&mut self) {
        self.file = None;
        if let Some(temp) = self.temp.take() {
            match temp.close() {
                Ok(()) => debug!(transfer_session = %self.id, "Removed staged file"),
                Err(e) => warn!(
                    transfer_session = %self.id,
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove staged file"
                ),
            }
        }
    }
}
