//! Upload payload normalization
//!
//! Every shape a caller may hand to an upload operation is reduced to the
//! same triple: the bytes to send, their MIME type, and an optional cleanup
//! action releasing whatever was opened along the way.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::core::error::{ConnectorError, Result};
use crate::shared::constants::DEFAULT_CONTENT_TYPE;

/// Readable and seekable, e.g. an open file or an in-memory cursor
pub trait SeekRead: Read + Seek {}

impl<T: Read + Seek> SeekRead for T {}

/// A file received from an upload widget or form: contents plus metadata
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: Some(name.into()),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Everything an upload can be made from
pub enum UploadSource {
    /// File on the local filesystem, opened and read at upload time
    Path(PathBuf),
    /// In-memory upload object carrying its own name and declared type
    Uploaded(UploadedFile),
    /// Raw bytes, sent unchanged
    Bytes(Bytes),
    /// Open handle; rewound to the start before reading
    Handle(Box<dyn SeekRead + Send>),
    /// Forward-only reader, read from its current position
    Reader(Box<dyn Read + Send>),
}

impl UploadSource {
    pub fn handle<H: SeekRead + Send + 'static>(handle: H) -> Self {
        UploadSource::Handle(Box::new(handle))
    }

    pub fn reader<R: Read + Send + 'static>(reader: R) -> Self {
        UploadSource::Reader(Box::new(reader))
    }

    /// File name carried by the source itself, if any
    pub fn name_hint(&self) -> Option<String> {
        match self {
            UploadSource::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            UploadSource::Uploaded(file) => file.name.clone(),
            _ => None,
        }
    }
}

impl fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            UploadSource::Uploaded(file) => f
                .debug_struct("Uploaded")
                .field("name", &file.name)
                .field("content_type", &file.content_type)
                .field("len", &file.data.len())
                .finish(),
            UploadSource::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            UploadSource::Handle(_) => f.write_str("Handle(..)"),
            UploadSource::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl From<PathBuf> for UploadSource {
    fn from(path: PathBuf) -> Self {
        UploadSource::Path(path)
    }
}

impl From<&Path> for UploadSource {
    fn from(path: &Path) -> Self {
        UploadSource::Path(path.to_path_buf())
    }
}

/// Strings are filesystem paths, not contents
impl From<&str> for UploadSource {
    fn from(path: &str) -> Self {
        UploadSource::Path(PathBuf::from(path))
    }
}

impl From<String> for UploadSource {
    fn from(path: String) -> Self {
        UploadSource::Path(PathBuf::from(path))
    }
}

impl From<UploadedFile> for UploadSource {
    fn from(file: UploadedFile) -> Self {
        UploadSource::Uploaded(file)
    }
}

impl From<Bytes> for UploadSource {
    fn from(data: Bytes) -> Self {
        UploadSource::Bytes(data)
    }
}

impl From<Vec<u8>> for UploadSource {
    fn from(data: Vec<u8>) -> Self {
        UploadSource::Bytes(Bytes::from(data))
    }
}

impl From<File> for UploadSource {
    fn from(file: File) -> Self {
        UploadSource::handle(file)
    }
}

/// Runs its action exactly once: on [`Cleanup::run`] or, failing that, on drop
pub struct Cleanup(Option<Box<dyn FnOnce() + Send>>);

impl Cleanup {
    pub fn new<F: FnOnce() + Send + 'static>(action: F) -> Self {
        Self(Some(Box::new(action)))
    }

    pub fn run(mut self) {
        self.fire();
    }

    fn fire(&mut self) {
        if let Some(action) = self.0.take() {
            action();
        }
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.fire();
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "Cleanup(pending)" } else { "Cleanup(done)" })
    }
}

/// Uniform upload payload
#[derive(Debug)]
pub struct NormalizedPayload {
    pub data: Bytes,
    pub content_type: String,
    cleanup: Option<Cleanup>,
}

impl NormalizedPayload {
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
            cleanup: None,
        }
    }

    /// Attach a cleanup action; it runs after any action already attached
    pub fn with_cleanup<F: FnOnce() + Send + 'static>(mut self, action: F) -> Self {
        self.cleanup = Some(match self.cleanup.take() {
            Some(previous) => Cleanup::new(move || {
                previous.run();
                action();
            }),
            None => Cleanup::new(action),
        });
        self
    }

    pub fn has_cleanup(&self) -> bool {
        self.cleanup.is_some()
    }

    /// Run the cleanup action now. Dropping the payload has the same effect.
    pub fn finish(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.run();
        }
    }
}

/// Guess a MIME type from a file name, falling back to `application/octet-stream`
pub fn guess_content_type(name: &str) -> String {
    if name.is_empty() {
        return DEFAULT_CONTENT_TYPE.to_string();
    }
    mime_guess::from_path(name).first_or_octet_stream().to_string()
}

/// Reduce any [`UploadSource`] to bytes, a content type and a cleanup action.
///
/// `fallback_name` is used to guess the content type when the source carries
/// no name of its own (bytes, handles, readers).
pub fn normalize(source: UploadSource, fallback_name: &str) -> Result<NormalizedPayload> {
    match source {
        UploadSource::Path(path) => {
            let mut file = File::open(&path).map_err(|e| {
                ConnectorError::Validation(format!(
                    "Cannot open upload source '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;

            let content_type = guess_content_type(&path.to_string_lossy());
            debug!(
                "Read {} bytes from {} ({})",
                data.len(),
                path.display(),
                content_type
            );

            Ok(NormalizedPayload::new(data, content_type).with_cleanup(move || {
                drop(file);
                debug!("Closed upload source {}", path.display());
            }))
        }
        UploadSource::Uploaded(file) => {
            let content_type = file
                .content_type
                .filter(|ct| !ct.trim().is_empty())
                .or_else(|| file.name.as_deref().map(guess_content_type))
                .unwrap_or_else(|| guess_content_type(fallback_name));
            Ok(NormalizedPayload::new(file.data, content_type))
        }
        UploadSource::Bytes(data) => {
            Ok(NormalizedPayload::new(data, guess_content_type(fallback_name)))
        }
        UploadSource::Handle(mut handle) => {
            if let Err(e) = handle.rewind() {
                warn!("Upload handle is not seekable, reading from current position: {}", e);
            }
            let mut data = Vec::new();
            handle.read_to_end(&mut data)?;
            Ok(NormalizedPayload::new(data, guess_content_type(fallback_name)))
        }
        UploadSource::Reader(mut reader) => {
            let mut data = Vec::new();
            reader.read_to_end(&mut data)?;
            Ok(NormalizedPayload::new(data, guess_content_type(fallback_name)))
        }
    }
}

/// [`normalize`] on tokio's blocking pool, so file and reader I/O never
/// stalls the async runtime
pub async fn normalize_async(source: UploadSource, fallback_name: &str) -> Result<NormalizedPayload> {
    let fallback_name = fallback_name.to_string();
    tokio::task::spawn_blocking(move || normalize(source, &fallback_name))
        .await
        .map_err(|e| {
            ConnectorError::Io(std::io::Error::other(format!(
                "Upload source read task failed: {}",
                e
            )))
        })?
}
