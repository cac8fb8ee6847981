//! Turn whatever the caller sent into an image file on disk.
//!
//! Callers hand over an upload stream, a path, or a `data:` URL. Each becomes a
//! [`TempImage`] whose extension reflects the best available hint about the
//! format, so downstream decoders can open it by path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use base64::Engine;
use regex::Regex;

use super::IdentifyError;

static MIME_SUBTYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"image/(\w+)").expect("MIME subtype regex is valid"));

const DEFAULT_EXTENSION: &str = "jpg";

/// Raw image input, classified once at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageInput {
    /// Uploaded bytes, possibly received in several chunks.
    Stream {
        filename: Option<String>,
        chunks: Vec<Vec<u8>>,
    },
    FilePath(PathBuf),
    /// `data:image/png;base64,...`
    DataUrl(String),
}

impl ImageInput {
    /// Classify a bare string: `data:` URLs vs. filesystem paths.
    pub fn from_text(text: &str) -> Result<Self, IdentifyError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(IdentifyError::InvalidInput("empty image reference".into()));
        }
        if text.starts_with("data:") {
            Ok(Self::DataUrl(text.to_string()))
        } else {
            Ok(Self::FilePath(PathBuf::from(text)))
        }
    }

    /// Classify the `image` member of a JSON body.
    pub fn from_json(value: Option<&serde_json::Value>) -> Result<Self, IdentifyError> {
        match value {
            Some(serde_json::Value::String(s)) => Self::from_text(s),
            Some(serde_json::Value::Null) | None => {
                Err(IdentifyError::InvalidInput("no image in request".into()))
            }
            Some(_) => Err(IdentifyError::InvalidInput("image must be a string".into())),
        }
    }

    /// Single-chunk upload.
    pub fn upload(filename: Option<String>, bytes: Vec<u8>) -> Self {
        Self::Stream {
            filename,
            chunks: vec![bytes],
        }
    }
}

/// An image written to a temporary file. The file is removed on drop.
#[derive(Debug)]
pub struct TempImage {
    file: tempfile::NamedTempFile,
}

impl TempImage {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn write(bytes: &[u8], extension: &str) -> Result<Self, IdentifyError> {
        let suffix = format!(".{extension}");
        let mut file = tempfile::Builder::new()
            .prefix("plantcare-")
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| IdentifyError::Internal(format!("failed to create temp file: {e}")))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|e| IdentifyError::Internal(format!("failed to write temp file: {e}")))?;
        Ok(Self { file })
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}

fn mime_extension(header: &str) -> Option<String> {
    MIME_SUBTYPE
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Materialize `input` as a temp file.
///
/// Extension priority: upload filename, data-URL MIME subtype, source path, `jpg`.
pub fn normalize(input: &ImageInput) -> Result<TempImage, IdentifyError> {
    match input {
        ImageInput::Stream { filename, chunks } => {
            let total: usize = chunks.iter().map(Vec::len).sum();
            if total == 0 {
                return Err(IdentifyError::InvalidInput("uploaded image is empty".into()));
            }
            let extension = filename
                .as_deref()
                .and_then(|f| extension_of(Path::new(f)))
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

            let mut bytes = Vec::with_capacity(total);
            for chunk in chunks {
                bytes.extend_from_slice(chunk);
            }
            TempImage::write(&bytes, &extension)
        }
        ImageInput::DataUrl(url) => {
            let (header, payload) = url
                .split_once(',')
                .ok_or_else(|| IdentifyError::InvalidInput("data URL has no payload".into()))?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(payload.trim())
                .map_err(|e| IdentifyError::InvalidInput(format!("invalid base64 payload: {e}")))?;
            if bytes.is_empty() {
                return Err(IdentifyError::InvalidInput("data URL payload is empty".into()));
            }
            let extension = mime_extension(header).unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
            TempImage::write(&bytes, &extension)
        }
        ImageInput::FilePath(path) => {
            let bytes = std::fs::read(path).map_err(|e| {
                IdentifyError::InvalidInput(format!("cannot read {}: {e}", path.display()))
            })?;
            let extension = extension_of(path).unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
            TempImage::write(&bytes, &extension)
        }
    }
}
