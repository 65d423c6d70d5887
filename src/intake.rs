use std::io::Cursor;
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::IntakeError;

/// Largest accepted image, 10 MiB.
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Where a candidate file came from. All sources share one validation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeSource {
    DragDrop,
    FilePicker,
    Clipboard,
}

/// A file offered by the user, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl CandidateFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Reads a file from disk, guessing its content type from the extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self::new(file_name, guess_content_type(path), bytes))
    }

    pub fn is_image(&self) -> bool {
        self.content_type.trim().to_ascii_lowercase().starts_with("image/")
    }
}

/// The currently held image plus what was derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub source: IntakeSource,
    /// Pixel width and height, when the header decodes.
    pub dimensions: Option<(u32, u32)>,
}

impl SelectedImage {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn size_label(&self) -> String {
        format_size_mb(self.size_bytes())
    }

    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Accepts `file` as the new selection or says why it cannot be used.
pub fn validate(file: CandidateFile, source: IntakeSource) -> Result<SelectedImage, IntakeError> {
    if !file.is_image() {
        return Err(IntakeError::InvalidFileType {
            file_name: file.file_name,
            content_type: file.content_type,
        });
    }

    let size = file.bytes.len() as u64;
    if size > MAX_IMAGE_BYTES {
        return Err(IntakeError::FileTooLarge {
            file_name: file.file_name,
            size,
            limit: MAX_IMAGE_BYTES,
        });
    }

    let dimensions = decode_dimensions(&file.bytes);
    Ok(SelectedImage {
        file_name: file.file_name,
        content_type: file.content_type,
        bytes: file.bytes,
        source,
        dimensions,
    })
}

/// Picks the first image-typed item of a clipboard paste.
pub fn first_image_item(items: Vec<CandidateFile>) -> Option<CandidateFile> {
    items.into_iter().find(CandidateFile::is_image)
}

pub fn format_size_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn decode_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
