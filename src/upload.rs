use crate::{FileExtension, PolarsSheetsResult};

use egui::DroppedFile;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// An uploaded file: name, inferred type, size and raw bytes.
///
/// Immutable once read. The payload is reference counted, so a registry entry
/// can keep it around (for alias renames) without copying the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// File name as sent by the uploader (no directories).
    pub name: String,
    /// Type inferred from the file name extension.
    pub extension: FileExtension,
    /// Payload size in bytes.
    pub size: usize,
    /// Raw binary payload.
    pub data: Arc<[u8]>,
}

impl UploadedFile {
    /// Builds an `UploadedFile` from a name and its bytes.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let data: Arc<[u8]> = bytes.into();
        UploadedFile {
            extension: FileExtension::from_name(&name),
            size: data.len(),
            name,
            data,
        }
    }

    /// Reads a file from disk without blocking the runtime.
    pub async fn from_path(path: &Path) -> PolarsSheetsResult<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = file_name_of(path);
        tracing::debug!("Read {} bytes from {}", bytes.len(), path.display());
        Ok(Self::from_bytes(name, bytes))
    }

    /// Reads a file dropped onto the window.
    ///
    /// On the web the bytes arrive with the event; natively only the path does.
    pub fn from_dropped(dropped: &DroppedFile) -> PolarsSheetsResult<Option<Self>> {
        if let Some(bytes) = &dropped.bytes {
            let name = if dropped.name.is_empty() {
                dropped
                    .path
                    .as_deref()
                    .map(file_name_of)
                    .unwrap_or_default()
            } else {
                dropped.name.clone()
            };
            return Ok(Some(Self::from_bytes(name, bytes.clone())));
        }

        match &dropped.path {
            Some(path) => {
                let bytes = std::fs::read(path)?;
                Ok(Some(Self::from_bytes(file_name_of(path), bytes)))
            }
            None => Ok(None),
        }
    }

    /// Rejects any type other than csv, xls or xlsx.
    pub fn ensure_supported(&self) -> PolarsSheetsResult<()> {
        self.extension.ensure_supported(&self.name)
    }

    /// Size in megabytes, rounded to two decimals, for display.
    pub fn size_mb(&self) -> f64 {
        size_in_mb(self.size)
    }
}

/// Converts a byte count to megabytes rounded to two decimals.
pub fn size_in_mb(size: usize) -> f64 {
    (size as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}
