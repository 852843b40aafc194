use crate::{PathExtension, PolarsSheetsError, PolarsSheetsResult};
use std::{fmt, path::Path};

/// Represents the extension of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileExtension {
    /// CSV file extension.
    Csv,
    /// Legacy Excel workbook (BIFF).
    Xls,
    /// Office Open XML workbook.
    Xlsx,
    /// Unknown file extension, storing the extension as a string.
    Unknown(String),
    /// Missing file extension, when no extension is present in the name.
    Missing,
}

impl FileExtension {
    /// Determines the file extension from a given path.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension_as_lowercase()
            .as_deref() // Converts `Option<String>` to `Option<&str>` for matching.
        {
            Some("csv") => FileExtension::Csv,
            Some("xls") => FileExtension::Xls,
            Some("xlsx") => FileExtension::Xlsx,
            Some(ext) => FileExtension::Unknown(ext.to_owned()),
            None => FileExtension::Missing,
        }
    }

    /// Determines the file extension from a bare file name (as sent by an upload).
    pub fn from_name(name: &str) -> Self {
        Self::from_path(Path::new(name))
    }

    /// `true` for workbook formats that may contain several sheets.
    pub fn is_spreadsheet(&self) -> bool {
        matches!(self, FileExtension::Xls | FileExtension::Xlsx)
    }

    /// Accepts only the formats the extractors understand.
    ///
    /// `file_name` is used for the error message of a missing extension.
    pub fn ensure_supported(&self, file_name: &str) -> PolarsSheetsResult<()> {
        match self {
            FileExtension::Csv | FileExtension::Xls | FileExtension::Xlsx => Ok(()),
            FileExtension::Unknown(ext) => Err(PolarsSheetsError::UnsupportedFileType(ext.clone())),
            FileExtension::Missing => Err(PolarsSheetsError::MissingExtension(file_name.to_string())),
        }
    }
}

impl fmt::Display for FileExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileExtension::Csv => write!(f, "csv"),
            FileExtension::Xls => write!(f, "xls"),
            FileExtension::Xlsx => write!(f, "xlsx"),
            FileExtension::Unknown(ext) => write!(f, "{ext}"),
            FileExtension::Missing => write!(f, ""),
        }
    }
}
