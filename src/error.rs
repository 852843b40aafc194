use polars::prelude::PolarsError;
use std::io;
use thiserror::Error;
use tokio::task::JoinError;

/**
Result type to simplify function signatures.

This is a custom result type that uses our custom `PolarsSheetsError` for the error type.

Functions can return `PolarsSheetsResult<T>` and then use `?` to automatically propagate errors.
*/
pub type PolarsSheetsResult<T> = Result<T, PolarsSheetsError>;

/**
Custom error type for Polars Sheets.

This enum defines all the possible errors that can occur in the application.

Three families are surfaced to the user:
- validation errors (aliases, empty query), raised before the query engine is touched;
- unsupported-input errors (file type, unreadable workbook, missing sheet),
  which abort only the registration of one file;
- engine errors (`Polars`), carrying the engine's own message.

We use the `thiserror` crate to derive the `Error` trait and automatically
implement `Display` using the `#[error(...)]` attribute.
*/
#[derive(Error, Debug)]
pub enum PolarsSheetsError {
    // Wrapper for standard IO errors.
    // The #[from] attribute automatically converts io::Error to PolarsSheetsError::Io.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Wrapper for Polars errors: CSV parsing, SQL parsing and execution,
    // missing tables and type mismatches all arrive here.
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    // Wrapper for workbook reader errors (XLS/XLSX).
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    // Errors encountered while parsing CSV data (e.g., no delimiter produced a usable table).
    #[error("CSV parsing error: {0}")]
    CsvParsing(String),

    // Indicates an invalid CSV delimiter was provided (empty).
    #[error("Invalid CSV delimiter: '{0}'")]
    InvalidDelimiter(String),

    // Indicates that a provided file extension or file type is not supported.
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    // The uploaded file name has no extension at all.
    #[error("Missing file extension: {0}")]
    MissingExtension(String),

    // The requested sheet does not exist in the workbook.
    #[error("Sheet '{sheet}' not found in '{file}'")]
    SheetNotFound { file: String, sheet: String },

    // --- Validation Errors ---
    /// A user-supplied alias starts with the prefix reserved for generated aliases.
    #[error("Alias '{alias}' is invalid: the prefix '{prefix}' is reserved and cannot be used.")]
    ReservedAlias { alias: String, prefix: String },

    /// A user-supplied alias is empty or only whitespace.
    #[error("Alias must not be empty.")]
    EmptyAlias,

    /// Another registered table already answers to this alias.
    #[error("Alias '{0}' is already used by another table.")]
    AliasInUse(String),

    /// The query editor was empty when "Run query" was requested.
    #[error("Please enter a SQL query.")]
    EmptyQuery,
    // --- End Validation Errors ---
    /// No registered table has this display key.
    #[error("No registered table named '{0}'")]
    EntryNotFound(String),

    /// One or more files of an upload batch failed; the others were registered.
    #[error("{} file(s) could not be registered:\n{}", .0.len(), .0.join("\n"))]
    UploadBatch(Vec<String>),

    // Wrapper for Tokio JoinErrors, occurring when asynchronous tasks fail.
    #[error("Tokio JoinError: {0}")]
    TokioJoin(#[from] JoinError),

    // Errors occurring when receiving data from asynchronous channels.
    #[error("Channel receive error: {0}")]
    ChannelReceive(String),

    #[error("Invalid value for command-line argument '{arg_name}': {reason}")]
    InvalidArgument {
        arg_name: String, // Context about *which* argument failed
        reason: String,   // The specific error reason
    },

    // A catch-all for other, less specific errors not covered by specific variants.
    #[error("Other error: {0}")]
    Other(String),
}

impl PolarsSheetsError {
    /// `true` for errors raised before any engine interaction.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PolarsSheetsError::ReservedAlias { .. }
                | PolarsSheetsError::EmptyAlias
                | PolarsSheetsError::AliasInUse(_)
                | PolarsSheetsError::EmptyQuery
        )
    }
}

#[cfg(test)]
mod tests_error {
    use super::*;

    #[test]
    fn test_upload_batch_message_lists_every_failure() {
        let error = PolarsSheetsError::UploadBatch(vec![
            "notes.txt: Unsupported file type: txt".to_string(),
            "broken.xlsx: Spreadsheet error: invalid zip".to_string(),
        ]);
        let message = error.to_string();

        assert!(message.starts_with("2 file(s) could not be registered:"));
        assert!(message.contains("notes.txt"));
        assert!(message.contains("broken.xlsx"));
    }

    #[tokio::test]
    async fn test_panicked_task_becomes_join_error() {
        let task = tokio::task::spawn_blocking(|| -> PolarsSheetsResult<()> {
            panic!("writer failed");
        });
        let join_err = task.await.expect_err("the task panicked");
        let error = PolarsSheetsError::from(join_err);

        assert!(matches!(error, PolarsSheetsError::TokioJoin(_)));
        assert!(!error.is_validation());
    }

    #[test]
    fn test_validation_family() {
        let reserved = PolarsSheetsError::ReservedAlias {
            alias: "table99".to_string(),
            prefix: "table".to_string(),
        };
        assert!(reserved.is_validation());
        assert!(PolarsSheetsError::EmptyQuery.is_validation());
        assert!(!PolarsSheetsError::UnsupportedFileType("txt".to_string()).is_validation());
    }
}
