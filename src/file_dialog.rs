use crate::{FileExtension, PolarsSheetsError, PolarsSheetsResult, UploadedFile};

use egui::Context;
use polars::prelude::*;
use rfd::AsyncFileDialog;
use std::{fs::File, io::BufWriter, path::PathBuf, sync::Arc};

/// Extensions offered by the upload dialog.
pub const UPLOAD_EXTENSIONS: [&str; 3] = ["csv", "xls", "xlsx"];

/// Opens a file dialog asynchronously and reads every chosen file.
///
/// `rfd` hands back the bytes through `FileHandle::read`, which works both
/// natively and in the browser.
///
/// ### Returns
/// The uploaded files, in the order the dialog returned them. Empty if the
/// user cancelled.
pub async fn pick_files() -> Vec<UploadedFile> {
    let Some(handles) = AsyncFileDialog::new()
        .add_filter("CSV or Excel", &UPLOAD_EXTENSIONS)
        .add_filter("All files", &["*"])
        .set_title("Upload files")
        .pick_files()
        .await
    else {
        return Vec::new();
    };

    let mut files = Vec::with_capacity(handles.len());
    for handle in handles {
        let bytes = handle.read().await;
        tracing::debug!("Picked '{}' ({} bytes)", handle.file_name(), bytes.len());
        files.push(UploadedFile::from_bytes(handle.file_name(), bytes));
    }
    files
}

/// Writes `df` as CSV to `path`.
pub fn write_csv(df: &DataFrame, path: &std::path::Path, separator: u8) -> PolarsSheetsResult<()> {
    match FileExtension::from_path(path) {
        FileExtension::Csv => {}
        other => {
            return Err(PolarsSheetsError::UnsupportedFileType(format!(
                "results are exported as CSV, not '{other}'"
            )));
        }
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    CsvWriter::new(&mut writer)
        .include_header(true)
        .with_separator(separator)
        .finish(&mut df.clone())?;

    tracing::info!("Exported {:?} to {}", df.shape(), path.display());
    Ok(())
}

/// Asks where to save the last query result and writes it as CSV.
///
/// ### Logic
/// 1. Open the save dialog with a `.csv` filter.
/// 2. Write the file inside `spawn_blocking` so the runtime stays responsive.
/// 3. Request a repaint and await the blocking task; a panic in the writer
///    surfaces as `TokioJoin`.
///
/// ### Returns
/// `Ok(None)` if the user cancelled, `Ok(Some(path))` once written.
pub async fn save_as_csv(
    df: Arc<DataFrame>,
    separator: u8,
    ctx: Context,
) -> PolarsSheetsResult<Option<PathBuf>> {
    // 1. Save dialog.
    let Some(file) = AsyncFileDialog::new()
        .add_filter("CSV", &["csv"])
        .set_file_name("query_result.csv")
        .save_file()
        .await
    else {
        return Ok(None);
    };

    let path = file.path().to_path_buf();
    let path = write_csv_blocking(df, path, separator).await?;

    // 3. Repaint.
    ctx.request_repaint();
    Ok(Some(path))
}

/// Runs [`write_csv`] on the blocking thread pool.
pub async fn write_csv_blocking(
    df: Arc<DataFrame>,
    path: PathBuf,
    separator: u8,
) -> PolarsSheetsResult<PathBuf> {
    // 2. Blocking write.
    tokio::task::spawn_blocking(move || write_csv(&df, &path, separator).map(|()| path)).await?
}
