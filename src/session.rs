//! The state of one user session and the commands that change it.
//!
//! The UI never touches the engine or the registry directly: it reads the
//! session each frame and queues `Command`s, which `Session::handle` applies
//! one at a time.

use crate::{
    ExtractOptions, LastQuery, PolarsSheetsError, PolarsSheetsResult, PreviewRows, SheetSelection,
    SqlEngine, TableRegistry, UploadedFile, partition_multi_sheet, preview, run_query,
};

use polars::prelude::DataFrame;
use std::sync::Arc;

/// Everything the user can ask the session to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start a new upload batch.
    Upload(Vec<UploadedFile>),
    /// Check or uncheck one sheet of a pending multi-sheet workbook.
    ToggleSheet {
        file: String,
        sheet: String,
        checked: bool,
    },
    /// Register the checked sheets.
    ConfirmSheets,
    /// Discard the pending sheet selection.
    CancelSheets,
    RunQuery(String),
    RenameAlias {
        key: String,
        alias: String,
    },
    /// Unregister one entry, by display key.
    Delete(String),
    DeleteAll,
    /// Show the preview of the entry with this display key.
    SelectPreview(String),
    SetPreviewRows(u32),
}

/// Result of the last preview: the rows, or the engine's message.
pub type PreviewResult = Result<Arc<DataFrame>, String>;

#[derive(Debug, Default)]
pub struct Session {
    engine: SqlEngine,
    registry: TableRegistry,
    last_query: Option<LastQuery>,
    /// Files of the current upload batch.
    batch: Vec<UploadedFile>,
    sheet_selection: Option<SheetSelection>,
    preview_key: Option<String>,
    preview_rows: PreviewRows,
    preview: Option<PreviewResult>,
    options: ExtractOptions,
    /// Query held back until no sheet selection is pending.
    deferred_query: Option<String>,
}

impl Session {
    pub fn new(options: ExtractOptions, preview_rows: PreviewRows) -> Self {
        Session {
            options,
            preview_rows,
            ..Default::default()
        }
    }

    /// Applies one command.
    ///
    /// Errors are recoverable: the session stays consistent and the caller
    /// only has to show the message.
    pub fn handle(&mut self, command: Command) -> PolarsSheetsResult<()> {
        match command {
            Command::Upload(files) => self.upload(files),
            Command::ToggleSheet {
                file,
                sheet,
                checked,
            } => {
                if let Some(selection) = self.sheet_selection.as_mut() {
                    selection.set_checked(&file, &sheet, checked);
                }
                Ok(())
            }
            Command::ConfirmSheets => self.confirm_sheets(),
            Command::CancelSheets => {
                if self.sheet_selection.take().is_some() {
                    tracing::debug!("Sheet selection cancelled");
                }
                Ok(())
            }
            Command::RunQuery(query) => {
                self.last_query = Some(run_query(&mut self.engine, &query)?);
                Ok(())
            }
            Command::RenameAlias { key, alias } => {
                let result = self
                    .registry
                    .rename(&mut self.engine, &key, &alias, &self.options);
                self.refresh_preview();
                result
            }
            Command::Delete(key) => {
                let result = self.registry.unregister(&mut self.engine, &key).map(|_| ());
                self.refresh_preview();
                result
            }
            Command::DeleteAll => {
                self.registry.clear_all(&mut self.engine);
                self.refresh_preview();
                Ok(())
            }
            Command::SelectPreview(key) => {
                if !self.registry.contains_key(&key) {
                    return Err(PolarsSheetsError::EntryNotFound(key));
                }
                self.preview_key = Some(key);
                self.refresh_preview();
                Ok(())
            }
            Command::SetPreviewRows(rows) => {
                self.preview_rows = PreviewRows::new(rows);
                self.refresh_preview();
                Ok(())
            }
        }
    }

    /// Handles a new upload batch.
    ///
    /// ### Logic
    /// 1. Forget the last query and any pending sheet selection.
    /// 2. Reject files of unsupported types.
    /// 3. Set aside workbooks with several sheets for the user to choose from.
    /// 4. Register everything else, in upload order.
    /// 5. Report every failure at once, after the other files are registered.
    fn upload(&mut self, files: Vec<UploadedFile>) -> PolarsSheetsResult<()> {
        tracing::info!("Upload batch of {} file(s)", files.len());

        // 1. A new batch starts from a clean slate.
        self.last_query = None;
        self.sheet_selection = None;

        // 2. Type check.
        let mut failures = Vec::new();
        let mut supported = Vec::new();
        for file in files {
            match file.ensure_supported() {
                Ok(()) => supported.push(file),
                Err(e) => failures.push(format!("{}: {e}", file.name)),
            }
        }

        // 3. Multi-sheet workbooks wait for confirmation.
        let (multi_sheet, unreadable) = partition_multi_sheet(&supported);
        let unreadable_names: Vec<&str> = unreadable.iter().map(|(name, _)| name.as_str()).collect();

        // 4. Register the rest.
        for file in supported
            .iter()
            .filter(|f| !multi_sheet.contains_key(&f.name) && !unreadable_names.contains(&f.name.as_str()))
        {
            if let Err(e) = self
                .registry
                .register(&mut self.engine, file, None, None, &self.options)
            {
                failures.push(format!("{}: {e}", file.name));
            }
        }
        failures.extend(unreadable.iter().map(|(name, e)| format!("{name}: {e}")));

        let selection = SheetSelection::new(&multi_sheet, &self.registry);
        self.sheet_selection = (!selection.is_empty()).then_some(selection);
        self.batch = supported;
        self.refresh_preview();

        // 5. Report.
        batch_result(failures)
    }

    /// Registers the checked sheets in (file, sheet) order and closes the selection.
    fn confirm_sheets(&mut self) -> PolarsSheetsResult<()> {
        let Some(selection) = self.sheet_selection.take() else {
            return Ok(());
        };

        let mut failures = Vec::new();
        for (file_name, sheet) in selection.selected() {
            let Some(file) = self.batch.iter().find(|f| f.name == file_name) else {
                failures.push(format!("{file_name}: no longer part of the upload batch"));
                continue;
            };
            if let Err(e) =
                self.registry
                    .register(&mut self.engine, file, Some(&sheet), None, &self.options)
            {
                failures.push(format!("{file_name} [{sheet}]: {e}"));
            }
        }

        self.refresh_preview();
        batch_result(failures)
    }

    /// Re-runs the preview query of the selected entry.
    ///
    /// Falls back to the first entry when the selection is gone.
    fn refresh_preview(&mut self) {
        let selected = self
            .preview_key
            .as_deref()
            .is_some_and(|key| self.registry.contains_key(key));
        if !selected {
            self.preview_key = self.registry.keys().into_iter().next();
        }

        let alias = self
            .preview_key
            .as_deref()
            .and_then(|key| self.registry.get(key))
            .map(|entry| entry.alias.clone());

        self.preview = alias.map(|alias| {
            preview(&mut self.engine, &alias, self.preview_rows)
                .map(Arc::new)
                .map_err(|e| {
                    tracing::warn!("Preview of '{alias}' failed: {e}");
                    e.to_string()
                })
        });
    }

    /// Holds `query` until every table of the current batch is registered.
    pub fn defer_query(&mut self, query: String) {
        self.deferred_query = Some(query);
    }

    /// Hands out the deferred query once no sheet selection is pending.
    pub fn take_ready_query(&mut self) -> Option<String> {
        if self.sheet_selection.is_some() {
            return None;
        }
        self.deferred_query.take()
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &SqlEngine {
        &self.engine
    }

    pub fn last_query(&self) -> Option<&LastQuery> {
        self.last_query.as_ref()
    }

    pub fn sheet_selection(&self) -> Option<&SheetSelection> {
        self.sheet_selection.as_ref()
    }

    pub fn preview_key(&self) -> Option<&str> {
        self.preview_key.as_deref()
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    pub fn preview_rows(&self) -> PreviewRows {
        self.preview_rows
    }

    pub fn preview(&self) -> Option<&PreviewResult> {
        self.preview.as_ref()
    }

    /// Alias of the entry being previewed.
    pub fn preview_alias(&self) -> Option<&str> {
        self.preview_key
            .as_deref()
            .and_then(|key| self.registry.get(key))
            .map(|entry| entry.alias.as_str())
    }
}

fn batch_result(failures: Vec<String>) -> PolarsSheetsResult<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        for failure in &failures {
            tracing::error!("{failure}");
        }
        Err(PolarsSheetsError::UploadBatch(failures))
    }
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//

/// Run tests with:
/// cargo test -- --show-output tests_session
#[cfg(test)]
mod tests_session {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn csv_file(name: &str) -> UploadedFile {
        UploadedFile::from_bytes(name, b"id,value\n1,10\n2,20\n3,30\n4,40\n5,50\n".to_vec())
    }

    fn workbook(name: &str, sheets: &[&str]) -> UploadedFile {
        let mut workbook = Workbook::new();
        for sheet in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(*sheet).unwrap();
            worksheet.write_string(0, 0, "month").unwrap();
            worksheet.write_string(0, 1, "amount").unwrap();
            worksheet.write_string(1, 0, *sheet).unwrap();
            worksheet.write_number(1, 1, 100.0).unwrap();
        }
        UploadedFile::from_bytes(name, workbook.save_to_buffer().unwrap())
    }

    fn session() -> Session {
        Session::new(ExtractOptions::default(), PreviewRows::default())
    }

    #[test]
    fn test_three_csv_uploads() -> PolarsSheetsResult<()> {
        let mut session = session();

        session.handle(Command::Upload(vec![
            csv_file("a.csv"),
            csv_file("b.csv"),
            csv_file("c.csv"),
        ]))?;

        assert_eq!(session.registry().aliases(), ["table1", "table2", "table3"]);
        assert_eq!(session.engine().tables(), session.registry().aliases());
        Ok(())
    }

    #[test]
    fn test_upload_again_changes_nothing() -> PolarsSheetsResult<()> {
        let mut session = session();
        session.handle(Command::Upload(vec![csv_file("a.csv")]))?;
        session.handle(Command::Upload(vec![csv_file("a.csv")]))?;

        assert_eq!(session.registry().keys(), ["a.csv"]);
        assert_eq!(session.engine().tables(), ["table1"]);
        Ok(())
    }

    #[test]
    fn test_failed_file_does_not_stop_the_batch() {
        let mut session = session();

        let result = session.handle(Command::Upload(vec![
            UploadedFile::from_bytes("notes.txt", b"hello".to_vec()),
            csv_file("good.csv"),
            UploadedFile::from_bytes("broken.xlsx", b"not a zip".to_vec()),
        ]));

        match result {
            Err(PolarsSheetsError::UploadBatch(failures)) => {
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().any(|f| f.starts_with("notes.txt")));
                assert!(failures.iter().any(|f| f.starts_with("broken.xlsx")));
            }
            other => panic!("expected UploadBatch, got {other:?}"),
        }
        assert_eq!(session.registry().keys(), ["good.csv"]);
    }

    #[test]
    fn test_multi_sheet_workbook_waits_for_confirmation() -> PolarsSheetsResult<()> {
        let mut session = session();

        session.handle(Command::Upload(vec![
            workbook("q1.xlsx", &["Jan", "Feb", "Mar"]),
            csv_file("plain.csv"),
        ]))?;

        // Only the CSV is registered so far.
        assert_eq!(session.registry().keys(), ["plain.csv"]);
        let selection = session.sheet_selection().expect("pending selection");
        let (file, choices) = selection.files().next().expect("one workbook");
        assert_eq!(file, "q1.xlsx");
        let names: Vec<&str> = choices.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Feb", "Jan", "Mar"]);

        for sheet in ["Jan", "Mar"] {
            session.handle(Command::ToggleSheet {
                file: "q1.xlsx".to_string(),
                sheet: sheet.to_string(),
                checked: true,
            })?;
        }
        session.handle(Command::ConfirmSheets)?;

        assert!(session.sheet_selection().is_none());
        assert_eq!(
            session.registry().keys(),
            ["plain.csv", "q1.xlsx - [Jan]", "q1.xlsx - [Mar]"]
        );
        let jan = session.registry().get("q1.xlsx - [Jan]").expect("Jan registered");
        let mar = session.registry().get("q1.xlsx - [Mar]").expect("Mar registered");
        assert_eq!(jan.alias, "table2");
        assert_eq!(mar.alias, "table3");
        assert_eq!(session.engine().tables(), session.registry().aliases());

        session.handle(Command::RunQuery("SELECT month FROM table3".to_string()))?;
        let last = session.last_query().expect("query ran");
        assert_eq!(last.result.column("month")?.str()?.get(0), Some("Mar"));
        Ok(())
    }

    #[test]
    fn test_deferred_query_waits_for_sheet_confirmation() -> PolarsSheetsResult<()> {
        let mut session = session();
        session.handle(Command::Upload(vec![
            csv_file("plain.csv"),
            workbook("q1.xlsx", &["Jan", "Feb"]),
        ]))?;
        session.defer_query("SELECT month FROM table2".to_string());

        assert_eq!(session.take_ready_query(), None);

        session.handle(Command::ToggleSheet {
            file: "q1.xlsx".to_string(),
            sheet: "Feb".to_string(),
            checked: true,
        })?;
        session.handle(Command::ConfirmSheets)?;

        let query = session.take_ready_query().expect("selection confirmed");
        session.handle(Command::RunQuery(query))?;
        let last = session.last_query().expect("query ran");
        assert_eq!(last.result.column("month")?.str()?.get(0), Some("Feb"));
        assert_eq!(session.take_ready_query(), None);
        Ok(())
    }

    #[test]
    fn test_cancel_sheet_selection() -> PolarsSheetsResult<()> {
        let mut session = session();
        session.handle(Command::Upload(vec![workbook("q1.xlsx", &["Jan", "Feb"])]))?;
        session.handle(Command::ToggleSheet {
            file: "q1.xlsx".to_string(),
            sheet: "Jan".to_string(),
            checked: true,
        })?;

        session.handle(Command::CancelSheets)?;
        session.handle(Command::ConfirmSheets)?;

        assert!(session.sheet_selection().is_none());
        assert!(session.registry().is_empty());
        Ok(())
    }

    #[test]
    fn test_single_sheet_workbook_registers_directly() -> PolarsSheetsResult<()> {
        let mut session = session();
        session.handle(Command::Upload(vec![workbook("one.xlsx", &["Only"])]))?;

        assert!(session.sheet_selection().is_none());
        assert_eq!(session.registry().keys(), ["one.xlsx"]);
        Ok(())
    }

    #[test]
    fn test_query_failure_keeps_state() -> PolarsSheetsResult<()> {
        let mut session = session();
        session.handle(Command::Upload(vec![csv_file("a.csv")]))?;
        session.handle(Command::RunQuery("SELECT id FROM table1".to_string()))?;

        let result = session.handle(Command::RunQuery(
            "SELECT * FROM nonexistent_table".to_string(),
        ));

        assert!(matches!(result, Err(PolarsSheetsError::Polars(_))));
        let last = session.last_query().expect("previous query kept");
        assert_eq!(last.query, "SELECT id FROM table1");
        assert_eq!(last.result.height(), 5);
        assert_eq!(session.registry().keys(), ["a.csv"]);
        Ok(())
    }

    #[test]
    fn test_empty_query_is_a_validation_error() -> PolarsSheetsResult<()> {
        let mut session = session();
        session.handle(Command::Upload(vec![csv_file("a.csv")]))?;

        let error = session
            .handle(Command::RunQuery("   ".to_string()))
            .expect_err("empty query");

        assert!(error.is_validation());
        assert!(session.last_query().is_none());
        Ok(())
    }

    #[test]
    fn test_new_upload_clears_last_query() -> PolarsSheetsResult<()> {
        let mut session = session();
        session.handle(Command::Upload(vec![csv_file("a.csv")]))?;
        session.handle(Command::RunQuery("SELECT * FROM table1".to_string()))?;
        assert!(session.last_query().is_some());

        session.handle(Command::Upload(vec![csv_file("b.csv")]))?;

        assert!(session.last_query().is_none());
        Ok(())
    }

    #[test]
    fn test_preview_follows_rows_and_selection() -> PolarsSheetsResult<()> {
        let mut session = session();
        session.handle(Command::Upload(vec![csv_file("a.csv"), csv_file("b.csv")]))?;

        // The first entry is previewed with the default row count.
        assert_eq!(session.preview_key(), Some("a.csv"));
        let rows = |session: &Session| match session.preview() {
            Some(Ok(df)) => df.height(),
            other => panic!("no preview: {other:?}"),
        };
        assert_eq!(rows(&session), 5);

        session.handle(Command::SetPreviewRows(0))?;
        assert_eq!(rows(&session), 0);

        session.handle(Command::SetPreviewRows(100))?;
        assert_eq!(rows(&session), 5);

        session.handle(Command::SelectPreview("b.csv".to_string()))?;
        assert_eq!(session.preview_alias(), Some("table2"));

        let missing = session.handle(Command::SelectPreview("ghost.csv".to_string()));
        assert!(matches!(missing, Err(PolarsSheetsError::EntryNotFound(_))));
        Ok(())
    }

    #[test]
    fn test_rename_and_delete_through_commands() -> PolarsSheetsResult<()> {
        let mut session = session();
        session.handle(Command::Upload(vec![csv_file("a.csv"), csv_file("b.csv")]))?;

        let reserved = session.handle(Command::RenameAlias {
            key: "a.csv".to_string(),
            alias: "table99".to_string(),
        });
        assert!(matches!(reserved, Err(PolarsSheetsError::ReservedAlias { .. })));
        assert_eq!(session.registry().aliases(), ["table1", "table2"]);

        session.handle(Command::RenameAlias {
            key: "a.csv".to_string(),
            alias: "table1".to_string(),
        })?;
        assert_eq!(session.registry().aliases(), ["table1", "table2"]);

        session.handle(Command::RenameAlias {
            key: "a.csv".to_string(),
            alias: "sales".to_string(),
        })?;
        assert_eq!(session.preview_alias(), Some("sales"));
        assert!(matches!(session.preview(), Some(Ok(_))));

        session.handle(Command::Delete("a.csv".to_string()))?;
        assert_eq!(session.preview_key(), Some("b.csv"));
        assert_eq!(session.engine().tables(), ["table2"]);
        Ok(())
    }

    #[test]
    fn test_delete_all() -> PolarsSheetsResult<()> {
        let mut session = session();
        session.handle(Command::Upload(vec![csv_file("a.csv"), csv_file("b.csv")]))?;

        session.handle(Command::DeleteAll)?;

        assert!(session.registry().is_empty());
        assert!(session.preview().is_none());
        assert!(session.preview_key().is_none());
        for alias in ["table1", "table2"] {
            let result = session.handle(Command::RunQuery(format!("SELECT * FROM {alias}")));
            assert!(result.is_err());
        }
        Ok(())
    }
}
