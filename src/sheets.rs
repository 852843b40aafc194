use crate::{PolarsSheetsResult, TableRegistry, UploadedFile, display_key, sheet_names};

use std::collections::BTreeMap;

/// One selectable sheet of a workbook awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetChoice {
    pub name: String,
    pub checked: bool,
}

/// Sheets of multi-sheet workbooks waiting for the user to pick which ones to register.
///
/// Built fresh for each upload batch and discarded once confirmed or cancelled.
/// Files are ordered by name and sheets alphabetically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetSelection {
    files: BTreeMap<String, Vec<SheetChoice>>,
}

impl SheetSelection {
    /// Builds the selection from the multi-sheet workbooks of `multi_sheet`
    /// (file name → sheet names), leaving out sheets already registered.
    /// Files with nothing left to choose are dropped.
    pub fn new(multi_sheet: &BTreeMap<String, Vec<String>>, registry: &TableRegistry) -> Self {
        let files = multi_sheet
            .iter()
            .filter_map(|(file_name, sheets)| {
                let mut choices: Vec<SheetChoice> = sheets
                    .iter()
                    .filter(|sheet| !registry.contains_key(&display_key(file_name, Some(sheet.as_str()))))
                    .map(|sheet| SheetChoice {
                        name: sheet.clone(),
                        checked: false,
                    })
                    .collect();
                choices.sort_by(|a, b| a.name.cmp(&b.name));
                (!choices.is_empty()).then(|| (file_name.clone(), choices))
            })
            .collect();

        SheetSelection { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files and their selectable sheets, ordered by file name.
    pub fn files(&self) -> impl Iterator<Item = (&String, &Vec<SheetChoice>)> {
        self.files.iter()
    }

    /// Checks or unchecks one sheet. Unknown files or sheets are ignored.
    pub fn set_checked(&mut self, file_name: &str, sheet: &str, checked: bool) {
        if let Some(choice) = self
            .files
            .get_mut(file_name)
            .and_then(|choices| choices.iter_mut().find(|c| c.name == sheet))
        {
            choice.checked = checked;
        }
    }

    /// Checked `(file name, sheet)` pairs in lexicographic order.
    pub fn selected(&self) -> Vec<(String, String)> {
        let mut selected: Vec<(String, String)> = self
            .files
            .iter()
            .flat_map(|(file_name, choices)| {
                choices
                    .iter()
                    .filter(|choice| choice.checked)
                    .map(move |choice| (file_name.clone(), choice.name.clone()))
            })
            .collect();
        selected.sort();
        selected
    }
}

/// Finds the workbooks of a batch that contain more than one sheet.
///
/// ### Returns
/// File name → sorted sheet names, for workbooks with at least two sheets.
/// CSV files and single-sheet workbooks are not listed: they register directly.
pub fn multi_sheet_files(batch: &[UploadedFile]) -> PolarsSheetsResult<BTreeMap<String, Vec<String>>> {
    let mut files = BTreeMap::new();

    for file in batch.iter().filter(|f| f.extension.is_spreadsheet()) {
        let mut sheets = sheet_names(&file.extension, &file.data)?;
        if sheets.len() > 1 {
            sheets.sort();
            tracing::debug!("'{}' has {} sheets: {:?}", file.name, sheets.len(), sheets);
            files.insert(file.name.clone(), sheets);
        }
    }

    Ok(files)
}

/// Like `multi_sheet_files`, but a workbook that cannot be opened is
/// reported instead of aborting the whole batch.
pub fn partition_multi_sheet(
    batch: &[UploadedFile],
) -> (BTreeMap<String, Vec<String>>, Vec<(String, String)>) {
    let mut files = BTreeMap::new();
    let mut failures = Vec::new();

    for file in batch.iter().filter(|f| f.extension.is_spreadsheet()) {
        match multi_sheet_files(std::slice::from_ref(file)) {
            Ok(found) => files.extend(found),
            Err(e) => failures.push((file.name.clone(), e.to_string())),
        }
    }

    (files, failures)
}

/// Run tests with:
/// cargo test -- --show-output tests_sheets
#[cfg(test)]
mod tests_sheets {
    use super::*;
    use crate::{ExtractOptions, SqlEngine};
    use rust_xlsxwriter::Workbook;

    fn workbook(name: &str, sheets: &[&str]) -> UploadedFile {
        let mut workbook = Workbook::new();
        for sheet in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(*sheet).unwrap();
            worksheet.write_string(0, 0, "month").unwrap();
            worksheet.write_string(1, 0, *sheet).unwrap();
        }
        UploadedFile::from_bytes(name, workbook.save_to_buffer().unwrap())
    }

    #[test]
    fn test_multi_sheet_files_sorts_and_skips_single_sheets() -> PolarsSheetsResult<()> {
        let batch = vec![
            workbook("q1.xlsx", &["Mar", "Jan", "Feb"]),
            workbook("single.xlsx", &["Only"]),
            UploadedFile::from_bytes("plain.csv", b"a,b\n1,2\n".to_vec()),
        ];

        let files = multi_sheet_files(&batch)?;

        assert_eq!(files.len(), 1);
        assert_eq!(files["q1.xlsx"], ["Feb", "Jan", "Mar"]);
        Ok(())
    }

    #[test]
    fn test_selection_excludes_registered_sheets() -> PolarsSheetsResult<()> {
        let file = workbook("q1.xlsx", &["Jan", "Feb", "Mar"]);
        let mut registry = TableRegistry::new();
        let mut engine = SqlEngine::new();
        registry.register(&mut engine, &file, Some("Feb"), None, &ExtractOptions::default())?;

        let files = multi_sheet_files(std::slice::from_ref(&file))?;
        let selection = SheetSelection::new(&files, &registry);

        let (_, choices) = selection.files().next().expect("one file");
        let names: Vec<&str> = choices.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Jan", "Mar"]);
        Ok(())
    }

    #[test]
    fn test_selection_drops_fully_registered_files() -> PolarsSheetsResult<()> {
        let file = workbook("two.xlsx", &["A", "B"]);
        let mut registry = TableRegistry::new();
        let mut engine = SqlEngine::new();
        let options = ExtractOptions::default();
        registry.register(&mut engine, &file, Some("A"), None, &options)?;
        registry.register(&mut engine, &file, Some("B"), None, &options)?;

        let files = multi_sheet_files(std::slice::from_ref(&file))?;
        assert!(SheetSelection::new(&files, &registry).is_empty());
        Ok(())
    }

    #[test]
    fn test_selected_is_sorted() {
        let mut multi = BTreeMap::new();
        multi.insert("b.xlsx".to_string(), vec!["Y".to_string(), "X".to_string()]);
        multi.insert("a.xlsx".to_string(), vec!["Z".to_string(), "W".to_string()]);
        let mut selection = SheetSelection::new(&multi, &TableRegistry::new());

        selection.set_checked("b.xlsx", "Y", true);
        selection.set_checked("a.xlsx", "Z", true);
        selection.set_checked("b.xlsx", "X", true);
        selection.set_checked("b.xlsx", "X", false);
        selection.set_checked("missing.xlsx", "X", true);

        assert_eq!(
            selection.selected(),
            [
                ("a.xlsx".to_string(), "Z".to_string()),
                ("b.xlsx".to_string(), "Y".to_string()),
            ]
        );
    }

    #[test]
    fn test_partition_reports_unreadable_workbooks() {
        let batch = vec![
            workbook("ok.xlsx", &["A", "B"]),
            UploadedFile::from_bytes("broken.xlsx", b"not a workbook".to_vec()),
        ];

        let (files, failures) = partition_multi_sheet(&batch);

        assert!(files.contains_key("ok.xlsx"));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "broken.xlsx");
    }
}
