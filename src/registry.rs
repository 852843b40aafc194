//! The table registry: which uploaded file (or sheet) is visible to SQL under which alias.
//!
//! Registry and engine are updated together: every successful `register`, `rename`,
//! `unregister` and `clear_all` leaves exactly one live engine table per entry.

use crate::{
    ExtractOptions, FileExtension, PolarsSheetsError, PolarsSheetsResult, SqlEngine, UploadedFile,
    extract_dataframe, size_in_mb,
};

use std::{collections::BTreeMap, sync::Arc};

/// Prefix of generated aliases (`table1`, `table2`, ...). Reserved: user aliases
/// may not start with it.
pub const AUTO_ALIAS_PREFIX: &str = "table";

/// Builds the display key of a file, or of one sheet of a workbook.
pub fn display_key(file_name: &str, sheet: Option<&str>) -> String {
    match sheet {
        Some(sheet) if !sheet.is_empty() => format!("{file_name} - [{sheet}]"),
        _ => file_name.to_string(),
    }
}

/// Validates an alias typed by the user.
pub fn validate_alias(alias: &str) -> PolarsSheetsResult<()> {
    if alias.trim().is_empty() {
        return Err(PolarsSheetsError::EmptyAlias);
    }
    if alias.starts_with(AUTO_ALIAS_PREFIX) {
        return Err(PolarsSheetsError::ReservedAlias {
            alias: alias.to_string(),
            prefix: AUTO_ALIAS_PREFIX.to_string(),
        });
    }
    Ok(())
}

/// A file (or one sheet of a workbook) registered as a SQL table.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredTable {
    /// Unique key shown to the user: file name, or `"<file> - [<sheet>]"`.
    pub display_key: String,
    /// Name of the uploaded file.
    pub file_name: String,
    /// Sheet name; empty for CSV files and default-sheet workbooks.
    pub sheet_name: String,
    pub extension: FileExtension,
    /// Payload size in bytes.
    pub size: usize,
    /// Raw payload, kept to re-extract on rename.
    pub data: Arc<[u8]>,
    /// Identifier of the table in the SQL engine.
    pub alias: String,
    pub row_count: usize,
    pub col_count: usize,
}

impl RegisteredTable {
    fn sheet(&self) -> Option<&str> {
        (!self.sheet_name.is_empty()).then_some(self.sheet_name.as_str())
    }

    pub fn size_mb(&self) -> f64 {
        size_in_mb(self.size)
    }
}

/// Registered tables keyed by display key, plus the generated-alias counter.
#[derive(Debug, Clone)]
pub struct TableRegistry {
    entries: BTreeMap<String, RegisteredTable>,
    /// Suffix of the next generated alias. Only ever increases, so a freed
    /// `table<N>` is never handed out again in the same session.
    next_alias: u32,
}

impl Default for TableRegistry {
    fn default() -> Self {
        TableRegistry {
            entries: BTreeMap::new(),
            next_alias: 1,
        }
    }
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `file` (or one of its sheets) in the registry and in `engine`.
    ///
    /// ### Logic
    /// 1. Compute the display key; if it is already registered, return `Ok(None)`.
    /// 2. Resolve the alias: the explicit one (validated, must be free) or the next `table<N>`.
    /// 3. Extract the table. Nothing is touched if this fails.
    /// 4. Register the table in the engine and insert the entry.
    ///
    /// ### Returns
    /// The display key of the new entry, or `None` for a duplicate.
    pub fn register(
        &mut self,
        engine: &mut SqlEngine,
        file: &UploadedFile,
        sheet: Option<&str>,
        alias: Option<&str>,
        options: &ExtractOptions,
    ) -> PolarsSheetsResult<Option<String>> {
        // 1. Duplicate registrations are silently ignored.
        let key = display_key(&file.name, sheet);
        if self.entries.contains_key(&key) {
            tracing::debug!("'{key}' is already registered; skipping.");
            return Ok(None);
        }

        // 2. Resolve the alias.
        let explicit = alias.is_some();
        let alias = match alias {
            Some(alias) => {
                validate_alias(alias)?;
                self.ensure_alias_free(alias, None)?;
                alias.to_string()
            }
            None => self.peek_auto_alias(engine),
        };

        // 3. Extract.
        file.ensure_supported()?;
        let df = extract_dataframe(&file.extension, &file.data, sheet, options)?;
        let (row_count, col_count) = df.shape();

        // 4. Engine first, then registry.
        engine.register(&alias, df);
        if !explicit {
            self.next_alias = self.alias_suffix(&alias).map_or(self.next_alias, |n| n + 1);
        }

        tracing::info!("Registered '{key}' as '{alias}' ({row_count} rows, {col_count} columns)");

        self.entries.insert(
            key.clone(),
            RegisteredTable {
                display_key: key.clone(),
                file_name: file.name.clone(),
                sheet_name: sheet.unwrap_or_default().to_string(),
                extension: file.extension.clone(),
                size: file.size,
                data: file.data.clone(),
                alias,
                row_count,
                col_count,
            },
        );

        Ok(Some(key))
    }

    /// Removes an entry and drops its engine table.
    pub fn unregister(
        &mut self,
        engine: &mut SqlEngine,
        key: &str,
    ) -> PolarsSheetsResult<RegisteredTable> {
        let entry = self
            .entries
            .remove(key)
            .ok_or_else(|| PolarsSheetsError::EntryNotFound(key.to_string()))?;
        engine.unregister(&entry.alias);
        tracing::info!("Unregistered '{}' ('{}')", entry.display_key, entry.alias);
        Ok(entry)
    }

    /// Re-registers the content of entry `key` under `new_alias`.
    ///
    /// The payload is extracted again: renames are rare and re-parsing keeps the
    /// registry free of cached frames. Extraction runs before the old alias is
    /// dropped, so a failure leaves the entry as it was.
    pub fn rename(
        &mut self,
        engine: &mut SqlEngine,
        key: &str,
        new_alias: &str,
        options: &ExtractOptions,
    ) -> PolarsSheetsResult<()> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| PolarsSheetsError::EntryNotFound(key.to_string()))?;

        // Unchanged alias, generated ones included.
        if entry.alias == new_alias {
            return Ok(());
        }
        validate_alias(new_alias)?;
        self.ensure_alias_free(new_alias, Some(key))?;

        let df = extract_dataframe(&entry.extension, &entry.data, entry.sheet(), options)?;
        let old_alias = entry.alias.clone();

        engine.unregister(&old_alias);
        engine.register(new_alias, df);

        if let Some(entry) = self.entries.get_mut(key) {
            entry.alias = new_alias.to_string();
        }

        tracing::info!("Renamed '{key}': '{old_alias}' -> '{new_alias}'");
        Ok(())
    }

    /// Unregisters every entry.
    pub fn clear_all(&mut self, engine: &mut SqlEngine) {
        for (_key, entry) in std::mem::take(&mut self.entries) {
            engine.unregister(&entry.alias);
        }
        tracing::info!("All tables unregistered");
    }

    pub fn get(&self, key: &str) -> Option<&RegisteredTable> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Entries ordered by display key.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredTable> {
        self.entries.values()
    }

    /// Display keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Live aliases, sorted.
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.iter().map(|entry| entry.alias.clone()).collect();
        aliases.sort();
        aliases
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_alias_free(&self, alias: &str, except_key: Option<&str>) -> PolarsSheetsResult<()> {
        let taken = self
            .iter()
            .any(|entry| entry.alias == alias && Some(entry.display_key.as_str()) != except_key);
        if taken {
            return Err(PolarsSheetsError::AliasInUse(alias.to_string()));
        }
        Ok(())
    }

    /// Next generated alias not live in the registry nor in the engine.
    fn peek_auto_alias(&self, engine: &SqlEngine) -> String {
        let mut n = self.next_alias;
        loop {
            let candidate = format!("{AUTO_ALIAS_PREFIX}{n}");
            let live = engine.contains(&candidate) || self.iter().any(|e| e.alias == candidate);
            if !live {
                return candidate;
            }
            n += 1;
        }
    }

    fn alias_suffix(&self, alias: &str) -> Option<u32> {
        alias.strip_prefix(AUTO_ALIAS_PREFIX)?.parse().ok()
    }
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//

/// Run tests with:
/// cargo test -- --show-output tests_registry
#[cfg(test)]
mod tests_registry {
    use super::*;

    fn csv_file(name: &str) -> UploadedFile {
        UploadedFile::from_bytes(name, b"id,value\n1,10\n2,20\n3,30\n4,40\n5,50\n".to_vec())
    }

    fn setup() -> (TableRegistry, SqlEngine, ExtractOptions) {
        (TableRegistry::new(), SqlEngine::new(), ExtractOptions::default())
    }

    #[test]
    fn test_display_key() {
        assert_eq!(display_key("sales.csv", None), "sales.csv");
        assert_eq!(display_key("book.xlsx", Some("Jan")), "book.xlsx - [Jan]");
        assert_eq!(display_key("book.xlsx", Some("")), "book.xlsx");
    }

    #[test]
    fn test_auto_aliases_follow_upload_order() -> PolarsSheetsResult<()> {
        let (mut registry, mut engine, options) = setup();

        for name in ["c.csv", "a.csv", "b.csv"] {
            registry.register(&mut engine, &csv_file(name), None, None, &options)?;
        }

        assert_eq!(registry.get("c.csv").map(|e| e.alias.as_str()), Some("table1"));
        assert_eq!(registry.get("a.csv").map(|e| e.alias.as_str()), Some("table2"));
        assert_eq!(registry.get("b.csv").map(|e| e.alias.as_str()), Some("table3"));
        assert_eq!(engine.tables(), registry.aliases());
        Ok(())
    }

    #[test]
    fn test_duplicate_registration_is_ignored() -> PolarsSheetsResult<()> {
        let (mut registry, mut engine, options) = setup();
        let file = csv_file("data.csv");

        let first = registry.register(&mut engine, &file, None, None, &options)?;
        let second = registry.register(&mut engine, &file, None, None, &options)?;

        assert_eq!(first.as_deref(), Some("data.csv"));
        assert_eq!(second, None);
        assert_eq!(registry.len(), 1);
        assert_eq!(engine.tables(), ["table1"]);
        Ok(())
    }

    #[test]
    fn test_reserved_alias_on_register() {
        let (mut registry, mut engine, options) = setup();

        let result =
            registry.register(&mut engine, &csv_file("data.csv"), None, Some("table99"), &options);

        assert!(matches!(result, Err(PolarsSheetsError::ReservedAlias { .. })));
        assert!(registry.is_empty());
        assert!(engine.tables().is_empty());
    }

    #[test]
    fn test_explicit_alias_on_register() -> PolarsSheetsResult<()> {
        let (mut registry, mut engine, options) = setup();

        registry.register(&mut engine, &csv_file("a.csv"), None, Some("sales"), &options)?;
        let clash = registry.register(&mut engine, &csv_file("b.csv"), None, Some("sales"), &options);

        assert!(matches!(clash, Err(PolarsSheetsError::AliasInUse(_))));
        assert_eq!(engine.tables(), ["sales"]);
        Ok(())
    }

    #[test]
    fn test_unsupported_type_leaves_registry_intact() -> PolarsSheetsResult<()> {
        let (mut registry, mut engine, options) = setup();
        registry.register(&mut engine, &csv_file("ok.csv"), None, None, &options)?;

        let notes = UploadedFile::from_bytes("notes.txt", b"free text".to_vec());
        let result = registry.register(&mut engine, &notes, None, None, &options);

        assert!(matches!(result, Err(PolarsSheetsError::UnsupportedFileType(_))));
        assert_eq!(registry.keys(), ["ok.csv"]);
        assert_eq!(engine.tables(), ["table1"]);
        Ok(())
    }

    #[test]
    fn test_rename_round_trip() -> PolarsSheetsResult<()> {
        let (mut registry, mut engine, options) = setup();
        registry.register(&mut engine, &csv_file("data.csv"), None, None, &options)?;
        let before = engine.execute("SELECT * FROM table1")?;

        registry.rename(&mut engine, "data.csv", "measurements", &options)?;

        assert!(!engine.contains("table1"));
        assert!(engine.contains("measurements"));
        let entry = registry.get("data.csv").expect("entry kept under its display key");
        assert_eq!(entry.alias, "measurements");
        assert_eq!(entry.display_key, "data.csv");
        assert_eq!(engine.execute("SELECT * FROM measurements")?, before);
        Ok(())
    }

    #[test]
    fn test_rename_to_reserved_alias_is_rejected() -> PolarsSheetsResult<()> {
        let (mut registry, mut engine, options) = setup();
        registry.register(&mut engine, &csv_file("data.csv"), None, None, &options)?;

        let result = registry.rename(&mut engine, "data.csv", "table99", &options);

        assert!(matches!(result, Err(PolarsSheetsError::ReservedAlias { .. })));
        assert_eq!(registry.aliases(), ["table1"]);
        assert_eq!(engine.tables(), ["table1"]);
        Ok(())
    }

    #[test]
    fn test_rename_to_current_generated_alias() -> PolarsSheetsResult<()> {
        let (mut registry, mut engine, options) = setup();
        registry.register(&mut engine, &csv_file("data.csv"), None, None, &options)?;

        registry.rename(&mut engine, "data.csv", "table1", &options)?;

        assert_eq!(registry.aliases(), ["table1"]);
        assert_eq!(engine.tables(), ["table1"]);
        Ok(())
    }

    #[test]
    fn test_rename_to_empty_or_taken_alias() -> PolarsSheetsResult<()> {
        let (mut registry, mut engine, options) = setup();
        registry.register(&mut engine, &csv_file("a.csv"), None, Some("first"), &options)?;
        registry.register(&mut engine, &csv_file("b.csv"), None, Some("second"), &options)?;

        let empty = registry.rename(&mut engine, "b.csv", "  ", &options);
        let taken = registry.rename(&mut engine, "b.csv", "first", &options);

        assert!(matches!(empty, Err(PolarsSheetsError::EmptyAlias)));
        assert!(matches!(taken, Err(PolarsSheetsError::AliasInUse(_))));
        assert_eq!(engine.tables(), ["first", "second"]);

        // Renaming to the current alias changes nothing.
        registry.rename(&mut engine, "b.csv", "second", &options)?;
        assert_eq!(engine.tables(), ["first", "second"]);
        Ok(())
    }

    #[test]
    fn test_generated_aliases_are_not_reused() -> PolarsSheetsResult<()> {
        let (mut registry, mut engine, options) = setup();
        for name in ["a.csv", "b.csv", "c.csv"] {
            registry.register(&mut engine, &csv_file(name), None, None, &options)?;
        }

        registry.unregister(&mut engine, "b.csv")?;
        registry.register(&mut engine, &csv_file("d.csv"), None, None, &options)?;

        assert_eq!(registry.get("d.csv").map(|e| e.alias.as_str()), Some("table4"));
        assert_eq!(engine.tables(), ["table1", "table3", "table4"]);
        assert_eq!(engine.tables(), registry.aliases());
        Ok(())
    }

    #[test]
    fn test_unregister_unknown_entry() {
        let (mut registry, mut engine, _options) = setup();
        let result = registry.unregister(&mut engine, "ghost.csv");
        assert!(matches!(result, Err(PolarsSheetsError::EntryNotFound(_))));
    }

    #[test]
    fn test_clear_all() -> PolarsSheetsResult<()> {
        let (mut registry, mut engine, options) = setup();
        for name in ["a.csv", "b.csv"] {
            registry.register(&mut engine, &csv_file(name), None, None, &options)?;
        }

        registry.clear_all(&mut engine);

        assert!(registry.is_empty());
        assert!(engine.tables().is_empty());
        assert!(engine.execute("SELECT * FROM table1").is_err());
        assert!(engine.execute("SELECT * FROM table2").is_err());
        Ok(())
    }
}
