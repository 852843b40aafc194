use crate::{PolarsSheetsError, PolarsSheetsResult, SqlEngine};

use polars::prelude::DataFrame;
use std::sync::Arc;

/// Smallest preview row count.
pub const PREVIEW_ROWS_MIN: u32 = 0;
/// Largest preview row count.
pub const PREVIEW_ROWS_MAX: u32 = 100;
/// Increment of the preview row selector.
pub const PREVIEW_ROWS_STEP: u32 = 5;
/// Rows shown in the preview until the user asks for more.
pub const PREVIEW_ROWS_DEFAULT: u32 = 5;

/// Number of rows shown in the table preview, always within
/// `[PREVIEW_ROWS_MIN, PREVIEW_ROWS_MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PreviewRows(u32);

impl PreviewRows {
    /// Clamps `rows` into the allowed range.
    pub fn new(rows: u32) -> Self {
        PreviewRows(rows.clamp(PREVIEW_ROWS_MIN, PREVIEW_ROWS_MAX))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PreviewRows {
    fn default() -> Self {
        PreviewRows(PREVIEW_ROWS_DEFAULT)
    }
}

/// The statement last run successfully and its result.
#[derive(Debug, Clone, PartialEq)]
pub struct LastQuery {
    /// Query text exactly as submitted.
    pub query: String,
    pub result: Arc<DataFrame>,
}

/// Runs a user query against every registered table.
///
/// Empty or whitespace-only input is rejected with `EmptyQuery` before the
/// engine is involved. Engine failures come back as `PolarsSheetsError::Polars`.
pub fn run_query(engine: &mut SqlEngine, query: &str) -> PolarsSheetsResult<LastQuery> {
    if query.trim().is_empty() {
        return Err(PolarsSheetsError::EmptyQuery);
    }

    tracing::debug!("Running query:\n{query}");

    let result = engine.execute(query).inspect_err(|e| {
        tracing::warn!("Query failed: {e}");
    })?;

    tracing::info!("Query returned {:?}", result.shape());

    Ok(LastQuery {
        query: query.to_string(),
        result: Arc::new(result),
    })
}

/// Builds the bounded preview statement for `alias`.
///
/// The alias is quoted so any name the user picked is a valid identifier.
pub fn preview_query(alias: &str, rows: PreviewRows) -> String {
    format!(
        "SELECT * FROM \"{}\" LIMIT {}",
        alias.replace('"', "\"\""),
        rows.get()
    )
}

/// Runs the preview statement of one registered table.
pub fn preview(
    engine: &mut SqlEngine,
    alias: &str,
    rows: PreviewRows,
) -> PolarsSheetsResult<DataFrame> {
    engine.execute(&preview_query(alias, rows))
}
