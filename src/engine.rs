use crate::PolarsSheetsResult;

use polars::{prelude::*, sql::SQLContext};

/// The SQL engine of one session: a Polars `SQLContext` whose table namespace
/// is exactly the set of registered aliases.
///
/// Only the `TableRegistry` registers and unregisters tables; the query runner
/// only executes statements.
pub struct SqlEngine {
    context: SQLContext,
}

impl Default for SqlEngine {
    fn default() -> Self {
        SqlEngine {
            context: SQLContext::new(),
        }
    }
}

impl std::fmt::Debug for SqlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlEngine")
            .field("tables", &self.tables())
            .finish()
    }
}

impl SqlEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `df` visible to SQL under `alias`.
    pub fn register(&mut self, alias: &str, df: DataFrame) {
        tracing::debug!("Engine: register '{alias}' {:?}", df.shape());
        self.context.register(alias, df.lazy());
    }

    /// Drops the table registered under `alias`. Unknown aliases are ignored.
    pub fn unregister(&mut self, alias: &str) {
        tracing::debug!("Engine: unregister '{alias}'");
        self.context.unregister(alias);
    }

    /// Executes `sql` against the registered tables and collects the result.
    pub fn execute(&mut self, sql: &str) -> PolarsSheetsResult<DataFrame> {
        let df = self.context.execute(sql)?.collect()?;
        Ok(df)
    }

    /// Names of the live tables, sorted.
    pub fn tables(&self) -> Vec<String> {
        let mut tables = self.context.get_tables();
        tables.sort();
        tables
    }

    /// `true` if a table is live under `alias`.
    pub fn contains(&self, alias: &str) -> bool {
        self.context.get_tables().iter().any(|name| name == alias)
    }
}
