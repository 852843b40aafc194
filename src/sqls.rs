use polars::prelude::{DataType, Schema};

// https://docs.pola.rs/api/python/stable/reference/sql/index.html
// https://docs.pola.rs/api/python/stable/reference/sql/clauses.html
// https://docs.pola.rs/api/python/stable/reference/sql/functions/index.html

/// Query shown in the editor before any table is registered.
pub const PLACEHOLDER_QUERY: &str = "SELECT * FROM table1 LIMIT 10;";

/// Helper function to safely get a column name by index.
pub fn get_col_name(schema: &Schema, index: usize) -> Option<&str> {
    schema
        .get_at_index(index)
        .map(|(col_name, _dtype)| col_name.as_str())
}

/// Attempts to retrieve the first column of a specified data type.
///
/// ### Arguments
///
/// * `schema` - The schema to search within.
/// * `target_dtype` - A closure that takes a `DataType` and returns `true` if
///   the data type matches the desired type, and `false` otherwise.
///
/// ### Returns
///
/// * `Some(&str)` - The name of the first column that matches the specified data type.
/// * `None` - If no column matching the specified data type is found.
pub fn get_col_by_type<F>(schema: &Schema, target_dtype: F) -> Option<&str>
where
    F: Fn(&DataType) -> bool,
{
    schema
        .iter()
        .find(|(_name, dtype)| target_dtype(*dtype))
        .map(|(name, _dtype)| name.as_str())
}

/// Quotes an identifier for Polars SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Example queries for the table registered under `alias`, built from its schema.
///
/// `others` are the remaining live aliases; when present, a cross-table example
/// is added.
pub fn sql_commands(alias: &str, schema: &Schema, others: &[String]) -> Vec<String> {
    let table = quote_ident(alias);
    let mut commands: Vec<String> = vec![
        format!("SELECT * FROM {table} LIMIT 10;"),
        format!("SELECT COUNT(*) AS n_rows FROM {table};"),
    ];

    let col_str = get_col_by_type(schema, |dtype| dtype.is_string());
    let col_int = get_col_by_type(schema, |dtype| dtype.is_integer());
    let col_float = get_col_by_type(schema, |dtype| dtype.is_float());
    let col_num = col_float.or(col_int);

    if let (Some(col0), Some(col1)) = (get_col_name(schema, 0), get_col_name(schema, 1)) {
        commands.push(format!(
            "SELECT {}, {} FROM {table};",
            quote_ident(col0),
            quote_ident(col1)
        ));
    }

    if let Some(col_str) = col_str.map(quote_ident) {
        commands.push(format!("SELECT * FROM {table} WHERE {col_str} IS NOT NULL;"));
        commands.push(format!("SELECT * FROM {table} WHERE {col_str} LIKE 'A%';"));
        commands.push(format!(
            "SELECT {col_str}, COUNT(*) AS frequency FROM {table} GROUP BY {col_str} ORDER BY frequency DESC;"
        ));
    }

    if let Some(col_num) = col_num.map(quote_ident) {
        commands.push(format!(
            "SELECT MIN({col_num}) AS min_value, MAX({col_num}) AS max_value, AVG({col_num}) AS mean_value FROM {table};"
        ));
        commands.push(format!("SELECT * FROM {table} ORDER BY {col_num} DESC LIMIT 10;"));

        if let Some(col_str) = col_str.map(quote_ident) {
            commands.push(format!(
                "SELECT {col_str}, SUM({col_num}) AS total FROM {table} GROUP BY {col_str} ORDER BY total DESC;"
            ));
        }
    }

    if let Some(other) = others.iter().find(|other| other.as_str() != alias) {
        commands.push(format!(
            "SELECT COUNT(*) AS n_rows FROM {table}\nUNION ALL\nSELECT COUNT(*) AS n_rows FROM {};",
            quote_ident(other)
        ));
    }

    commands
}
