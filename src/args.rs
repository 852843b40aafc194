use crate::{
    DEFAULT_CSV_DELIMITER, DEFAULT_INFER_SCHEMA_ROWS, ExtractOptions, PREVIEW_ROWS_DEFAULT,
    PREVIEW_ROWS_MAX, PolarsSheetsError, PolarsSheetsResult, PreviewRows,
};

use clap::Parser;
use std::path::PathBuf;

// https://stackoverflow.com/questions/74068168/clap-rs-not-printing-colors-during-help
fn get_styles() -> clap::builder::Styles {
    let cyan = anstyle::Color::Ansi(anstyle::AnsiColor::Cyan);
    let green = anstyle::Color::Ansi(anstyle::AnsiColor::Green);
    let yellow = anstyle::Color::Ansi(anstyle::AnsiColor::Yellow);

    clap::builder::Styles::styled()
        .placeholder(anstyle::Style::new().fg_color(Some(yellow)))
        .usage(anstyle::Style::new().fg_color(Some(cyan)).bold())
        .header(
            anstyle::Style::new()
                .fg_color(Some(cyan))
                .bold()
                .underline(),
        )
        .literal(anstyle::Style::new().fg_color(Some(green)))
}

// https://docs.rs/clap/latest/clap/struct.Command.html#method.help_template
const APPLET_TEMPLATE: &str = "\
{before-help}
{about-with-newline}
{usage-heading} {usage}

{all-args}
{after-help}";

const EX1: &str = r#" polars-sheets sales.csv"#;
const EX2: &str = r#" polars-sheets sales.csv budget.xlsx -r 20"#;
const EX3: &str = r#" polars-sheets -d ";" -q "SELECT * FROM table1 WHERE \"Unit Price\" > 10" prices.csv"#;

/// Command-line arguments for the Polars Sheets application.
#[derive(Parser, Debug, Clone)]
#[command(
    // Read from `Cargo.toml`.
    author, version, about,
    long_about = None,
    next_line_help = true,
    help_template = APPLET_TEMPLATE,
    styles=get_styles(),
    after_help = format!("EXAMPLES:\n{EX1}\n{EX2}\n{EX3}")
)]
pub struct Arguments {
    /// CSV delimiter tried first. [Default: ',']
    #[arg(
        short = 'd',
        long,
        default_value = DEFAULT_CSV_DELIMITER,
        help = "CSV delimiter character tried first",
        long_help = "Sets the CSV delimiter tried first.\n\
        If it does not split the header, common separators (, ; | \\t :) are tried next.",
        value_parser = validate_delimiter
    )]
    pub delimiter: String,

    /// Files registered at startup (CSV, XLS, XLSX).
    #[arg(
        value_name = "FILE_PATH",
        required = false,
        help = "Files to register at startup (CSV/XLS/XLSX) [Optional]",
        long_help = "Files registered as tables when the window opens, in the given order.\n\
        Multi-sheet workbooks ask which sheets to register.\n\
        If omitted, upload files from the side panel or by drag and drop."
    )]
    pub paths: Vec<PathBuf>,

    /// Rows scanned to infer the column types of CSV files.
    #[arg(
        short = 'i',
        long,
        value_name = "ROWS",
        default_value_t = DEFAULT_INFER_SCHEMA_ROWS,
        help = "Rows scanned to infer CSV column types"
    )]
    pub infer_schema_rows: usize,

    /// SQL query run after the startup files are registered.
    #[arg(
        short = 'q',
        long,
        value_name = "SQL_QUERY",
        help = "SQL query to run after registering FILE_PATH (use quotes)",
        long_help = "Optional Polars SQL query executed once the startup files are registered.\n\
        Generated aliases follow the file order: table1, table2, ...\n\
        With a multi-sheet workbook the query waits until the sheet choice is confirmed or cancelled.\n\
        Example: -q \"SELECT * FROM table1 WHERE count > 10\"",
        requires = "paths"
    )]
    pub query: Option<String>,

    /// Rows shown in the table preview.
    #[arg(
        short = 'r',
        long,
        value_name = "ROWS",
        default_value_t = PREVIEW_ROWS_DEFAULT,
        help = "Rows shown in the table preview (0 to 100)",
        value_parser = validate_preview_rows
    )]
    pub rows: u32,
}

impl Arguments {
    /// Build `Arguments` struct.
    pub fn build() -> Arguments {
        Arguments::parse()
    }

    /// Extraction settings taken from the command line.
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            csv_delimiter: self.delimiter.clone(),
            infer_schema_rows: self.infer_schema_rows,
        }
    }

    pub fn preview_rows(&self) -> PreviewRows {
        PreviewRows::new(self.rows)
    }
}

// --- Validation Functions ---

/// clap validator for '--delimiter': exactly one single-byte character.
fn validate_delimiter(s: &str) -> PolarsSheetsResult<String> {
    if s.len() == 1 {
        Ok(s.to_string())
    } else {
        Err(PolarsSheetsError::InvalidArgument {
            arg_name: "--delimiter".to_string(),
            reason: format!("expected a single ASCII character, got '{s}'"),
        })
    }
}

/// clap validator for '--rows': an integer in `0..=PREVIEW_ROWS_MAX`.
fn validate_preview_rows(s: &str) -> PolarsSheetsResult<u32> {
    let invalid = |reason: String| PolarsSheetsError::InvalidArgument {
        arg_name: "--rows".to_string(),
        reason,
    };

    let rows: u32 = s
        .parse()
        .map_err(|e| invalid(format!("'{s}' is not a number: {e}")))?;

    if rows > PREVIEW_ROWS_MAX {
        return Err(invalid(format!("{rows} is greater than {PREVIEW_ROWS_MAX}")));
    }
    Ok(rows)
}

//----------------------------------------------------------------------------//
//                                   Tests                                    //
//----------------------------------------------------------------------------//

/// Run tests with:
/// cargo test -- --show-output tests_args
#[cfg(test)]
mod tests_args {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Arguments::parse_from(["polars-sheets"]);

        assert!(args.paths.is_empty());
        assert_eq!(args.delimiter, DEFAULT_CSV_DELIMITER);
        assert_eq!(args.infer_schema_rows, DEFAULT_INFER_SCHEMA_ROWS);
        assert_eq!(args.rows, PREVIEW_ROWS_DEFAULT);
        assert_eq!(args.query, None);
        assert_eq!(args.extract_options(), ExtractOptions::default());
        assert_eq!(args.preview_rows(), PreviewRows::default());
    }

    #[test]
    fn test_args_many_paths_keep_order() {
        let args = Arguments::parse_from(["polars-sheets", "b.csv", "a.xlsx", "c.xls"]);

        assert_eq!(
            args.paths,
            [
                PathBuf::from("b.csv"),
                PathBuf::from("a.xlsx"),
                PathBuf::from("c.xls")
            ]
        );
    }

    #[test]
    fn test_args_all_options_short() {
        let query_str = "SELECT * FROM table1";
        let args = Arguments::parse_from([
            "polars-sheets",
            "-d",
            ";",
            "-i",
            "1000",
            "-r",
            "25",
            "-q",
            query_str,
            "data.csv",
        ]);

        assert_eq!(args.delimiter, ";");
        assert_eq!(args.infer_schema_rows, 1000);
        assert_eq!(args.rows, 25);
        assert_eq!(args.query.as_deref(), Some(query_str));
        assert_eq!(args.paths, [PathBuf::from("data.csv")]);
    }

    #[test]
    fn test_args_all_options_long() {
        let args = Arguments::parse_from([
            "polars-sheets",
            "--delimiter",
            "|",
            "--infer-schema-rows",
            "50",
            "--rows",
            "100",
            "--query",
            "SELECT 1",
            "data.csv",
        ]);

        assert_eq!(args.delimiter, "|");
        assert_eq!(args.infer_schema_rows, 50);
        assert_eq!(args.preview_rows().get(), 100);
        assert_eq!(args.query.as_deref(), Some("SELECT 1"));
    }

    #[test]
    fn test_args_invalid_values() {
        assert!(Arguments::try_parse_from(["polars-sheets", "-r", "101"]).is_err());
        assert!(Arguments::try_parse_from(["polars-sheets", "-r", "five"]).is_err());
        assert!(Arguments::try_parse_from(["polars-sheets", "-d", ";;"]).is_err());
        assert!(Arguments::try_parse_from(["polars-sheets", "-d", ""]).is_err());
    }

    #[test]
    fn test_args_query_requires_paths() {
        assert!(Arguments::try_parse_from(["polars-sheets", "-q", "SELECT 1"]).is_err());
    }
}
