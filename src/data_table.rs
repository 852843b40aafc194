use crate::TypedHeaderRenderer;

use egui::{Align, Direction, Layout, ScrollArea, TextStyle, Ui};
use egui_extras::{Column, TableBuilder, TableRow};
use polars::prelude::*;

/// Decimal places shown for float cells.
const FLOAT_DECIMALS: usize = 2;

/// Formats one cell for display. Nulls render as empty strings.
pub fn format_cell(column: &polars::prelude::Column, row_index: usize) -> String {
    match column.get(row_index) {
        Ok(AnyValue::Null) => String::new(),
        Ok(AnyValue::String(s)) => s.to_string(),
        Ok(AnyValue::StringOwned(s)) => s.to_string(),
        Ok(AnyValue::Float32(f)) => format!("{:.*}", FLOAT_DECIMALS, f),
        Ok(AnyValue::Float64(f)) => format!("{:.*}", FLOAT_DECIMALS, f),
        Ok(any_value) => any_value.to_string(),
        Err(_) => "Error: Value not found".to_string(),
    }
}

/// Cell layout by data type: numbers to the right, integers, dates and booleans
/// centered, text to the left.
fn cell_layout(dtype: &DataType) -> Layout {
    if dtype.is_float() {
        Layout::right_to_left(Align::Center)
    } else if dtype.is_integer() || dtype.is_temporal() || dtype.is_bool() {
        Layout::centered_and_justified(Direction::LeftToRight)
    } else {
        Layout::left_to_right(Align::Center)
    }
}

/// Renders `df` as an `egui` table.
///
/// `id_salt` keeps the scroll state of the preview and the result tables apart.
pub fn render_table(df: &DataFrame, ui: &mut Ui, id_salt: &str) {
    if df.width() == 0 {
        ui.label("The table has no columns.");
        return;
    }

    let analyze_header = |mut table_row: TableRow<'_, '_>| {
        for column in df.columns() {
            table_row.col(|ui| {
                ui.render_typed_header(column.name(), column.dtype());
            });
        }
    };

    let analyze_rows = |mut table_row: TableRow<'_, '_>| {
        let row_index = table_row.index();

        for column in df.columns() {
            let layout = cell_layout(column.dtype());
            let value = format_cell(column, row_index);

            table_row.col(|ui| {
                ui.with_layout(layout.with_main_wrap(false), |ui| {
                    ui.label(value);
                });
            });
        }
    };

    let style = ui.style();
    let text_height = TextStyle::Body.resolve(style).size;
    let col_number = df.width().max(1) as f32;
    let available_space = ui.available_width()
        - col_number * style.spacing.item_spacing.x
        - style.spacing.scroll.bar_width;

    // Initial and minimal column widths, from the available space and the number of columns.
    let initial_col_width = (available_space / col_number).max(80.0);
    let header_height = 2.0 * style.spacing.interact_size.y + 2.0 * style.spacing.item_spacing.y;
    let min_col_width = style.spacing.interact_size.x.max(initial_col_width / 4.0);

    let column = Column::initial(initial_col_width)
        .at_least(min_col_width)
        .resizable(true)
        .clip(true);

    ScrollArea::horizontal()
        .id_salt(id_salt)
        .auto_shrink([false, false])
        .show(ui, |ui| {
            TableBuilder::new(ui)
                .striped(true)
                .columns(column, df.width())
                .column(Column::remainder())
                .auto_shrink([false, false])
                .header(header_height, analyze_header)
                .body(|body| {
                    body.rows(text_height, df.height(), analyze_rows);
                });
        });
}
