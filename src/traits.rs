//! Custom traits, trait implementations for `egui` types, and general utility traits.
//!
//! This module centralizes extensions to existing types (`egui::Context`, `egui::Ui`, `std::path::Path`, `Vec`)
//! and defines the `Notification` interface for modal windows.
//! It interacts primarily with `layout.rs` (styling, notifications) and `data_table.rs` (header rendering).

use egui::{
    Align, Color32, Context,
    FontFamily::Proportional,
    FontId, Frame, Layout, RichText, ScrollArea, Spacing, Stroke, Style,
    TextStyle::{Body, Button, Heading, Monospace, Small},
    Ui, Vec2, Visuals, Window,
    style::ScrollStyle,
};
use polars::prelude::DataType;

use std::{collections::HashSet, ffi::OsStr, hash::Hash, path::Path};

/// Defines custom text styles for the egui context.
/// Overrides default `egui` font sizes for different logical text styles (Heading, Body, etc.).
/// Used by `MyStyle::set_style_init`.
pub const CUSTOM_TEXT_STYLE: [(egui::TextStyle, egui::FontId); 5] = [
    (Heading, FontId::new(18.0, Proportional)),
    (Body, FontId::new(16.0, Proportional)),
    (Button, FontId::new(16.0, Proportional)),
    (Monospace, FontId::new(15.0, egui::FontFamily::Monospace)),
    (Small, FontId::new(14.0, Proportional)),
];

/// A trait for applying custom styling to the `egui` context (`Context`).
/// Used once at startup by `layout.rs::PolarsSheetsApp::new`.
pub trait MyStyle {
    /// Applies a pre-defined application style to the `egui` context.
    fn set_style_init(&self, visuals: Visuals);
}

impl MyStyle for Context {
    /// Configures the application's look and feel (theme, spacing, text styles) by modifying `egui::Style`.
    ///
    /// ### Logic
    /// 1. Define custom scrollbar settings (`ScrollStyle`).
    /// 2. Define custom widget spacing (`Spacing`).
    /// 3. Build a `Style` from the given `Visuals`, the spacing and `CUSTOM_TEXT_STYLE`.
    /// 4. Apply it to the context.
    fn set_style_init(&self, visuals: Visuals) {
        // 1. Define ScrollStyle.
        let scroll = ScrollStyle {
            handle_min_length: 32.0,
            ..ScrollStyle::default()
        };

        // 2. Define Spacing.
        let spacing = Spacing {
            scroll,
            item_spacing: [8.0, 6.0].into(),
            ..Spacing::default()
        };

        // 3. Create the main Style struct.
        let style = Style {
            visuals,
            spacing,
            text_styles: CUSTOM_TEXT_STYLE.into(),
            ..Style::default()
        };

        // 4. Set the style on the egui Context.
        self.set_style(style);
    }
}

/// Trait for modal Notification windows (errors, the query used).
/// Allows `layout.rs` to manage different notification types through `Box<dyn Notification>`.
pub trait Notification: Send + Sync + 'static {
    /// Renders the notification window using `egui::Window`.
    /// Called every frame by `layout.rs::check_notification` while the notification is active.
    ///
    /// ### Returns
    /// `true` if the window should remain open, `false` if closed.
    fn show(&mut self, ctx: &Context) -> bool;
}

/// Notification struct for displaying error messages. Implements `Notification`.
pub struct Error {
    /// The error message content. Set by the caller in `layout.rs`.
    pub message: String,
}

impl Notification for Error {
    /// Renders the Error notification window.
    ///
    /// ### Logic
    /// 1. Create an `egui::Window` named "Error", bound to a local `open` flag.
    /// 2. Lay out a fixed-width content area.
    /// 3. Show the message inside a red frame.
    /// 4. Return the `open` state.
    fn show(&mut self, ctx: &Context) -> bool {
        let mut open = true;

        // 1. Create window.
        Window::new("Error")
            .collapsible(false)
            .open(&mut open)
            .show(ctx, |ui| {
                // 2. Layout content.
                let width_max = ui.available_width() * 0.80;
                ui.allocate_ui_with_layout(
                    Vec2::new(width_max, ui.available_height()),
                    Layout::top_down(Align::LEFT),
                    |ui| {
                        // 3. Styled frame.
                        Frame::default()
                            .fill(Color32::from_rgb(255, 200, 200)) // Light red bg
                            .stroke(Stroke::new(1.0, Color32::DARK_RED))
                            .outer_margin(2.0)
                            .inner_margin(10.0)
                            .show(ui, |ui| {
                                ui.colored_label(Color32::BLACK, &self.message);
                            });
                    },
                );
            });

        open // 4. Return state.
    }
}

/// Notification showing the text of the last successful query.
pub struct QueryUsed {
    pub query: String,
}

impl Notification for QueryUsed {
    fn show(&mut self, ctx: &Context) -> bool {
        let mut open = true;

        Window::new("Query used")
            .collapsible(false)
            .resizable(true)
            .open(&mut open)
            .show(ctx, |ui| {
                ScrollArea::vertical().max_height(300.0).show(ui, |ui| {
                    ui.add(
                        egui::TextEdit::multiline(&mut self.query.as_str())
                            .code_editor()
                            .desired_width(f32::INFINITY),
                    );
                });

                if ui.button("📋 Copy").clicked() {
                    ui.ctx().copy_text(self.query.clone());
                }
            });

        open
    }
}

/// Renders a table header cell: column name plus its data type.
pub trait TypedHeaderRenderer {
    fn render_typed_header(&mut self, column_name: &str, dtype: &DataType);
}

impl TypedHeaderRenderer for Ui {
    fn render_typed_header(&mut self, column_name: &str, dtype: &DataType) {
        let color = get_column_header_text_color(self.visuals());

        self.vertical(|ui| {
            ui.add(egui::Label::new(RichText::new(column_name).strong().color(color)).truncate())
                .on_hover_text(column_name);
            ui.label(RichText::new(dtype.to_string()).small().weak());
        });
    }
}

/// Helper: Determines header text color based on theme for contrast.
fn get_column_header_text_color(visuals: &Visuals) -> Color32 {
    if visuals.dark_mode {
        Color32::from_rgb(160, 200, 255) // Lighter blue for dark mode
    } else {
        Color32::from_rgb(0, 80, 160) // Darker blue for light mode
    }
}

/// Trait to extend `Path` with a convenient method for getting the lowercase file extension.
/// Used by `file_extension.rs`.
pub trait PathExtension {
    /// Returns the file extension as a lowercase `String`, or `None`.
    fn extension_as_lowercase(&self) -> Option<String>;
}

impl PathExtension for Path {
    /// Gets the extension, converts it to `&str` and lowercases it.
    fn extension_as_lowercase(&self) -> Option<String> {
        self.extension()
            .and_then(OsStr::to_str)
            .map(str::to_lowercase)
    }
}

/// A trait for deduplicating vectors while preserving the original order of elements.
/// Added to `Vec<T>`. Used by `extract.rs` for delimiter guessing.
pub trait UniqueElements<T> {
    /// Removes duplicate elements in place, keeping the first occurrence.
    fn unique(&mut self)
    where
        T: Eq + Hash + Clone;
}

impl<T> UniqueElements<T> for Vec<T> {
    /// Implementation using `HashSet`.
    ///
    /// ### Logic
    /// `HashSet::insert` returns `true` only the first time a value is seen,
    /// so `retain` keeps exactly the first occurrence of each element.
    fn unique(&mut self)
    where
        T: Eq + Hash + Clone,
    {
        let mut seen = HashSet::new();
        self.retain(|x| seen.insert(x.clone()));
    }
}

// --- Unit Tests ---
