#![warn(clippy::all)]
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use polars_sheets::{Arguments, PolarsSheetsApp};
use tracing::error;

/*
cargo fmt
cargo test -- --nocapture
cargo test -- --show-output tests_session
cargo run -- --help
cargo run -- sales.csv budget.xlsx -q "SELECT * FROM table1"
cargo doc --open
cargo b -r && cargo install --path=.
*/

#[cfg(not(target_arch = "wasm32"))]
fn main() -> eframe::Result<()> {
    // Initialize the tracing subscriber for logging.
    // Use RUST_LOG environment variable to set logging level.  eg `export RUST_LOG=info`
    tracing_subscriber::fmt::init();

    // Parse command-line arguments.
    let args = Arguments::build();
    tracing::debug!("main()\nArguments: {args:#?}");

    // Configure the native options for the eframe application.
    let native_options = eframe::NativeOptions {
        centered: true,
        persist_window: true,
        vsync: true,
        viewport: egui::ViewportBuilder::default()
            .with_drag_and_drop(true)
            .with_inner_size([1280.0, 800.0]),
        ..Default::default()
    };

    // Run the eframe application.
    eframe::run_native(
        "Polars Sheets",
        native_options,
        Box::new(move |creation_context| {
            // Startup files and query come from the command line.
            match PolarsSheetsApp::new(creation_context, &args) {
                Ok(app) => Ok(Box::new(app)),
                Err(err) => {
                    error!("Failed to initialize PolarsSheetsApp: {err}");
                    Err(err.into())
                }
            }
        }),
    )
}
