#![warn(clippy::all)]
#![doc = include_str!("../README.md")]

// Modules that make up the Polars Sheets library.
mod args;
mod data_table;
mod engine;
mod error;
mod extract;
mod file_dialog;
mod file_extension;
mod layout;
mod query;
mod registry;
mod session;
mod sheets;
mod sqls;
mod traits;
mod upload;

// Publicly expose the contents of these modules.
pub use self::{
    // add to lib
    args::Arguments,
    data_table::*,
    engine::*,
    error::*,
    extract::*,
    file_dialog::*,
    file_extension::*,
    layout::*,
    query::*,
    registry::*,
    session::*,
    sheets::*,
    sqls::*,
    traits::*,
    upload::*,
};
