use crate::{
    Arguments, Command, Error, MyStyle, Notification, PREVIEW_ROWS_MAX, PREVIEW_ROWS_MIN,
    PREVIEW_ROWS_STEP, PLACEHOLDER_QUERY, PolarsSheetsError, PolarsSheetsResult, QueryUsed,
    Session, UploadedFile, pick_files, render_table, save_as_csv, sql_commands,
};

use egui::{
    CentralPanel, Color32, ComboBox, Context, Direction, FontId, Frame, Grid, Hyperlink, Layout,
    MenuBar, RichText, ScrollArea, SidePanel, Slider, Stroke, TextEdit, TopBottomPanel,
    ViewportCommand, Window, style::Visuals, warn_if_debug_build, widgets,
};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::oneshot::{self, Receiver, error::TryRecvError};
use tracing::error;

/// Outcome of a CSV export: the written path, or `None` if cancelled.
type ExportResult = PolarsSheetsResult<Option<PathBuf>>;

/// The main application struct for Polars Sheets.
pub struct PolarsSheetsApp {
    /// Registered tables, last query and preview state.
    session: Session,
    /// Text of the query editor.
    query_text: String,
    /// Alias editor of the previewed entry: (display key, text being typed).
    alias_input: Option<(String, String)>,
    /// Whether the "Registered files" window is open.
    show_registered: bool,
    /// Optional Notification window for displaying errors or the query used.
    notification: Option<Box<dyn Notification>>,

    /// Tokio runtime for the file dialogs and the CSV export.
    runtime: tokio::runtime::Runtime,
    /// Channel receiving the result of a running export.
    export: Option<Receiver<ExportResult>>,
    /// Spawned export tasks, pruned once finished.
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Default for PolarsSheetsApp {
    fn default() -> Self {
        Self {
            session: Session::default(),
            query_text: String::new(),
            alias_input: None,
            show_registered: false,
            notification: None,
            runtime: tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("Failed to build Tokio runtime"),
            export: None,
            tasks: Vec::new(),
        }
    }
}

impl PolarsSheetsApp {
    /// Creates the app, registers the files given on the command line and
    /// runs the startup query, if any.
    pub fn new(cc: &eframe::CreationContext<'_>, args: &Arguments) -> PolarsSheetsResult<Self> {
        cc.egui_ctx.set_style_init(Visuals::dark());

        let mut app = Self {
            session: Session::new(args.extract_options(), args.preview_rows()),
            ..Default::default()
        };

        if !args.paths.is_empty() {
            let result = app.load_startup_files(&args.paths);
            app.notify_on_error(result);
        }

        if let Some(query) = &args.query {
            app.session.defer_query(query.clone());
            app.run_startup_query();
        }

        Ok(app)
    }

    /// Reads `paths` from disk and uploads them as one batch.
    ///
    /// Unreadable paths are reported together with the registration failures.
    fn load_startup_files(&mut self, paths: &[PathBuf]) -> PolarsSheetsResult<()> {
        let mut files = Vec::with_capacity(paths.len());
        let mut failures = Vec::new();

        for path in paths {
            match self.runtime.block_on(UploadedFile::from_path(path)) {
                Ok(file) => files.push(file),
                Err(e) => failures.push(format!("{}: {e}", path.display())),
            }
        }

        let result = if files.is_empty() {
            Ok(())
        } else {
            self.session.handle(Command::Upload(files))
        };

        match (result, failures.is_empty()) {
            (result, true) => result,
            (Ok(()), false) => Err(PolarsSheetsError::UploadBatch(failures)),
            (Err(PolarsSheetsError::UploadBatch(more)), false) => {
                failures.extend(more);
                Err(PolarsSheetsError::UploadBatch(failures))
            }
            (Err(e), false) => {
                failures.push(e.to_string());
                Err(PolarsSheetsError::UploadBatch(failures))
            }
        }
    }

    /// Applies one command to the session, showing any error in a modal window.
    fn dispatch(&mut self, command: Command) {
        tracing::debug!("Command: {}", command_name(&command));
        let result = self.session.handle(command);
        self.notify_on_error(result);
        self.run_startup_query();
    }

    /// Runs the `-q` query once the startup sheets are confirmed or cancelled.
    fn run_startup_query(&mut self) {
        if let Some(query) = self.session.take_ready_query() {
            self.query_text = query.clone();
            self.dispatch(Command::RunQuery(query));
        }
    }

    fn notify_on_error(&mut self, result: PolarsSheetsResult<()>) {
        if let Err(err) = result {
            if err.is_validation() {
                tracing::warn!("{err}");
            } else {
                error!("{err}");
            }
            self.notification = Some(Box::new(Error {
                message: err.to_string(),
            }));
        }
    }

    /// Checks if a Notification is active and displays it.
    fn check_notification(&mut self, ctx: &Context) {
        if let Some(notification) = &mut self.notification
            && !notification.show(ctx)
        {
            self.notification = None;
        }
    }

    /// Polls the running export, if any.
    ///
    /// Returns `true` while the export is still in progress.
    fn check_export_pending(&mut self) -> bool {
        let Some(mut output) = self.export.take() else {
            return false;
        };

        match output.try_recv() {
            Ok(Ok(Some(path))) => {
                tracing::info!("Query result saved to {}", path.display());
                false
            }
            Ok(Ok(None)) => false,
            Ok(Err(err)) => {
                self.notify_on_error(Err(err));
                false
            }
            Err(TryRecvError::Empty) => {
                self.export = Some(output);
                true
            }
            Err(TryRecvError::Closed) => {
                self.notify_on_error(Err(PolarsSheetsError::ChannelReceive(
                    "export terminated without response".to_string(),
                )));
                false
            }
        }
    }

    /// Saves the last query result as CSV in a background task.
    fn run_export(&mut self, ctx: &Context) {
        let Some(last) = self.session.last_query() else {
            return;
        };

        self.tasks.retain(|task| !task.is_finished());

        let df = Arc::clone(&last.result);
        let separator = self.session.options().csv_separator().unwrap_or(b',');
        let (tx, rx) = oneshot::channel::<ExportResult>();
        self.export = Some(rx);

        let ctx_clone = ctx.clone();
        let handle = self.runtime.spawn(async move {
            let result = save_as_csv(df, separator, ctx_clone.clone()).await;
            if tx.send(result).is_err() {
                error!("Receiver dropped before the export result could be sent.");
            }
            ctx_clone.request_repaint();
        });

        self.tasks.push(handle);
    }

    /// Opens the upload dialog and queues the chosen files.
    fn upload_from_dialog(&mut self, commands: &mut Vec<Command>) {
        let files = self.runtime.block_on(pick_files());
        if !files.is_empty() {
            commands.push(Command::Upload(files));
        }
    }

    /// Queues files dropped onto the window as one upload batch.
    fn handle_dropped_files(&mut self, ctx: &Context, commands: &mut Vec<Command>) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        if dropped.is_empty() {
            return;
        }

        let mut files = Vec::with_capacity(dropped.len());
        for file in &dropped {
            match UploadedFile::from_dropped(file) {
                Ok(Some(file)) => files.push(file),
                Ok(None) => tracing::warn!("Dropped file '{}' has no content", file.name),
                Err(err) => self.notify_on_error(Err(err)),
            }
        }

        if !files.is_empty() {
            commands.push(Command::Upload(files));
        }
    }

    fn render_menu_bar(&mut self, ctx: &Context, commands: &mut Vec<Command>) {
        TopBottomPanel::top("top_panel").show(ctx, |ui| {
            MenuBar::new().ui(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Upload files…").clicked() {
                        ui.close();
                        self.upload_from_dialog(commands);
                    }

                    let has_result = self.session.last_query().is_some();
                    if ui
                        .add_enabled(has_result, egui::Button::new("Export result as CSV…"))
                        .clicked()
                    {
                        ui.close();
                        self.run_export(ctx);
                    }

                    if ui.button("Registered files").clicked() {
                        self.show_registered = true;
                        ui.close();
                    }

                    ui.separator();

                    if ui.button("Quit").clicked() {
                        ui.ctx().send_viewport_cmd(ViewportCommand::Close);
                    }
                });

                ui.menu_button("Help", render_about);

                // Add spacing to align theme switch to the right.
                let delta = ui.available_width() - 15.0;
                if delta > 0.0 {
                    ui.add_space(delta);
                    widgets::global_theme_preference_switch(ui);
                }
            });
        });
    }

    fn render_side_panel(&mut self, ctx: &Context, commands: &mut Vec<Command>) {
        SidePanel::left("side_panel")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| {
                ScrollArea::vertical().show(ui, |ui| {
                    ui.collapsing("Files", |ui| {
                        ui.label("CSV, XLS or XLSX. Drop files on the window or:");
                        ui.horizontal(|ui| {
                            if ui.button("📂 Upload files").clicked() {
                                self.upload_from_dialog(commands);
                            }
                            let count = self.session.registry().len();
                            if ui
                                .button(format!("Registered files ({count})"))
                                .clicked()
                            {
                                self.show_registered = true;
                            }
                        });
                    });

                    ui.collapsing("Query", |ui| {
                        self.render_query_editor(ui, commands);
                    });

                    if !self.session.registry().is_empty() {
                        ui.collapsing("Preview", |ui| {
                            self.render_preview_settings(ui, commands);
                        });
                    }
                });
            });
    }

    fn render_query_editor(&mut self, ui: &mut egui::Ui, commands: &mut Vec<Command>) {
        ui.add(
            TextEdit::multiline(&mut self.query_text)
                .code_editor()
                .hint_text(PLACEHOLDER_QUERY)
                .desired_rows(6)
                .desired_width(f32::INFINITY),
        );
        ui.label(
            RichText::new("Quote names with spaces: SELECT \"Unit Price\" FROM table1")
                .small()
                .weak(),
        );

        ui.horizontal(|ui| {
            if ui.button("▶ Run query").clicked() {
                commands.push(Command::RunQuery(self.query_text.clone()));
            }

            let examples = self.example_queries();
            ui.add_enabled_ui(!examples.is_empty(), |ui| {
                ui.menu_button("Examples", |ui| {
                    ScrollArea::vertical().max_height(400.0).show(ui, |ui| {
                        for example in examples {
                            let label = example.lines().collect::<Vec<_>>().join(" ");
                            if ui.button(label).clicked() {
                                self.query_text = example;
                                ui.close();
                            }
                        }
                    });
                });
            });
        });
    }

    /// Example queries for the previewed table.
    fn example_queries(&self) -> Vec<String> {
        match (self.session.preview_alias(), self.session.preview()) {
            (Some(alias), Some(Ok(df))) => {
                sql_commands(alias, df.schema(), &self.session.registry().aliases())
            }
            _ => Vec::new(),
        }
    }

    fn render_preview_settings(&mut self, ui: &mut egui::Ui, commands: &mut Vec<Command>) {
        let registry = self.session.registry();
        let current = self.session.preview_key().unwrap_or_default().to_string();

        Grid::new("preview_grid")
            .num_columns(2)
            .spacing([10.0, 6.0])
            .show(ui, |ui| {
                ui.label("Table:");
                ComboBox::from_id_salt("preview_table")
                    .selected_text(current.as_str())
                    .width(220.0)
                    .show_ui(ui, |ui| {
                        for entry in registry.iter() {
                            let selected = entry.display_key == current;
                            if ui.selectable_label(selected, entry.display_key.as_str()).clicked()
                                && !selected
                            {
                                commands.push(Command::SelectPreview(entry.display_key.clone()));
                            }
                        }
                    });
                ui.end_row();

                ui.label("Rows:");
                let mut rows = self.session.preview_rows().get();
                if ui
                    .add(Slider::new(&mut rows, PREVIEW_ROWS_MIN..=PREVIEW_ROWS_MAX).step_by(
                        f64::from(PREVIEW_ROWS_STEP),
                    ))
                    .changed()
                {
                    commands.push(Command::SetPreviewRows(rows));
                }
                ui.end_row();
            });

        // Keep the alias editor in sync with the previewed entry.
        let Some(entry) = registry.get(&current) else {
            self.alias_input = None;
            return;
        };
        let stale = self
            .alias_input
            .as_ref()
            .is_none_or(|(key, _)| key != &entry.display_key);
        if stale {
            self.alias_input = Some((entry.display_key.clone(), entry.alias.clone()));
        }

        if let Some((key, alias)) = self.alias_input.as_mut() {
            ui.horizontal(|ui| {
                ui.label("Alias:");
                ui.add(TextEdit::singleline(alias).desired_width(160.0));
                if ui.button("Rename").clicked() && alias.trim() != entry.alias {
                    commands.push(Command::RenameAlias {
                        key: key.clone(),
                        alias: alias.trim().to_string(),
                    });
                }
            });
        }
    }

    /// Window listing every registered table, with delete buttons.
    fn render_registered_files(&mut self, ctx: &Context, commands: &mut Vec<Command>) {
        let mut open = self.show_registered;

        Window::new("Registered files")
            .collapsible(false)
            .resizable(true)
            .open(&mut open)
            .show(ctx, |ui| {
                let registry = self.session.registry();
                if registry.is_empty() {
                    ui.label("No files registered.");
                    return;
                }

                ScrollArea::vertical().max_height(400.0).show(ui, |ui| {
                    for entry in registry.iter() {
                        ui.horizontal(|ui| {
                            egui::CollapsingHeader::new(entry.display_key.as_str())
                                .default_open(true)
                                .show(ui, |ui| {
                                    Grid::new(("entry_grid", &entry.display_key))
                                        .num_columns(2)
                                        .show(ui, |ui| {
                                            ui.label("Type:");
                                            ui.label(entry.extension.to_string());
                                            ui.end_row();
                                            ui.label("Size:");
                                            ui.label(format!("{:.2} MB", entry.size_mb()));
                                            ui.end_row();
                                            ui.label("Alias:");
                                            ui.label(RichText::new(&entry.alias).monospace());
                                            ui.end_row();
                                            ui.label("Shape:");
                                            ui.label(format!(
                                                "{} rows × {} columns",
                                                entry.row_count, entry.col_count
                                            ));
                                            ui.end_row();
                                        });
                                });
                            if ui.button("🗑").on_hover_text("Delete").clicked() {
                                commands.push(Command::Delete(entry.display_key.clone()));
                            }
                        });
                    }
                });

                ui.separator();
                if ui.button("🗑 Delete all").clicked() {
                    commands.push(Command::DeleteAll);
                }
            });

        self.show_registered = open;
    }

    /// Window asking which sheets of multi-sheet workbooks to register.
    fn render_sheet_selection(&mut self, ctx: &Context, commands: &mut Vec<Command>) {
        let Some(selection) = self.session.sheet_selection() else {
            return;
        };

        let mut open = true;
        Window::new("Select sheets for registration")
            .collapsible(false)
            .resizable(false)
            .open(&mut open)
            .show(ctx, |ui| {
                for (file_name, choices) in selection.files() {
                    ui.heading(file_name.as_str());
                    for choice in choices {
                        let mut checked = choice.checked;
                        if ui.checkbox(&mut checked, choice.name.as_str()).changed() {
                            commands.push(Command::ToggleSheet {
                                file: file_name.clone(),
                                sheet: choice.name.clone(),
                                checked,
                            });
                        }
                    }
                    ui.add_space(6.0);
                }

                ui.separator();
                ui.horizontal(|ui| {
                    let any_checked = !selection.selected().is_empty();
                    if ui
                        .add_enabled(any_checked, egui::Button::new("✔ Confirm sheets"))
                        .clicked()
                    {
                        commands.push(Command::ConfirmSheets);
                    }
                    if ui.button("Cancel").clicked() {
                        commands.push(Command::CancelSheets);
                    }
                });
            });

        if !open {
            commands.push(Command::CancelSheets);
        }
    }

    fn render_status_bar(&mut self, ctx: &Context) {
        TopBottomPanel::bottom("bottom_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let count = self.session.registry().len();
                ui.label(format!("{count} table(s) registered"));

                if let Some(last) = self.session.last_query() {
                    ui.separator();
                    let (rows, cols) = last.result.shape();
                    ui.label(format!("Last result: {rows} rows × {cols} columns"));
                }

                if self.check_export_pending() {
                    ui.separator();
                    ui.spinner();
                    ui.label("Exporting…");
                }
            });
        });
    }

    fn render_central_panel(&mut self, ctx: &Context) {
        // CentralPanel must be added after all other panels in your egui layout!
        CentralPanel::default().show(ctx, |ui| {
            warn_if_debug_build(ui);

            if self.session.registry().is_empty() && self.session.last_query().is_none() {
                ui.centered_and_justified(|ui| {
                    ui.label("Drag and drop CSV, XLS or XLSX files here.");
                });
                return;
            }

            if let (Some(key), Some(preview)) =
                (self.session.preview_key(), self.session.preview())
            {
                TopBottomPanel::top("preview_panel")
                    .resizable(true)
                    .default_height(260.0)
                    .show_inside(ui, |ui| {
                        let alias = self.session.preview_alias().unwrap_or_default();
                        ui.heading(format!("Preview: {key}"));
                        ui.label(RichText::new(format!("Alias: {alias}")).monospace());

                        match preview {
                            Ok(df) => render_table(df, ui, "preview_table"),
                            Err(message) => {
                                ui.colored_label(Color32::RED, message.as_str());
                            }
                        }
                    });
            }

            match self.session.last_query() {
                Some(last) => {
                    ui.horizontal(|ui| {
                        ui.heading("Query result");
                        if ui.button("Show used query").clicked() {
                            self.notification = Some(Box::new(QueryUsed {
                                query: last.query.clone(),
                            }));
                        }
                    });
                    render_table(&last.result, ui, "result_table");
                }
                None => {
                    ui.centered_and_justified(|ui| {
                        ui.label("Run a query to see its result here.");
                    });
                }
            }
        });
    }
}

/// Short name of a command for the logs; uploads carry whole files.
fn command_name(command: &Command) -> String {
    match command {
        Command::Upload(files) => format!("Upload({} file(s))", files.len()),
        other => format!("{other:?}"),
    }
}

/// The "Help" menu: application information.
fn render_about(ui: &mut egui::Ui) {
    Frame::default()
        .stroke(Stroke::new(1.0, Color32::GRAY))
        .outer_margin(2.0)
        .inner_margin(10.0)
        .show(ui, |ui| {
            let version = env!("CARGO_PKG_VERSION");
            let description = env!("CARGO_PKG_DESCRIPTION");

            Grid::new("about_grid")
                .num_columns(1)
                .spacing([10.0, 4.0])
                .show(ui, |ui| {
                    ui.with_layout(Layout::centered_and_justified(Direction::LeftToRight), |ui| {
                        ui.label(RichText::new("Polars Sheets").font(FontId::proportional(30.0)));
                    });
                    ui.end_row();

                    ui.with_layout(Layout::centered_and_justified(Direction::LeftToRight), |ui| {
                        ui.label(format!("Version: {version}"));
                    });
                    ui.end_row();
                    ui.end_row();

                    ui.label(RichText::new(description).font(FontId::proportional(18.0)));
                    ui.end_row();
                    ui.end_row();

                    for (prefix, name, url) in [
                        ("Powered by ", "Polars", "https://github.com/pola-rs/polars"),
                        ("Workbooks read with ", "calamine", "https://github.com/tafia/calamine"),
                        ("Built with ", "egui", "https://github.com/emilk/egui"),
                    ] {
                        ui.horizontal(|ui| {
                            ui.label(prefix);
                            ui.add(Hyperlink::from_label_and_url(name, url))
                                .on_hover_text(url);
                        });
                        ui.end_row();
                    }
                });
        });
}

// See
// https://github.com/emilk/egui/blob/master/examples/custom_window_frame/src/main.rs

impl eframe::App for PolarsSheetsApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        // Check and display any active Notifications (errors, query used).
        self.check_notification(ctx);

        // Define the main UI layout.
        //
        //  | menu_bar          theme |
        //  ---------------------------
        //  |         |    preview    |
        //  | Files   |---------------|
        //  | Query   |    result     |
        //  | Preview |               |
        //  ---------------------------
        //  | status bar              |
        //
        // Widgets only queue commands; the session changes after the frame is drawn.
        let mut commands = Vec::new();

        self.handle_dropped_files(ctx, &mut commands);
        self.render_menu_bar(ctx, &mut commands);
        self.render_side_panel(ctx, &mut commands);
        self.render_status_bar(ctx);
        self.render_central_panel(ctx);
        self.render_registered_files(ctx, &mut commands);
        self.render_sheet_selection(ctx, &mut commands);

        if !commands.is_empty() {
            for command in commands {
                self.dispatch(command);
            }
            ctx.request_repaint();
        }
    }
}
