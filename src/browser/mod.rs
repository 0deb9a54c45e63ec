//! Browser module: the main application surface.
//!
//! This module contains the main Browser struct and its supporting module:
//! - `view`: the record store view bound to the persistence adapter
//!
//! # Architecture
//! The browser is structured to separate concerns:
//! - Event loop management (main run loop)
//! - Input processing (keyboard handlers)
//! - Rendering (header, record table, widget bar, status line)
//! - Plugin lifecycle (discovery passes, widget activation)
//!
//! Everything runs synchronously on the UI task: a blocking store call
//! blocks the interface for its duration.

pub mod view;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row as TableRow, Table, TableState},
    Frame, Terminal as RatatuiTerminal,
};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::plugins::{
    HostContext, PluginRegistry, SharedWidgets, TrackedWidget, WidgetAction,
};
use crate::store::Database;

use self::view::RecordView;

/// Target FPS for the render loop; the UI is mostly idle
const TARGET_FPS: u64 = 30;

/// Notification display duration in seconds
const NOTIFICATION_DURATION_SECS: u64 = 3;

const NOTIFICATION_FRAMES: u64 = NOTIFICATION_DURATION_SECS * TARGET_FPS;

const HELP_LINE: &str = "q quit | r refresh | p reload plugins | Tab focus | Enter activate";

/// The record browser: event loop, rendering, and plugin wiring
pub struct Browser {
    config: Config,
    db: Rc<RefCell<Database>>,
    view: Rc<RefCell<RecordView>>,
    widgets: SharedWidgets,
    registry: PluginRegistry,
    should_quit: bool,
    // Performance optimization: track if redraw is needed
    dirty: bool,
    // Index into the tracked-widgets bar
    focused_widget: usize,
    // Notification message and timeout
    notification_message: Option<String>,
    notification_frames: u64,
    frame_count: u64,
}

impl Browser {
    /// Create a new browser instance: open the store, ensure the schema,
    /// and build the plugin registry with its host facade.
    ///
    /// # Errors
    /// Returns an error if the configuration paths cannot be resolved, the
    /// backend cannot be opened, or the plugin runtime fails to initialize.
    pub fn new(config: Config) -> Result<Self> {
        info!("Initializing Tabula record browser");

        let db_path = config.database_path()?;
        let db = Database::open(&config.database, &config.store, &db_path)
            .context("Failed to open record store")?;
        let db = Rc::new(RefCell::new(db));
        let view = Rc::new(RefCell::new(RecordView::new(&config.store)));

        let ctx = HostContext::new(db.clone(), view.clone());
        let widgets = ctx.widgets.clone();
        // The reload control is itself a tracked widget, so the bar always
        // has at least one entry and plugins line up after it.
        widgets.borrow_mut().push(TrackedWidget::host_native(
            "Reload plugins",
            WidgetAction::ReloadPlugins,
        ));

        let plugins_dir = config.plugins_dir()?;
        let registry = PluginRegistry::new(plugins_dir, ctx)
            .context("Failed to initialize plugin runtime")?;

        Ok(Self {
            config,
            db,
            view,
            widgets,
            registry,
            should_quit: false,
            dirty: true,
            focused_widget: 0,
            notification_message: None,
            notification_frames: 0,
            frame_count: 0,
        })
    }

    /// Initial plugin discovery pass followed by the first view refresh.
    ///
    /// Called once before the event loop starts; also usable headless,
    /// which is how the integration tests drive the browser.
    pub fn bootstrap(&mut self) {
        debug!(
            "Running initial plugin discovery in {:?}",
            self.registry.plugins_dir()
        );
        let report = self.registry.discover();
        if let Some(summary) = report.summary() {
            self.notify(summary);
        }
        self.refresh_view();
    }

    /// Main event loop
    ///
    /// # Errors
    /// Returns an error if terminal setup or rendering fails. Store and
    /// plugin failures never reach here; they become notifications.
    pub async fn run(&mut self) -> Result<()> {
        self.bootstrap();

        enable_raw_mode().context(
            "Failed to enable raw mode. Ensure you're running in a proper terminal emulator.",
        )?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal =
            RatatuiTerminal::new(backend).context("Failed to create terminal backend")?;

        // Always render the initial screen
        terminal.draw(|f| self.render(f))?;
        self.dirty = false;

        let frame_duration = Duration::from_micros(1_000_000 / TARGET_FPS);
        let mut render_interval = interval(frame_duration);
        render_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        while !self.should_quit {
            tokio::select! {
                // Handle user input (higher priority)
                Ok(Ok(has_event)) = tokio::task::spawn_blocking(|| event::poll(Duration::from_millis(1))) => {
                    if has_event {
                        match event::read() {
                            Ok(Event::Key(key)) => {
                                self.handle_key_event(key);
                                self.dirty = true;
                            }
                            Ok(Event::Resize(_, _)) => {
                                self.dirty = true;
                            }
                            _ => {}
                        }
                    }
                }

                // Render at a consistent frame rate
                _ = render_interval.tick() => {
                    if self.notification_frames > 0 {
                        self.notification_frames -= 1;
                        if self.notification_frames == 0 {
                            self.notification_message = None;
                            self.dirty = true;
                        }
                    }

                    if self.dirty {
                        terminal.draw(|f| self.render(f))?;
                        self.dirty = false;
                        self.frame_count += 1;
                    }
                }
            }
        }

        // Cleanup
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        self.db.borrow_mut().close();
        info!("Browser shutdown complete after {} frames", self.frame_count);
        Ok(())
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            KeyCode::Char('r') => {
                self.refresh_view();
            }
            KeyCode::Char('p') => {
                self.reload_plugins();
            }
            KeyCode::Tab => {
                let count = self.widgets.borrow().len();
                if count > 0 {
                    self.focused_widget = (self.focused_widget + 1) % count;
                }
            }
            KeyCode::BackTab => {
                let count = self.widgets.borrow().len();
                if count > 0 {
                    self.focused_widget = (self.focused_widget + count - 1) % count;
                }
            }
            KeyCode::Enter => {
                self.activate_focused();
            }
            KeyCode::Down => {
                self.view.borrow_mut().select_next();
            }
            KeyCode::Up => {
                self.view.borrow_mut().select_previous();
            }
            _ => {}
        }
    }

    /// Re-run plugin discovery; only previously unseen units are loaded
    fn reload_plugins(&mut self) {
        let report = self.registry.discover();
        match report.summary() {
            Some(summary) => self.notify(summary),
            None => self.notify("Plugins: nothing new".to_string()),
        }
        self.dirty = true;
    }

    /// Refresh the record view; a failed query leaves stale rows visible
    /// and surfaces a non-fatal notification.
    fn refresh_view(&mut self) {
        let result = {
            let db = self.db.borrow();
            self.view.borrow_mut().refresh(&db)
        };
        match result {
            Ok(count) => debug!("Refreshed record view: {} records", count),
            Err(e) => {
                warn!("Record refresh failed: {}", e);
                self.notify(format!("Error loading records: {e}"));
            }
        }
        self.dirty = true;
    }

    fn activate_focused(&mut self) {
        enum Pending {
            Reload,
            RunScript,
            Nothing,
        }

        let pending = {
            let widgets = self.widgets.borrow();
            match widgets.get(self.focused_widget).map(|w| &w.action) {
                Some(WidgetAction::ReloadPlugins) => Pending::Reload,
                Some(WidgetAction::Lua(_)) => Pending::RunScript,
                _ => Pending::Nothing,
            }
        };

        match pending {
            Pending::Reload => self.reload_plugins(),
            Pending::RunScript => {
                let result = self
                    .registry
                    .run_widget_action(&self.widgets, self.focused_widget);
                if let Err(e) = result {
                    let owner = self
                        .widgets
                        .borrow()
                        .get(self.focused_widget)
                        .map(|w| w.owner.clone())
                        .unwrap_or_default();
                    warn!("Widget action from `{}` failed: {}", owner, e);
                    self.notify(format!("Plugin `{owner}` error: {e}"));
                }
                self.dirty = true;
            }
            Pending::Nothing => {}
        }
    }

    fn notify(&mut self, message: String) {
        self.notification_message = Some(message);
        self.notification_frames = NOTIFICATION_FRAMES;
        self.dirty = true;
    }

    fn render(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // header with record count
                Constraint::Min(3),    // record table
                Constraint::Length(1), // widget bar
                Constraint::Length(1), // status / notification line
            ])
            .split(f.size());

        let view = self.view.borrow();

        // Header
        let header = Paragraph::new(Line::from(vec![
            Span::styled(
                format!(" Records: {} ", view.record_count()),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("table `{}`", self.config.store.table)),
        ]));
        f.render_widget(header, chunks[0]);

        // Record table
        let header_row = TableRow::new(
            view.columns()
                .iter()
                .map(|name| Cell::from(name.as_str()))
                .collect::<Vec<_>>(),
        )
        .style(Style::default().add_modifier(Modifier::UNDERLINED));

        let rows: Vec<TableRow> = view
            .rows()
            .iter()
            .map(|record| {
                TableRow::new(
                    record
                        .iter()
                        .map(|value| Cell::from(value.to_string()))
                        .collect::<Vec<_>>(),
                )
            })
            .collect();

        let column_count = view.columns().len().max(1) as u32;
        let widths = vec![Constraint::Ratio(1, column_count); column_count as usize];

        let table = Table::new(rows, widths)
            .header(header_row)
            .block(Block::default().borders(Borders::ALL))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");

        let mut state = TableState::default();
        state.select(view.selected());
        f.render_stateful_widget(table, chunks[1], &mut state);

        // Widget bar: host-native controls first, then plugin contributions
        let widgets = self.widgets.borrow();
        let mut spans = Vec::with_capacity(widgets.len() * 2);
        for (index, widget) in widgets.iter().enumerate() {
            let style = if index == self.focused_widget {
                Style::default().add_modifier(Modifier::REVERSED | Modifier::BOLD)
            } else {
                Style::default()
            };
            spans.push(Span::styled(format!("[ {} ]", widget.label), style));
            spans.push(Span::raw(" "));
        }
        f.render_widget(Paragraph::new(Line::from(spans)), chunks[2]);

        // Status line
        let status = match &self.notification_message {
            Some(message) => Line::from(Span::styled(
                message.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            None => Line::from(Span::raw(HELP_LINE)),
        };
        f.render_widget(Paragraph::new(status), chunks[3]);
    }

    // Diagnostics accessors; also used by the integration tests

    /// Displayed record count
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.view.borrow().record_count()
    }

    /// Labels of all tracked widgets, host-native controls included
    #[must_use]
    pub fn tracked_widget_labels(&self) -> Vec<String> {
        self.widgets.borrow().iter().map(|w| w.label.clone()).collect()
    }

    /// Logical names of every plugin loaded in this process run
    #[must_use]
    pub fn loaded_plugins(&self) -> Vec<String> {
        self.registry
            .loaded_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}
