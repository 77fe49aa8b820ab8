use std::collections::HashSet;
use std::io::{self, Stdout, Write};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use clap::Parser;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::api::{CatalogClient, Review};
use super::config::Settings;
use super::data_io::{detect_data_format, export_reviews};
use super::location::{Location, NavigationHistory};
use super::logging::{LogTarget, default_log_path, init_logging};
use super::poller::{AbortTaskOnDrop, PollControl, run_poller};
use super::tui::draw_loop;
use super::types::{AppState, Cli, DataFormat, ReviewSortMode, SortDirection, ViewerEvent};

/// View state plus the navigation history it is mirrored into.
///
/// Every change of the selected app or the committed filter goes through
/// here so that the location, the history and the poller's selection
/// never disagree.
pub(crate) struct Viewer {
    pub(crate) state: AppState,
    pub(crate) history: NavigationHistory,
    pub(crate) filter: String,
    selection_tx: watch::Sender<Option<String>>,
}

impl Viewer {
    pub(crate) fn new(initial: Location) -> (Self, watch::Receiver<Option<String>>) {
        let (selection_tx, selection_rx) = watch::channel(initial.app_id.clone());
        let mut state = AppState::default();
        state.select_app(initial.app_id.clone());
        let viewer = Self {
            state,
            filter: initial.query.clone().unwrap_or_default(),
            history: NavigationHistory::new(initial),
            selection_tx,
        };
        (viewer, selection_rx)
    }

    pub(crate) fn location(&self) -> Location {
        Location::new(self.state.selected_app.clone(), Some(self.filter.clone()))
    }

    /// Opens an app and pushes a history entry for it.
    pub(crate) fn select_app(&mut self, app_id: &str) -> bool {
        if !self.state.select_app(Some(app_id.to_string())) {
            return false;
        }
        self.history.push(self.location());
        self.selection_tx.send_replace(Some(app_id.to_string()));
        info!(app_id, location = %self.location(), "app selected");
        true
    }

    /// Stores the review filter in the current history entry.
    pub(crate) fn commit_filter(&mut self, filter: &str) {
        self.filter = filter.trim().to_string();
        self.history.replace(self.location());
    }

    pub(crate) fn back(&mut self) -> bool {
        let Some(location) = self.history.back().cloned() else {
            return false;
        };
        self.apply_location(location);
        true
    }

    pub(crate) fn forward(&mut self) -> bool {
        let Some(location) = self.history.forward().cloned() else {
            return false;
        };
        self.apply_location(location);
        true
    }

    fn apply_location(&mut self, location: Location) {
        info!(location = %location, "restoring location");
        self.filter = location.query.unwrap_or_default();
        if self.state.select_app(location.app_id.clone()) {
            self.selection_tx.send_replace(location.app_id);
        }
    }

    /// Folds a poller event into the state. Returns the ids of reviews
    /// seen for the first time when the event was a review fetch for the
    /// selected app.
    pub(crate) fn handle_event(&mut self, event: ViewerEvent) -> Option<Vec<String>> {
        match event {
            ViewerEvent::AppsLoaded(apps) => {
                self.state.set_apps(apps);
                self.state.clear_catalog_error();
                self.push_status(format!("catalog loaded: {} apps", self.state.apps.len()));
                self.drop_unknown_selection();
                None
            }
            ViewerEvent::AppsFailed(err) => {
                self.state
                    .push_catalog_error(format!("catalog unavailable: {err}"));
                None
            }
            ViewerEvent::Polling { app_id } => {
                if self.state.selected_app.as_deref() == Some(app_id.as_str()) {
                    self.state.loading_reviews = true;
                }
                None
            }
            ViewerEvent::ReviewsLoaded {
                app_id,
                reviews,
                fetched_at,
            } => {
                let added = self.state.apply_reviews(&app_id, reviews, fetched_at)?;
                if self.state.poll_count > 1 && !added.is_empty() {
                    self.push_status(format!("{} new review(s) for {app_id}", added.len()));
                }
                Some(added)
            }
            ViewerEvent::ReviewsFailed { app_id, error } => {
                if self.state.selected_app.as_deref() == Some(app_id.as_str()) {
                    self.state.loading_reviews = false;
                    self.state.push_error(error);
                }
                None
            }
            ViewerEvent::Status(message) => {
                self.push_status(message);
                None
            }
        }
    }

    fn drop_unknown_selection(&mut self) {
        let Some(selected) = self.state.selected_app.clone() else {
            return;
        };
        if self.state.app_index(&selected).is_some() {
            return;
        }
        warn!(app_id = %selected, "location names an app missing from the catalog");
        self.state.select_app(None);
        self.state
            .push_error(format!("app {selected} is not in the catalog"));
        self.history.replace(self.location());
        self.selection_tx.send_replace(None);
    }

    pub(crate) fn push_status(&mut self, message: String) {
        let stamp = Utc::now().format("%H:%M:%S");
        self.state.push_status(format!("{stamp} {message}"));
    }
}

fn initial_location(cli: &Cli) -> Location {
    match (&cli.location, &cli.app) {
        (Some(location), _) => Location::parse(location),
        (None, Some(app_id)) => Location::for_app(app_id.clone()),
        (None, None) => Location::default(),
    }
}

pub async fn run() -> io::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::resolve(&cli).map_err(io::Error::other)?;
    let log_target = if cli.no_tui {
        LogTarget::Stderr
    } else {
        LogTarget::File(settings.log_file.clone().unwrap_or_else(default_log_path))
    };
    init_logging(&log_target)?;

    let initial = initial_location(&cli);
    let client = CatalogClient::new(&settings.api_url, settings.request_timeout)
        .map_err(io::Error::other)?;
    info!(
        api_url = %client.base_url(),
        poll_secs = settings.poll_interval.as_secs(),
        location = %initial,
        "starting reviewdeck"
    );

    let export_format: DataFormat = cli.format.into();
    if cli.no_tui {
        return run_headless(&cli, &settings, client, initial, export_format).await;
    }

    let (viewer, selection_rx) = Viewer::new(initial);
    let (tx, mut rx) = mpsc::unbounded_channel::<ViewerEvent>();
    let (control_tx, control_rx) = mpsc::unbounded_channel::<PollControl>();
    let poll_handle = tokio::spawn(run_poller(
        client,
        settings.poll_interval,
        selection_rx,
        tx,
        control_rx,
    ));

    let poll_guard = AbortTaskOnDrop(poll_handle.abort_handle());

    let tui_result = run_tui(
        viewer,
        &settings,
        &control_tx,
        ExportTarget {
            path: cli.output.clone(),
            format: export_format,
        },
        &mut rx,
    );

    let _ = control_tx.send(PollControl::Shutdown);
    drop(poll_guard);
    if let Err(err) = poll_handle.await
        && !err.is_cancelled()
    {
        error!("poller task join error: {err}");
    }

    tui_result
}

#[derive(Debug, Clone)]
pub(crate) struct ExportTarget {
    pub(crate) path: Option<String>,
    pub(crate) format: DataFormat,
}

/// What a `--no-tui` run should do once the app is resolved.
#[derive(Debug, Clone)]
struct HeadlessOptions {
    polls: usize,
    poll_interval: Duration,
    output: Option<String>,
    format: DataFormat,
}

async fn run_headless(
    cli: &Cli,
    settings: &Settings,
    client: CatalogClient,
    initial: Location,
    export_format: DataFormat,
) -> io::Result<()> {
    let options = HeadlessOptions {
        polls: cli.polls,
        poll_interval: settings.poll_interval,
        output: cli.output.clone(),
        format: export_format,
    };
    headless_session(
        &client,
        initial,
        &options,
        &mut io::stdout(),
        &mut io::stderr(),
    )
    .await
}

/// Prints the catalog, or one line per new review of the selected app,
/// to `out`. Diagnostics go to `diag`. Fails when the catalog cannot be
/// loaded.
async fn headless_session<W: Write, E: Write>(
    client: &CatalogClient,
    initial: Location,
    options: &HeadlessOptions,
    out: &mut W,
    diag: &mut E,
) -> io::Result<()> {
    let (mut viewer, _selection_rx) = Viewer::new(initial);
    let apps = match client.list_apps().await {
        Ok(apps) => apps,
        Err(err) => {
            writeln!(diag, "catalog unavailable: {err}")?;
            return Err(io::Error::other(err));
        }
    };
    viewer.handle_event(ViewerEvent::AppsLoaded(apps));
    if let Some(err) = viewer.state.error.take() {
        writeln!(diag, "{err}")?;
    }

    let Some(app_id) = viewer.state.selected_app.clone() else {
        for app in &viewer.state.apps {
            writeln!(
                out,
                "{}\t{}\t{}",
                app.id,
                app.name,
                app.developer.as_deref().unwrap_or("-")
            )?;
        }
        out.flush()?;
        return Ok(());
    };

    for poll in 0..options.polls.max(1) {
        if poll > 0 {
            tokio::time::sleep(options.poll_interval).await;
        }
        let event = match client.list_reviews(&app_id).await {
            Ok(reviews) => ViewerEvent::ReviewsLoaded {
                app_id: app_id.clone(),
                reviews,
                fetched_at: Utc::now(),
            },
            Err(err) => ViewerEvent::ReviewsFailed {
                app_id: app_id.clone(),
                error: err.to_string(),
            },
        };
        if let Some(added) = viewer.handle_event(event) {
            let added = added.into_iter().collect::<HashSet<_>>();
            for review in viewer
                .state
                .filtered_reviews(&viewer.filter, ReviewSortMode::Newest, SortDirection::Asc)
                .into_iter()
                .filter(|review| added.contains(&review.id))
            {
                writeln!(out, "{}", review_line(review))?;
            }
            out.flush()?;
        }
        if let Some(err) = viewer.state.error.take() {
            writeln!(diag, "{err}")?;
        }
    }

    if let Some(path) = options.output.as_deref() {
        let format = detect_data_format(path, options.format);
        if let Some(app) = viewer.state.selected_app_entry() {
            let reviews = viewer.state.filtered_reviews(
                &viewer.filter,
                ReviewSortMode::Newest,
                SortDirection::Desc,
            );
            let written = export_reviews(path, format, app, reviews)?;
            writeln!(diag, "exported {written} reviews to {path}")?;
        }
    }

    let summary = viewer.state.rating_summary();
    writeln!(
        diag,
        "finished: app={} reviews={} avg_rating={:.2} polls={} location={}",
        app_id,
        summary.count,
        summary.average,
        viewer.state.poll_count,
        viewer.location()
    )?;
    Ok(())
}

fn review_line(review: &Review) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        review
            .submitted_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        "*".repeat(usize::from(review.rating)),
        review.author,
        if review.title.is_empty() {
            review.content.lines().next().unwrap_or_default()
        } else {
            review.title.as_str()
        }
    )
}

fn run_tui(
    viewer: Viewer,
    settings: &Settings,
    control_tx: &UnboundedSender<PollControl>,
    export: ExportTarget,
    rx: &mut UnboundedReceiver<ViewerEvent>,
) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal: Terminal<CrosstermBackend<Stdout>> = Terminal::new(backend)?;
    terminal.clear()?;

    let tui_result = draw_loop(&mut terminal, viewer, settings, control_tx, &export, rx);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    tui_result
}
