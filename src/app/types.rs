use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};

use super::api::{CatalogApp, Review};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "reviewdeck",
    version,
    about = "Browse an app catalog and follow its reviews with live polling"
)]
pub(crate) struct Cli {
    /// Base URL of the catalog API (the one serving `/apps`).
    #[arg(long, env = "REVIEWDECK_API_URL", value_name = "URL")]
    pub(crate) api_url: Option<String>,

    /// Start at this location, e.g. `/?app=123&q=crash`.
    #[arg(long, env = "REVIEWDECK_LOCATION", value_name = "LOCATION")]
    pub(crate) location: Option<String>,

    /// Shorthand for `--location /?app=<ID>`.
    #[arg(long, value_name = "ID", conflicts_with = "location")]
    pub(crate) app: Option<String>,

    #[arg(
        long = "poll-interval",
        env = "REVIEWDECK_POLL_SECS",
        value_name = "SECS"
    )]
    pub(crate) poll_interval_secs: Option<u64>,

    #[arg(
        long = "request-timeout",
        env = "REVIEWDECK_TIMEOUT_SECS",
        value_name = "SECS"
    )]
    pub(crate) request_timeout_secs: Option<u64>,

    #[arg(long, env = "REVIEWDECK_CONFIG", value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,

    #[arg(long, env = "REVIEWDECK_LOG_FILE", value_name = "FILE")]
    pub(crate) log_file: Option<PathBuf>,

    #[arg(short, long, value_name = "FILE")]
    pub(crate) output: Option<String>,

    #[arg(long, value_enum, default_value_t = FileFormatArg::Csv)]
    pub(crate) format: FileFormatArg,

    /// Number of review polls to run with --no-tui.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub(crate) polls: usize,

    #[arg(long, default_value_t = false)]
    pub(crate) no_tui: bool,
}

#[cfg(test)]
impl Cli {
    /// Parses `args` after the program name with every `REVIEWDECK_*`
    /// fallback removed, so the caller's environment cannot leak in.
    pub(crate) fn parse_without_env(args: &[&str]) -> Result<Self, clap::Error> {
        use clap::{CommandFactory, FromArgMatches};

        let matches = Self::command()
            .mut_args(|arg| arg.env(None::<&'static str>))
            .try_get_matches_from(std::iter::once("reviewdeck").chain(args.iter().copied()))?;
        Self::from_arg_matches(&matches)
    }
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
pub(crate) enum FileFormatArg {
    Csv,
    Json,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum DataFormat {
    Csv,
    Json,
}

impl From<FileFormatArg> for DataFormat {
    fn from(value: FileFormatArg) -> Self {
        match value {
            FileFormatArg::Csv => DataFormat::Csv,
            FileFormatArg::Json => DataFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FocusPane {
    Apps,
    Reviews,
}

impl FocusPane {
    pub(crate) fn cycle(self) -> Self {
        match self {
            FocusPane::Apps => FocusPane::Reviews,
            FocusPane::Reviews => FocusPane::Apps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReviewSortMode {
    Newest,
    Rating,
    Author,
}

impl ReviewSortMode {
    pub(crate) fn cycle(self) -> Self {
        match self {
            ReviewSortMode::Newest => ReviewSortMode::Rating,
            ReviewSortMode::Rating => ReviewSortMode::Author,
            ReviewSortMode::Author => ReviewSortMode::Newest,
        }
    }

    pub(crate) fn title(self) -> &'static str {
        match self {
            ReviewSortMode::Newest => "newest",
            ReviewSortMode::Rating => "rating",
            ReviewSortMode::Author => "author",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub(crate) fn toggle(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Events produced by the poller task and folded into [`AppState`].
#[derive(Debug)]
pub(crate) enum ViewerEvent {
    AppsLoaded(Vec<CatalogApp>),
    AppsFailed(String),
    Polling {
        app_id: String,
    },
    ReviewsLoaded {
        app_id: String,
        reviews: Vec<Review>,
        fetched_at: DateTime<Utc>,
    },
    ReviewsFailed {
        app_id: String,
        error: String,
    },
    Status(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RatingSummary {
    pub(crate) count: usize,
    pub(crate) average: f64,
    /// Index 0 holds one-star reviews, index 4 five-star reviews.
    pub(crate) histogram: [usize; 5],
}

const MAX_STATUS_MESSAGES: usize = 20;

#[derive(Debug, Default)]
pub(crate) struct AppState {
    pub(crate) apps: Vec<CatalogApp>,
    pub(crate) apps_loaded: bool,
    pub(crate) selected_app: Option<String>,
    pub(crate) reviews: Vec<Review>,
    reviews_app: Option<String>,
    seen_review_ids: HashSet<String>,
    pub(crate) new_review_ids: HashSet<String>,
    pub(crate) loading_reviews: bool,
    pub(crate) last_refresh: Option<DateTime<Utc>>,
    pub(crate) poll_count: usize,
    pub(crate) error: Option<String>,
    /// Set while `error` describes a failed catalog request.
    catalog_error: bool,
    pub(crate) status_messages: VecDeque<String>,
}

impl AppState {
    pub(crate) fn set_apps(&mut self, mut apps: Vec<CatalogApp>) {
        apps.sort_by(|a, b| {
            a.name
                .to_ascii_lowercase()
                .cmp(&b.name.to_ascii_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        apps.dedup_by(|a, b| a.id == b.id);
        self.apps = apps;
        self.apps_loaded = true;
    }

    pub(crate) fn app_index(&self, app_id: &str) -> Option<usize> {
        self.apps.iter().position(|app| app.id == app_id)
    }

    pub(crate) fn selected_app_entry(&self) -> Option<&CatalogApp> {
        let selected = self.selected_app.as_deref()?;
        self.apps.iter().find(|app| app.id == selected)
    }

    /// Switches the selection. Returns `false` when the app is already selected.
    pub(crate) fn select_app(&mut self, app_id: Option<String>) -> bool {
        if self.selected_app == app_id {
            return false;
        }
        self.loading_reviews = app_id.is_some();
        self.selected_app = app_id;
        self.reviews.clear();
        self.reviews_app = None;
        self.seen_review_ids.clear();
        self.new_review_ids.clear();
        self.last_refresh = None;
        self.poll_count = 0;
        self.error = None;
        self.catalog_error = false;
        true
    }

    /// Replaces the review list with a fetch result.
    ///
    /// Returns the ids not seen before for this app, or `None` when the
    /// result belongs to an app that is no longer selected. Reviews that
    /// arrive on the first load are reported but not flagged as new.
    pub(crate) fn apply_reviews(
        &mut self,
        app_id: &str,
        reviews: Vec<Review>,
        fetched_at: DateTime<Utc>,
    ) -> Option<Vec<String>> {
        if self.selected_app.as_deref() != Some(app_id) {
            return None;
        }

        let first_load = self.reviews_app.as_deref() != Some(app_id);
        let mut added = Vec::new();
        for review in &reviews {
            if self.seen_review_ids.insert(review.id.clone()) {
                added.push(review.id.clone());
            }
        }

        self.new_review_ids = if first_load {
            HashSet::new()
        } else {
            added.iter().cloned().collect()
        };
        self.reviews = reviews;
        self.reviews_app = Some(app_id.to_string());
        self.loading_reviews = false;
        self.last_refresh = Some(fetched_at);
        self.poll_count += 1;
        self.error = None;
        self.catalog_error = false;
        Some(added)
    }

    pub(crate) fn push_error(&mut self, error: String) {
        self.error = Some(error);
        self.catalog_error = false;
    }

    pub(crate) fn push_catalog_error(&mut self, error: String) {
        self.error = Some(error);
        self.catalog_error = true;
    }

    /// Drops the current error only if it came from the catalog.
    pub(crate) fn clear_catalog_error(&mut self) {
        if self.catalog_error {
            self.error = None;
            self.catalog_error = false;
        }
    }

    pub(crate) fn push_status(&mut self, message: String) {
        self.status_messages.push_front(message);
        while self.status_messages.len() > MAX_STATUS_MESSAGES {
            self.status_messages.pop_back();
        }
    }

    pub(crate) fn rating_summary(&self) -> RatingSummary {
        let mut histogram = [0usize; 5];
        let mut sum = 0u64;
        for review in &self.reviews {
            let stars = review.rating.clamp(1, 5);
            histogram[usize::from(stars - 1)] += 1;
            sum += u64::from(stars);
        }
        let count = self.reviews.len();
        RatingSummary {
            count,
            average: if count == 0 {
                0.0
            } else {
                sum as f64 / count as f64
            },
            histogram,
        }
    }

    pub(crate) fn filtered_reviews<'a>(
        &'a self,
        filter: &str,
        sort: ReviewSortMode,
        direction: SortDirection,
    ) -> Vec<&'a Review> {
        let filter = filter.trim().to_lowercase();
        let mut reviews = self
            .reviews
            .iter()
            .filter(|review| {
                filter.is_empty()
                    || review_matches_filter_query(
                        review,
                        self.new_review_ids.contains(&review.id),
                        &filter,
                    )
            })
            .collect::<Vec<_>>();

        match sort {
            ReviewSortMode::Newest => {
                reviews.sort_by(|a, b| {
                    a.submitted_at
                        .cmp(&b.submitted_at)
                        .then_with(|| a.id.cmp(&b.id))
                });
            }
            ReviewSortMode::Rating => {
                reviews.sort_by(|a, b| {
                    a.rating
                        .cmp(&b.rating)
                        .then_with(|| a.submitted_at.cmp(&b.submitted_at))
                });
            }
            ReviewSortMode::Author => {
                reviews.sort_by(|a, b| {
                    a.author
                        .to_lowercase()
                        .cmp(&b.author.to_lowercase())
                        .then_with(|| a.submitted_at.cmp(&b.submitted_at))
                });
            }
        }
        if direction == SortDirection::Desc {
            reviews.reverse();
        }

        reviews
    }
}

fn review_matches_filter_query(review: &Review, is_new: bool, filter: &str) -> bool {
    let title = review.title.to_lowercase();
    let content = review.content.to_lowercase();
    let author = review.author.to_lowercase();

    let mut saw_term = false;
    for raw in filter.split_whitespace() {
        saw_term = true;
        let (negated, token) = if let Some(rest) = raw.strip_prefix('!') {
            (true, rest)
        } else if let Some(rest) = raw.strip_prefix('-') {
            (true, rest)
        } else {
            (false, raw)
        };
        if token.is_empty() {
            continue;
        }
        let matched = review_matches_token(review, is_new, token, &title, &content, &author);
        if matched == negated {
            return false;
        }
    }

    saw_term
}

fn review_matches_token(
    review: &Review,
    is_new: bool,
    token: &str,
    title: &str,
    content: &str,
    author: &str,
) -> bool {
    if token == "new" || token == "is:new" {
        return is_new;
    }

    if let Some((key, value)) = token.split_once(':') {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        return match key {
            "rating" | "stars" => matches_rating_filter(review.rating, value),
            "author" => author.contains(value),
            "title" => title.contains(value),
            "version" => review
                .version
                .as_deref()
                .map(|version| version.to_lowercase().contains(value))
                .unwrap_or(false),
            _ => false,
        };
    }

    title.contains(token) || content.contains(token) || author.contains(token)
}

fn matches_rating_filter(rating: u8, expr: &str) -> bool {
    let (op, number) = if let Some(rest) = expr.strip_prefix(">=") {
        (">=", rest)
    } else if let Some(rest) = expr.strip_prefix("<=") {
        ("<=", rest)
    } else if let Some(rest) = expr.strip_prefix('>') {
        (">", rest)
    } else if let Some(rest) = expr.strip_prefix('<') {
        ("<", rest)
    } else {
        ("=", expr)
    };
    let Ok(target) = number.trim().parse::<u8>() else {
        return false;
    };
    match op {
        ">=" => rating >= target,
        "<=" => rating <= target,
        ">" => rating > target,
        "<" => rating < target,
        _ => rating == target,
    }
}
