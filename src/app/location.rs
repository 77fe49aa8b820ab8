use std::fmt;

use url::{Url, form_urlencoded};

const MAX_HISTORY_ENTRIES: usize = 100;

/// URL-like view state: which app is open and which review filter is active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Location {
    pub(crate) app_id: Option<String>,
    pub(crate) query: Option<String>,
}

impl Location {
    pub(crate) fn new(app_id: Option<String>, query: Option<String>) -> Self {
        Self {
            app_id: non_empty(app_id),
            query: non_empty(query),
        }
    }

    pub(crate) fn for_app(app_id: impl Into<String>) -> Self {
        Self::new(Some(app_id.into()), None)
    }

    /// Accepts `/?app=1`, `?app=1`, `app=1` or a full URL. Never fails;
    /// unknown parameters are dropped.
    pub(crate) fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let query = match Url::parse(trimmed) {
            Ok(url) => url.query().unwrap_or_default().to_string(),
            Err(_) => {
                let without_fragment = trimmed.split('#').next().unwrap_or_default();
                if let Some((_, query)) = without_fragment.split_once('?') {
                    query.to_string()
                } else if without_fragment.contains('=') {
                    without_fragment.to_string()
                } else {
                    String::new()
                }
            }
        };

        let mut app_id = None;
        let mut filter = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "app" if app_id.is_none() => app_id = Some(value.to_string()),
                "q" if filter.is_none() => filter = Some(value.to_string()),
                _ => {}
            }
        }

        Self::new(app_id, filter)
    }

    pub(crate) fn to_path(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        if let Some(app_id) = &self.app_id {
            serializer.append_pair("app", app_id);
        }
        if let Some(query) = &self.query {
            serializer.append_pair("q", query);
        }
        let query = serializer.finish();
        if query.is_empty() {
            "/".to_string()
        } else {
            format!("/?{query}")
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Session history with push/replace and back/forward traversal.
#[derive(Debug, Clone)]
pub(crate) struct NavigationHistory {
    entries: Vec<Location>,
    index: usize,
}

impl NavigationHistory {
    pub(crate) fn new(initial: Location) -> Self {
        Self {
            entries: vec![initial],
            index: 0,
        }
    }

    pub(crate) fn current(&self) -> &Location {
        &self.entries[self.index]
    }

    /// Adds an entry after the current one, dropping any forward entries.
    /// Pushing the current location again is a no-op.
    pub(crate) fn push(&mut self, location: Location) -> bool {
        if *self.current() == location {
            return false;
        }
        self.entries.truncate(self.index + 1);
        self.entries.push(location);
        if self.entries.len() > MAX_HISTORY_ENTRIES {
            self.entries.remove(0);
        }
        self.index = self.entries.len() - 1;
        true
    }

    pub(crate) fn replace(&mut self, location: Location) {
        self.entries[self.index] = location;
    }

    pub(crate) fn back(&mut self) -> Option<&Location> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        Some(self.current())
    }

    pub(crate) fn forward(&mut self) -> Option<&Location> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        Some(self.current())
    }

    pub(crate) fn position(&self) -> (usize, usize) {
        (self.index + 1, self.entries.len())
    }
}
