//! Search predicates
//!
//! A `Query` is the predicate handed to a job. The keyword part
//! (`fragments`) is answered by the store's token index, everything else is
//! checked against each scanned event by the pipeline's filter stage.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::Event;

/// Predicate for a search job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Keywords that must all appear in the raw text (index-assisted)
    ///
    /// A keyword with no word characters, such as `->`, is matched as a
    /// case-insensitive substring instead.
    #[serde(default)]
    pub fragments: Vec<String>,

    /// Case-insensitive substrings that must not appear in the raw text
    #[serde(default)]
    pub not_fragments: Vec<String>,

    /// Allowed hosts, empty means any
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Allowed sources, empty means any
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Query {
    /// A query matching every event
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a keyword query from whitespace separated text
    pub fn keywords(text: &str) -> Self {
        Self {
            fragments: text.split_whitespace().map(str::to_string).collect(),
            ..Default::default()
        }
    }

    pub fn without_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.not_fragments.push(fragment.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.hosts.push(host.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Evaluate the part of the predicate the index cannot answer
    pub fn residual_matches(&self, event: &Event) -> bool {
        if !self.hosts.is_empty() && !self.hosts.iter().any(|h| h == &event.host) {
            return false;
        }
        if !self.sources.is_empty() && !self.sources.iter().any(|s| s == &event.source) {
            return false;
        }
        if self.not_fragments.is_empty() {
            return true;
        }

        let raw_lower = event.raw.to_lowercase();
        !self
            .not_fragments
            .iter()
            .any(|f| raw_lower.contains(&f.to_lowercase()))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.fragments.clone();
        parts.extend(self.not_fragments.iter().map(|n| format!("NOT {}", n)));
        parts.extend(self.hosts.iter().map(|h| format!("host={}", h)));
        parts.extend(self.sources.iter().map(|s| format!("source={}", s)));

        if parts.is_empty() {
            write!(f, "*")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

/// Half-open event time window `[start, end)`; unset bounds are unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Unbounded range
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Everything from `duration` ago onwards
    pub fn last(duration: Duration) -> Self {
        Self {
            start: Some(Utc::now() - duration),
            end: None,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts < e)
    }
}
