//! Recency window over stored history

use chrono::{DateTime, TimeDelta, Utc};

use super::{ConversationDocument, Entry};

/// Default maximum age of an entry eligible for context
pub const DEFAULT_HORIZON_DAYS: i64 = 5;

/// Default maximum number of entries in a window
pub const DEFAULT_MAX_ENTRIES: usize = 20;

/// Bounds applied when selecting prompt context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    /// Entries older than `now - horizon` are excluded
    pub horizon: TimeDelta,
    /// At most this many of the most recent eligible entries are kept
    pub max_entries: usize,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            horizon: TimeDelta::days(DEFAULT_HORIZON_DAYS),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl WindowPolicy {
    #[must_use]
    pub const fn new(horizon: TimeDelta, max_entries: usize) -> Self {
        Self {
            horizon,
            max_entries,
        }
    }

    /// Select the context window for `document` as of `now`
    #[must_use]
    pub fn select(&self, document: &ConversationDocument, now: DateTime<Utc>) -> Vec<Entry> {
        select_context(document, now, self)
    }
}

/// Select the entries of `document` that form the prompt context at `now`
///
/// Entries are taken in stored (chronological) order, restricted to the
/// horizon, stripped of incomplete exchanges, then truncated to the most
/// recent `max_entries`. The result is oldest first.
#[must_use]
pub fn select_context(
    document: &ConversationDocument,
    now: DateTime<Utc>,
    policy: &WindowPolicy,
) -> Vec<Entry> {
    // A horizon reaching past the representable range has no lower bound
    let cutoff = now.checked_sub_signed(policy.horizon);

    let eligible: Vec<&Entry> = document
        .entries()
        .filter(|e| cutoff.is_none_or(|cutoff| e.timestamp >= cutoff))
        .filter(|e| e.is_complete())
        .collect();

    let skip = eligible.len().saturating_sub(policy.max_entries);
    eligible.into_iter().skip(skip).cloned().collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::history::Identity;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn doc_with(entries: impl IntoIterator<Item = Entry>) -> ConversationDocument {
        let mut doc = ConversationDocument::new(Identity::user_channel("u1", "c1"));
        for entry in entries {
            doc.push(entry);
        }
        doc
    }

    fn entry_ago(ago: TimeDelta, label: &str) -> Entry {
        Entry::new(label, format!("re: {label}"), now() - ago)
    }

    fn labels(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.user_message.as_str()).collect()
    }

    #[test]
    fn empty_document_yields_empty_window() {
        let doc = doc_with([]);
        assert!(select_context(&doc, now(), &WindowPolicy::default()).is_empty());
    }

    #[test]
    fn excludes_entries_beyond_horizon() {
        let doc = doc_with([
            entry_ago(TimeDelta::days(6), "six"),
            entry_ago(TimeDelta::days(4), "four"),
            entry_ago(TimeDelta::days(1), "one"),
        ]);

        let window = select_context(&doc, now(), &WindowPolicy::default());
        assert_eq!(labels(&window), ["four", "one"]);
    }

    #[test]
    fn entry_exactly_at_horizon_is_kept() {
        let doc = doc_with([entry_ago(TimeDelta::days(5), "edge")]);
        let window = select_context(&doc, now(), &WindowPolicy::default());
        assert_eq!(labels(&window), ["edge"]);
    }

    #[test]
    fn keeps_most_recent_n_in_chronological_order() {
        let doc = doc_with([
            entry_ago(TimeDelta::days(10), "t-10d"),
            entry_ago(TimeDelta::days(2), "t-2d"),
            entry_ago(TimeDelta::days(1), "t-1d"),
            entry_ago(TimeDelta::zero(), "t"),
        ]);
        let policy = WindowPolicy::new(TimeDelta::days(5), 2);

        let window = select_context(&doc, now(), &policy);
        assert_eq!(labels(&window), ["t-1d", "t"]);
    }

    #[test]
    fn caps_at_max_entries() {
        let policy = WindowPolicy::default();
        let total = policy.max_entries + 7;
        let doc = doc_with((0..total).map(|i| {
            let minutes = i64::try_from(total - i).unwrap();
            entry_ago(TimeDelta::minutes(minutes), &format!("m{i}"))
        }));

        let window = select_context(&doc, now(), &policy);
        assert_eq!(window.len(), policy.max_entries);
        assert_eq!(window[0].user_message, "m7");
        assert_eq!(window.last().unwrap().user_message, format!("m{}", total - 1));
    }

    #[test]
    fn fewer_than_max_keeps_all() {
        let doc = doc_with([
            entry_ago(TimeDelta::hours(3), "a"),
            entry_ago(TimeDelta::hours(2), "b"),
        ]);
        let window = select_context(&doc, now(), &WindowPolicy::default());
        assert_eq!(labels(&window), ["a", "b"]);
    }

    #[test]
    fn drops_incomplete_entries() {
        let doc = doc_with([
            Entry::new("", "orphan reply", now() - TimeDelta::hours(3)),
            entry_ago(TimeDelta::hours(2), "kept"),
            Entry::new("unanswered", "", now() - TimeDelta::hours(1)),
        ]);

        let window = select_context(&doc, now(), &WindowPolicy::default());
        assert_eq!(labels(&window), ["kept"]);
    }

    #[test]
    fn tolerates_empty_buckets() {
        let mut doc = doc_with([entry_ago(TimeDelta::hours(1), "only")]);
        doc.buckets.insert(
            0,
            crate::history::DailyBucket {
                date: (now() - TimeDelta::days(1)).date_naive(),
                entries: Vec::new(),
            },
        );

        let window = select_context(&doc, now(), &WindowPolicy::default());
        assert_eq!(labels(&window), ["only"]);
    }

    #[test]
    fn horizon_beyond_date_range_keeps_everything() {
        let doc = doc_with([
            entry_ago(TimeDelta::days(3650), "decade"),
            entry_ago(TimeDelta::hours(1), "recent"),
        ]);
        let policy = WindowPolicy::new(TimeDelta::try_days(100_000_000).unwrap(), 20);

        let window = select_context(&doc, now(), &policy);
        assert_eq!(labels(&window), ["decade", "recent"]);
    }

    #[test]
    fn deterministic_for_same_input() {
        let doc = doc_with((0..30).map(|i| entry_ago(TimeDelta::hours(i), &format!("h{i}"))));
        let policy = WindowPolicy::new(TimeDelta::days(1), 10);

        let first = select_context(&doc, now(), &policy);
        let second = policy.select(&doc, now());
        assert_eq!(first, second);
    }
}
