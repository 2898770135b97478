//! Priority merge of fetcher results
//!
//! The highest-priority completed entry seeds the result. Lower-priority
//! entries only fill fields that are still empty; they never override a
//! value already present. Evidence and error trails of every entry are
//! appended.

use onair_common::{is_blank, FetcherEntry, FetcherOutcome, SongData, StationNowPlayingData, TaskState};
use tracing::debug;

/// Merge the completed entries written during the current task
///
/// Returns `None` when no current entry completed.
pub fn merge(state: &TaskState) -> Option<StationNowPlayingData> {
    let mut completed: Vec<(&String, &FetcherEntry, &StationNowPlayingData)> = state
        .current_entries()
        .filter_map(|(fetcher_id, entry)| match &entry.outcome {
            FetcherOutcome::Completed(data) => Some((fetcher_id, entry, data)),
            FetcherOutcome::Failed(_) => None,
        })
        .collect();

    // Equal priorities fall back to fetcher id so the order is stable
    completed.sort_by(|a, b| {
        b.1.priority
            .cmp(&a.1.priority)
            .then_with(|| a.0.cmp(b.0))
    });

    let mut entries = completed.into_iter();
    let (seed_id, seed_entry, seed) = entries.next()?;

    let mut merged = seed.clone();
    merged.dirty = seed.dirty || seed_entry.dirty;
    let mut contributors = vec![seed_id.as_str()];

    for (fetcher_id, entry, data) in entries {
        let mut filled = fill_song(&mut merged.current_song, data.current_song.as_ref());
        if merged.listeners.is_none() && data.listeners.is_some() {
            merged.listeners = data.listeners;
            filled = true;
        }
        if filled {
            merged.dirty |= data.dirty || entry.dirty;
            contributors.push(fetcher_id.as_str());
        }

        merged.raw_data.extend(data.raw_data.iter().cloned());
        merged.error.extend(data.error.iter().cloned());
        if data.timestamp > merged.timestamp {
            merged.timestamp = data.timestamp;
        }
    }

    debug!(
        station_id = %state.station_id,
        contributors = ?contributors,
        complete = merged.has_complete_song(),
        "Merged fetcher results"
    );
    Some(merged)
}

/// Fill empty song fields from a lower-priority song, true if any was filled
fn fill_song(target: &mut Option<SongData>, other: Option<&SongData>) -> bool {
    let Some(other) = other.filter(|s| !s.is_empty()) else {
        return false;
    };
    let Some(song) = target.as_mut() else {
        *target = Some(other.clone());
        return true;
    };

    let mut filled = false;
    for (field, candidate) in [
        (&mut song.name, &other.name),
        (&mut song.artist, &other.artist),
        (&mut song.thumbnail_url, &other.thumbnail_url),
        (&mut song.raw_title, &other.raw_title),
    ] {
        if is_blank(field) && !is_blank(candidate) {
            *field = candidate.clone();
            filled = true;
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn song(name: Option<&str>, artist: Option<&str>) -> SongData {
        SongData {
            name: name.map(String::from),
            artist: artist.map(String::from),
            ..SongData::default()
        }
    }

    fn data(song: Option<SongData>, listeners: Option<i64>) -> StationNowPlayingData {
        let mut data = StationNowPlayingData::empty();
        data.current_song = song;
        data.listeners = listeners;
        data
    }

    fn running_state() -> (TaskState, Uuid) {
        let task_id = Uuid::new_v4();
        let mut state = TaskState::new("station");
        state.current_task_id = Some(task_id);
        state.current_task_started_at = Some(Utc::now() - Duration::seconds(10));
        (state, task_id)
    }

    fn insert(state: &mut TaskState, id: &str, priority: i32, outcome: FetcherOutcome, task_id: Uuid) {
        state.processed_fetcher_states.insert(
            id.to_string(),
            FetcherEntry {
                outcome,
                priority,
                timestamp: Utc::now(),
                task_id,
                dirty: false,
            },
        );
    }

    #[test]
    fn test_no_entries_is_none() {
        let (state, _) = running_state();
        assert!(merge(&state).is_none());
    }

    #[test]
    fn test_highest_priority_name_wins() {
        let (mut state, task) = running_state();
        insert(&mut state, "low", 1, FetcherOutcome::Completed(data(Some(song(Some("Low Song"), Some("Low Artist"))), None)), task);
        insert(&mut state, "high", 9, FetcherOutcome::Completed(data(Some(song(Some("High Song"), None)), None)), task);
        insert(&mut state, "mid", 5, FetcherOutcome::Completed(data(Some(song(Some("Mid Song"), Some("Mid Artist"))), None)), task);

        let merged = merge(&state).unwrap();
        assert_eq!(merged.song_name(), Some("High Song"));
        // First entry below the seed that has an artist
        assert_eq!(merged.song_artist(), Some("Mid Artist"));
    }

    #[test]
    fn test_failed_and_stale_entries_ignored() {
        let (mut state, task) = running_state();
        insert(&mut state, "failed", 10, FetcherOutcome::Failed("timeout".into()), task);
        insert(&mut state, "old", 8, FetcherOutcome::Completed(data(Some(song(Some("Old Song"), None)), None)), Uuid::new_v4());
        if let Some(entry) = state.processed_fetcher_states.get_mut("old") {
            entry.timestamp = Utc::now() - Duration::minutes(30);
        }
        insert(&mut state, "fresh", 1, FetcherOutcome::Completed(data(None, Some(4))), task);

        let merged = merge(&state).unwrap();
        assert_eq!(merged.song_name(), None);
        assert_eq!(merged.listeners, Some(4));
    }

    #[test]
    fn test_trails_are_appended_and_timestamp_advances() {
        let (mut state, task) = running_state();
        let mut high = data(Some(song(Some("A Song"), Some("An Artist"))), Some(1));
        high.push_raw(json!({"from": "high"}));
        high.timestamp = Utc::now() - Duration::seconds(5);
        let mut low = data(None, Some(99));
        low.push_raw(json!({"from": "low"}));
        low.push_error("parse", "bad");
        let latest = Utc::now();
        low.timestamp = latest;

        insert(&mut state, "high", 2, FetcherOutcome::Completed(high), task);
        insert(&mut state, "low", 1, FetcherOutcome::Completed(low), task);

        let merged = merge(&state).unwrap();
        assert_eq!(merged.listeners, Some(1));
        assert_eq!(merged.raw_data.len(), 2);
        assert_eq!(merged.error.len(), 1);
        assert_eq!(merged.timestamp, latest);
    }

    #[test]
    fn test_dirty_only_from_contributors() {
        let (mut state, task) = running_state();
        let mut noisy = data(Some(song(Some("Other"), Some("Other"))), None);
        noisy.dirty = true;
        insert(&mut state, "clean", 5, FetcherOutcome::Completed(data(Some(song(Some("Song"), Some("Artist"))), Some(3))), task);
        insert(&mut state, "noisy", 1, FetcherOutcome::Completed(noisy), task);
        assert!(!merge(&state).unwrap().dirty);

        let mut needed = data(None, Some(7));
        needed.dirty = true;
        insert(&mut state, "clean", 5, FetcherOutcome::Completed(data(Some(song(Some("Song"), Some("Artist"))), None)), task);
        insert(&mut state, "noisy", 1, FetcherOutcome::Completed(needed), task);
        assert!(merge(&state).unwrap().dirty);
    }

    #[test]
    fn test_equal_priority_tie_breaks_on_fetcher_id() {
        let (mut state, task) = running_state();
        insert(&mut state, "b@http://b", 3, FetcherOutcome::Completed(data(Some(song(Some("From B"), None)), None)), task);
        insert(&mut state, "a@http://a", 3, FetcherOutcome::Completed(data(Some(song(Some("From A"), None)), None)), task);
        assert_eq!(merge(&state).unwrap().song_name(), Some("From A"));
    }
}
