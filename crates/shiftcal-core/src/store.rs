use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::datetime::DayRange;
use crate::event::{EventId, EventRow};

/// Read/write contract of the storage collaborator.
pub trait EventStore: Send + Sync {
    /// Rows whose [`EventRow::day_span`] overlaps `range`, so events that
    /// started before it but run into it are included.
    fn query(&self, range: DayRange) -> anyhow::Result<Vec<EventRow>>;

    /// Stores `row` under a fresh id and returns it; `row.id` is ignored.
    fn insert(&self, row: EventRow) -> anyhow::Result<EventId>;

    fn update(&self, row: EventRow) -> anyhow::Result<()>;

    fn delete(&self, id: EventId) -> anyhow::Result<bool>;
}

#[derive(Debug, Default)]
pub struct MemoryEventStore {
    rows: Mutex<Vec<EventRow>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<EventRow>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Vec<EventRow>>> {
        self.rows
            .lock()
            .map_err(|_| anyhow!("event store lock poisoned"))
    }
}

impl EventStore for MemoryEventStore {
    fn query(&self, range: DayRange) -> anyhow::Result<Vec<EventRow>> {
        Ok(select_range(&self.lock()?, range))
    }

    fn insert(&self, mut row: EventRow) -> anyhow::Result<EventId> {
        let mut rows = self.lock()?;
        row.id = next_id(&rows);
        let id = row.id;
        rows.push(row);
        Ok(id)
    }

    fn update(&self, row: EventRow) -> anyhow::Result<()> {
        let mut rows = self.lock()?;
        let slot = rows
            .iter_mut()
            .find(|existing| existing.id == row.id)
            .ok_or_else(|| anyhow!("event not found: {}", row.id))?;
        *slot = row;
        Ok(())
    }

    fn delete(&self, id: EventId) -> anyhow::Result<bool> {
        let mut rows = self.lock()?;
        let before = rows.len();
        rows.retain(|row| row.id != id);
        Ok(rows.len() != before)
    }
}

/// Rows kept as JSON lines in `events.data` under a data directory.
#[derive(Debug)]
pub struct JsonlEventStore {
    pub data_dir: PathBuf,
    pub events_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlEventStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let events_path = data_dir.join("events.data");
        if !events_path.exists() {
            fs::write(&events_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            events = %events_path.display(),
            "opened event store"
        );

        Ok(Self {
            data_dir,
            events_path,
            write_lock: Mutex::new(()),
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_all(&self) -> anyhow::Result<Vec<EventRow>> {
        load_jsonl(&self.events_path).context("failed to load events.data")
    }

    fn rewrite<F, T>(&self, apply: F) -> anyhow::Result<T>
    where
        F: FnOnce(&mut Vec<EventRow>) -> anyhow::Result<T>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("event store write lock poisoned"))?;
        let mut rows = self.load_all()?;
        let out = apply(&mut rows)?;
        rows.sort_by_key(|row| (row.day, row.start_minute, row.id));
        save_jsonl_atomic(&self.events_path, &rows).context("failed to save events.data")?;
        Ok(out)
    }
}

impl EventStore for JsonlEventStore {
    #[tracing::instrument(skip(self, range), fields(range = %range))]
    fn query(&self, range: DayRange) -> anyhow::Result<Vec<EventRow>> {
        Ok(select_range(&self.load_all()?, range))
    }

    #[tracing::instrument(skip(self, row), fields(day = %row.day))]
    fn insert(&self, mut row: EventRow) -> anyhow::Result<EventId> {
        self.rewrite(|rows| {
            row.id = next_id(rows);
            let id = row.id;
            rows.push(row);
            Ok(id)
        })
    }

    #[tracing::instrument(skip(self, row), fields(id = row.id))]
    fn update(&self, row: EventRow) -> anyhow::Result<()> {
        self.rewrite(|rows| {
            let slot = rows
                .iter_mut()
                .find(|existing| existing.id == row.id)
                .ok_or_else(|| anyhow!("event not found: {}", row.id))?;
            *slot = row;
            Ok(())
        })
    }

    #[tracing::instrument(skip(self))]
    fn delete(&self, id: EventId) -> anyhow::Result<bool> {
        self.rewrite(|rows| {
            let before = rows.len();
            rows.retain(|row| row.id != id);
            Ok(rows.len() != before)
        })
    }
}

fn next_id(rows: &[EventRow]) -> EventId {
    rows.iter().map(|row| row.id).max().unwrap_or(0) + 1
}

fn select_range(rows: &[EventRow], range: DayRange) -> Vec<EventRow> {
    let mut out: Vec<EventRow> = rows
        .iter()
        .filter(|row| row.day_span().overlaps(&range))
        .cloned()
        .collect();
    out.sort_by_key(|row| (row.day, row.start_minute, row.id));
    debug!(range = %range, count = out.len(), "selected rows");
    out
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<EventRow>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let row: EventRow = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(row);
    }

    debug!(count = out.len(), "loaded rows from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, rows))]
fn save_jsonl_atomic(path: &Path, rows: &[EventRow]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = rows.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for row in rows {
        let serialized = serde_json::to_string(row)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{EventStore, MemoryEventStore};
    use crate::datetime::{DayRange, JulianDay};
    use crate::event::EventRow;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 9, d).expect("valid date")
    }

    fn row(id: i64, day: NaiveDate, start_minute: i64, duration_minutes: i64) -> EventRow {
        EventRow {
            id,
            day,
            start_minute,
            duration_minutes,
            name: format!("row {id}"),
            description: String::new(),
            location: String::new(),
            color: 0,
            created_at: Utc
                .with_ymd_and_hms(2026, 9, 1, 0, 0, 0)
                .single()
                .expect("valid timestamp"),
        }
    }

    #[test]
    fn query_includes_rows_running_into_the_range() {
        let store = MemoryEventStore::with_rows(vec![
            row(1, date(25), 600, 5600),
            row(2, date(25), 600, 60),
            row(3, date(27), 1380, 30),
            row(4, date(28), 0, 30),
            row(5, date(30), 0, 30),
        ]);
        let range = DayRange::new(
            JulianDay::from_date(date(28)),
            JulianDay::from_date(date(29)),
        );

        let ids: Vec<i64> = store
            .query(range)
            .expect("query")
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn insert_assigns_next_id() {
        let store = MemoryEventStore::new();
        assert_eq!(store.insert(row(0, date(1), 0, 10)).expect("insert"), 1);
        assert_eq!(store.insert(row(0, date(2), 0, 10)).expect("insert"), 2);
        assert!(store.delete(1).expect("delete"));
        assert_eq!(store.insert(row(0, date(3), 0, 10)).expect("insert"), 3);
    }
}
