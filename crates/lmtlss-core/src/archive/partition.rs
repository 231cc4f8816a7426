//! Day-partitioned JSONL files and a bounded read cache.
//!
//! Each UTC calendar day gets its own `YYYY-MM-DD.jsonl` file under the
//! state directory. Appends are flushed and `sync_data`-ed before the
//! caller commits the corresponding index row, so a crash between the two
//! can only ever leave the index behind the file, never ahead of it —
//! recovery (see [`crate::archive::recovery`]) relies on this ordering.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[must_use]
pub fn partition_path(state_dir: &Path, date: NaiveDate) -> PathBuf {
    state_dir.join(format!("{}.jsonl", date.format("%Y-%m-%d")))
}

/// Append `line` (without trailing newline) to the day partition for `date`,
/// returning the 1-based line number it was written at. Durable: flushed
/// and `sync_data`-ed before returning.
pub fn append_line(state_dir: &Path, date: NaiveDate, line: &str) -> io::Result<usize> {
    let path = partition_path(state_dir, date);
    let existing = count_lines(&path)?;

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    file.sync_data()?;

    Ok(existing + 1)
}

/// Count the number of newline-terminated lines currently in the partition
/// file, or 0 if it does not exist.
pub fn count_lines(path: &Path) -> io::Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let file = File::open(path)?;
    Ok(BufReader::new(file).lines().count())
}

/// Read the 1-based `line_number` from the partition file at `path`.
pub fn read_line(path: &Path, line_number: usize) -> io::Result<Option<String>> {
    if line_number == 0 {
        return Ok(None);
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(reader.lines().nth(line_number - 1).transpose()?)
}

/// A bounded cache of fully parsed day-partition line vectors, keyed by
/// date. Eviction is oldest-accessed-first. The cache is a pure
/// performance optimization: callers must still verify `event_hash`
/// against the index row on every read, since a cache hit does not imply
/// the underlying file has not changed out from under the process.
pub struct PartitionCache {
    capacity: usize,
    entries: HashMap<NaiveDate, CachedPartition>,
    clock: u64,
}

struct CachedPartition {
    lines: Vec<String>,
    last_accessed: u64,
}

impl PartitionCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            clock: 0,
        }
    }

    /// Fetch the 1-based `line_number` for `date` from `state_dir`, loading
    /// and caching the whole file on a miss.
    pub fn get_line(
        &mut self,
        state_dir: &Path,
        date: NaiveDate,
        line_number: usize,
    ) -> io::Result<Option<String>> {
        self.clock += 1;
        let clock = self.clock;

        if !self.entries.contains_key(&date) {
            let path = partition_path(state_dir, date);
            let lines = if path.exists() {
                let file = File::open(&path)?;
                BufReader::new(file).lines().collect::<io::Result<Vec<_>>>()?
            } else {
                Vec::new()
            };
            self.insert(date, lines);
        }

        if let Some(entry) = self.entries.get_mut(&date) {
            entry.last_accessed = clock;
            Ok(line_number
                .checked_sub(1)
                .and_then(|i| entry.lines.get(i))
                .cloned())
        } else {
            Ok(None)
        }
    }

    /// Drop a date's cached entry, forcing the next read to reload from
    /// disk. Used after an append invalidates the cached tail.
    pub fn invalidate(&mut self, date: NaiveDate) {
        self.entries.remove(&date);
    }

    fn insert(&mut self, date: NaiveDate, lines: Vec<String>) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&date) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, v)| v.last_accessed)
                .map(|(k, _)| *k)
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            date,
            CachedPartition {
                lines,
                last_accessed: self.clock,
            },
        );
    }
}
