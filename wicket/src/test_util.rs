// Copyright 2024 Oxide Computer Company
//! Facilities for testing code that uses Wicket
//!
//! These are exposed for use by Wicket's own integration tests and by
//! consumers that want to inspect what Wicket logged.  They are not part of
//! the stable interface.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use slog::Drain;
use slog::Level;
use slog::Logger;
use slog::KV;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

/// Parses `contents` as TOML into a `T`.  `label` identifies the config in
/// errors.
pub fn read_config<T: DeserializeOwned + fmt::Debug>(
    label: &str,
    contents: &str,
) -> Result<T, toml::de::Error> {
    let result = toml::from_str(contents);
    if let Err(error) = &result {
        eprintln!("config \"{}\": {}", label, error);
    }
    result
}

/// The fields of a bunyan log record that tests care about.
#[derive(Debug, Deserialize)]
pub struct BunyanLogRecord {
    pub time: chrono::DateTime<chrono::Utc>,
    pub name: String,
    pub hostname: String,
    pub pid: u32,
    pub msg: String,
    pub v: usize,
}

/// Reads every record of the bunyan-formatted log at `path`.
///
/// # Panics
///
/// Panics if the file can't be read or any line isn't a bunyan record.
pub fn read_bunyan_log(path: &Path) -> Vec<BunyanLogRecord> {
    let contents = std::fs::read_to_string(path).unwrap_or_else(|error| {
        panic!("reading log {}: {}", path.display(), error)
    });
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).unwrap_or_else(|error| {
                panic!("parsing log record {:?}: {}", line, error)
            })
        })
        .collect()
}

/// A log entry kept by [`CapturedLog`].
#[derive(Clone, Debug)]
pub struct CapturedRecord {
    pub level: Level,
    pub msg: String,
    /// key/value pairs, the record's own first and then its logger's
    pub values: Vec<(String, String)>,
}

impl CapturedRecord {
    /// Returns the value logged under `key`, if any.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Keeps log entries in memory so tests can assert on them.
#[derive(Clone, Debug, Default)]
pub struct CapturedLog {
    records: Arc<Mutex<Vec<CapturedRecord>>>,
}

impl CapturedLog {
    pub fn new() -> Self {
        CapturedLog::default()
    }

    /// Returns a logger whose entries (at every level) are captured here.
    pub fn logger(&self) -> Logger {
        let drain = CaptureDrain { records: Arc::clone(&self.records) };
        Logger::root(drain, slog::o!())
    }

    pub fn records(&self) -> Vec<CapturedRecord> {
        lock(&self.records).clone()
    }

    /// Returns the captured entries with message `msg`.
    pub fn find(&self, msg: &str) -> Vec<CapturedRecord> {
        lock(&self.records)
            .iter()
            .filter(|r| r.msg == msg)
            .cloned()
            .collect()
    }
}

fn lock(
    records: &Mutex<Vec<CapturedRecord>>,
) -> MutexGuard<'_, Vec<CapturedRecord>> {
    match records.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct CaptureDrain {
    records: Arc<Mutex<Vec<CapturedRecord>>>,
}

impl Drain for CaptureDrain {
    type Ok = ();
    type Err = slog::Never;

    fn log(
        &self,
        record: &slog::Record<'_>,
        values: &slog::OwnedKVList,
    ) -> Result<(), slog::Never> {
        let mut collector = Collector(vec![]);
        // Collector never fails.
        let _ = record.kv().serialize(record, &mut collector);
        let _ = values.serialize(record, &mut collector);
        lock(&self.records).push(CapturedRecord {
            level: record.level(),
            msg: record.msg().to_string(),
            values: collector.0,
        });
        Ok(())
    }
}

struct Collector(Vec<(String, String)>);

impl slog::Serializer for Collector {
    fn emit_arguments(
        &mut self,
        key: slog::Key,
        value: &fmt::Arguments<'_>,
    ) -> slog::Result {
        self.0.push((key.to_string(), value.to_string()));
        Ok(())
    }
}
