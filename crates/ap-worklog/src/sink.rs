// sink.rs - Durable work log sinks.
//
// `JsonlSink` stores one JSON object per line. Each line carries the hash
// of the line before it in `previous_hash`, so inserting, deleting or
// editing a line breaks the chain and `verify_chain` reports where.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entry::WorkEntry;
use crate::error::WorkLogError;
use crate::hasher;

/// Receives every entry the [`crate::WorkLog`] accepts, in order.
///
/// A sink error is logged and swallowed by the work log; it never fails
/// the append.
pub trait LogSink: Send {
    fn name(&self) -> &str;
    fn write(&mut self, entry: &WorkEntry) -> Result<(), WorkLogError>;
}

/// On-disk record: the entry plus its link into the hash chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChainedEntry {
    #[serde(flatten)]
    pub entry: WorkEntry,
    #[serde(default)]
    pub previous_hash: Option<String>,
}

pub struct JsonlSink {
    writer: BufWriter<File>,
    path: PathBuf,
    last_hash: Option<String>,
}

impl JsonlSink {
    /// Open (or create) a JSONL log, picking up the chain where an existing
    /// file left off.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WorkLogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| WorkLogError::OpenFailed {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let last_hash = if path.exists() {
            Self::read_last_hash(&path)?
        } else {
            None
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| WorkLogError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            last_hash,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record, oldest first. Blank lines are skipped.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<ChainedEntry>, WorkLogError> {
        let reader = Self::reader(path.as_ref())?;
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    /// Check every `previous_hash` against the hash of the raw line before it.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<bool, WorkLogError> {
        let reader = Self::reader(path.as_ref())?;
        let mut previous_hash: Option<String> = None;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ChainedEntry = serde_json::from_str(&line)?;
            if record.previous_hash != previous_hash {
                return Err(WorkLogError::IntegrityViolation {
                    line: line_num + 1,
                    expected: previous_hash.unwrap_or_else(|| "None".to_string()),
                    actual: record.previous_hash.unwrap_or_else(|| "None".to_string()),
                });
            }
            // Hash the raw line: re-serializing could reorder fields.
            previous_hash = Some(hasher::hash_str(&line));
        }

        Ok(true)
    }

    fn reader(path: &Path) -> Result<BufReader<File>, WorkLogError> {
        let file = File::open(path).map_err(|source| WorkLogError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(BufReader::new(file))
    }

    fn read_last_hash(path: &Path) -> Result<Option<String>, WorkLogError> {
        let mut last_line: Option<String> = None;
        for line in Self::reader(path)?.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }
        Ok(last_line.map(|line| hasher::hash_str(&line)))
    }
}

impl LogSink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn write(&mut self, entry: &WorkEntry) -> Result<(), WorkLogError> {
        let record = ChainedEntry {
            entry: entry.clone(),
            previous_hash: self.last_hash.clone(),
        };
        let json = serde_json::to_string(&record)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        self.last_hash = Some(hasher::hash_str(&json));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryStatus;
    use tempfile::tempdir;

    #[test]
    fn first_record_has_no_previous_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("work.jsonl");
        {
            let mut sink = JsonlSink::open(&path).unwrap();
            sink.write(&WorkEntry::new("controller", "one", EntryStatus::Info)).unwrap();
            sink.write(&WorkEntry::new("controller", "two", EntryStatus::Success)).unwrap();
        }

        let records = JsonlSink::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].previous_hash.is_none());
        assert!(records[1].previous_hash.is_some());
        assert_eq!(records[1].entry.message, "two");
        assert!(JsonlSink::verify_chain(&path).unwrap());
    }

    #[test]
    fn reopen_continues_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("work.jsonl");
        {
            let mut sink = JsonlSink::open(&path).unwrap();
            sink.write(&WorkEntry::new("controller", "before", EntryStatus::Info)).unwrap();
        }
        {
            let mut sink = JsonlSink::open(&path).unwrap();
            sink.write(&WorkEntry::new("controller", "after", EntryStatus::Info)).unwrap();
        }
        assert!(JsonlSink::verify_chain(&path).unwrap());
        assert_eq!(JsonlSink::read_all(&path).unwrap().len(), 2);
    }

    #[test]
    fn removed_line_breaks_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("work.jsonl");
        {
            let mut sink = JsonlSink::open(&path).unwrap();
            for i in 0..3 {
                sink.write(&WorkEntry::new("controller", format!("entry {i}"), EntryStatus::Info))
                    .unwrap();
            }
        }
        let content = std::fs::read_to_string(&path).unwrap();
        let kept: Vec<&str> = content.lines().enumerate().filter(|(i, _)| *i != 1).map(|(_, l)| l).collect();
        std::fs::write(&path, kept.join("\n")).unwrap();

        let err = JsonlSink::verify_chain(&path).unwrap_err();
        assert!(matches!(err, WorkLogError::IntegrityViolation { line: 2, .. }));
    }
}
