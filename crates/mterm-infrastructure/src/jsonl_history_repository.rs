//! Append-only history logs, one JSON record per line.

use crate::paths::{MtermPaths, is_storable_id};
use crate::storage::StoreLock;
use mterm_core::error::{MtermError, Result};
use mterm_core::history::{HistoryEntry, HistoryIter, HistoryRepository, NewHistoryEntry};
use mterm_core::session::SessionId;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};

/// Stores `history/<session>.jsonl`.
///
/// Appends hold `history/<session>.lock`; reads take no lock and only trust
/// newline-terminated records.
pub struct JsonlHistoryRepository {
    paths: MtermPaths,
}

impl JsonlHistoryRepository {
    pub fn new(paths: MtermPaths) -> Result<Self> {
        fs::create_dir_all(paths.history_dir())?;
        Ok(Self { paths })
    }

    fn check_id(session_id: &SessionId) -> Result<()> {
        if is_storable_id(session_id.as_str()) {
            Ok(())
        } else {
            Err(MtermError::validation(format!(
                "invalid session id '{}'",
                session_id
            )))
        }
    }
}

/// Where the complete records end and what the highest sequence number is.
struct LogTail {
    complete_len: u64,
    last_sequence: u64,
}

fn scan_tail(content: &[u8]) -> LogTail {
    let complete_len = content
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1);

    let last_sequence = content[..complete_len]
        .split(|b| *b == b'\n')
        .filter_map(|line| serde_json::from_slice::<HistoryEntry>(line).ok())
        .map(|entry| entry.sequence_number)
        .max()
        .unwrap_or(0);

    LogTail {
        complete_len: complete_len as u64,
        last_sequence,
    }
}

impl HistoryRepository for JsonlHistoryRepository {
    fn append(&self, session_id: &SessionId, entry: NewHistoryEntry) -> Result<HistoryEntry> {
        Self::check_id(session_id)?;
        let _lock = StoreLock::acquire(&self.paths.history_lock(session_id.as_str()))?;

        let path = self.paths.history_file(session_id.as_str());
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        let tail = scan_tail(&content);

        if tail.complete_len < content.len() as u64 {
            tracing::warn!(
                "[History] Truncating {} byte partial record from {}",
                content.len() as u64 - tail.complete_len,
                path.display()
            );
            file.set_len(tail.complete_len)?;
        }

        let entry = entry.into_entry(session_id.clone(), tail.last_sequence + 1);
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        file.seek(SeekFrom::Start(tail.complete_len))?;
        file.write_all(&line)?;
        file.sync_all()?;

        Ok(entry)
    }

    fn read_all(&self, session_id: &SessionId) -> Result<HistoryIter> {
        Self::check_id(session_id)?;
        let path = self.paths.history_file(session_id.as_str());
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Box::new(std::iter::empty()));
            }
            Err(e) => return Err(e.into()),
        };

        let location = path.display().to_string();
        let records = BufReader::new(file)
            .split(b'\n')
            .enumerate()
            .filter_map(move |(index, line)| {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => return Some(Err(MtermError::from(e))),
                };
                if line.iter().all(u8::is_ascii_whitespace) {
                    return None;
                }
                Some(serde_json::from_slice::<HistoryEntry>(&line).map_err(|e| {
                    MtermError::corruption(format!("{}:{}", location, index + 1), e.to_string())
                }))
            });

        Ok(Box::new(records))
    }

    fn delete(&self, session_id: &SessionId) -> Result<()> {
        Self::check_id(session_id)?;
        let _lock = StoreLock::acquire(&self.paths.history_lock(session_id.as_str()))?;
        match fs::remove_file(self.paths.history_file(session_id.as_str())) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mterm_core::history::{InputKind, Outcome};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn entry(raw: &str) -> NewHistoryEntry {
        NewHistoryEntry {
            timestamp: Utc::now(),
            kind: InputKind::Builtin,
            raw_input: raw.to_string(),
            resolved_command: None,
            outcome: Outcome::success("ok"),
            duration_ms: 1,
        }
    }

    fn repository(dir: &TempDir) -> JsonlHistoryRepository {
        JsonlHistoryRepository::new(MtermPaths::new(dir.path())).unwrap()
    }

    fn sequences(repo: &JsonlHistoryRepository, id: &SessionId) -> Vec<u64> {
        repo.read_all(id)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.sequence_number)
            .collect()
    }

    #[test]
    fn test_sequence_continues_across_reopen() {
        let dir = TempDir::new().unwrap();
        let id = SessionId::from_ordinal(1);

        let repo = repository(&dir);
        repo.append(&id, entry("pwd")).unwrap();
        repo.append(&id, entry("ls")).unwrap();
        drop(repo);

        let reopened = repository(&dir);
        let third = reopened.append(&id, entry("date")).unwrap();
        assert_eq!(third.sequence_number, 3);
        assert_eq!(sequences(&reopened, &id), vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir);
        assert_eq!(repo.read_all(&SessionId::from_ordinal(4)).unwrap().count(), 0);
    }

    #[test]
    fn test_partial_trailing_record_is_skipped_then_repaired() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir);
        let id = SessionId::from_ordinal(1);
        repo.append(&id, entry("pwd")).unwrap();
        repo.append(&id, entry("ls")).unwrap();

        let path = MtermPaths::new(dir.path()).history_file(id.as_str());
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"session_id\":\"session_1\",\"seq").unwrap();
        drop(file);

        let items: Vec<_> = repo.read_all(&id).unwrap().collect();
        assert_eq!(items.len(), 3);
        assert!(items[2].as_ref().unwrap_err().is_corruption());
        let page = repo.recent(&id, 10).unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.skipped.len(), 1);

        let next = repo.append(&id, entry("date")).unwrap();
        assert_eq!(next.sequence_number, 3);
        let items: Vec<_> = repo.read_all(&id).unwrap().collect();
        assert!(items.iter().all(|i| i.is_ok()));
        assert_eq!(sequences(&repo, &id), vec![1, 2, 3]);
    }

    #[test]
    fn test_corrupt_middle_line_does_not_stop_the_scan() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir);
        let id = SessionId::from_ordinal(1);
        repo.append(&id, entry("pwd")).unwrap();

        let path = MtermPaths::new(dir.path()).history_file(id.as_str());
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"not json\n").unwrap();
        drop(file);
        repo.append(&id, entry("ls")).unwrap();

        assert_eq!(sequences(&repo, &id), vec![1, 2]);
        let page = repo.recent(&id, 1).unwrap();
        assert_eq!(page.entries[0].raw_input, "ls");
    }

    #[test]
    fn test_concurrent_appends_have_no_gaps() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let id = Arc::new(SessionId::from_ordinal(1));

        let handles: Vec<_> = (0..4)
            .map(|n| {
                let root = root.clone();
                let id = id.clone();
                thread::spawn(move || {
                    let repo = JsonlHistoryRepository::new(MtermPaths::new(root)).unwrap();
                    for i in 0..10 {
                        repo.append(&id, entry(&format!("echo {n}-{i}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let seqs = sequences(&repository(&dir), &id);
        assert_eq!(seqs, (1..=40).collect::<Vec<u64>>());
    }

    #[test]
    fn test_delete_removes_log() {
        let dir = TempDir::new().unwrap();
        let repo = repository(&dir);
        let id = SessionId::from_ordinal(2);
        repo.append(&id, entry("pwd")).unwrap();

        repo.delete(&id).unwrap();
        repo.delete(&id).unwrap();
        assert_eq!(repo.read_all(&id).unwrap().count(), 0);
    }
}
