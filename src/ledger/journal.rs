// =============================================================================
// Journal — append-only event log backing the ledger
// =============================================================================
//
// One JSON object per line:
//   { "seq": 7, "recorded_at": 1718000000, "event": { ... }, "checksum": "…" }
//
// `seq` starts at 1 and increases by exactly one per line. The checksum is
// hex(sha256(seq_le ‖ recorded_at_le ‖ event_json)).
//
// An event is written, flushed and fsync'd before the ledger applies it, so a
// committed transaction survives a crash. A failed append truncates the file
// back to its previous length and keeps `next_seq`, so the next append lands
// on a clean line boundary with the same sequence number. If that rollback
// also fails the journal is poisoned and refuses every further append until
// the process restarts and replays.
//
// A torn final line (crash mid-write, no trailing newline) is truncated on
// open; any other malformed line, gap or checksum mismatch aborts startup.
// =============================================================================

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::ledger::error::{LedgerError, LedgerResult};
use crate::ledger::state::LedgerEvent;

/// Destination for committed events.
pub trait EventSink: Send + Sync {
    /// Durably record `event`; returns its sequence number.
    fn append(&mut self, event: &LedgerEvent, recorded_at: u64) -> LedgerResult<u64>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub recorded_at: u64,
    pub event: LedgerEvent,
    pub checksum: String,
}

#[derive(Serialize)]
struct EntryLine<'a> {
    seq: u64,
    recorded_at: u64,
    event: &'a LedgerEvent,
    checksum: String,
}

fn checksum(seq: u64, recorded_at: u64, event_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seq.to_le_bytes());
    hasher.update(recorded_at.to_le_bytes());
    hasher.update(event_json.as_bytes());
    hex::encode(hasher.finalize())
}

impl JournalEntry {
    pub fn verify(&self) -> bool {
        match serde_json::to_string(&self.event) {
            Ok(json) => checksum(self.seq, self.recorded_at, &json) == self.checksum,
            Err(_) => false,
        }
    }
}

pub struct Journal {
    file: File,
    next_seq: u64,
    poisoned: bool,
    #[cfg(test)]
    fault: Option<fault::Fault>,
}

impl Journal {
    /// Open (creating if needed) the journal at `path` and return the events
    /// already committed to it, in order.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<LedgerEvent>)> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create journal dir {}", parent.display()))?;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read journal {}", path.display()))
            }
        };

        let (events, valid_len) = Self::parse(&content, path)?;

        if valid_len < content.len() {
            warn!(
                path = %path.display(),
                dropped_bytes = content.len() - valid_len,
                "truncating torn journal tail"
            );
            let f = OpenOptions::new()
                .write(true)
                .open(path)
                .with_context(|| format!("failed to open journal {} for repair", path.display()))?;
            f.set_len(valid_len as u64)
                .with_context(|| format!("failed to truncate journal {}", path.display()))?;
            f.sync_all().context("failed to sync repaired journal")?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open journal {} for append", path.display()))?;

        info!(path = %path.display(), events = events.len(), "journal opened");

        let next_seq = events.len() as u64 + 1;
        Ok((
            Self {
                file,
                next_seq,
                poisoned: false,
                #[cfg(test)]
                fault: None,
            },
            events,
        ))
    }

    /// Parse every complete line; returns the events and the byte length of
    /// the valid prefix.
    fn parse(content: &str, path: &Path) -> Result<(Vec<LedgerEvent>, usize)> {
        let mut events = Vec::new();
        let mut offset = 0usize;

        for raw in content.split_inclusive('\n') {
            // A line without its newline was never acknowledged.
            if !raw.ends_with('\n') {
                break;
            }
            let line = raw.trim_end();
            if line.is_empty() {
                offset += raw.len();
                continue;
            }

            let entry: JournalEntry = serde_json::from_str(line)
                .with_context(|| format!("journal {} corrupt at byte {offset}", path.display()))?;

            let expected = events.len() as u64 + 1;
            if entry.seq != expected {
                bail!(
                    "journal {} sequence gap: expected {expected}, found {}",
                    path.display(),
                    entry.seq
                );
            }
            if !entry.verify() {
                bail!(
                    "journal {} checksum mismatch at seq {}",
                    path.display(),
                    entry.seq
                );
            }

            events.push(entry.event);
            offset += raw.len();
        }

        Ok((events, offset))
    }
}

impl Journal {
    fn write_synced(&mut self, bytes: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        if let Some(fault) = self.fault.take() {
            if let fault::Fault::Unrecoverable(_) = fault {
                self.fault = Some(fault::Fault::RollbackFails);
            }
            return fault.inject(&mut self.file, bytes);
        }
        self.file.write_all(bytes)?;
        self.file.sync_data()
    }

    /// Cut the file back to `len` bytes.
    fn rollback(&mut self, len: u64) -> io::Result<()> {
        #[cfg(test)]
        if self.fault.take() == Some(fault::Fault::RollbackFails) {
            return Err(io::Error::new(io::ErrorKind::Other, "rollback refused"));
        }
        self.file.set_len(len)?;
        self.file.sync_all()
    }

    #[cfg(test)]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    #[cfg(test)]
    pub(crate) fn inject_fault(&mut self, fault: fault::Fault) {
        self.fault = Some(fault);
    }
}

impl EventSink for Journal {
    fn append(&mut self, event: &LedgerEvent, recorded_at: u64) -> LedgerResult<u64> {
        if self.poisoned {
            return Err(LedgerError::Storage(
                "journal is poisoned by an earlier failed rollback; restart to replay".into(),
            ));
        }
        let seq = self.next_seq;
        let storage = |e: &dyn std::fmt::Display| LedgerError::Storage(e.to_string());

        let event_json = serde_json::to_string(event).map_err(|e| storage(&e))?;
        let line = EntryLine {
            seq,
            recorded_at,
            event,
            checksum: checksum(seq, recorded_at, &event_json),
        };
        let mut bytes = serde_json::to_vec(&line).map_err(|e| storage(&e))?;
        bytes.push(b'\n');

        let prev_len = self.file.metadata().map_err(|e| storage(&e))?.len();
        if let Err(write_err) = self.write_synced(&bytes) {
            if let Err(rollback_err) = self.rollback(prev_len) {
                self.poisoned = true;
                error!(
                    seq,
                    error = %write_err,
                    rollback_error = %rollback_err,
                    "journal rollback failed; refusing further appends"
                );
                return Err(LedgerError::Storage(format!(
                    "{write_err}; rollback failed: {rollback_err}"
                )));
            }
            warn!(seq, error = %write_err, "journal append failed; rolled back");
            return Err(storage(&write_err));
        }

        self.next_seq += 1;
        debug!(seq, kind = event.kind(), "journal append");
        Ok(seq)
    }
}


#[cfg(test)]
mod tests {
    use super::fault::Fault;
    use super::*;
    use crate::types::Identity;

    fn halted(by: &str) -> LedgerEvent {
        LedgerEvent::Halted {
            by: Identity::new(by),
        }
    }

    #[test]
    fn appended_events_are_replayed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.journal");

        {
            let (mut journal, events) = Journal::open(&path).unwrap();
            assert!(events.is_empty());
            assert_eq!(journal.append(&halted("A"), 1).unwrap(), 1);
            assert_eq!(journal.append(&halted("B"), 2).unwrap(), 2);
        }

        let (mut journal, events) = Journal::open(&path).unwrap();
        assert_eq!(events, vec![halted("A"), halted("B")]);
        assert_eq!(journal.append(&halted("C"), 3).unwrap(), 3);
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.journal");
        {
            let (mut journal, _) = Journal::open(&path).unwrap();
            journal.append(&halted("A"), 1).unwrap();
        }
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"{\"seq\":2,\"recorded_").unwrap();
        drop(f);

        let (mut journal, events) = Journal::open(&path).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(journal.append(&halted("B"), 2).unwrap(), 2);

        let (_, events) = Journal::open(&path).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn tampered_entry_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.journal");
        {
            let (mut journal, _) = Journal::open(&path).unwrap();
            journal.append(&halted("GADMIN"), 1).unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replace("GADMIN", "GMALLORY")).unwrap();

        let err = Journal::open(&path).err().unwrap();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn sequence_gap_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.journal");
        let event = halted("A");
        let json = serde_json::to_string(&event).unwrap();
        let line = serde_json::json!({
            "seq": 2,
            "recorded_at": 0,
            "event": event,
            "checksum": checksum(2, 0, &json),
        });
        std::fs::write(&path, format!("{line}\n")).unwrap();

        let err = Journal::open(&path).err().unwrap();
        assert!(err.to_string().contains("sequence gap"));
    }

    #[test]
    fn torn_write_is_rolled_back_before_next_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.journal");
        {
            let (mut journal, _) = Journal::open(&path).unwrap();
            journal.append(&halted("A"), 1).unwrap();
            let len_after_a = std::fs::metadata(&path).unwrap().len();

            journal.inject_fault(Fault::TornWrite(20));
            let err = journal.append(&halted("B"), 2).unwrap_err();
            assert_eq!(err.code(), "STORAGE");
            assert_eq!(std::fs::metadata(&path).unwrap().len(), len_after_a);

            assert_eq!(journal.append(&halted("C"), 3).unwrap(), 2);
        }

        let (_, events) = Journal::open(&path).unwrap();
        assert_eq!(events, vec![halted("A"), halted("C")]);
    }

    #[test]
    fn failed_sync_does_not_leave_the_line_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.journal");
        {
            let (mut journal, _) = Journal::open(&path).unwrap();
            journal.inject_fault(Fault::SyncFails);
            assert!(journal.append(&halted("A"), 1).is_err());
            assert_eq!(journal.append(&halted("B"), 2).unwrap(), 1);
        }

        let (_, events) = Journal::open(&path).unwrap();
        assert_eq!(events, vec![halted("B")]);
    }

    #[test]
    fn failed_rollback_poisons_the_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.journal");
        {
            let (mut journal, _) = Journal::open(&path).unwrap();
            journal.append(&halted("A"), 1).unwrap();

            journal.inject_fault(Fault::Unrecoverable(10));
            assert!(journal.append(&halted("B"), 2).is_err());
            assert!(journal.is_poisoned());

            let err = journal.append(&halted("C"), 3).unwrap_err();
            assert!(err.to_string().contains("poisoned"));
        }

        // The torn fragment is the final line, so a restart recovers cleanly.
        let (mut journal, events) = Journal::open(&path).unwrap();
        assert_eq!(events, vec![halted("A")]);
        assert_eq!(journal.append(&halted("C"), 3).unwrap(), 2);
    }
}
