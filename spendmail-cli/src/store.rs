//! Append-only JSONL transaction store keyed by record id.
//!
//! Inserting an id that is already present is a benign no-op, so
//! reprocessing a mailbox never duplicates or overwrites records.

use anyhow::{Context, Result};
use spendmail_core::Transaction;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

pub struct JsonlStore {
    path: PathBuf,
    ids: HashSet<String>,
}

impl JsonlStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let ids = read_records(&path)?
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        Ok(Self { path, ids })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn insert_if_absent(&mut self, txn: &Transaction) -> Result<InsertOutcome> {
        let id = txn.id().to_string();
        if self.ids.contains(&id) {
            debug!(id = %id, "Duplicate txn skipped");
            return Ok(InsertOutcome::Duplicate);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let line = serde_json::to_string(&txn.to_item()?)?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        writeln!(f, "{line}").with_context(|| format!("write {}", self.path.display()))?;

        info!(id = %id, merchant = txn.merchant(), amount = %txn.amount(), currency = txn.currency(), "Saved txn");
        self.ids.insert(id);
        Ok(InsertOutcome::Inserted)
    }

    pub fn records(&self) -> Result<Vec<Transaction>> {
        read_records(&self.path)
    }
}

fn read_records(path: &Path) -> Result<Vec<Transaction>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    s.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let item: serde_json::Value = serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid JSON", path.display(), i + 1))?;
            Transaction::from_item(item)
                .with_context(|| format!("{}:{}: invalid record", path.display(), i + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use spendmail_core::{RawDate, RawFields, SourceMeta, normalize};
    use chrono::Utc;

    fn txn(message_id: &str) -> Transaction {
        let fields = RawFields {
            date: RawDate::Text("2025-07-01".into()),
            amount: "23.45".parse().unwrap(),
            currency: None,
            txn_type: "debit".into(),
            merchant: Some("STARBUCKS".into()),
            category: None,
        };
        let src = SourceMeta::new("noreply@bank.com", "body", Some(message_id));
        normalize(fields, &src, Utc::now()).unwrap()
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/txns.jsonl");
        let mut store = JsonlStore::open(&path).unwrap();

        assert_eq!(store.insert_if_absent(&txn("1")).unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert_if_absent(&txn("1")).unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.insert_if_absent(&txn("2")).unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.records().unwrap().len(), 2);
    }

    #[test]
    fn test_reopen_remembers_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("txns.jsonl");
        JsonlStore::open(&path).unwrap().insert_if_absent(&txn("9")).unwrap();

        let mut reopened = JsonlStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.insert_if_absent(&txn("9")).unwrap(), InsertOutcome::Duplicate);
        let records = reopened.records().unwrap();
        assert_eq!(records[0].merchant(), "STARBUCKS");
        assert_eq!(records[0].source_message_id(), "9");
    }

    #[test]
    fn test_corrupt_line_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("txns.jsonl");
        fs::write(&path, "{not json}\n").unwrap();
        let err = JsonlStore::open(&path).err().unwrap();
        assert!(format!("{err:#}").contains(":1:"));
    }
}
