//! Write batching for bulk catalog inserts
//!
//! New rows discovered during traversal are queued per destination table and
//! flushed in batches. Container (directory) rows are queued in a priority
//! lane that is always flushed before plain rows for the same table, so a
//! child file can never be inserted ahead of its parent directory.

use log::debug;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::store::{FieldMap, Store, Table};

/// Per-table pending insert queues
#[derive(Default)]
struct TableQueue {
    priority: Vec<FieldMap>,
    plain: Vec<FieldMap>,
}

impl TableQueue {
    fn len(&self) -> usize {
        self.priority.len() + self.plain.len()
    }
}

/// Batches inserts per destination table, flushing when a table's queue
/// reaches the configured batch size.
pub struct WriteBatcher {
    batch_size: usize,
    queues: BTreeMap<Table, TableQueue>,
}

impl WriteBatcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            queues: BTreeMap::new(),
        }
    }

    /// Queue a plain row for insertion
    pub fn insert(&mut self, store: &dyn Store, table: Table, fields: FieldMap) -> Result<()> {
        let queue = self.queues.entry(table).or_default();
        queue.plain.push(fields);
        if queue.len() >= self.batch_size {
            self.flush_table(store, table)?;
        }
        Ok(())
    }

    /// Queue a container row for insertion ahead of plain rows
    pub fn insert_priority(
        &mut self,
        store: &dyn Store,
        table: Table,
        fields: FieldMap,
    ) -> Result<()> {
        let queue = self.queues.entry(table).or_default();
        queue.priority.push(fields);
        if queue.len() >= self.batch_size {
            self.flush_table(store, table)?;
        }
        Ok(())
    }

    /// Number of rows currently queued across all tables
    pub fn pending(&self) -> usize {
        self.queues.values().map(TableQueue::len).sum()
    }

    /// Flush one table's queue, priority rows first
    pub fn flush_table(&mut self, store: &dyn Store, table: Table) -> Result<()> {
        let Some(queue) = self.queues.get_mut(&table) else {
            return Ok(());
        };
        if queue.len() == 0 {
            return Ok(());
        }
        let priority = std::mem::take(&mut queue.priority);
        let plain = std::mem::take(&mut queue.plain);
        debug!(
            "flushing {} queued rows to {:?} ({} priority)",
            priority.len() + plain.len(),
            table,
            priority.len()
        );
        for fields in priority.iter().chain(plain.iter()) {
            store.insert(table, fields)?;
        }
        Ok(())
    }

    /// Flush every table's queue. Must be called before any read that needs
    /// to observe queued rows, and at session end.
    pub fn flush_all(&mut self, store: &dyn Store) -> Result<()> {
        let tables: Vec<Table> = self.queues.keys().copied().collect();
        for table in tables {
            self.flush_table(store, table)?;
        }
        Ok(())
    }
}

/// Batches row deletions by collecting identifiers and issuing one
/// `_id IN (...)` delete per full batch.
pub struct DeleteBatcher {
    batch_size: usize,
    ids: Vec<i64>,
}

impl DeleteBatcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            ids: Vec::new(),
        }
    }

    /// Queue one row for deletion
    pub fn delete(&mut self, store: &dyn Store, id: i64) -> Result<()> {
        self.ids.push(id);
        if self.ids.len() >= self.batch_size {
            self.flush(store)?;
        }
        Ok(())
    }

    /// Delete all queued rows
    pub fn flush(&mut self, store: &dyn Store) -> Result<()> {
        if self.ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; self.ids.len()].join(", ");
        let predicate = format!("_id IN ({})", placeholders);
        let args: Vec<crate::store::Value> = self
            .ids
            .drain(..)
            .map(crate::store::Value::Integer)
            .collect();
        let deleted = store.delete(Table::Files, Some(&predicate), &args)?;
        debug!("deleted {} stale catalog rows", deleted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn row(path: &str) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("path", path.into());
        fields
    }

    #[test]
    fn test_batcher_defers_until_batch_full() {
        let store = SqliteStore::open_memory().unwrap();
        let mut batcher = WriteBatcher::new(3);

        batcher.insert(&store, Table::Audio, row("/m/a.mp3")).unwrap();
        batcher.insert(&store, Table::Audio, row("/m/b.mp3")).unwrap();
        assert_eq!(store.count(Table::Audio).unwrap(), 0);
        assert_eq!(batcher.pending(), 2);

        batcher.insert(&store, Table::Audio, row("/m/c.mp3")).unwrap();
        assert_eq!(store.count(Table::Audio).unwrap(), 3);
        assert_eq!(batcher.pending(), 0);
    }

    #[test]
    fn test_priority_rows_inserted_first() {
        let store = SqliteStore::open_memory().unwrap();
        let mut batcher = WriteBatcher::new(10);

        batcher.insert(&store, Table::Files, row("/m/child.bin")).unwrap();
        batcher
            .insert_priority(&store, Table::Files, row("/m"))
            .unwrap();
        batcher.flush_all(&store).unwrap();

        let rows = store
            .query(Table::Files, &["path"], None, &[], Some("_id"), None, true)
            .unwrap();
        assert_eq!(rows[0][0].as_str(), Some("/m"));
        assert_eq!(rows[1][0].as_str(), Some("/m/child.bin"));
    }

    #[test]
    fn test_flush_all_drains_every_table() {
        let store = SqliteStore::open_memory().unwrap();
        let mut batcher = WriteBatcher::new(100);

        batcher.insert(&store, Table::Audio, row("/m/a.mp3")).unwrap();
        batcher.insert(&store, Table::Images, row("/p/a.jpg")).unwrap();
        assert_eq!(batcher.pending(), 2);

        batcher.flush_all(&store).unwrap();
        assert_eq!(batcher.pending(), 0);
        assert_eq!(store.count(Table::Audio).unwrap(), 1);
        assert_eq!(store.count(Table::Images).unwrap(), 1);
    }

    #[test]
    fn test_delete_batcher_flushes_in_batches() {
        let store = SqliteStore::open_memory().unwrap();
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(
                store
                    .insert(Table::Files, &row(&format!("/f/{}.bin", i)))
                    .unwrap(),
            );
        }

        let mut deleter = DeleteBatcher::new(2);
        deleter.delete(&store, ids[0]).unwrap();
        assert_eq!(store.count(Table::Files).unwrap(), 5);
        deleter.delete(&store, ids[1]).unwrap();
        assert_eq!(store.count(Table::Files).unwrap(), 3);

        deleter.delete(&store, ids[2]).unwrap();
        deleter.flush(&store).unwrap();
        assert_eq!(store.count(Table::Files).unwrap(), 2);

        let remaining = store
            .query(Table::Files, &["_id"], None, &[], Some("_id"), None, true)
            .unwrap();
        let left: Vec<i64> = remaining.iter().filter_map(|r| r[0].as_i64()).collect();
        assert_eq!(left, vec![ids[3], ids[4]]);
    }
}
