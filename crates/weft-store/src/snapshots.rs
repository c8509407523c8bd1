//! Post-run column snapshots, used by schema-drift analysis.

use crate::error::Result;
use crate::types::SnapshotColumn;
use crate::Store;
use chrono::Utc;
use rusqlite::params;

impl Store {
    /// Records the columns a model observed from one source table
    /// during a successful run, then prunes snapshots beyond the
    /// retention policy. Insert-only apart from pruning.
    pub fn save_snapshot(
        &self,
        model_path: &str,
        source_table: &str,
        columns: &[String],
        run_id: i64,
    ) -> Result<()> {
        let retention = self.snapshot_retention();
        self.write(|tx| {
            let now = Utc::now();
            let mut insert = tx.prepare(
                "INSERT INTO column_snapshots (model_path, source_table, column_name, \
                 column_index, run_id, snapshot_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (index, column) in columns.iter().enumerate() {
                insert.execute(params![
                    model_path,
                    source_table,
                    column,
                    index as i64,
                    run_id,
                    now,
                ])?;
            }
            // Keep only the N most recent runs per source table.
            tx.execute(
                "DELETE FROM column_snapshots WHERE source_table = ?1 AND run_id NOT IN ( \
                 SELECT DISTINCT run_id FROM column_snapshots WHERE source_table = ?1 \
                 ORDER BY run_id DESC LIMIT ?2)",
                params![source_table, retention as i64],
            )?;
            Ok(())
        })
    }

    /// The latest snapshot for a source table, in column order.
    pub fn latest_snapshot(&self, source_table: &str) -> Result<Vec<SnapshotColumn>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT model_path, source_table, column_name, column_index, run_id, \
                 snapshot_at FROM column_snapshots WHERE source_table = ?1 AND run_id = ( \
                 SELECT MAX(run_id) FROM column_snapshots WHERE source_table = ?1) \
                 ORDER BY column_index",
            )?;
            let columns = stmt
                .query_map([source_table], |row| {
                    Ok(SnapshotColumn {
                        model_path: row.get(0)?,
                        source_table: row.get(1)?,
                        column_name: row.get(2)?,
                        column_index: row.get(3)?,
                        run_id: row.get(4)?,
                        snapshot_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<_, _>>()?;
            Ok(columns)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn latest_snapshot_tracks_most_recent_run() {
        let store = Store::open_in_memory().unwrap();
        store
            .save_snapshot("m", "raw.users", &cols(&["id", "name"]), 1)
            .unwrap();
        store
            .save_snapshot("m", "raw.users", &cols(&["id", "name", "email"]), 2)
            .unwrap();

        let latest = store.latest_snapshot("raw.users").unwrap();
        assert_eq!(latest.len(), 3);
        assert!(latest.iter().all(|c| c.run_id == 2));
        assert_eq!(latest[2].column_name, "email");
        assert_eq!(latest[2].column_index, 2);
    }

    #[test]
    fn retention_keeps_only_recent_runs() {
        let store = Store::open_in_memory().unwrap().with_snapshot_retention(2);
        for run in 1..=4 {
            store
                .save_snapshot("m", "raw.users", &cols(&["id"]), run)
                .unwrap();
        }
        let all_runs: Vec<i64> = {
            // Latest snapshot still resolves, and only two runs remain.
            let latest = store.latest_snapshot("raw.users").unwrap();
            assert_eq!(latest[0].run_id, 4);
            store
                .read(|conn| {
                    let mut stmt = conn.prepare(
                        "SELECT DISTINCT run_id FROM column_snapshots \
                         WHERE source_table = 'raw.users' ORDER BY run_id",
                    )?;
                    let runs = stmt
                        .query_map([], |row| row.get(0))?
                        .collect::<std::result::Result<_, _>>()?;
                    Ok(runs)
                })
                .unwrap()
        };
        assert_eq!(all_runs, vec![3, 4]);
    }

    #[test]
    fn missing_table_has_empty_snapshot() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.latest_snapshot("raw.unknown").unwrap().is_empty());
    }
}
