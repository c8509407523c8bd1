//! File content hashes for incremental discovery.

use crate::error::Result;
use crate::Store;
use chrono::Utc;
use rusqlite::params;

impl Store {
    pub fn get_file_hash(&self, file_path: &str) -> Result<Option<String>> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT hash FROM file_hashes WHERE file_path = ?1")?;
            let mut rows = stmt.query_map([file_path], |row| row.get::<_, String>(0))?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
    }

    pub fn set_file_hash(&self, file_path: &str, hash: &str) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO file_hashes (file_path, hash, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(file_path) DO UPDATE SET hash = ?2, updated_at = ?3",
                params![file_path, hash, Utc::now()],
            )?;
            Ok(())
        })
    }

    pub fn delete_file_hash(&self, file_path: &str) -> Result<()> {
        self.write(|tx| {
            tx.execute("DELETE FROM file_hashes WHERE file_path = ?1", [file_path])?;
            Ok(())
        })
    }

    /// Every tracked file path; discovery diffs this against the
    /// filesystem to detect deletions.
    pub fn list_tracked_files(&self) -> Result<Vec<String>> {
        self.read(|conn| {
            let mut stmt =
                conn.prepare("SELECT file_path FROM file_hashes ORDER BY file_path")?;
            let paths = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<_, _>>()?;
            Ok(paths)
        })
    }
}
