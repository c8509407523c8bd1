//! Warehouse driver seam.
//!
//! The engine composes materialization SQL and hands statements to a
//! [`WarehouseDriver`]. Production deployments plug network drivers in
//! behind this trait; the built-in [`SqliteDriver`] materializes into
//! an embedded database for local targets and tests.

use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("warehouse statement failed: {0}")]
    Execution(String),
    #[error("bulk load failed for `{table}`: {message}")]
    BulkLoad { table: String, message: String },
}

/// Executes SQL statements and bulk-loads seed data against the
/// target warehouse.
pub trait WarehouseDriver: Send + Sync {
    /// Executes one statement and returns the affected row count when
    /// the warehouse reports one.
    fn execute(&self, sql: &str) -> Result<u64, DriverError>;

    /// Whether a relation with this name exists.
    fn table_exists(&self, name: &str) -> Result<bool, DriverError>;

    /// Creates `table` with `headers` as TEXT columns and appends
    /// every row. Used for seeds.
    fn create_table_from_csv(
        &self,
        table: &str,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> Result<u64, DriverError>;

    /// Renders a qualified relation name for this warehouse.
    fn qualify(&self, schema: Option<&str>, name: &str) -> String {
        match schema {
            Some(schema) if !schema.is_empty() => format!("{schema}.{name}"),
            _ => name.to_string(),
        }
    }
}

/// Embedded SQLite warehouse for local targets.
pub struct SqliteDriver {
    conn: Mutex<Connection>,
}

impl SqliteDriver {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|err| DriverError::Execution(err.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, DriverError> {
        let conn = Connection::open_in_memory()
            .map_err(|err| DriverError::Execution(err.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs a scalar query; test helper.
    pub fn query_scalar(&self, sql: &str) -> Result<i64, DriverError> {
        let conn = self.conn.lock().expect("driver lock poisoned");
        conn.query_row(sql, [], |row| row.get(0))
            .map_err(|err| DriverError::Execution(err.to_string()))
    }
}

impl WarehouseDriver for SqliteDriver {
    fn execute(&self, sql: &str) -> Result<u64, DriverError> {
        let conn = self.conn.lock().expect("driver lock poisoned");
        match conn.execute(sql, []) {
            Ok(rows) => Ok(rows as u64),
            // CREATE VIEW / CREATE TABLE AS report no row count through
            // `execute`; fall back to a batch run.
            Err(rusqlite::Error::ExecuteReturnedResults) => {
                conn.execute_batch(sql)
                    .map_err(|err| DriverError::Execution(err.to_string()))?;
                Ok(0)
            }
            Err(err) => Err(DriverError::Execution(err.to_string())),
        }
    }

    fn table_exists(&self, name: &str) -> Result<bool, DriverError> {
        let conn = self.conn.lock().expect("driver lock poisoned");
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = ?1 \
                 AND type IN ('table', 'view')",
                [name],
                |row| row.get(0),
            )
            .map_err(|err| DriverError::Execution(err.to_string()))?;
        Ok(count > 0)
    }

    fn create_table_from_csv(
        &self,
        table: &str,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> Result<u64, DriverError> {
        let mut conn = self.conn.lock().expect("driver lock poisoned");
        let tx = conn.transaction().map_err(|err| DriverError::BulkLoad {
            table: table.to_string(),
            message: err.to_string(),
        })?;
        let result = (|| -> rusqlite::Result<u64> {
            tx.execute(&format!("DROP TABLE IF EXISTS \"{table}\""), [])?;
            let column_list = headers
                .iter()
                .map(|h| format!("\"{h}\" TEXT"))
                .collect::<Vec<_>>()
                .join(", ");
            tx.execute(&format!("CREATE TABLE \"{table}\" ({column_list})"), [])?;
            let placeholders = (1..=headers.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let mut insert =
                tx.prepare(&format!("INSERT INTO \"{table}\" VALUES ({placeholders})"))?;
            let mut loaded = 0u64;
            for row in rows {
                insert.execute(rusqlite::params_from_iter(row.iter()))?;
                loaded += 1;
            }
            drop(insert);
            Ok(loaded)
        })();
        match result {
            Ok(loaded) => {
                tx.commit().map_err(|err| DriverError::BulkLoad {
                    table: table.to_string(),
                    message: err.to_string(),
                })?;
                Ok(loaded)
            }
            Err(err) => Err(DriverError::BulkLoad {
                table: table.to_string(),
                message: err.to_string(),
            }),
        }
    }

    fn qualify(&self, _schema: Option<&str>, name: &str) -> String {
        // SQLite has no schemas: the dotted model path becomes the
        // (quoted) relation name, so cross-folder references written
        // as `"staging.users"` resolve.
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_reports_rows_affected() {
        let driver = SqliteDriver::open_in_memory().unwrap();
        driver.execute("CREATE TABLE t (x INTEGER)").unwrap();
        driver
            .execute("INSERT INTO t VALUES (1), (2), (3)")
            .map(|rows| assert_eq!(rows, 3))
            .unwrap();
        assert!(driver.table_exists("t").unwrap());
        assert!(!driver.table_exists("missing").unwrap());
    }

    #[test]
    fn create_table_as_select_works() {
        let driver = SqliteDriver::open_in_memory().unwrap();
        driver.execute("CREATE TABLE src (x INTEGER)").unwrap();
        driver.execute("INSERT INTO src VALUES (1), (2)").unwrap();
        driver
            .execute("CREATE TABLE dst AS SELECT x FROM src")
            .unwrap();
        assert_eq!(driver.query_scalar("SELECT COUNT(*) FROM dst").unwrap(), 2);
    }

    #[test]
    fn csv_bulk_load_round_trips() {
        let driver = SqliteDriver::open_in_memory().unwrap();
        let headers = vec!["id".to_string(), "name".to_string()];
        let rows = vec![
            vec!["1".to_string(), "ada".to_string()],
            vec!["2".to_string(), "grace".to_string()],
        ];
        let loaded = driver
            .create_table_from_csv("people", &headers, &rows)
            .unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(
            driver.query_scalar("SELECT COUNT(*) FROM people").unwrap(),
            2
        );
    }

    #[test]
    fn qualify_keeps_the_dotted_model_path() {
        let driver = SqliteDriver::open_in_memory().unwrap();
        assert_eq!(
            driver.qualify(Some("analytics"), "staging.users"),
            "staging.users"
        );
    }

    #[test]
    fn failed_statement_is_an_execution_error() {
        let driver = SqliteDriver::open_in_memory().unwrap();
        assert!(matches!(
            driver.execute("SELECT FROM nope").unwrap_err(),
            DriverError::Execution(_)
        ));
    }
}
