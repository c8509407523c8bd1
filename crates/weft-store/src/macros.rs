//! Macro namespace and function persistence.

use crate::error::{Result, StoreError};
use crate::{from_json, to_json, Store};
use rusqlite::{params, Connection};
use weft_core::macros::{MacroFunction, MacroNamespace};

impl Store {
    /// Saves a namespace and transactionally replaces its function set.
    pub fn save_macro_namespace(&self, namespace: &MacroNamespace) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO macro_namespaces (name, file_path, package) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(name) DO UPDATE SET file_path = ?2, package = ?3",
                params![namespace.name, namespace.file_path, namespace.package],
            )?;
            tx.execute(
                "DELETE FROM macro_functions WHERE namespace = ?1",
                [&namespace.name],
            )?;
            let mut insert = tx.prepare(
                "INSERT INTO macro_functions (namespace, name, args, docstring, line) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for function in &namespace.functions {
                insert.execute(params![
                    namespace.name,
                    function.name,
                    to_json(&function.args),
                    function.docstring,
                    function.line,
                ])?;
            }
            Ok(())
        })
    }

    pub fn get_macro_namespace(&self, name: &str) -> Result<MacroNamespace> {
        self.read(|conn| {
            let mut stmt = conn
                .prepare("SELECT name, file_path, package FROM macro_namespaces WHERE name = ?1")?;
            let mut rows = stmt.query_map([name], |row| {
                Ok(MacroNamespace {
                    name: row.get(0)?,
                    file_path: row.get(1)?,
                    package: row.get(2)?,
                    functions: Vec::new(),
                })
            })?;
            let mut namespace = match rows.next() {
                Some(row) => row?,
                None => return Err(StoreError::not_found("macro namespace", name)),
            };
            namespace.functions = functions_of(conn, name)?;
            Ok(namespace)
        })
    }

    pub fn list_macro_namespaces(&self) -> Result<Vec<MacroNamespace>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, file_path, package FROM macro_namespaces ORDER BY name",
            )?;
            let mut namespaces: Vec<MacroNamespace> = stmt
                .query_map([], |row| {
                    Ok(MacroNamespace {
                        name: row.get(0)?,
                        file_path: row.get(1)?,
                        package: row.get(2)?,
                        functions: Vec::new(),
                    })
                })?
                .collect::<std::result::Result<_, _>>()?;
            for namespace in &mut namespaces {
                namespace.functions = functions_of(conn, &namespace.name)?;
            }
            Ok(namespaces)
        })
    }

    pub fn get_macro_function(&self, namespace: &str, name: &str) -> Result<MacroFunction> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, args, docstring, line FROM macro_functions \
                 WHERE namespace = ?1 AND name = ?2",
            )?;
            let mut rows = stmt.query_map(params![namespace, name], row_to_function)?;
            match rows.next() {
                Some(row) => Ok(row?),
                None => Err(StoreError::not_found(
                    "macro function",
                    format!("{namespace}.{name}"),
                )),
            }
        })
    }

    pub fn macro_function_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        self.read(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM macro_functions WHERE namespace = ?1 AND name = ?2",
                params![namespace, name],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Functions of a namespace whose name starts with `prefix`.
    pub fn search_macro_functions(
        &self,
        namespace: &str,
        prefix: &str,
    ) -> Result<Vec<MacroFunction>> {
        self.read(|conn| {
            let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
            let mut stmt = conn.prepare(
                "SELECT name, args, docstring, line FROM macro_functions \
                 WHERE namespace = ?1 AND name LIKE ?2 ESCAPE '\\' ORDER BY name",
            )?;
            let functions = stmt
                .query_map(params![namespace, pattern], row_to_function)?
                .collect::<std::result::Result<_, _>>()?;
            Ok(functions)
        })
    }

    /// Deletes a namespace; its functions cascade.
    pub fn delete_macro_namespace(&self, name: &str) -> Result<()> {
        self.write(|tx| {
            tx.execute("DELETE FROM macro_namespaces WHERE name = ?1", [name])?;
            Ok(())
        })
    }
}

fn functions_of(conn: &Connection, namespace: &str) -> Result<Vec<MacroFunction>> {
    let mut stmt = conn.prepare(
        "SELECT name, args, docstring, line FROM macro_functions \
         WHERE namespace = ?1 ORDER BY line",
    )?;
    let functions = stmt
        .query_map([namespace], row_to_function)?
        .collect::<std::result::Result<_, _>>()?;
    Ok(functions)
}

fn row_to_function(row: &rusqlite::Row<'_>) -> rusqlite::Result<MacroFunction> {
    let args_raw: String = row.get(1)?;
    Ok(MacroFunction {
        name: row.get(0)?,
        args: from_json(&args_raw),
        docstring: row.get(2)?,
        line: row.get(3)?,
    })
}
