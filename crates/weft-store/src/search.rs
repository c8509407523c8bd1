//! Full-text search over model metadata.

use crate::error::Result;
use crate::Store;

/// One search result, ranked by relevance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub path: String,
    pub name: String,
    pub description: Option<String>,
}

impl Store {
    /// Searches `(name, path, description, sql_content)` with
    /// prefix-capable matching, ranked by bm25 relevance.
    pub fn search_models(&self, query: &str) -> Result<Vec<SearchHit>> {
        let match_expr = build_match_expr(query);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.path, m.name, m.description \
                 FROM models_fts f JOIN models m ON m.id = f.rowid \
                 WHERE models_fts MATCH ?1 ORDER BY bm25(models_fts)",
            )?;
            let hits = stmt
                .query_map([match_expr], |row| {
                    Ok(SearchHit {
                        path: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<_, _>>()?;
            Ok(hits)
        })
    }
}

/// Builds an FTS5 match expression: each token quoted (so user input
/// cannot inject FTS syntax) and suffixed with `*` for prefix search.
fn build_match_expr(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("\"{}\"*", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}
