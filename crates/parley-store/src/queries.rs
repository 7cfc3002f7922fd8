use crate::Database;
use crate::models::NodeRow;
use crate::path::StorePath;
use crate::tree::{get_at, set_at};
use anyhow::{Result, anyhow};
use rusqlite::Connection;
use serde_json::{Map, Value};
use tracing::warn;

// Rows are (parent, key, JSON value). A row never has another row above it
// on its path: writing below a row edits that row's JSON, and writing at or
// above rows replaces them.

impl Database {
    /// The value at `path`, assembled from the row holding it or from the
    /// rows below it. `None` when nothing is stored there.
    pub fn read_tree(&self, path: &StorePath) -> Result<Option<Value>> {
        self.with_conn(|conn| read(conn, path))
    }

    /// Replace the value at `path`. `null` deletes it and everything below.
    pub fn write_tree(&self, path: &StorePath, value: &Value) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            write(&tx, path, value)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Shallow-merge `fields` into the value at `path`. A `null` field is
    /// removed; a value left empty disappears.
    pub fn merge_tree(&self, path: &StorePath, fields: &Map<String, Value>) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            for (field, value) in fields {
                let child = path
                    .child(field)
                    .map_err(|e| anyhow!("merge into {} failed: {}", path, e))?;
                write(&tx, &child, value)?;
            }
            tx.commit()?;
            Ok(())
        })
    }
}

fn read(conn: &Connection, path: &StorePath) -> Result<Option<Value>> {
    if let Some((depth, stored)) = holding_row(conn, path)? {
        return Ok(get_at(stored, &path.segments()[depth..]));
    }

    let rows = rows_below(conn, path)?;
    if rows.is_empty() {
        return Ok(None);
    }

    let base = path.segments().len();
    let mut root = Value::Null;
    for row in rows {
        let value = match serde_json::from_str::<Value>(&row.value) {
            Ok(value) => value,
            Err(e) => {
                warn!("Corrupt value at '{}/{}': {}", row.parent, row.key, e);
                continue;
            }
        };

        let mut relative: Vec<&str> = split(&row.parent).skip(base).collect();
        relative.push(&row.key);
        set_at(&mut root, &relative, value);
    }

    Ok(Some(root).filter(|v| !v.is_null()))
}

fn write(conn: &Connection, path: &StorePath, value: &Value) -> Result<()> {
    let segments = path.segments();
    if segments.is_empty() {
        return Err(anyhow!("cannot write the root"));
    }

    // Inside an existing row: edit its JSON in place
    if let Some((depth, mut stored)) = holding_row(conn, path)? {
        if depth < segments.len() {
            set_at(&mut stored, &segments[depth..], value.clone());
            let (parent, key) = row_address(&segments[..depth]);
            if stored.is_null() {
                delete_row(conn, &parent, key)?;
            } else {
                upsert_row(conn, &parent, key, &stored.to_string())?;
            }
            return Ok(());
        }
    }

    let (parent, key) = row_address(segments);
    delete_row(conn, &parent, key)?;
    delete_below(conn, path)?;
    if !value.is_null() {
        upsert_row(conn, &parent, key, &value.to_string())?;
    }
    Ok(())
}

/// The row at `path` or at one of its ancestors, with its depth in segments
/// and parsed value.
fn holding_row(conn: &Connection, path: &StorePath) -> Result<Option<(usize, Value)>> {
    let segments = path.segments();
    for depth in 1..=segments.len() {
        let (parent, key) = row_address(&segments[..depth]);
        if let Some(row) = query_node(conn, &parent, key)? {
            let value = serde_json::from_str::<Value>(&row.value)
                .map_err(|e| anyhow!("corrupt value at '{}/{}': {}", parent, key, e))?;
            return Ok(Some((depth, value)));
        }
    }
    Ok(None)
}

fn row_address(segments: &[String]) -> (String, &str) {
    match segments.split_last() {
        Some((key, parent)) => (parent.join("/"), key.as_str()),
        None => (String::new(), ""),
    }
}

fn split(parent: &str) -> impl Iterator<Item = &str> {
    parent.split('/').filter(|s| !s.is_empty())
}

fn upsert_row(conn: &Connection, parent: &str, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO nodes (parent, key, value) VALUES (?1, ?2, ?3)
         ON CONFLICT(parent, key) DO UPDATE
         SET value = excluded.value, updated_at = datetime('now')",
        (parent, key, value),
    )
    .map_err(|e| anyhow!("write {}/{} failed: {}", parent, key, e))?;
    Ok(())
}

fn delete_row(conn: &Connection, parent: &str, key: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM nodes WHERE parent = ?1 AND key = ?2",
        (parent, key),
    )?;
    Ok(())
}

/// Bounds of the parents strictly below `path`: `p` itself and every
/// `p/...`. '0' is the byte after '/', so `p/` <= x < `p0` is the subtree.
fn subtree_bounds(path: &StorePath) -> (String, String, String) {
    let p = path.to_string();
    (p.clone(), format!("{p}/"), format!("{p}0"))
}

fn delete_below(conn: &Connection, path: &StorePath) -> Result<()> {
    if path.is_root() {
        conn.execute("DELETE FROM nodes", ())?;
        return Ok(());
    }

    let (p, lo, hi) = subtree_bounds(path);
    conn.execute(
        "DELETE FROM nodes WHERE parent = ?1 OR (parent >= ?2 AND parent < ?3)",
        (p, lo, hi),
    )?;
    Ok(())
}

fn rows_below(conn: &Connection, path: &StorePath) -> Result<Vec<NodeRow>> {
    // BINARY collation orders push ids by creation time
    let rows = if path.is_root() {
        let mut stmt = conn.prepare(
            "SELECT parent, key, value FROM nodes
             ORDER BY parent COLLATE BINARY, key COLLATE BINARY",
        )?;
        stmt.query_map([], node_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?
    } else {
        let (p, lo, hi) = subtree_bounds(path);
        let mut stmt = conn.prepare(
            "SELECT parent, key, value FROM nodes
             WHERE parent = ?1 OR (parent >= ?2 AND parent < ?3)
             ORDER BY parent COLLATE BINARY, key COLLATE BINARY",
        )?;
        stmt.query_map((p, lo, hi), node_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?
    };

    Ok(rows)
}

fn query_node(conn: &Connection, parent: &str, key: &str) -> Result<Option<NodeRow>> {
    let mut stmt =
        conn.prepare("SELECT parent, key, value FROM nodes WHERE parent = ?1 AND key = ?2")?;

    let row = stmt.query_row((parent, key), node_row).optional()?;
    Ok(row)
}

fn node_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeRow> {
    Ok(NodeRow {
        parent: row.get(0)?,
        key: row.get(1)?,
        value: row.get(2)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
