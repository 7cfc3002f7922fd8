use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- One row per keyed child. `parent` is the collection path
        -- (e.g. 'messages/u1_u2'), `key` the child key, `value` its JSON.
        CREATE TABLE IF NOT EXISTS nodes (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            parent      TEXT NOT NULL,
            key         TEXT NOT NULL,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(parent, key)
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_parent
            ON nodes(parent, key);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
