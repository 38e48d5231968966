//! Cache of shared, non-user-editable configuration
//!
//! Entries arrive through the one-way global pull and overwrite the cache
//! wholesale. They are never versioned, never conflict-resolved, and never
//! enter the outbox.

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::GlobalEntry;

/// Replace the whole cache with the server's snapshot
pub(crate) fn replace(
    conn: &mut Connection,
    entries: &[GlobalEntry],
    fetched_at: i64,
) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM global_config", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO global_config (key, value, fetched_at) VALUES (?1, ?2, ?3)",
        )?;
        for entry in entries {
            stmt.execute(params![entry.key, entry.value.to_string(), fetched_at])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub(crate) fn get(conn: &Connection, key: &str) -> Result<Option<GlobalEntry>> {
    let entry = conn
        .query_row(
            "SELECT key, value FROM global_config WHERE key = ?",
            [key],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}

pub(crate) fn list(conn: &Connection) -> Result<Vec<GlobalEntry>> {
    let mut stmt = conn.prepare("SELECT key, value FROM global_config ORDER BY key")?;
    let rows = stmt.query_map([], entry_from_row)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GlobalEntry> {
    let value: String = row.get(1)?;
    let value = serde_json::from_str(&value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(GlobalEntry {
        key: row.get(0)?,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn setup() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        migrations::run(&mut conn).unwrap();
        conn
    }

    fn entry(key: &str, value: serde_json::Value) -> GlobalEntry {
        GlobalEntry {
            key: key.to_string(),
            value,
        }
    }

    #[test]
    fn test_replace_and_read_back() {
        let mut conn = setup();
        replace(
            &mut conn,
            &[
                entry("currencies", json!(["PHP", "USD"])),
                entry("app_minimum_version", json!("1.4.0")),
            ],
            100,
        )
        .unwrap();

        let all = list(&conn).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].key, "app_minimum_version");

        let currencies = get(&conn, "currencies").unwrap().unwrap();
        assert_eq!(currencies.value, json!(["PHP", "USD"]));
        assert_eq!(get(&conn, "missing").unwrap(), None);
    }

    #[test]
    fn test_replace_drops_stale_keys() {
        let mut conn = setup();
        replace(
            &mut conn,
            &[
                entry("currencies", json!(["PHP"])),
                entry("app_minimum_version", json!("1.4.0")),
            ],
            100,
        )
        .unwrap();

        replace(&mut conn, &[entry("currencies", json!(["PHP", "EUR"]))], 200).unwrap();

        let all = list(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, json!(["PHP", "EUR"]));
        assert_eq!(get(&conn, "app_minimum_version").unwrap(), None);
    }
}
