use anyhow::{anyhow, Context};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::model::{Snapshot, SNAPSHOT_VERSION};

pub const DB_FILE_NAME: &str = "reportcard.sqlite3";

pub type SettingsMap = serde_json::Map<String, serde_json::Value>;

/// Load/save boundary for the whole-collection document.
pub trait SnapshotStore {
    fn load(&self) -> anyhow::Result<Option<Snapshot>>;
    fn save(&mut self, snapshot: &Snapshot) -> anyhow::Result<()>;
    /// Replaces the snapshot and, when given, every setting. Either both
    /// land or neither does.
    fn restore(
        &mut self,
        snapshot: &Snapshot,
        settings: Option<&SettingsMap>,
    ) -> anyhow::Result<()>;
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS snapshot(
            id INTEGER PRIMARY KEY CHECK (id = 1),
            format_version INTEGER NOT NULL,
            revision INTEGER NOT NULL,
            body TEXT NOT NULL,
            body_sha256 TEXT NOT NULL,
            saved_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: open_db(workspace)?,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn revision(&self) -> anyhow::Result<i64> {
        let rev: Option<i64> = self
            .conn
            .query_row("SELECT revision FROM snapshot WHERE id = 1", [], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(rev.unwrap_or(0))
    }
}

impl SnapshotStore for SqliteStore {
    fn load(&self) -> anyhow::Result<Option<Snapshot>> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT body, body_sha256 FROM snapshot WHERE id = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .context("failed to read snapshot row")?;
        let Some((body, checksum)) = row else {
            return Ok(None);
        };
        if sha256_hex(body.as_bytes()) != checksum {
            return Err(anyhow!("corrupt snapshot: checksum mismatch"));
        }
        let snapshot: Snapshot =
            serde_json::from_str(&body).context("corrupt snapshot: invalid JSON")?;
        Ok(Some(snapshot.upgrade()?))
    }

    fn save(&mut self, snapshot: &Snapshot) -> anyhow::Result<()> {
        write_snapshot(&self.conn, snapshot)
    }

    fn restore(
        &mut self,
        snapshot: &Snapshot,
        settings: Option<&SettingsMap>,
    ) -> anyhow::Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("failed to start restore transaction")?;
        if let Some(settings) = settings {
            settings_replace_all(&tx, settings)?;
        }
        write_snapshot(&tx, snapshot)?;
        tx.commit().context("failed to commit restore")?;
        Ok(())
    }
}

fn write_snapshot(conn: &Connection, snapshot: &Snapshot) -> anyhow::Result<()> {
    let body = serde_json::to_string(snapshot).context("failed to serialize snapshot")?;
    let checksum = sha256_hex(body.as_bytes());
    let saved_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    conn.execute(
        "INSERT INTO snapshot(id, format_version, revision, body, body_sha256, saved_at)
         VALUES(1, ?, 1, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           format_version = excluded.format_version,
           revision = snapshot.revision + 1,
           body = excluded.body,
           body_sha256 = excluded.body_sha256,
           saved_at = excluded.saved_at",
        (SNAPSHOT_VERSION, &body, &checksum, &saved_at),
    )
    .context("failed to write snapshot row")?;
    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => {
            let value = serde_json::from_str(&text)
                .with_context(|| format!("setting {} is invalid JSON", key))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn settings_all(conn: &Connection) -> anyhow::Result<SettingsMap> {
    let mut stmt = conn.prepare("SELECT key, value_json FROM settings ORDER BY key")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    let mut out = SettingsMap::new();
    for (key, text) in rows {
        let value: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("setting {} is invalid JSON", key))?;
        out.insert(key, value);
    }
    Ok(out)
}

/// Not atomic on its own; run it inside a transaction.
pub fn settings_replace_all(conn: &Connection, values: &SettingsMap) -> anyhow::Result<()> {
    conn.execute("DELETE FROM settings", [])?;
    for (key, value) in values {
        settings_set_json(conn, key, value)?;
    }
    Ok(())
}

/// In-memory store for tests; counts saves.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    pub saved: Option<Snapshot>,
    pub settings: SettingsMap,
    pub saves: usize,
    pub fail_saves: bool,
}

#[cfg(test)]
impl SnapshotStore for MemoryStore {
    fn load(&self) -> anyhow::Result<Option<Snapshot>> {
        Ok(self.saved.clone())
    }

    fn save(&mut self, snapshot: &Snapshot) -> anyhow::Result<()> {
        if self.fail_saves {
            return Err(anyhow!("save refused"));
        }
        self.saved = Some(snapshot.clone());
        self.saves += 1;
        Ok(())
    }

    fn restore(
        &mut self,
        snapshot: &Snapshot,
        settings: Option<&SettingsMap>,
    ) -> anyhow::Result<()> {
        self.save(snapshot)?;
        if let Some(settings) = settings {
            self.settings = settings.clone();
        }
        Ok(())
    }
}
