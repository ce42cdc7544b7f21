use std::collections::HashMap;

use rusqlite::{params, OptionalExtension, Row};
use tokio::sync::broadcast;
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{Settings, SnoozedItem};

use super::schema::SCHEMA;

const ACCESS_TOKEN: &str = "access_token";
const USERNAME: &str = "username";
const LAST_SYNCED: &str = "last_synced";

/// Fired after every mutation with the keys that changed: item ids for the
/// snoozed partition, setting names for the scalar partition.
#[derive(Debug, Clone)]
pub struct StoreChange {
    pub keys: Vec<String>,
}

/// Persistent snooze store. The underlying file is synced across devices
/// by the platform (last-writer-wins per key), so reads may be stale and a
/// local write is never assumed to be visible elsewhere yet.
#[derive(Clone)]
pub struct Store {
    conn: Connection,
    changes: broadcast::Sender<StoreChange>,
}

impl Store {
    pub async fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        let (changes, _) = broadcast::channel(16);
        Ok(Self { conn, changes })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn notify(&self, keys: Vec<String>) {
        // Nobody listening is fine.
        let _ = self.changes.send(StoreChange { keys });
    }

    // Snoozed items partition

    pub async fn snoozed_items(&self) -> Result<Vec<SnoozedItem>> {
        let items = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT item_id, url, title, until_timestamp FROM snoozed_items ORDER BY until_timestamp",
                )?;
                let items = stmt
                    .query_map([], |row| Ok(snoozed_from_row(row)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    pub async fn get_snoozed(&self, item_id: &str) -> Result<Option<SnoozedItem>> {
        let item_id = item_id.to_string();
        let item = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT item_id, url, title, until_timestamp FROM snoozed_items WHERE item_id = ?1",
                )?;
                let item = stmt
                    .query_row(params![item_id], |row| Ok(snoozed_from_row(row)))
                    .optional()?;
                Ok(item)
            })
            .await?;
        Ok(item)
    }

    pub async fn upsert_snoozed(&self, item: SnoozedItem) -> Result<()> {
        let key = item.item_id.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO snoozed_items (item_id, url, title, until_timestamp)
                       VALUES (?1, ?2, ?3, ?4)
                       ON CONFLICT(item_id) DO UPDATE SET
                           url = excluded.url,
                           title = excluded.title,
                           until_timestamp = excluded.until_timestamp"#,
                    params![item.item_id, item.url, item.title, item.until_timestamp],
                )?;
                Ok(())
            })
            .await?;
        self.notify(vec![key]);
        Ok(())
    }

    pub async fn remove_snoozed(&self, item_ids: Vec<String>) -> Result<()> {
        if item_ids.is_empty() {
            return Ok(());
        }
        let keys = item_ids.clone();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for item_id in &item_ids {
                    tx.execute("DELETE FROM snoozed_items WHERE item_id = ?1", params![item_id])?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        self.notify(keys);
        Ok(())
    }

    // Scalar settings partition

    async fn get_value(&self, key: &'static str) -> Result<Option<String>> {
        let value = self
            .conn
            .call(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM settings WHERE key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    async fn set_value(&self, key: &'static str, value: String) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
                Ok(())
            })
            .await?;
        self.notify(vec![key.to_string()]);
        Ok(())
    }

    pub async fn access_token(&self) -> Result<Option<String>> {
        self.get_value(ACCESS_TOKEN).await
    }

    pub async fn username(&self) -> Result<Option<String>> {
        self.get_value(USERNAME).await
    }

    pub async fn set_credentials(&self, access_token: &str, username: &str) -> Result<()> {
        let token = access_token.to_string();
        let name = username.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                    params![ACCESS_TOKEN, token],
                )?;
                tx.execute(
                    "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                    params![USERNAME, name],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        self.notify(vec![ACCESS_TOKEN.to_string(), USERNAME.to_string()]);
        Ok(())
    }

    pub async fn clear_access_token(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute("DELETE FROM settings WHERE key = ?1", params![ACCESS_TOKEN])?;
                Ok(())
            })
            .await?;
        self.notify(vec![ACCESS_TOKEN.to_string()]);
        Ok(())
    }

    pub async fn last_synced(&self) -> Result<i64> {
        let value = self.get_value(LAST_SYNCED).await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    pub async fn set_last_synced(&self, timestamp: i64) -> Result<()> {
        self.set_value(LAST_SYNCED, timestamp.to_string()).await
    }

    pub async fn settings(&self) -> Result<Settings> {
        let pairs = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
                let pairs = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<HashMap<String, String>, _>>()?;
                Ok(pairs)
            })
            .await?;
        Ok(Settings::from_pairs(&pairs))
    }

    pub async fn set_settings(&self, settings: &Settings) -> Result<()> {
        let pairs = settings.to_pairs();
        let keys: Vec<String> = pairs.iter().map(|(k, _)| k.to_string()).collect();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (key, value) in &pairs {
                    tx.execute(
                        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                        params![key, value],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        self.notify(keys);
        Ok(())
    }
}

fn snoozed_from_row(row: &Row) -> SnoozedItem {
    SnoozedItem {
        item_id: row.get(0).unwrap(),
        url: row.get(1).unwrap(),
        title: row.get(2).unwrap(),
        until_timestamp: row.get(3).unwrap(),
    }
}
