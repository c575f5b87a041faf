use futures::future::{BoxFuture, FutureExt};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::fs;
use std::path::Path;

use super::library::Item;
use crate::error::{Error, Result};

/// Progress values are reported on a fixed 0..=1000 scale.
pub const PROGRESS_SCALE: u32 = 1000;

/// Persistent item records. Safe to call from worker tasks.
pub trait Storage: Send + Sync {
    fn progress<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<u32>>;
    fn update_item<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<()>>;
}

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// A private database that lives as long as the returned storage.
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database, so pin one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let storage = SqliteStorage { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS items (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                name        TEXT NOT NULL,
                cover_path  TEXT,
                thumb_path  TEXT,
                sort_order  INTEGER NOT NULL DEFAULT 0,
                position_ms INTEGER NOT NULL DEFAULT 0,
                duration_ms INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All items in display order.
    pub async fn items(&self) -> Result<Vec<Item>> {
        let rows = sqlx::query_as::<_, (i64, String, Option<String>, Option<String>)>(
            "SELECT id, name, cover_path, thumb_path FROM items ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, cover_path, thumb_path)| Item {
                id,
                name,
                cover_path,
                thumb_path,
            })
            .collect())
    }

    pub async fn add(&self, name: &str, duration_ms: i64) -> Result<Item> {
        let result = sqlx::query(
            "INSERT INTO items (name, duration_ms, sort_order)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(sort_order), -1) + 1 FROM items))",
        )
        .bind(name)
        .bind(duration_ms.max(0))
        .execute(&self.pool)
        .await?;

        Ok(Item::new(result.last_insert_rowid(), name))
    }

    pub async fn set_position(&self, id: i64, position_ms: i64) -> Result<()> {
        let result = sqlx::query("UPDATE items SET position_ms = ?1 WHERE id = ?2")
            .bind(position_ms.max(0))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::UnknownItem(id));
        }
        Ok(())
    }

    async fn load_progress(&self, id: i64) -> Result<u32> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            "SELECT position_ms, duration_ms FROM items WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let (position_ms, duration_ms) = row.ok_or(Error::UnknownItem(id))?;
        Ok(scaled_progress(position_ms, duration_ms))
    }

    async fn store_item(&self, item: &Item) -> Result<()> {
        sqlx::query("UPDATE items SET name = ?1, cover_path = ?2, thumb_path = ?3 WHERE id = ?4")
            .bind(item.name.as_str())
            .bind(item.cover_path.as_deref())
            .bind(item.thumb_path.as_deref())
            .bind(item.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl Storage for SqliteStorage {
    fn progress<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<u32>> {
        self.load_progress(item.id).boxed()
    }

    fn update_item<'a>(&'a self, item: &'a Item) -> BoxFuture<'a, Result<()>> {
        self.store_item(item).boxed()
    }
}

fn scaled_progress(position_ms: i64, duration_ms: i64) -> u32 {
    if duration_ms <= 0 {
        return 0;
    }
    let position = position_ms.clamp(0, duration_ms) as i128;
    (position * PROGRESS_SCALE as i128 / duration_ms as i128) as u32
}
