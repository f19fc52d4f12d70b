//! SQLite watchlist storage.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use stockwatch_core::{StoreError, Ticker, WatchEntry, WatchlistStore};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Corrupt row for user {user}: {reason}")]
    Corrupt { user: String, reason: String },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match &err {
            DbError::Sqlx(e) => StoreError::Backend(e.to_string()),
            DbError::Corrupt { .. } => StoreError::Corrupt(err.to_string()),
        }
    }
}

/// Database connection holding users' watchlists.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite database at the given URL, creating it if needed.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), DbError> {
        // Targets are stored as decimal text so they round-trip exactly.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_stocks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                stock_code TEXT NOT NULL,
                target_price TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(username, stock_code)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_user_stocks_username
            ON user_stocks(username)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Watchlist of a user in insertion order.
    pub async fn load_watchlist(&self, username: &str) -> Result<Vec<WatchEntry>, DbError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT stock_code, target_price FROM user_stocks WHERE username = ? ORDER BY id",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(code, target)| {
                let corrupt = |reason: String| DbError::Corrupt {
                    user: username.to_string(),
                    reason,
                };
                let ticker = Ticker::parse(&code).map_err(|e| corrupt(e.to_string()))?;
                let target_price = Decimal::from_str(&target)
                    .map_err(|e| corrupt(format!("{code}: target {target:?}: {e}")))?;
                Ok(WatchEntry {
                    ticker,
                    target_price,
                })
            })
            .collect()
    }

    /// Replace a user's watchlist atomically.
    pub async fn save_watchlist(
        &self,
        username: &str,
        entries: &[WatchEntry],
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_stocks WHERE username = ?")
            .bind(username)
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            sqlx::query(
                "INSERT INTO user_stocks (username, stock_code, target_price) VALUES (?, ?, ?)",
            )
            .bind(username)
            .bind(entry.ticker.as_str())
            .bind(entry.target_price.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(user = username, entries = entries.len(), "Watchlist saved");
        Ok(())
    }
}

#[async_trait]
impl WatchlistStore for Database {
    async fn load(&self, user_key: &str) -> Result<Vec<WatchEntry>, StoreError> {
        Ok(self.load_watchlist(user_key).await?)
    }

    async fn save(&self, user_key: &str, entries: &[WatchEntry]) -> Result<(), StoreError> {
        Ok(self.save_watchlist(user_key, entries).await?)
    }
}
