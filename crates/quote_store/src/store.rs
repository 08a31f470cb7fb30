use async_trait::async_trait;
use deadline::RaceError;
use log::{debug, info};
use quote_model::{Quote, StoredQuote};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://cotacoes.db";
pub const DEFAULT_SAVE_BUDGET: Duration = Duration::from_millis(10);

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS cotacoes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL,
    codein TEXT NOT NULL,
    name TEXT NOT NULL,
    high TEXT NOT NULL,
    low TEXT NOT NULL,
    var_bid TEXT NOT NULL,
    pct_change TEXT NOT NULL,
    bid TEXT NOT NULL,
    ask TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    create_date TEXT NOT NULL
)";

const DROP_TABLE: &str = "DROP TABLE IF EXISTS cotacoes";

const INSERT_QUOTE: &str = "INSERT INTO cotacoes
    (code, codein, name, high, low, var_bid, pct_change, bid, ask, timestamp, create_date)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const SELECT_QUOTES: &str = "SELECT id, code, codein, name, high, low, var_bid, pct_change, bid, ask, timestamp, create_date
    FROM cotacoes ORDER BY id";

const TABLE_EXISTS: &str = "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'cotacoes'";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not open database: {0}")]
    Open(sqlx::Error),
    #[error("could not ensure schema: {0}")]
    Schema(sqlx::Error),
    #[error("could not insert quote: {0}")]
    Insert(sqlx::Error),
    #[error("transaction failed: {0}")]
    Transaction(sqlx::Error),
    #[error("could not drop table: {0}")]
    Reset(sqlx::Error),
    #[error("could not read quotes: {0}")]
    Read(sqlx::Error),
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    #[error("worker failed: {0}")]
    Worker(String),
}

impl From<RaceError<StoreError>> for StoreError {
    fn from(err: RaceError<StoreError>) -> StoreError {
        match err {
            RaceError::Failed(e) => e,
            RaceError::DeadlineExceeded { budget, .. } => StoreError::DeadlineExceeded(budget),
            e @ RaceError::Worker { .. } => StoreError::Worker(e.to_string()),
        }
    }
}

/// Anything able to persist a quote and hand back its storage identity.
#[async_trait]
pub trait QuoteSink: Send + Sync {
    async fn save(&self, quote: &Quote) -> Result<StoredQuote, StoreError>;
}

#[derive(sqlx::FromRow)]
struct QuoteRow {
    id: i64,
    code: String,
    codein: String,
    name: String,
    high: String,
    low: String,
    var_bid: String,
    pct_change: String,
    bid: String,
    ask: String,
    timestamp: String,
    create_date: String,
}

impl From<QuoteRow> for StoredQuote {
    fn from(row: QuoteRow) -> Self {
        StoredQuote {
            id: row.id,
            quote: Quote {
                code: row.code,
                codein: row.codein,
                name: row.name,
                high: row.high,
                low: row.low,
                var_bid: row.var_bid,
                pct_change: row.pct_change,
                bid: row.bid,
                ask: row.ask,
                timestamp: row.timestamp,
                create_date: row.create_date,
            },
        }
    }
}

#[derive(Clone)]
pub struct QuoteStore {
    pool: SqlitePool,
    budget: Duration,
}

impl QuoteStore {
    /// Opens the database file, creating it when missing.
    pub async fn connect(url: &str, budget: Duration) -> Result<Self, StoreError> {
        debug!("connect | url: {}", url);

        let options = SqliteConnectOptions::from_str(url)
            .map_err(StoreError::Open)?
            .create_if_missing(true);
        // one connection keeps writes serialised
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StoreError::Open)?;

        Ok(QuoteStore { pool, budget })
    }

    /// Drops the quote table. Succeeds when the table is already gone.
    pub async fn reset(&self) -> Result<(), StoreError> {
        sqlx::query(DROP_TABLE)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Reset)?;
        info!("reset | table cotacoes dropped");
        Ok(())
    }

    pub async fn all(&self) -> Result<Vec<StoredQuote>, StoreError> {
        if !self.table_exists().await? {
            return Ok(vec![]);
        }

        let rows: Vec<QuoteRow> = sqlx::query_as(SELECT_QUOTES)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Read)?;

        Ok(rows.into_iter().map(StoredQuote::from).collect())
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.all().await?.len())
    }

    async fn table_exists(&self) -> Result<bool, StoreError> {
        let (tables,): (i64,) = sqlx::query_as(TABLE_EXISTS)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Read)?;
        Ok(tables > 0)
    }
}

#[async_trait]
impl QuoteSink for QuoteStore {
    async fn save(&self, quote: &Quote) -> Result<StoredQuote, StoreError> {
        let expires = Instant::now() + self.budget;
        let work = insert_quote(self.pool.clone(), quote.clone(), expires, self.budget);
        let stored = deadline::race("quote_store save", self.budget, work).await?;

        debug!("save | id: {} | bid: {}", stored.id, stored.quote.bid);
        Ok(stored)
    }
}

/// The insert runs in its own transaction. A worker aborted before the commit
/// drops the transaction and the row is rolled back.
async fn insert_quote(
    pool: SqlitePool,
    quote: Quote,
    expires: Instant,
    budget: Duration,
) -> Result<StoredQuote, StoreError> {
    // outside the transaction so the insert is the first write it takes a lock for
    sqlx::query(CREATE_TABLE)
        .execute(&pool)
        .await
        .map_err(StoreError::Schema)?;

    let mut tx = pool.begin().await.map_err(StoreError::Transaction)?;

    let result = sqlx::query(INSERT_QUOTE)
        .bind(&quote.code)
        .bind(&quote.codein)
        .bind(&quote.name)
        .bind(&quote.high)
        .bind(&quote.low)
        .bind(&quote.var_bid)
        .bind(&quote.pct_change)
        .bind(&quote.bid)
        .bind(&quote.ask)
        .bind(&quote.timestamp)
        .bind(&quote.create_date)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::Insert)?;

    if Instant::now() >= expires {
        tx.rollback().await.map_err(StoreError::Transaction)?;
        return Err(StoreError::DeadlineExceeded(budget));
    }
    tx.commit().await.map_err(StoreError::Transaction)?;

    Ok(StoredQuote {
        id: result.last_insert_rowid(),
        quote,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::{Connection, sqlite::SqliteConnection};
    use std::{env, fs, path::PathBuf};

    fn sample_quote(bid: &str) -> Quote {
        Quote {
            code: "USD".to_string(),
            codein: "BRL".to_string(),
            name: "Dólar Americano/Real Brasileiro".to_string(),
            high: "5.4512".to_string(),
            low: "5.4011".to_string(),
            var_bid: "0.0123".to_string(),
            pct_change: "0.23".to_string(),
            bid: bid.to_string(),
            ask: "5.4312".to_string(),
            timestamp: "1718380799".to_string(),
            create_date: "2024-06-14 17:59:59".to_string(),
        }
    }

    async fn open_store(budget: Duration) -> QuoteStore {
        QuoteStore::connect("sqlite::memory:", budget).await.unwrap()
    }

    #[tokio::test]
    async fn save_pass_persists_one_equal_row() {
        let store = open_store(Duration::from_secs(5)).await;
        let quote = sample_quote("5.43");

        let stored = store.save(&quote).await.unwrap();
        let all = store.all().await.unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(all[0], stored);
        assert_eq!(all[0].quote, quote);
    }

    #[tokio::test]
    async fn save_pass_assigns_sequential_ids() {
        let store = open_store(Duration::from_secs(5)).await;

        let first = store.save(&sample_quote("5.43")).await.unwrap();
        let second = store.save(&sample_quote("5.44")).await.unwrap();

        assert!(second.id > first.id);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn save_fail_deadline_stores_nothing() {
        let store = open_store(Duration::ZERO).await;

        let err = store.save(&sample_quote("5.43")).await.unwrap_err();

        assert!(matches!(err, StoreError::DeadlineExceeded(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reset_pass_empties_table() {
        let store = open_store(Duration::from_secs(5)).await;
        store.save(&sample_quote("5.43")).await.unwrap();
        store.save(&sample_quote("5.44")).await.unwrap();

        store.reset().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reset_pass_without_table() {
        let store = open_store(Duration::from_secs(5)).await;

        store.reset().await.unwrap();
        store.reset().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
    }

    fn db_path(name: &str) -> PathBuf {
        env::temp_dir().join(format!("cotacoes-{}-{}.db", name, std::process::id()))
    }

    fn remove_db(path: &PathBuf) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let _ = fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn save_fail_deadline_during_insert_rolls_back() {
        let path = db_path("insert-rolls-back");
        remove_db(&path);
        let url = format!("sqlite://{}", path.display());

        let store = QuoteStore::connect(&url, Duration::from_secs(5)).await.unwrap();
        store.save(&sample_quote("5.43")).await.unwrap();
        let tight = QuoteStore {
            pool: store.pool.clone(),
            budget: Duration::from_millis(100),
        };

        // another writer holds the lock, so the insert blocks past the budget
        let mut writer = SqliteConnection::connect(&url).await.unwrap();
        sqlx::query("BEGIN IMMEDIATE").execute(&mut writer).await.unwrap();

        let err = tight.save(&sample_quote("5.44")).await.unwrap_err();
        assert!(matches!(err, StoreError::DeadlineExceeded(_)));

        sqlx::query("ROLLBACK").execute(&mut writer).await.unwrap();
        writer.close().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let bids: Vec<String> = store
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.quote.bid)
            .collect();
        assert_eq!(bids, vec!["5.43"]);

        store.pool.close().await;
        remove_db(&path);
    }
}
