//! SQLite document and correction store
//!
//! Persists ingested documents with their machine extraction and the
//! append-only log of human corrections, using SQLx and SQLite.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use crate::{
    CorrectionRecord, Document, DocumentStatus, ExtractedRecord, HitlError, Result, StorageConfig,
};

const CREATE_DOCUMENTS: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    upload_date TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    ai_extraction TEXT NOT NULL
)
"#;

const CREATE_CORRECTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS corrections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL,
    corrected_data TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    time_taken INTEGER NOT NULL
)
"#;

/// SQLite-backed store
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect, creating the database file and schema if needed
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| HitlError::DatabaseError(format!("SQLite connection failed: {e}")))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url = %config.database_url, "Connected to document store");
        Ok(store)
    }

    /// Open an existing database without creating anything.
    ///
    /// Returns `None` when the database file does not exist. An in-memory
    /// URL (`sqlite::memory:`) also yields `None`: each connection starts
    /// empty, so there is never an existing database to read.
    pub async fn open_existing(config: &StorageConfig) -> Result<Option<Self>> {
        if is_in_memory(&config.database_url) {
            debug!(url = %config.database_url, "In-memory database holds no prior data");
            return Ok(None);
        }

        let options =
            SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(false);
        if !Path::new(options.get_filename()).exists() {
            debug!(url = %config.database_url, "Database file is absent");
            return Ok(None);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| HitlError::DatabaseError(format!("SQLite connection failed: {e}")))?;

        Ok(Some(Self { pool }))
    }

    /// Create the documents and corrections tables if absent
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_DOCUMENTS).execute(&self.pool).await?;
        sqlx::query(CREATE_CORRECTIONS).execute(&self.pool).await?;
        Ok(())
    }
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Document row from database
#[derive(Debug, FromRow)]
struct DocumentRow {
    id: i64,
    filename: String,
    upload_date: DateTime<Utc>,
    status: String,
    ai_extraction: String,
}

impl TryFrom<DocumentRow> for Document {
    type Error = HitlError;

    fn try_from(row: DocumentRow) -> Result<Self> {
        Ok(Document {
            id: row.id,
            filename: row.filename,
            upload_date: row.upload_date,
            status: row.status.parse().unwrap_or_default(),
            ai_extraction: ExtractedRecord::from_json_str(&row.ai_extraction)?,
        })
    }
}

/// Correction row with its metadata
#[derive(Debug, FromRow)]
struct CorrectionLogRow {
    id: i64,
    document_id: i64,
    corrected_data: String,
    timestamp: DateTime<Utc>,
    time_taken: i64,
}

impl TryFrom<CorrectionLogRow> for CorrectionRecord {
    type Error = HitlError;

    fn try_from(row: CorrectionLogRow) -> Result<Self> {
        Ok(CorrectionRecord {
            id: row.id,
            document_id: row.document_id,
            corrected_data: ExtractedRecord::from_json_str(&row.corrected_data)?,
            timestamp: row.timestamp,
            time_taken: row.time_taken,
        })
    }
}

/// Raw correction row as consumed by training.
///
/// Columns are nullable because the table may have been written by other
/// tools; callers decide how to treat missing values.
#[derive(Debug, Clone, FromRow)]
pub struct CorrectionRow {
    pub corrected_data: Option<String>,
    pub time_taken: Option<i64>,
}

impl CorrectionRow {
    pub fn new(corrected_data: impl Into<String>, time_taken: i64) -> Self {
        Self {
            corrected_data: Some(corrected_data.into()),
            time_taken: Some(time_taken),
        }
    }
}

/// Trait for document and correction storage
#[async_trait]
pub trait CorrectionRepository: Send + Sync {
    /// Store a freshly extracted document as pending review
    async fn insert_document(&self, filename: &str, extraction: &ExtractedRecord) -> Result<i64>;

    /// Get a document by ID
    async fn get_document(&self, id: i64) -> Result<Option<Document>>;

    /// List documents, newest first
    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Append a correction and mark its document validated
    async fn record_correction(
        &self,
        document_id: i64,
        corrected: &ExtractedRecord,
        time_taken: i64,
    ) -> Result<i64>;

    /// Corrections recorded for one document, oldest first
    async fn document_corrections(&self, document_id: i64) -> Result<Vec<CorrectionRecord>>;

    /// Load every correction row; `None` when the corrections table is absent
    async fn load_corrections(&self) -> Result<Option<Vec<CorrectionRow>>>;
}

#[async_trait]
impl CorrectionRepository for SqliteStore {
    async fn insert_document(&self, filename: &str, extraction: &ExtractedRecord) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO documents (filename, upload_date, status, ai_extraction) VALUES (?, ?, ?, ?)",
        )
        .bind(filename)
        .bind(Utc::now())
        .bind(DocumentStatus::Pending.as_str())
        .bind(extraction.to_json_string()?)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, filename, "Stored document");
        Ok(id)
    }

    async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let row: Option<DocumentRow> = sqlx::query_as(
            "SELECT id, filename, upload_date, status, ai_extraction FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Document::try_from).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            "SELECT id, filename, upload_date, status, ai_extraction FROM documents \
             ORDER BY upload_date DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Document::try_from).collect()
    }

    async fn record_correction(
        &self,
        document_id: i64,
        corrected: &ExtractedRecord,
        time_taken: i64,
    ) -> Result<i64> {
        if time_taken < 0 {
            return Err(HitlError::ValidationError(format!(
                "time_taken must not be negative, got {time_taken}"
            )));
        }

        let payload = corrected.to_json_string()?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO corrections (document_id, corrected_data, timestamp, time_taken) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(document_id)
        .bind(&payload)
        .bind(Utc::now())
        .bind(time_taken)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query("UPDATE documents SET status = ?, ai_extraction = ? WHERE id = ?")
            .bind(DocumentStatus::Validated.as_str())
            .bind(&payload)
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        if updated.rows_affected() == 0 {
            debug!(document_id, "Correction recorded for an unknown document");
        }

        Ok(result.last_insert_rowid())
    }

    async fn document_corrections(&self, document_id: i64) -> Result<Vec<CorrectionRecord>> {
        let rows: Vec<CorrectionLogRow> = sqlx::query_as(
            "SELECT id, document_id, corrected_data, timestamp, time_taken FROM corrections \
             WHERE document_id = ? ORDER BY id",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CorrectionRecord::try_from).collect()
    }

    async fn load_corrections(&self) -> Result<Option<Vec<CorrectionRow>>> {
        let table: Option<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'corrections'",
        )
        .fetch_optional(&self.pool)
        .await?;

        if table.is_none() {
            return Ok(None);
        }

        let rows: Vec<CorrectionRow> =
            sqlx::query_as("SELECT corrected_data, time_taken FROM corrections ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(rows))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_config(dir: &Path) -> StorageConfig {
        StorageConfig {
            database_url: format!("sqlite://{}", dir.join("hitl.db").display()),
            max_connections: 1,
        }
    }

    #[tokio::test]
    async fn test_document_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::connect(&storage_config(dir.path())).await.unwrap();

        let extraction = ExtractedRecord {
            name: "Jane Doe".to_string(),
            ..Default::default()
        };
        let id = store.insert_document("jane.pdf", &extraction).await.unwrap();

        let doc = store.get_document(id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(doc.ai_extraction.name, "Jane Doe");

        let corrected = ExtractedRecord {
            predicted_role: "Data Scientist".to_string(),
            ..extraction
        };
        store.record_correction(id, &corrected, 42).await.unwrap();

        let doc = store.get_document(id).await.unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Validated);
        assert_eq!(doc.ai_extraction.predicted_role, "Data Scientist");

        let rows = store.load_corrections().await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].time_taken, Some(42));

        let history = store.document_corrections(id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].document_id, id);
        assert_eq!(history[0].time_taken, 42);
        assert_eq!(history[0].corrected_data.predicted_role, "Data Scientist");
        assert!(store.document_corrections(id + 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_documents_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::connect(&storage_config(dir.path())).await.unwrap();

        let first = store
            .insert_document("a.pdf", &ExtractedRecord::new())
            .await
            .unwrap();
        let second = store
            .insert_document("b.pdf", &ExtractedRecord::new())
            .await
            .unwrap();

        let docs = store.list_documents().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, second);
        assert_eq!(docs[1].id, first);
    }

    #[tokio::test]
    async fn test_correction_for_unknown_document_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::connect(&storage_config(dir.path())).await.unwrap();

        store
            .record_correction(99, &ExtractedRecord::new(), 10)
            .await
            .unwrap();
        assert!(store.get_document(99).await.unwrap().is_none());
        assert_eq!(store.load_corrections().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_negative_time_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::connect(&storage_config(dir.path())).await.unwrap();

        let err = store
            .record_correction(1, &ExtractedRecord::new(), -5)
            .await
            .unwrap_err();
        assert!(matches!(err, HitlError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_open_existing_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_existing(&storage_config(dir.path()))
            .await
            .unwrap();
        assert!(store.is_none());
        assert!(!dir.path().join("hitl.db").exists());
    }

    #[tokio::test]
    async fn test_open_existing_in_memory() {
        let config = StorageConfig {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        };
        assert!(SqliteStore::open_existing(&config).await.unwrap().is_none());
        assert!(is_in_memory("sqlite://cv.db?mode=memory"));
        assert!(!is_in_memory("sqlite://hitl.db"));
    }

    #[tokio::test]
    async fn test_missing_corrections_table() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::File::create(dir.path().join("hitl.db")).unwrap();

        let store = SqliteStore::open_existing(&storage_config(dir.path()))
            .await
            .unwrap()
            .unwrap();
        assert!(store.load_corrections().await.unwrap().is_none());
    }
}
