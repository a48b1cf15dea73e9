//! Job repository: reads and compare-and-set writes on the `jobs` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database. Structured fields are JSON text.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub original_name: String,
    pub input_key: String,
    pub input_size: u64,
    pub mime_type: Option<String>,
    pub status: String,
    pub attempt: u32,
    pub settings: Option<String>,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub runs: String,
    pub uploaded_at: String,
    pub processing_started_at: Option<String>,
    pub processing_ended_at: Option<String>,
    pub updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            original_name: row.get("original_name")?,
            input_key: row.get("input_key")?,
            input_size: row.get::<_, i64>("input_size")? as u64,
            mime_type: row.get("mime_type")?,
            status: row.get("status")?,
            attempt: row.get("attempt")?,
            settings: row.get("settings")?,
            summary: row.get("summary")?,
            error: row.get("error")?,
            runs: row.get("runs")?,
            uploaded_at: row.get("uploaded_at")?,
            processing_started_at: row.get("processing_started_at")?,
            processing_ended_at: row.get("processing_ended_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a new job row. Fails if the id already exists.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, original_name, input_key, input_size, mime_type, status,
             attempt, settings, summary, error, runs, uploaded_at, processing_started_at,
             processing_ended_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                job.id,
                job.original_name,
                job.input_key,
                job.input_size as i64,
                job.mime_type,
                job.status,
                job.attempt,
                job.settings,
                job.summary,
                job.error,
                job.runs,
                job.uploaded_at,
                job.processing_started_at,
                job.processing_ended_at,
                job.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Overwrites the mutable columns of `job` only if the stored status still
/// equals `expected_status`. Returns whether a row was changed.
///
/// `id`, `original_name`, `input_key`, `input_size` and `uploaded_at` are
/// never rewritten.
pub fn update_if_status(
    db: &Database,
    job: &JobRow,
    expected_status: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET status=?2, attempt=?3, settings=?4, summary=?5, error=?6,
             runs=?7, processing_started_at=?8, processing_ended_at=?9, updated_at=?10
             WHERE id=?1 AND status=?11",
            params![
                job.id,
                job.status,
                job.attempt,
                job.settings,
                job.summary,
                job.error,
                job.runs,
                job.processing_started_at,
                job.processing_ended_at,
                job.updated_at,
                expected_status,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Returns every job, newest upload first.
pub fn list_all(db: &Database) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs ORDER BY uploaded_at DESC")?;
        let rows = stmt
            .query_map([], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
