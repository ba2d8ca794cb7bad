//! Paper record store
//!
//! Field-level merge semantics: intake writes `created`/`title`, the
//! pipeline writes `parse_status`/`parse_data`/`author_contact`. Each
//! writer updates only its own columns, so re-running either side never
//! clobbers the other and replays converge.

use crate::error::{Error, Result};
use crate::models::{AuthorContact, PaperJob, PaperRecord, ParseStatus, Verdict};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Per-status record counts for the status view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaperCounts {
    pub unprocessed: i64,
    pub clean: i64,
    pub flagged: i64,
}

impl PaperCounts {
    pub fn total(&self) -> i64 {
        self.unprocessed + self.clean + self.flagged
    }
}

/// Insert or refresh the intake-owned fields of a paper record
///
/// New rows start at `parse_status = 'unprocessed'`. Existing rows keep
/// their analysis fields untouched; only `created` and `title` are
/// refreshed. Idempotent for repeated announcements of the same paper.
pub async fn upsert_intake(pool: &SqlitePool, snapshot: &PaperJob) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO papers (id, created, title)
        VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            created = excluded.created,
            title = excluded.title,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&snapshot.paper_id)
    .bind(snapshot.created)
    .bind(&snapshot.title)
    .execute(pool)
    .await?;

    Ok(())
}

/// Merge an analysis verdict into a paper record
///
/// Writes `parse_status` and `parse_data` only. A `clean` verdict also
/// clears `author_contact` so contact data never outlives a downgraded
/// flag. Intake fields are untouched.
pub async fn merge_analysis(
    pool: &SqlitePool,
    paper_id: &str,
    verdict: Verdict,
    data: &serde_json::Value,
) -> Result<()> {
    let data_text = serde_json::to_string(data)?;

    let result = match verdict {
        Verdict::Flagged => {
            sqlx::query(
                r#"
                UPDATE papers
                SET parse_status = 'flagged', parse_data = ?, updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(&data_text)
            .bind(paper_id)
            .execute(pool)
            .await?
        }
        Verdict::Clean => {
            sqlx::query(
                r#"
                UPDATE papers
                SET parse_status = 'clean', parse_data = ?, author_contact = NULL,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ?
                "#,
            )
            .bind(&data_text)
            .bind(paper_id)
            .execute(pool)
            .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("paper {}", paper_id)));
    }

    Ok(())
}

/// Merge author contact information into a paper record
///
/// Writes `author_contact` only. Called after enrichment of a flagged
/// paper; all other fields are untouched.
pub async fn merge_author_contact(
    pool: &SqlitePool,
    paper_id: &str,
    contact: &AuthorContact,
) -> Result<()> {
    let contact_text = serde_json::to_string(contact)?;

    let result = sqlx::query(
        r#"
        UPDATE papers
        SET author_contact = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&contact_text)
    .bind(paper_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("paper {}", paper_id)));
    }

    Ok(())
}

/// Fetch one paper record by id
pub async fn get_paper(pool: &SqlitePool, paper_id: &str) -> Result<Option<PaperRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, created, title, parse_status, parse_data, author_contact
        FROM papers
        WHERE id = ?
        "#,
    )
    .bind(paper_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(row_to_record(&row)?)),
        None => Ok(None),
    }
}

/// List paper records, newest announcement first
pub async fn list_papers(pool: &SqlitePool, limit: i64) -> Result<Vec<PaperRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, created, title, parse_status, parse_data, author_contact
        FROM papers
        ORDER BY created DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_record).collect()
}

/// Count records per verdict
pub async fn count_papers_by_status(pool: &SqlitePool) -> Result<PaperCounts> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT parse_status, COUNT(*) FROM papers GROUP BY parse_status",
    )
    .fetch_all(pool)
    .await?;

    let mut counts = PaperCounts::default();
    for (status, count) in rows {
        match ParseStatus::parse(&status) {
            Some(ParseStatus::Unprocessed) => counts.unprocessed = count,
            Some(ParseStatus::Clean) => counts.clean = count,
            Some(ParseStatus::Flagged) => counts.flagged = count,
            None => {
                return Err(Error::Internal(format!(
                    "unknown parse_status in papers table: {}",
                    status
                )))
            }
        }
    }

    Ok(counts)
}

fn row_to_record(row: &SqliteRow) -> Result<PaperRecord> {
    let status_text: String = row.get("parse_status");
    let parse_status = ParseStatus::parse(&status_text).ok_or_else(|| {
        Error::Internal(format!("unknown parse_status in papers table: {}", status_text))
    })?;

    let parse_data = match row.get::<Option<String>, _>("parse_data") {
        Some(text) => Some(serde_json::from_str(&text)?),
        None => None,
    };

    let author_contact = match row.get::<Option<String>, _>("author_contact") {
        Some(text) => Some(serde_json::from_str(&text)?),
        None => None,
    };

    Ok(PaperRecord {
        id: row.get("id"),
        created: row.get::<DateTime<Utc>, _>("created"),
        title: row.get("title"),
        parse_status,
        parse_data,
        author_contact,
    })
}
