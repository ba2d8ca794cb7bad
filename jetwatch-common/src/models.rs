//! Domain models shared across jetwatch services

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tri-state analysis verdict stored on a paper record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseStatus {
    /// Intake has seen the paper; no analysis has landed yet
    Unprocessed,
    /// Analysis ran and found no rainbow colormap
    Clean,
    /// Analysis ran and flagged a rainbow colormap
    Flagged,
}

impl ParseStatus {
    /// Stable string form used in the database TEXT column
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Unprocessed => "unprocessed",
            ParseStatus::Clean => "clean",
            ParseStatus::Flagged => "flagged",
        }
    }

    /// Parse the database string form
    pub fn parse(s: &str) -> Option<ParseStatus> {
        match s {
            "unprocessed" => Some(ParseStatus::Unprocessed),
            "clean" => Some(ParseStatus::Clean),
            "flagged" => Some(ParseStatus::Flagged),
            _ => None,
        }
    }
}

/// Analyzer outcome for one downloaded paper (never `unprocessed`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Clean,
    Flagged,
}

impl From<Verdict> for ParseStatus {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Clean => ParseStatus::Clean,
            Verdict::Flagged => ParseStatus::Flagged,
        }
    }
}

/// Author contact emails recorded for a flagged paper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorContact {
    /// Corresponding author email addresses
    pub corresponding: Vec<String>,
    /// Every author email address found for the paper
    pub all: Vec<String>,
}

/// One paper's durable state, keyed by the announcement-derived identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Paper identifier (last path segment of the announced URL), immutable
    pub id: String,

    /// Announcement time of the event that introduced the paper
    pub created: DateTime<Utc>,

    /// Best-effort title extracted from the announcement text
    pub title: String,

    /// Analysis verdict; starts `unprocessed`
    pub parse_status: ParseStatus,

    /// Opaque diagnostic payload from the analyzer, stored untouched
    pub parse_data: Option<serde_json::Value>,

    /// Present only when the paper is flagged
    pub author_contact: Option<AuthorContact>,
}

/// One announcement consumed from the event stream
///
/// Unknown fields on the wire are ignored; a missing `embedded_urls`
/// decodes as empty and is rejected at intake rather than at decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    /// Source-assigned event identifier (for discard logging)
    pub id: String,
    /// Event creation time at the source
    pub created_at: DateTime<Utc>,
    /// Full announcement text
    pub full_text: String,
    /// Expanded URLs embedded in the text, in order of appearance
    #[serde(default)]
    pub embedded_urls: Vec<String>,
}

/// Queue payload: snapshot of the record fields as of intake
///
/// Workers operate on the snapshot and merge results by `paper_id`;
/// the stored row may have moved on in the meantime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperJob {
    pub paper_id: String,
    pub created: DateTime<Utc>,
    pub title: String,
}

/// Lifecycle of one queued job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting for a worker
    Queued,
    /// Claimed by a worker, lease running
    Running,
    /// Finished successfully
    Done,
    /// Attempts exhausted, needs manual triage
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<JobState> {
        match s {
            "queued" => Some(JobState::Queued),
            "running" => Some(JobState::Running),
            "done" => Some(JobState::Done),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }
}
