//! Scripted collaborator stand-ins
//!
//! Each stub implements one collaborator trait with configurable
//! behavior and a call counter, so tests can assert not just outcomes
//! but which collaborators were (not) consulted.

use async_trait::async_trait;
use jetwatch_common::models::{Announcement, AuthorContact, Verdict};
use jetwatch_pm::services::{
    AnnouncementSource, AnnouncementStream, AuthorLookup, ColormapDetector, DetectError,
    Detection, FeedError, FetchError, LookupError, PaperFetcher,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted announcement source
///
/// `stream()` drains the scripted live items once; later calls yield an
/// empty stream. `recent()` serves from the timeline.
pub struct StubFeed {
    stream_items: Mutex<Option<Vec<Result<Announcement, FeedError>>>>,
    timeline: Vec<Announcement>,
}

impl StubFeed {
    pub fn with_timeline(timeline: Vec<Announcement>) -> Self {
        Self {
            stream_items: Mutex::new(None),
            timeline,
        }
    }

    pub fn with_stream(items: Vec<Result<Announcement, FeedError>>) -> Self {
        Self {
            stream_items: Mutex::new(Some(items)),
            timeline: Vec::new(),
        }
    }
}

#[async_trait]
impl AnnouncementSource for StubFeed {
    async fn stream(&self) -> Result<AnnouncementStream, FeedError> {
        let items = self
            .stream_items
            .lock()
            .expect("stream items lock")
            .take()
            .unwrap_or_default();
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Announcement>, FeedError> {
        Ok(self
            .timeline
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Fetcher that writes a placeholder PDF into the destination directory
pub struct StubFetcher {
    fail: bool,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn ok() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn not_found() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaperFetcher for StubFetcher {
    async fn download(&self, paper_id: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::PaperNotFound(paper_id.to_string()));
        }
        let path = dest_dir.join(format!("{}.full.pdf", paper_id));
        tokio::fs::write(&path, b"%PDF-1.4 stub").await?;
        Ok(path)
    }
}

/// Detector that returns a fixed verdict
pub struct StubDetector {
    result: Result<(Verdict, serde_json::Value), String>,
    calls: AtomicUsize,
}

impl StubDetector {
    pub fn flagged(data: serde_json::Value) -> Self {
        Self {
            result: Ok((Verdict::Flagged, data)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn clean() -> Self {
        Self {
            result: Ok((Verdict::Clean, serde_json::json!({"figures": 0}))),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            result: Err(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ColormapDetector for StubDetector {
    async fn analyze(&self, pdf_path: &Path) -> Result<Detection, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !pdf_path.exists() {
            return Err(DetectError::FileNotFound(pdf_path.display().to_string()));
        }
        match &self.result {
            Ok((verdict, data)) => Ok(Detection {
                verdict: *verdict,
                data: data.clone(),
            }),
            Err(reason) => Err(DetectError::DetectionFailed(reason.clone())),
        }
    }
}

/// Author lookup that returns a fixed contact set
pub struct StubAuthors {
    result: Result<AuthorContact, String>,
    calls: AtomicUsize,
}

impl StubAuthors {
    pub fn with_contact(contact: AuthorContact) -> Self {
        Self {
            result: Ok(contact),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            result: Err(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorLookup for StubAuthors {
    async fn find_authors(&self, _paper_id: &str) -> Result<AuthorContact, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.result {
            Ok(contact) => Ok(contact.clone()),
            Err(reason) => Err(LookupError::Parse(reason.clone())),
        }
    }
}
