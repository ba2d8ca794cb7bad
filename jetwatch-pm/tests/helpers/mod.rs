//! Test helper utilities
//!
//! Shared stand-ins for the monitor's external collaborators, plus
//! fixture builders for announcements and author contacts.

pub mod stubs;

pub use stubs::{StubAuthors, StubDetector, StubFeed, StubFetcher};

use chrono::{DateTime, Utc};
use jetwatch_common::models::{Announcement, AuthorContact};

/// Timestamp used by fixtures so assertions are deterministic
pub fn fixture_time() -> DateTime<Utc> {
    "2017-06-13T09:00:00Z".parse().expect("valid fixture time")
}

/// Build an announcement whose first URL yields `paper_id`
pub fn announcement_for(paper_id: &str, title: &str) -> Announcement {
    let url = format!("http://biorxiv.org/content/{}", paper_id);
    Announcement {
        id: format!("src-{}", paper_id),
        created_at: fixture_time(),
        full_text: format!("{} {}", title, url),
        embedded_urls: vec![url],
    }
}

/// The canonical end-to-end fixture announcement
pub fn sample_announcement() -> Announcement {
    Announcement {
        id: "900".to_string(),
        created_at: fixture_time(),
        full_text: "Some Title http://biorxiv.org/content/172627v1".to_string(),
        embedded_urls: vec!["http://biorxiv.org/content/172627v1".to_string()],
    }
}

/// Author contacts matching the canonical fixture paper
pub fn sample_contact() -> AuthorContact {
    AuthorContact {
        corresponding: vec!["t.ellis@imperial.ac.uk".to_string()],
        all: vec![
            "o.borkowski@imperial.ac.uk".to_string(),
            "carlos.bricio@gmail.com".to_string(),
            "g.stan@imperial.ac.uk".to_string(),
            "t.ellis@imperial.ac.uk".to_string(),
        ],
    }
}
