//! External service clients for the paper monitor
//!
//! Each collaborator the monitor talks to lives behind a trait so the
//! pipeline can be exercised against scripted implementations in tests.

pub mod authors_client;
pub mod content_client;
pub mod detector_client;
pub mod feed_client;

pub use authors_client::{AuthorLookup, AuthorsClient, LookupError};
pub use content_client::{ContentClient, FetchError, PaperFetcher};
pub use detector_client::{ColormapDetector, DetectError, Detection, DetectorClient};
pub use feed_client::{AnnouncementSource, AnnouncementStream, FeedClient, FeedError};
