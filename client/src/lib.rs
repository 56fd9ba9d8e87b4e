//! Async client for the Pivotal Tracker v3 XML API.
//!
//! Wraps the sans-IO `tracker-core` with a reqwest transport. Requests are
//! built by the core, sent here, and the response body is streamed into the
//! core's `Exchange` chunk by chunk.
//!
//! ```ignore
//! use tracker_client::{ListQuery, Tracker, TrackerConfig};
//!
//! let tracker = Tracker::new(TrackerConfig::default())?;
//! let token = tracker.authenticate("user", "password").await?;
//! for project in tracker.all_projects(&ListQuery::new(), &token).await? {
//!     println!("{:?}", project.field("name"));
//! }
//! ```

mod tracker;

pub use tracker::Tracker;
pub use tracker_core::{
    Document, Fields, IterationGroup, ListQuery, Node, TrackerConfig, TrackerError,
};
