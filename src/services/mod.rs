//! Service layer for the ingestion pipeline.
//!
//! - Listing sources (`HttpListingSource`, `FileListingSource`)
//! - Notification dispatch (`Notifier`, `WebhookSink`)

pub mod notify;
pub mod source;

pub use notify::{NotificationSink, Notifier, WebhookSink};
pub use source::{FileListingSource, HttpListingSource, ListingSource};
