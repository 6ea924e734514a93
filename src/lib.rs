//! Incremental feed synchronization client for the "Events & Leads" view
//! of a lead-management dashboard.
//!
//! The crate is an embedded client module, not an application: the
//! surrounding UI constructs a [`FeedController`] and consumes
//! [`FeedSnapshot`]s. The pipeline it owns:
//!
//! - bulk-loads paginated historical records ([`sync::BulkPageLoader`]),
//! - polls for records newer than the last known point on a fixed
//!   interval, merging them without re-fetching or duplicating history,
//! - enriches lightweight list records with heavier per-entity detail,
//!   fetched lazily and memoized ([`sync::EntityDetailCache`]),
//! - tracks persistent seen/unseen state across sessions
//!   ([`viewed::ViewedStateStore`]),
//! - and atomically resets all of the above when the business filter
//!   ([`Scope`]) changes, discarding in-flight work via an epoch token.
//!
//! ```no_run
//! use leadfeed::{ApiClient, Config, FeedController, JsonFileStore, Scope, ViewedStateStore};
//! use std::time::Duration;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load(std::path::Path::new("leadfeed.toml"))?;
//! let api = ApiClient::new(&config)?;
//! let viewed = ViewedStateStore::load(Box::new(JsonFileStore::new(".leadfeed-state")?));
//! let feed = FeedController::new(api, viewed, Duration::from_secs(config.poll_interval_secs));
//!
//! feed.set_scope(Scope::Business("B1".into())).await?;
//! let snapshot = feed.snapshot();
//! println!("{} unread leads", snapshot.unread_leads_count);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod sync;
pub mod viewed;

pub use api::{ApiClient, EventSummary, FetchError, LeadDetail, LeadSummary, Page, Scope};
pub use config::{Config, ConfigError};
pub use sync::{FeedController, FeedSnapshot, Phase, SyncError};
pub use viewed::{JsonFileStore, MemoryStore, Namespace, StateStore, ViewedStateStore};
