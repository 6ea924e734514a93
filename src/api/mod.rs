//! Backend collaborator surface: wire types and the REST client.

mod client;
mod types;

pub use client::{ApiClient, FetchError, PagedCollection};
pub use types::{
    EventSummary, LeadDetail, LeadSummary, Page, Project, Scope, FALLBACK_DISPLAY_NAME,
};
