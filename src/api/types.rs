//! Wire types for the lead-management REST backend.
//!
//! All list endpoints share the same pagination envelope ([`Page`]), with
//! `next` carrying an opaque cursor URL that is consumed verbatim. Record
//! types are deserialized leniently: enrichment fields default when absent,
//! since the backend frequently omits them.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Placeholder display name stored when a detail fetch fails or the
/// backend omits the field. Downstream rendering never needs to
/// special-case a missing entry.
pub const FALLBACK_DISPLAY_NAME: &str = "—";

// ============================================================================
// Scope
// ============================================================================

/// The active business filter. Changing scope is a hard reset boundary:
/// every collection, cache entry, and in-flight request keyed to the
/// previous scope is invalidated or ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    /// No business filter — all records.
    #[default]
    All,
    /// Records for a single business.
    Business(String),
}

impl Scope {
    /// Query-parameter value for scoped endpoints, `None` for [`Scope::All`].
    pub fn business_id(&self) -> Option<&str> {
        match self {
            Scope::All => None,
            Scope::Business(id) => Some(id),
        }
    }
}

// ============================================================================
// Pagination Envelope
// ============================================================================

/// DRF-style pagination envelope returned by the list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    /// Authoritative server-side total, independent of how many records
    /// have been loaded into memory.
    pub count: u64,
    /// Opaque cursor URL for the next page; `None` signals exhaustion.
    pub next: Option<String>,
    /// Opaque cursor URL for the previous page (unused, kept for fidelity).
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

// ============================================================================
// Records
// ============================================================================

/// Lightweight lead record from the paginated list endpoint.
///
/// Immutable once received. `lead_id` is unique across the in-memory
/// collection; the backend pagination is not guaranteed duplicate-free
/// across overlapping pages, so callers deduplicate before rendering.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LeadSummary {
    pub lead_id: String,
    pub business_id: String,
    pub processed_at: DateTime<Utc>,
}

/// Heavyweight per-lead enrichment record.
///
/// Partial by nature — every field except `lead_id` may be absent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LeadDetail {
    pub lead_id: String,
    #[serde(default)]
    pub user_display_name: String,
    #[serde(default)]
    pub project: Option<Project>,
    #[serde(default)]
    pub phone_opt_in: bool,
    #[serde(default)]
    pub phone_in_text: bool,
    #[serde(default)]
    pub phone_in_additional_info: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct Project {
    #[serde(default)]
    pub job_names: Vec<String>,
}

impl LeadDetail {
    /// Typed fallback stored when the detail endpoint fails for a key.
    pub fn fallback(lead_id: &str) -> Self {
        Self {
            lead_id: lead_id.to_string(),
            user_display_name: FALLBACK_DISPLAY_NAME.to_string(),
            project: None,
            phone_opt_in: false,
            phone_in_text: false,
            phone_in_additional_info: false,
        }
    }

    /// Detail derived from a list record that already carries the same
    /// lead. Used when an in-memory event makes a network fetch redundant.
    pub fn from_event(event: &EventSummary) -> Self {
        Self {
            lead_id: event.lead_id.clone(),
            user_display_name: event.user_display_name.clone(),
            project: None,
            phone_opt_in: false,
            phone_in_text: false,
            phone_in_additional_info: false,
        }
    }
}

/// Event record from the feed.
///
/// `event_id` is server-assigned and strictly increases with recency; it is
/// the sole ordering key used for delta queries and tie-breaks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventSummary {
    pub event_id: i64,
    pub lead_id: String,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub user_type: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub user_display_name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub cursor: Option<String>,
    pub time_created: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_envelope_deserializes() {
        let json = r#"{
            "count": 57,
            "next": "https://api.example.com/processed_leads/?page=2",
            "previous": null,
            "results": [
                {"lead_id": "L1", "business_id": "B1", "processed_at": "2026-08-01T10:00:00Z"}
            ]
        }"#;
        let page: Page<LeadSummary> = serde_json::from_str(json).unwrap();
        assert_eq!(page.count, 57);
        assert!(page.next.is_some());
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].lead_id, "L1");
    }

    #[test]
    fn test_page_missing_previous_tolerated() {
        let json = r#"{"count": 0, "next": null, "results": []}"#;
        let page: Page<LeadSummary> = serde_json::from_str(json).unwrap();
        assert_eq!(page.count, 0);
        assert!(page.next.is_none());
        assert!(page.previous.is_none());
    }

    #[test]
    fn test_lead_detail_partial_fields_default() {
        // Only lead_id present — everything else defaults
        let json = r#"{"lead_id": "L1"}"#;
        let detail: LeadDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.lead_id, "L1");
        assert_eq!(detail.user_display_name, "");
        assert!(detail.project.is_none());
        assert!(!detail.phone_opt_in);
    }

    #[test]
    fn test_lead_detail_full() {
        let json = r#"{
            "lead_id": "L1",
            "user_display_name": "Ada Lovelace",
            "project": {"job_names": ["Roof repair", "Gutter install"]},
            "phone_opt_in": true,
            "phone_in_text": false,
            "phone_in_additional_info": true
        }"#;
        let detail: LeadDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.user_display_name, "Ada Lovelace");
        assert_eq!(detail.project.unwrap().job_names.len(), 2);
        assert!(detail.phone_opt_in);
        assert!(detail.phone_in_additional_info);
    }

    #[test]
    fn test_fallback_detail() {
        let detail = LeadDetail::fallback("L9");
        assert_eq!(detail.lead_id, "L9");
        assert_eq!(detail.user_display_name, FALLBACK_DISPLAY_NAME);
    }

    #[test]
    fn test_event_lenient_fields() {
        let json = r#"{
            "event_id": 42,
            "lead_id": "L1",
            "time_created": "2026-08-01T10:00:00Z",
            "created_at": "2026-08-01T10:00:00Z",
            "updated_at": "2026-08-01T10:00:00Z"
        }"#;
        let event: EventSummary = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_id, 42);
        assert_eq!(event.user_display_name, "");
        assert!(event.cursor.is_none());
    }

    #[test]
    fn test_scope_business_id() {
        assert_eq!(Scope::All.business_id(), None);
        assert_eq!(
            Scope::Business("B7".to_string()).business_id(),
            Some("B7")
        );
    }
}
