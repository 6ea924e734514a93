//! Orchestration of the synchronization pipeline for the active scope.
//!
//! The controller owns every piece of per-scope mutable state: the lead
//! and event collections, both page loaders, the delta high-water mark,
//! and the cross-link memo. All of it lives behind one mutex that is
//! never held across an await; in-flight work captures the scope epoch at
//! issue time and its result is discarded if the epoch has advanced by
//! the time it resolves.

use crate::api::{ApiClient, EventSummary, LeadDetail, LeadSummary, Scope};
use crate::sync::detail_cache::EntityDetailCache;
use crate::sync::pager::BulkPageLoader;
use crate::sync::poller::{self, PollHandle};
use crate::sync::SyncError;
use crate::viewed::{Namespace, ViewedStateStore};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;

// ============================================================================
// Phases
// ============================================================================

/// Lifecycle phase of the feed for the active scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No scope bootstrapped (or the last bootstrap failed).
    Idle,
    /// Initial bulk load in progress.
    Loading,
    /// Collections populated; delta polling active.
    Ready,
    /// A user-triggered "load more" is in flight.
    LoadingMore,
}

// ============================================================================
// Shared State
// ============================================================================

pub(crate) struct FeedState {
    pub(crate) phase: Phase,
    pub(crate) scope: Scope,
    pub(crate) leads: Vec<LeadSummary>,
    pub(crate) events: Vec<EventSummary>,
    pub(crate) lead_pager: BulkPageLoader<LeadSummary>,
    pub(crate) event_pager: BulkPageLoader<EventSummary>,
    /// Highest event_id ever merged for this scope. None until the
    /// bootstrap load establishes a baseline.
    pub(crate) last_seen_max_id: Option<i64>,
    /// Memoized "latest event for this lead" lookups, including negative
    /// results. Never consulted across a scope change.
    pub(crate) event_by_lead: HashMap<String, Option<EventSummary>>,
}

pub(crate) struct Shared {
    pub(crate) api: ApiClient,
    pub(crate) epoch: Arc<AtomicU64>,
    pub(crate) state: Mutex<FeedState>,
    pub(crate) details: EntityDetailCache,
    pub(crate) viewed: Mutex<ViewedStateStore>,
    pub(crate) poll_interval: Duration,
    pub(crate) poll: Mutex<Option<PollHandle>>,
}

impl Shared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_viewed(&self) -> MutexGuard<'_, ViewedStateStore> {
        self.viewed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_poll(&self) -> MutexGuard<'_, Option<PollHandle>> {
        self.poll.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Everything the surrounding UI consumes, computed in one pass.
///
/// `unread_*` deliberately intersects the viewed set with *loaded* ids
/// only, not the full unseen-on-server set — never-paged records are not
/// counted as viewed. This matches the shipped behavior and is flagged
/// for product clarification rather than silently corrected.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub phase: Phase,
    pub scope: Scope,
    /// Deduplicated on lead_id, first occurrence wins.
    pub leads: Vec<LeadSummary>,
    /// Newest-first; the head is always the newest merged event.
    pub events: Vec<EventSummary>,
    /// Every detail resolved so far, keyed by lead id.
    pub lead_details: HashMap<String, LeadDetail>,
    pub total_leads_count: u64,
    pub total_events_count: u64,
    pub loaded_leads_count: usize,
    pub loaded_events_count: usize,
    pub unread_leads_count: u64,
    pub unread_events_count: u64,
    pub has_more_leads: bool,
    pub has_more_events: bool,
}

/// Filter to unique lead_id, first occurrence wins. Pagination can
/// legitimately return overlapping items at page boundaries, so this runs
/// on every snapshot.
fn dedup_leads(leads: &[LeadSummary]) -> Vec<LeadSummary> {
    let mut seen = HashSet::with_capacity(leads.len());
    leads
        .iter()
        .filter(|lead| seen.insert(lead.lead_id.as_str()))
        .cloned()
        .collect()
}

// ============================================================================
// Controller
// ============================================================================

/// Per-scope lifecycle owner: reset on scope change, initial bulk load,
/// recurring delta poll, on-demand load-more, and unread accounting.
#[derive(Clone)]
pub struct FeedController {
    shared: Arc<Shared>,
}

impl FeedController {
    pub fn new(api: ApiClient, viewed: ViewedStateStore, poll_interval: Duration) -> Self {
        let epoch = Arc::new(AtomicU64::new(0));
        let state = FeedState {
            phase: Phase::Idle,
            scope: Scope::All,
            leads: Vec::new(),
            events: Vec::new(),
            lead_pager: BulkPageLoader::new(api.clone(), Scope::All),
            event_pager: BulkPageLoader::new(api.clone(), Scope::All),
            last_seen_max_id: None,
            event_by_lead: HashMap::new(),
        };
        Self {
            shared: Arc::new(Shared {
                details: EntityDetailCache::new(api.clone(), Arc::clone(&epoch)),
                api,
                epoch,
                state: Mutex::new(state),
                viewed: Mutex::new(viewed),
                poll_interval,
                poll: Mutex::new(None),
            }),
        }
    }

    /// Activate a scope: tear down the previous one (epoch bump, poll
    /// stop, collection and cache reset), bulk-load the first lead and
    /// event pages concurrently, then start the delta poller.
    ///
    /// A bootstrap failure leaves the controller in [`Phase::Idle`] with
    /// empty collections; retry is manual, by re-invoking this.
    pub async fn set_scope(&self, scope: Scope) -> Result<(), SyncError> {
        let shared = &self.shared;
        let epoch = shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::info!(?scope, epoch, "Scope change, resetting pipeline");

        let (mut lead_pager, mut event_pager) = {
            let mut state = shared.lock_state();
            // The teardown itself must be epoch-guarded: a racing scope
            // change that bumped past us may already have committed, and
            // its poller and collections are not ours to destroy.
            if shared.epoch.load(Ordering::Acquire) != epoch {
                return Err(SyncError::StaleScope);
            }
            if let Some(handle) = shared.lock_poll().take() {
                handle.stop();
            }
            shared.details.reset();
            state.phase = Phase::Loading;
            state.scope = scope.clone();
            state.leads.clear();
            state.events.clear();
            state.last_seen_max_id = None;
            state.event_by_lead.clear();
            state.lead_pager = BulkPageLoader::new(shared.api.clone(), scope.clone());
            state.event_pager = BulkPageLoader::new(shared.api.clone(), scope);
            (state.lead_pager.clone(), state.event_pager.clone())
        };

        let (leads, events) = tokio::join!(lead_pager.load_first(), event_pager.load_first());

        let mut state = shared.lock_state();
        if shared.epoch.load(Ordering::Acquire) != epoch {
            // A newer scope owns the state; drop this bootstrap entirely
            return Err(SyncError::StaleScope);
        }

        match (leads, events) {
            (Ok(leads), Ok(events)) => {
                let lead_ids: Vec<String> = leads.iter().map(|l| l.lead_id.clone()).collect();
                state.last_seen_max_id = events.iter().map(|e| e.event_id).max();
                state.leads = leads;
                state.events = events;
                state.lead_pager = lead_pager;
                state.event_pager = event_pager;
                state.phase = Phase::Ready;

                // Mounted before the state lock is released: any later
                // scope change takes the state lock first, so it always
                // finds this handle to stop.
                let handle = poller::spawn(Arc::downgrade(shared), epoch, shared.poll_interval);
                *shared.lock_poll() = Some(handle);
                drop(state);

                spawn_enrichment(shared, lead_ids, epoch);
                Ok(())
            }
            (Err(e), _) | (_, Err(e)) => {
                state.phase = Phase::Idle;
                drop(state);
                tracing::warn!(error = %e, "Scope bootstrap failed");
                Err(e.into())
            }
        }
    }

    /// Append the next page of leads. Returns `Ok(true)` if a page was
    /// appended; `Ok(false)` when ignored (not [`Phase::Ready`], another
    /// load-more already in flight, or the collection is exhausted).
    pub async fn load_more_leads(&self) -> Result<bool, SyncError> {
        let shared = &self.shared;
        let epoch = shared.epoch.load(Ordering::Acquire);

        let mut pager = {
            let mut state = shared.lock_state();
            if state.phase != Phase::Ready || !state.lead_pager.has_more() {
                return Ok(false);
            }
            state.phase = Phase::LoadingMore;
            state.lead_pager.clone()
        };

        let fetched = pager.load_more().await;

        let mut state = shared.lock_state();
        if shared.epoch.load(Ordering::Acquire) != epoch {
            // The new scope owns the phase; touch nothing
            return Err(SyncError::StaleScope);
        }
        state.phase = Phase::Ready;
        match fetched {
            Ok(Some(items)) => {
                let lead_ids: Vec<String> = items.iter().map(|l| l.lead_id.clone()).collect();
                state.leads.extend(items);
                state.lead_pager = pager;
                drop(state);
                spawn_enrichment(shared, lead_ids, epoch);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Append the next page of events. Same contract as
    /// [`FeedController::load_more_leads`].
    pub async fn load_more_events(&self) -> Result<bool, SyncError> {
        let shared = &self.shared;
        let epoch = shared.epoch.load(Ordering::Acquire);

        let mut pager = {
            let mut state = shared.lock_state();
            if state.phase != Phase::Ready || !state.event_pager.has_more() {
                return Ok(false);
            }
            state.phase = Phase::LoadingMore;
            state.event_pager.clone()
        };

        let fetched = pager.load_more().await;

        let mut state = shared.lock_state();
        if shared.epoch.load(Ordering::Acquire) != epoch {
            return Err(SyncError::StaleScope);
        }
        state.phase = Phase::Ready;
        match fetched {
            Ok(Some(items)) => {
                state.events.extend(items);
                state.event_pager = pager;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Run one delta tick immediately, outside the timer. Returns the
    /// number of events merged.
    pub async fn poll_now(&self) -> Result<usize, SyncError> {
        let epoch = self.shared.epoch.load(Ordering::Acquire);
        poller::poll_once(&self.shared, epoch).await
    }

    /// Resolve the detail record for a lead.
    ///
    /// Prefers data already in memory: an already-loaded event carrying
    /// the same lead id yields a detail without a network call. Only
    /// leads with no in-memory counterpart fall through to the memoized
    /// per-key fetch.
    pub async fn lead_detail(&self, lead_id: &str) -> Result<LeadDetail, SyncError> {
        let epoch = self.shared.epoch.load(Ordering::Acquire);
        resolve_detail(&self.shared, lead_id, epoch).await
    }

    /// The most relevant event for a lead.
    ///
    /// Loaded events win; otherwise a single best-effort "latest event"
    /// lookup runs and its result — positive or negative — is memoized
    /// for the rest of the scope. A failed lookup is not memoized and
    /// retries on the next access.
    pub async fn event_for_lead(&self, lead_id: &str) -> Result<Option<EventSummary>, SyncError> {
        let shared = &self.shared;
        let epoch = shared.epoch.load(Ordering::Acquire);

        {
            let state = shared.lock_state();
            if let Some(event) = state.events.iter().find(|e| e.lead_id == lead_id) {
                return Ok(Some(event.clone()));
            }
            if let Some(memo) = state.event_by_lead.get(lead_id) {
                return Ok(memo.clone());
            }
        }

        let fetched = shared.api.latest_event(lead_id).await;

        let mut state = shared.lock_state();
        if shared.epoch.load(Ordering::Acquire) != epoch {
            return Err(SyncError::StaleScope);
        }
        match fetched {
            Ok(resolved) => {
                state
                    .event_by_lead
                    .insert(lead_id.to_string(), resolved.clone());
                Ok(resolved)
            }
            Err(e) => {
                tracing::debug!(lead_id, error = %e, "Latest-event lookup failed, will retry on next access");
                Ok(None)
            }
        }
    }

    // ------------------------------------------------------------------
    // Viewed state
    // ------------------------------------------------------------------

    pub fn mark_lead_viewed(&self, lead_id: &str) {
        self.shared
            .lock_viewed()
            .mark_viewed(Namespace::Leads, lead_id);
    }

    pub fn mark_event_viewed(&self, event_id: i64) {
        self.shared
            .lock_viewed()
            .mark_viewed(Namespace::Events, &event_id.to_string());
    }

    pub fn is_lead_viewed(&self, lead_id: &str) -> bool {
        self.shared.lock_viewed().is_viewed(Namespace::Leads, lead_id)
    }

    pub fn is_event_viewed(&self, event_id: i64) -> bool {
        self.shared
            .lock_viewed()
            .is_viewed(Namespace::Events, &event_id.to_string())
    }

    // ------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------

    /// Current state of the pipeline for rendering: deduplicated
    /// collections, resolved details, and the count arithmetic.
    pub fn snapshot(&self) -> FeedSnapshot {
        let shared = &self.shared;
        let state = shared.lock_state();
        let viewed = shared.lock_viewed();

        let leads = dedup_leads(&state.leads);
        let viewed_leads =
            viewed.viewed_within(Namespace::Leads, leads.iter().map(|l| l.lead_id.as_str()));
        let event_ids: Vec<String> = state.events.iter().map(|e| e.event_id.to_string()).collect();
        let viewed_events =
            viewed.viewed_within(Namespace::Events, event_ids.iter().map(String::as_str));

        let total_leads = state.lead_pager.total_count();
        let total_events = state.event_pager.total_count();

        FeedSnapshot {
            phase: state.phase,
            scope: state.scope.clone(),
            loaded_leads_count: leads.len(),
            loaded_events_count: state.events.len(),
            unread_leads_count: total_leads.saturating_sub(viewed_leads as u64),
            unread_events_count: total_events.saturating_sub(viewed_events as u64),
            total_leads_count: total_leads,
            total_events_count: total_events,
            has_more_leads: state.lead_pager.has_more(),
            has_more_events: state.event_pager.has_more(),
            leads,
            events: state.events.clone(),
            lead_details: shared.details.snapshot(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock_state().phase
    }

    pub fn scope(&self) -> Scope {
        self.shared.lock_state().scope.clone()
    }
}

/// Shared detail resolution: resolved cache entry first, then an
/// already-loaded event carrying the same lead (seeded, no network), then
/// the memoized per-key fetch. Used by both the on-demand accessor and
/// the background page enrichment.
async fn resolve_detail(
    shared: &Shared,
    lead_id: &str,
    epoch: u64,
) -> Result<LeadDetail, SyncError> {
    if let Some(detail) = shared.details.peek(lead_id) {
        return Ok(detail);
    }

    let local = {
        let state = shared.lock_state();
        state
            .events
            .iter()
            .find(|e| e.lead_id == lead_id && !e.user_display_name.is_empty())
            .map(LeadDetail::from_event)
    };
    if let Some(detail) = local {
        shared.details.seed(detail.clone());
        return Ok(detail);
    }

    shared.details.get(lead_id, epoch).await
}

/// Upper bound on in-flight background enrichment fetches per page.
const ENRICH_CONCURRENCY: usize = 4;

/// Resolve details for a freshly committed page of leads in the
/// background, at most [`ENRICH_CONCURRENCY`] in flight. Fire-and-forget:
/// fetch failures become the cache's typed fallback, and a scope change
/// strands late results in detached cells.
fn spawn_enrichment(shared: &Arc<Shared>, lead_ids: Vec<String>, epoch: u64) {
    if lead_ids.is_empty() {
        return;
    }
    let shared = Arc::downgrade(shared);
    tokio::spawn(async move {
        let semaphore = Arc::new(Semaphore::new(ENRICH_CONCURRENCY));
        for lead_id in lead_ids {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            let Some(shared) = shared.upgrade() else {
                break;
            };
            tokio::spawn(async move {
                let _permit = permit;
                let _ = resolve_detail(&shared, &lead_id, epoch).await;
            });
        }
    });
}

// ============================================================================
// Tests
// ============================================================================
