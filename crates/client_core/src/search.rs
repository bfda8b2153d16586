//! Search-as-you-type state machine.
//!
//! [`QueryMachine`] owns the raw input, the committed term, the quiet-period
//! timer token and the generation counter. It performs no I/O and never
//! sleeps: the caller starts timers and runs lookups, then feeds their
//! completion back in. [`crate::coordinator::SearchCoordinator`] is the async
//! driver used by the storefront.

use async_trait::async_trait;
use shared::protocol::SearchPage;
use thiserror::Error;
use tracing::debug;

/// Tag attached to every issued lookup. Only the latest one is ever applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Identifies one armed quiet-period timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    /// Arm a fresh quiet-period timer, replacing any pending one.
    Start(TimerToken),
    /// Drop the pending timer, if any.
    Cancel,
    /// Leave timers as they are.
    Keep,
}

/// Number of pages needed to show `total` rows.
pub fn page_count(total: u64, per_page: u32) -> u64 {
    if per_page == 0 {
        return 0;
    }
    total.div_ceil(u64::from(per_page))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub generation: Generation,
    pub term: String,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Typing,
    Committed,
    Fetching,
    Resolved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PanelStatus {
    pub is_loading: bool,
    pub is_error: bool,
}

/// What the results panel should currently display.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelView<T> {
    pub visible: bool,
    pub items: Vec<T>,
    pub total: u64,
    pub status: PanelStatus,
}

impl<T> PanelView<T> {
    fn hidden() -> Self {
        Self {
            visible: false,
            items: Vec::new(),
            total: 0,
            status: PanelStatus::default(),
        }
    }

    fn clear_results(&mut self) {
        self.items.clear();
        self.total = 0;
        self.status = PanelStatus::default();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("search request failed: {0}")]
    Transport(String),
    #[error("search service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed search response: {0}")]
    Decode(String),
}

/// Remote lookup keyed by term.
#[async_trait]
pub trait SearchBackend: Send + Sync + 'static {
    type Item: Send + 'static;

    async fn search(
        &self,
        term: &str,
        page: u32,
        limit: u32,
    ) -> Result<SearchPage<Self::Item>, LookupError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermOutcome {
    InFlight,
    Succeeded,
    Failed,
}

pub struct QueryMachine<T> {
    raw_input: String,
    committed_term: Option<String>,
    committed_outcome: Option<TermOutcome>,
    page: u32,
    pending_timer: Option<TimerToken>,
    next_timer: u64,
    issued: u64,
    latest: Option<Generation>,
    phase: Phase,
    panel: PanelView<T>,
    limit: u32,
}

impl<T> QueryMachine<T> {
    pub fn new(limit: u32) -> Self {
        Self {
            raw_input: String::new(),
            committed_term: None,
            committed_outcome: None,
            page: 1,
            pending_timer: None,
            next_timer: 0,
            issued: 0,
            latest: None,
            phase: Phase::Idle,
            panel: PanelView::hidden(),
            limit: limit.max(1),
        }
    }

    pub fn raw_input(&self) -> &str {
        &self.raw_input
    }

    pub fn committed_term(&self) -> Option<&str> {
        self.committed_term.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn panel(&self) -> &PanelView<T> {
        &self.panel
    }

    /// Page of the committed term currently requested or shown.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Pages available for the committed term at the configured limit.
    pub fn page_count(&self) -> u64 {
        page_count(self.panel.total, self.limit)
    }

    pub fn pending_timer(&self) -> Option<TimerToken> {
        self.pending_timer
    }

    /// Generation whose response would currently be applied.
    pub fn latest_generation(&self) -> Option<Generation> {
        self.latest
    }

    pub fn input_changed(&mut self, value: impl Into<String>) -> TimerCommand {
        self.raw_input = value.into();
        if self.raw_input.is_empty() {
            self.reset();
            return TimerCommand::Cancel;
        }

        self.panel.visible = true;
        self.phase = Phase::Typing;
        TimerCommand::Start(self.arm_timer())
    }

    /// Re-opens the panel for whatever is still in the input box.
    pub fn focus(&mut self) -> TimerCommand {
        if self.raw_input.is_empty() {
            return TimerCommand::Keep;
        }
        let value = std::mem::take(&mut self.raw_input);
        self.input_changed(value)
    }

    /// Panel closed or its owner unmounted. The raw input survives so that
    /// [`QueryMachine::focus`] can pick it up again.
    pub fn close(&mut self) -> TimerCommand {
        let raw_input = std::mem::take(&mut self.raw_input);
        self.reset();
        self.raw_input = raw_input;
        TimerCommand::Cancel
    }

    pub fn quiet_period_elapsed(&mut self, token: TimerToken) -> Option<LookupRequest> {
        if self.pending_timer != Some(token) {
            debug!(?token, "ignoring superseded quiet-period timer");
            return None;
        }
        self.pending_timer = None;
        self.phase = Phase::Committed;

        let term = self.raw_input.trim().to_string();
        if term.is_empty() {
            self.page = 1;
            self.latest = None;
            self.committed_term = Some(term);
            self.committed_outcome = None;
            self.panel.clear_results();
            return None;
        }

        if self.committed_term.as_deref() == Some(term.as_str()) {
            match self.committed_outcome {
                Some(TermOutcome::InFlight) => {
                    self.phase = Phase::Fetching;
                    return None;
                }
                Some(TermOutcome::Succeeded) => {
                    self.phase = Phase::Resolved;
                    return None;
                }
                Some(TermOutcome::Failed) | None => {}
            }
        }

        if self.committed_term.as_deref() != Some(term.as_str()) {
            self.page = 1;
        }
        Some(self.issue(term))
    }

    /// Requests another page of the committed term under a fresh generation,
    /// so a late response for the previous page is dropped.
    pub fn go_to_page(&mut self, page: u32) -> Option<LookupRequest> {
        let page = page.max(1);
        let term = self
            .committed_term
            .clone()
            .filter(|term| !term.is_empty() && self.panel.visible)?;

        let showing = matches!(
            self.committed_outcome,
            Some(TermOutcome::InFlight | TermOutcome::Succeeded)
        );
        if showing && page == self.page {
            return None;
        }
        let last = self.page_count();
        if self.committed_outcome == Some(TermOutcome::Succeeded) && u64::from(page) > last {
            debug!(page, last, "ignoring request past the last page");
            return None;
        }

        self.page = page;
        Some(self.issue(term))
    }

    pub fn lookup_resolved(
        &mut self,
        generation: Generation,
        result: Result<SearchPage<T>, LookupError>,
    ) -> Resolution {
        if self.latest != Some(generation) {
            debug!(
                generation = generation.get(),
                latest = self.latest.map(Generation::get),
                "discarding stale search response"
            );
            return Resolution::Stale;
        }

        match result {
            Ok(page) => {
                self.panel.items = page.items;
                self.panel.total = page.total;
                self.panel.status = PanelStatus::default();
                self.committed_outcome = Some(TermOutcome::Succeeded);
            }
            Err(_) => {
                self.panel.items.clear();
                self.panel.total = 0;
                self.panel.status = PanelStatus {
                    is_loading: false,
                    is_error: true,
                };
                self.committed_outcome = Some(TermOutcome::Failed);
            }
        }
        self.phase = if self.pending_timer.is_some() {
            Phase::Typing
        } else {
            Phase::Resolved
        };
        Resolution::Applied
    }

    fn issue(&mut self, term: String) -> LookupRequest {
        self.issued += 1;
        let generation = Generation(self.issued);
        self.latest = Some(generation);
        self.committed_term = Some(term.clone());
        self.committed_outcome = Some(TermOutcome::InFlight);
        self.panel.status.is_loading = true;
        if self.pending_timer.is_none() {
            self.phase = Phase::Fetching;
        }

        LookupRequest {
            generation,
            term,
            page: self.page,
            limit: self.limit,
        }
    }

    fn arm_timer(&mut self) -> TimerToken {
        self.next_timer += 1;
        let token = TimerToken(self.next_timer);
        self.pending_timer = Some(token);
        token
    }

    fn reset(&mut self) {
        self.raw_input.clear();
        self.pending_timer = None;
        self.latest = None;
        self.committed_term = None;
        self.committed_outcome = None;
        self.page = 1;
        self.phase = Phase::Idle;
        self.panel = PanelView::hidden();
    }
}

#[cfg(test)]
#[path = "tests/search_tests.rs"]
mod tests;
