//! Async driver for [`QueryMachine`].
//!
//! One task owns the machine, the quiet-period [`Sleep`] and every lookup in
//! flight. Input events, the timer and lookup completions are multiplexed
//! with `select!`, so no locking is involved.

use std::{pin::Pin, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, Stream, StreamExt};
use shared::protocol::SearchPage;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, Sleep},
};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::search::{
    Generation, LookupError, LookupRequest, PanelStatus, QueryMachine, Resolution, SearchBackend,
    TimerCommand, TimerToken,
};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchInput {
    Changed(String),
    Focus,
    Close,
    /// Jump to another page of the committed term.
    Page(u32),
}

/// Presentation collaborator that displays search results.
pub trait ResultsPanel<T>: Send {
    fn show(&mut self, items: &[T], status: PanelStatus);
    fn hide(&mut self);

    /// Called after settled results are shown.
    fn paginate(&mut self, _page: u32, _page_count: u64) {}
}

type LookupFuture<T> = BoxFuture<'static, (Generation, Result<SearchPage<T>, LookupError>)>;

struct QuietTimer {
    token: TimerToken,
    sleep: Pin<Box<Sleep>>,
}

async fn quiet_elapsed(timer: &mut Option<QuietTimer>) -> TimerToken {
    match timer {
        Some(timer) => {
            timer.sleep.as_mut().await;
            timer.token
        }
        None => std::future::pending().await,
    }
}

pub struct SearchCoordinator<B: SearchBackend, P> {
    backend: Arc<B>,
    panel: P,
    machine: QueryMachine<B::Item>,
    quiet_period: Duration,
    panel_shown: bool,
}

impl<B, P> SearchCoordinator<B, P>
where
    B: SearchBackend,
    P: ResultsPanel<B::Item>,
{
    pub fn new(backend: Arc<B>, panel: P, quiet_period: Duration, limit: u32) -> Self {
        Self {
            backend,
            panel,
            machine: QueryMachine::new(limit),
            quiet_period,
            panel_shown: false,
        }
    }

    /// Drives the coordinator until `inputs` ends, which counts as unmount.
    /// Returns the panel so callers can inspect what was rendered.
    pub async fn run<S>(mut self, inputs: S) -> P
    where
        S: Stream<Item = SearchInput>,
    {
        tokio::pin!(inputs);
        let mut timer: Option<QuietTimer> = None;
        let mut lookups: FuturesUnordered<LookupFuture<B::Item>> = FuturesUnordered::new();

        loop {
            tokio::select! {
                input = inputs.next() => {
                    let Some(input) = input else {
                        let command = self.machine.close();
                        self.apply_timer(&mut timer, command);
                        self.render();
                        break;
                    };
                    let command = match input {
                        SearchInput::Changed(value) => self.machine.input_changed(value),
                        SearchInput::Focus => self.machine.focus(),
                        SearchInput::Close => self.machine.close(),
                        SearchInput::Page(page) => {
                            if let Some(request) = self.machine.go_to_page(page) {
                                lookups.push(self.lookup(request));
                            }
                            TimerCommand::Keep
                        }
                    };
                    self.apply_timer(&mut timer, command);
                    self.render();
                }
                token = quiet_elapsed(&mut timer) => {
                    timer = None;
                    if let Some(request) = self.machine.quiet_period_elapsed(token) {
                        lookups.push(self.lookup(request));
                    }
                    self.render();
                }
                Some((generation, result)) = lookups.next(), if !lookups.is_empty() => {
                    if let Err(error) = &result {
                        warn!(generation = generation.get(), %error, "search lookup failed");
                    }
                    if self.machine.lookup_resolved(generation, result) == Resolution::Applied {
                        self.render();
                    }
                }
            }
        }

        if !lookups.is_empty() {
            debug!(in_flight = lookups.len(), "dropping lookups on unmount");
        }
        self.panel
    }

    fn apply_timer(&self, timer: &mut Option<QuietTimer>, command: TimerCommand) {
        match command {
            TimerCommand::Start(token) => {
                *timer = Some(QuietTimer {
                    token,
                    sleep: Box::pin(sleep(self.quiet_period)),
                });
            }
            TimerCommand::Cancel => *timer = None,
            TimerCommand::Keep => {}
        }
    }

    fn lookup(&self, request: LookupRequest) -> LookupFuture<B::Item> {
        info!(
            generation = request.generation.get(),
            term = %request.term,
            page = request.page,
            limit = request.limit,
            "issuing search lookup"
        );
        let backend = Arc::clone(&self.backend);
        async move {
            let result = backend
                .search(&request.term, request.page, request.limit)
                .await;
            (request.generation, result)
        }
        .boxed()
    }

    fn render(&mut self) {
        let view = self.machine.panel();
        if view.visible {
            self.panel.show(&view.items, view.status);
            if !view.status.is_loading && !view.status.is_error && view.total > 0 {
                self.panel
                    .paginate(self.machine.page(), self.machine.page_count());
            }
            self.panel_shown = true;
        } else if self.panel_shown {
            self.panel.hide();
            self.panel_shown = false;
        }
    }
}

/// Input side of a coordinator running on its own task.
pub struct SearchHandle<P> {
    inputs: mpsc::UnboundedSender<SearchInput>,
    task: JoinHandle<P>,
}

impl<P: Send + 'static> SearchHandle<P> {
    pub fn spawn<B>(coordinator: SearchCoordinator<B, P>) -> Self
    where
        B: SearchBackend,
        P: ResultsPanel<B::Item>,
    {
        let (inputs, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(coordinator.run(UnboundedReceiverStream::new(rx)));
        Self { inputs, task }
    }

    pub fn on_change(&self, value: impl Into<String>) {
        self.send(SearchInput::Changed(value.into()));
    }

    pub fn focus(&self) {
        self.send(SearchInput::Focus);
    }

    pub fn close(&self) {
        self.send(SearchInput::Close);
    }

    pub fn go_to_page(&self, page: u32) {
        self.send(SearchInput::Page(page));
    }

    /// Unmounts the search box and waits for the driver to wind down.
    pub async fn finish(self) -> Result<P> {
        drop(self.inputs);
        self.task.await.context("search coordinator task failed")
    }

    fn send(&self, input: SearchInput) {
        if self.inputs.send(input).is_err() {
            debug!("search coordinator already stopped; input dropped");
        }
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
