//! The session event loop.
//!
//! A [`Session`] owns every piece of mutable state (scheduler registry, page
//! sets, accumulators, flushers) and runs as a single task. Observer events,
//! debounce deadlines, render page streams, accumulation ticks, flush checks
//! and transport completions are interleaved by one `select!` loop, so no two
//! of them ever mutate state concurrently.
//!
//! Hosts talk to the loop through a [`SessionHandle`] (or the
//! [`EventSender`] it hands out), in the same command-channel style a worker
//! thread would be driven.

use crate::platform::{Event, EventSender, Foreground, NoopObserverHost, ObserverHost};
use crate::rendering::{PageRenderer, RenderedPage, MAX_PAGE_INDEX};
use crate::scheduler::{RenderPhase, RenderScheduler, TargetView};
use crate::telemetry::{FlushDecision, Page, PageSet, ReadTimeAccumulator, TelemetryFlusher};
use crate::transport::TelemetryTransport;
use crate::{Error, RenderError, Result, TargetId, TrackerConfig, TransportError};
use futures::future::BoxFuture;
use futures::stream::{self, AbortHandle, BoxStream, FuturesUnordered, SelectAll, StreamExt};
use futures::FutureExt;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, WeakUnboundedSender};
use tokio::sync::oneshot;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use uuid::Uuid;

#[derive(Debug)]
pub(crate) enum Command {
    Event(Event),
    Report(oneshot::Sender<SessionReport>),
    Shutdown(oneshot::Sender<()>),
}

enum RenderProgress {
    Page(std::result::Result<RenderedPage, RenderError>),
    Finished,
}

type ProgressStream = BoxStream<'static, (TargetId, u64, RenderProgress)>;
type FlushFuture = BoxFuture<'static, (TargetId, u64, std::result::Result<(), TransportError>)>;

/// Bookkeeping for the pass currently producing pages for a target
struct ActivePass {
    pass: u64,
    width: f64,
    pages: u32,
    /// Stops the renderer's stream once the pass is settled early
    abort: AbortHandle,
}

struct TargetTelemetry {
    pages: PageSet,
    accumulator: ReadTimeAccumulator,
    flusher: TelemetryFlusher,
}

/// Point-in-time view of one target
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub target: TargetId,
    pub document: String,
    pub phase: RenderPhase,
    pub view: TargetView,
    pub passes_started: u64,
    pub listeners_attached: bool,
    pub pages: Vec<Page>,
    pub flush_in_flight: bool,
}

impl TargetReport {
    pub fn page(&self, index: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.index() == index)
    }

    pub fn total_ms(&self) -> f64 {
        self.pages.iter().map(|p| p.duration_ms()).sum()
    }
}

/// Point-in-time view of the whole session, targets sorted by id
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub client_id: Uuid,
    pub targets: Vec<TargetReport>,
}

impl SessionReport {
    pub fn target(&self, target: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.target.as_str() == target)
    }
}

/// Async handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: EventSender,
}

impl SessionHandle {
    /// Deliver a host event to the session.
    pub fn send(&self, event: Event) -> Result<()> {
        self.events.send(event)
    }

    /// A sender observers can keep.
    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    /// Snapshot the session state.
    pub async fn report(&self) -> Result<SessionReport> {
        let (tx, rx) = oneshot::channel();
        self.events.command(Command::Report(tx))?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Stop the session loop. Unflushed telemetry is dropped.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.events.command(Command::Shutdown(tx))?;
        rx.await.map_err(|_| Error::SessionClosed)
    }
}

pub struct Session {
    config: TrackerConfig,
    client_id: Uuid,
    scheduler: RenderScheduler,
    telemetry: HashMap<TargetId, TargetTelemetry>,
    active: HashMap<TargetId, ActivePass>,
    next_pass: u64,
    next_flight: u64,
    renderer: Arc<dyn PageRenderer>,
    transport: Arc<dyn TelemetryTransport>,
    observers: Arc<dyn ObserverHost>,
    foreground: Foreground,
    rx: UnboundedReceiver<Command>,
    tx: WeakUnboundedSender<Command>,
    renders: SelectAll<ProgressStream>,
    flushes: FuturesUnordered<FlushFuture>,
}

impl Session {
    /// Build a session and the handle that drives it.
    ///
    /// The session does nothing until [`Session::run`] is awaited (usually in
    /// its own task). It stops when [`SessionHandle::shutdown`] is called or
    /// every handle and sender has been dropped.
    pub fn new(
        config: TrackerConfig,
        renderer: Arc<dyn PageRenderer>,
        transport: Arc<dyn TelemetryTransport>,
        foreground: Foreground,
    ) -> Result<(Self, SessionHandle)> {
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let client_id = config.client_id.unwrap_or_else(Uuid::new_v4);
        let session = Self {
            scheduler: RenderScheduler::new(&config),
            config,
            client_id,
            telemetry: HashMap::new(),
            active: HashMap::new(),
            next_pass: 0,
            next_flight: 0,
            renderer,
            transport,
            observers: Arc::new(NoopObserverHost::new()),
            foreground,
            rx,
            tx: tx.downgrade(),
            renders: SelectAll::new(),
            flushes: FuturesUnordered::new(),
        };
        let handle = SessionHandle {
            events: EventSender::new(tx),
        };
        Ok((session, handle))
    }

    /// Use `observers` to attach size/density observers to rendered targets.
    pub fn with_observers(mut self, observers: Arc<dyn ObserverHost>) -> Self {
        self.observers = observers;
        self
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    /// Run the event loop until shutdown.
    pub async fn run(mut self) -> Result<()> {
        let now = Instant::now();
        let mut tick = interval_at(now + self.config.tick_period(), self.config.tick_period());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut flush_check = interval_at(
            now + self.config.flush_check_period(),
            self.config.flush_check_period(),
        );
        flush_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("read-time session {} started", self.client_id);
        loop {
            let deadline = self.scheduler.next_deadline();
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(Command::Event(event)) => self.handle_event(event, Instant::now()),
                    Some(Command::Report(resp)) => {
                        let _ = resp.send(self.report());
                    }
                    Some(Command::Shutdown(resp)) => {
                        let _ = resp.send(());
                        break;
                    }
                    None => break,
                },
                _ = sleep_until_deadline(deadline) => self.start_due_renders(Instant::now()),
                Some((target, pass, progress)) = self.renders.next(),
                    if !self.renders.is_empty() =>
                {
                    self.on_render_progress(target, pass, progress, Instant::now());
                }
                Some((target, flight, outcome)) = self.flushes.next(),
                    if !self.flushes.is_empty() =>
                {
                    self.on_flush_complete(&target, flight, outcome);
                }
                _ = tick.tick() => self.tick(Instant::now()),
                _ = flush_check.tick() => self.evaluate_flushes(Instant::now()),
            }
        }

        let unflushed: f64 = self.telemetry.values().map(|t| t.pages.total_ms()).sum();
        info!(
            "read-time session {} stopped ({:.0}ms unflushed)",
            self.client_id, unflushed
        );
        Ok(())
    }

    fn handle_event(&mut self, event: Event, now: Instant) {
        match event {
            Event::ContentAdded { target, document } => {
                if self.scheduler.discover(&target, &document, now) {
                    debug!("discovered target {} ({})", target, document);
                    let telemetry = self.new_telemetry(&target, now);
                    self.telemetry.insert(target, telemetry);
                }
            }
            Event::TargetRemoved { target } => {
                self.scheduler.remove(&target);
                if let Some(active) = self.active.remove(&target) {
                    active.abort.abort();
                }
                if let Some(t) = self.telemetry.remove(&target) {
                    let lost = t.pages.total_ms();
                    if lost > 0.0 {
                        info!("target {} removed with {:.0}ms unflushed", target, lost);
                    }
                }
            }
            Event::RenderRequested { target } => {
                self.scheduler.request_render(&target, now);
            }
            Event::Resized { target, width } => {
                self.scheduler.on_resize(&target, width, now);
            }
            Event::DensityChanged { target, dpr } => {
                self.scheduler.on_density_change(&target, dpr, now);
            }
            Event::Visibility { target, page, ratio } => {
                if let Some(t) = self.telemetry.get_mut(&target) {
                    t.pages.observe(page, ratio);
                }
            }
        }
    }

    fn new_telemetry(&self, target: &TargetId, now: Instant) -> TargetTelemetry {
        TargetTelemetry {
            pages: PageSet::new(self.config.duration_policy),
            accumulator: ReadTimeAccumulator::new(now),
            flusher: TelemetryFlusher::new(
                target.clone(),
                self.client_id,
                self.config.flush_interval(),
                self.config.reset_policy,
                now,
            ),
        }
    }

    fn start_due_renders(&mut self, now: Instant) {
        for job in self.scheduler.start_due(now) {
            self.next_pass += 1;
            let pass = self.next_pass;
            let target = job.target.clone();
            let width = job.constraints.width;
            if let Some(t) = self.telemetry.get_mut(&target) {
                t.pages.begin_pass();
            }

            let (pages, abort) = stream::abortable(self.renderer.render(job));
            self.active.insert(
                target.clone(),
                ActivePass {
                    pass,
                    width,
                    pages: 0,
                    abort,
                },
            );
            let page_target = target.clone();
            let progress = pages
                .map(move |page| (page_target.clone(), pass, RenderProgress::Page(page)))
                .chain(stream::once(async move { (target, pass, RenderProgress::Finished) }))
                .boxed();
            self.renders.push(progress);
        }
    }

    fn on_render_progress(
        &mut self,
        target: TargetId,
        pass: u64,
        progress: RenderProgress,
        now: Instant,
    ) {
        if !self.active.get(&target).is_some_and(|a| a.pass == pass) {
            debug!("dropping output of superseded pass {} for {}", pass, target);
            return;
        }

        match progress {
            RenderProgress::Page(Ok(page)) => self.attach_page(&target, page),
            RenderProgress::Page(Err(err)) => {
                // the first error settles the pass; whatever the renderer
                // does afterwards is discarded
                if let Some(active) = self.active.remove(&target) {
                    active.abort.abort();
                    self.finish_pass(&target, active.width, Err(err), now);
                }
            }
            RenderProgress::Finished => {
                if let Some(active) = self.active.remove(&target) {
                    self.finish_pass(&target, active.width, Ok(active.pages), now);
                }
            }
        }
    }

    fn attach_page(&mut self, target: &TargetId, page: RenderedPage) {
        let Some(active) = self.active.get_mut(target) else {
            return;
        };
        if page.index > MAX_PAGE_INDEX {
            warn!(
                "renderer produced page {} for {} (limit {}); ignoring",
                page.index, target, MAX_PAGE_INDEX
            );
            return;
        }
        if page.index <= active.pages {
            warn!(
                "renderer produced page {} after page {} for {}; ignoring",
                page.index, active.pages, target
            );
            return;
        }
        active.pages = page.index;
        if let Some(t) = self.telemetry.get_mut(target) {
            t.pages.attach(&page);
        }
        self.scheduler.page_attached(target, page.index);
    }

    fn finish_pass(
        &mut self,
        target: &TargetId,
        width: f64,
        outcome: std::result::Result<u32, RenderError>,
        now: Instant,
    ) {
        if let Some(t) = self.telemetry.get_mut(target) {
            if outcome.is_err() {
                // the failure placeholder replaces whatever was attached
                t.pages.begin_pass();
            }
            t.pages.finish_pass();
        }
        let succeeded = outcome.is_ok();
        self.scheduler.complete(target, outcome, width, now);
        if succeeded && self.scheduler.attach_listeners(target) {
            self.attach_observers(target);
        }
        // a retrigger recorded during the pass is due right now
        self.start_due_renders(now);
    }

    fn attach_observers(&self, target: &TargetId) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        if let Err(err) = self.observers.attach(target, EventSender::new(tx)) {
            warn!("{}; {} will not re-render on resize", err, target);
        }
    }

    fn tick(&mut self, now: Instant) {
        let foreground = self.foreground.is_foreground();
        for t in self.telemetry.values_mut() {
            t.accumulator.tick(now, foreground, &mut t.pages);
        }
    }

    fn evaluate_flushes(&mut self, now: Instant) {
        for (target, t) in self.telemetry.iter_mut() {
            let flight = self.next_flight + 1;
            if let FlushDecision::Send(snapshot) = t.flusher.poll(now, &t.pages, flight) {
                self.next_flight = flight;
                let send = self.transport.send(&self.config.endpoint, snapshot);
                let target = target.clone();
                self.flushes
                    .push(async move { (target, flight, send.await) }.boxed());
            }
        }
    }

    fn on_flush_complete(
        &mut self,
        target: &TargetId,
        flight: u64,
        outcome: std::result::Result<(), TransportError>,
    ) {
        match self.telemetry.get_mut(target) {
            Some(t) => {
                if t.flusher.complete(flight, &outcome, &mut t.pages) {
                    debug!("telemetry for {} delivered", target);
                }
            }
            None => debug!("flush finished for removed target {}", target),
        }
    }

    fn report(&self) -> SessionReport {
        let mut targets: Vec<TargetReport> = self
            .scheduler
            .targets()
            .map(|(id, state)| {
                let telemetry = self.telemetry.get(id);
                TargetReport {
                    target: id.clone(),
                    document: state.document().to_string(),
                    phase: state.phase(),
                    view: state.view().clone(),
                    passes_started: state.passes_started(),
                    listeners_attached: state.listeners_attached(),
                    pages: telemetry
                        .map(|t| t.pages.iter().cloned().collect())
                        .unwrap_or_default(),
                    flush_in_flight: telemetry.map(|t| t.flusher.is_in_flight()).unwrap_or(false),
                }
            })
            .collect();
        targets.sort_by(|a, b| a.target.cmp(&b.target));
        SessionReport {
            client_id: self.client_id,
            targets,
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
