//! Shared mocks for session integration tests

#![allow(dead_code)]

use futures::stream::{self, StreamExt};
use readtime::rendering::{page_layout, PageSize, PageStream};
use readtime::transport::TransportFuture;
use readtime::{
    Event, EventSender, Foreground, ObserverAttachError, ObserverHost, PageRenderer, RenderError,
    RenderJob, RenderedPage, Session, SessionHandle, TargetId, TelemetrySnapshot,
    TelemetryTransport, TrackerConfig, TransportError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

pub async fn sleep_ms(n: u64) {
    tokio::time::sleep(ms(n)).await;
}

#[derive(Debug, Clone)]
pub struct RenderCall {
    pub job: RenderJob,
    pub at: Instant,
}

struct RendererState {
    indices: Vec<u32>,
    render_time: Duration,
    failing: AtomicBool,
    stall_after_error: AtomicBool,
    calls: Mutex<Vec<RenderCall>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

/// Renderer that takes `render_time` before producing its pages.
#[derive(Clone)]
pub struct MockRenderer {
    state: Arc<RendererState>,
}

impl MockRenderer {
    pub fn new(pages: u32, render_time: Duration) -> Self {
        Self::with_indices((1..=pages).collect(), render_time)
    }

    /// Renderer that emits exactly these page indices, in order.
    pub fn with_indices(indices: Vec<u32>, render_time: Duration) -> Self {
        Self {
            state: Arc::new(RendererState {
                indices,
                render_time,
                failing: AtomicBool::new(false),
                stall_after_error: AtomicBool::new(false),
                calls: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    /// After a failure, keep the stream open forever instead of ending it.
    pub fn set_stall_after_error(&self, stall: bool) {
        self.state.stall_after_error.store(stall, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RenderCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().unwrap().len()
    }

    /// Highest number of passes that were producing pages at the same time
    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }
}

impl PageRenderer for MockRenderer {
    fn render(&self, job: RenderJob) -> PageStream {
        let state = self.state.clone();
        state.calls.lock().unwrap().push(RenderCall {
            job: job.clone(),
            at: Instant::now(),
        });
        let running = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_active.fetch_max(running, Ordering::SeqCst);

        let failing = state.failing.load(Ordering::SeqCst);
        let stall = failing && state.stall_after_error.load(Ordering::SeqCst);
        let pages: Vec<Result<RenderedPage, RenderError>> = if failing {
            vec![Err(RenderError::Fetch(format!("{} unavailable", job.document)))]
        } else {
            state
                .indices
                .iter()
                .map(|&index| {
                    Ok(RenderedPage {
                        index,
                        layout: page_layout(
                            PageSize {
                                width: 595.0,
                                height: 842.0,
                            },
                            &job.constraints,
                        ),
                    })
                })
                .collect()
        };

        let done = state.clone();
        let tail: PageStream = if stall {
            stream::pending::<Result<RenderedPage, RenderError>>().boxed()
        } else {
            stream::once(async move {
                done.active.fetch_sub(1, Ordering::SeqCst);
            })
            .filter_map(|_| async { None::<Result<RenderedPage, RenderError>> })
            .boxed()
        };
        stream::once(tokio::time::sleep(state.render_time))
            .flat_map(move |_| stream::iter(pages.clone()))
            .chain(tail)
            .boxed()
    }
}

struct TransportState {
    latency: Duration,
    outcomes: Mutex<VecDeque<Result<(), TransportError>>>,
    sent: Mutex<Vec<(String, TelemetrySnapshot)>>,
}

/// Transport that records snapshots and answers from a scripted queue
/// (success once the queue is empty).
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<TransportState>,
}

impl MockTransport {
    pub fn new(latency: Duration) -> Self {
        Self {
            state: Arc::new(TransportState {
                latency,
                outcomes: Mutex::new(VecDeque::new()),
                sent: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn push_outcome(&self, outcome: Result<(), TransportError>) {
        self.state.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn sent(&self) -> Vec<TelemetrySnapshot> {
        self.state
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.state
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|(e, _)| e.clone())
            .collect()
    }
}

impl TelemetryTransport for MockTransport {
    fn send(&self, endpoint: &str, snapshot: TelemetrySnapshot) -> TransportFuture {
        self.state
            .sent
            .lock()
            .unwrap()
            .push((endpoint.to_string(), snapshot));
        let outcome = self.state.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()));
        let latency = self.state.latency;
        Box::pin(async move {
            tokio::time::sleep(latency).await;
            outcome
        })
    }
}

/// Observer host counting attach calls; optionally failing them.
#[derive(Clone, Default)]
pub struct CountingObservers {
    attached: Arc<Mutex<Vec<TargetId>>>,
    senders: Arc<Mutex<Vec<EventSender>>>,
    fail: bool,
}

impl CountingObservers {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn attached(&self) -> Vec<TargetId> {
        self.attached.lock().unwrap().clone()
    }

    /// Fire a resize the way a real size observer would.
    pub fn fire_resize(&self, target: &str, width: f64) {
        for sender in self.senders.lock().unwrap().iter() {
            let _ = sender.send(Event::Resized {
                target: TargetId::from(target),
                width,
            });
        }
    }
}

impl ObserverHost for CountingObservers {
    fn attach(&self, target: &TargetId, events: EventSender) -> Result<(), ObserverAttachError> {
        self.attached.lock().unwrap().push(target.clone());
        if self.fail {
            return Err(ObserverAttachError {
                target: target.to_string(),
                observer: "resize",
                reason: "not supported".to_string(),
            });
        }
        self.senders.lock().unwrap().push(events);
        Ok(())
    }
}

pub struct Harness {
    pub handle: SessionHandle,
    pub renderer: MockRenderer,
    pub transport: MockTransport,
    pub foreground: Foreground,
    pub driver: JoinHandle<readtime::Result<()>>,
}

impl Harness {
    pub fn start(config: TrackerConfig, renderer: MockRenderer, transport: MockTransport) -> Self {
        Self::start_with_observers(config, renderer, transport, CountingObservers::default())
    }

    pub fn start_with_observers(
        config: TrackerConfig,
        renderer: MockRenderer,
        transport: MockTransport,
        observers: CountingObservers,
    ) -> Self {
        let foreground = Foreground::new(true);
        let (session, handle) = Session::new(
            config,
            Arc::new(renderer.clone()),
            Arc::new(transport.clone()),
            foreground.clone(),
        )
        .expect("valid config");
        let session = session.with_observers(Arc::new(observers));
        let driver = tokio::spawn(session.run());
        Self {
            handle,
            renderer,
            transport,
            foreground,
            driver,
        }
    }

    pub fn add(&self, target: &str, document: &str) {
        self.handle
            .send(Event::ContentAdded {
                target: TargetId::from(target),
                document: document.to_string(),
            })
            .expect("session running");
    }

    pub fn trigger(&self, target: &str) {
        self.handle
            .send(Event::RenderRequested {
                target: TargetId::from(target),
            })
            .expect("session running");
    }

    pub fn resize(&self, target: &str, width: f64) {
        self.handle
            .send(Event::Resized {
                target: TargetId::from(target),
                width,
            })
            .expect("session running");
    }

    pub fn density(&self, target: &str, dpr: f64) {
        self.handle
            .send(Event::DensityChanged {
                target: TargetId::from(target),
                dpr,
            })
            .expect("session running");
    }

    pub fn remove(&self, target: &str) {
        self.handle
            .send(Event::TargetRemoved {
                target: TargetId::from(target),
            })
            .expect("session running");
    }

    pub fn visibility(&self, target: &str, page: u32, ratio: f64) {
        self.handle
            .send(Event::Visibility {
                target: TargetId::from(target),
                page,
                ratio,
            })
            .expect("session running");
    }

    pub async fn stop(self) {
        self.handle.shutdown().await.expect("shutdown");
        self.driver
            .await
            .expect("session task")
            .expect("session result");
    }
}
