//! Host-facing surface: trigger events, observer attachment, foreground state
//!
//! Observers in the host (resize, density, DOM mutation, intersection) do not
//! touch session state directly. They push [`Event`]s through an
//! [`EventSender`] into the session loop, which is the only writer of
//! scheduler and telemetry state.

pub mod foreground;

pub use foreground::Foreground;

use crate::session::Command;
use crate::{Error, ObserverAttachError, Result, TargetId};
use tokio::sync::mpsc::UnboundedSender;

/// Something changed in the host
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A target appeared in the document (or its content was replaced)
    ContentAdded { target: TargetId, document: String },
    /// The target left the document; its state is dropped
    TargetRemoved { target: TargetId },
    /// Untyped "something changed" trigger
    RenderRequested { target: TargetId },
    /// The size observer saw a new container width (CSS px)
    Resized { target: TargetId, width: f64 },
    /// The density observer saw a new device pixel ratio
    DensityChanged { target: TargetId, dpr: f64 },
    /// The visibility observer reported the visible fraction of a page
    Visibility { target: TargetId, page: u32, ratio: f64 },
}

impl Event {
    pub fn target(&self) -> &TargetId {
        match self {
            Event::ContentAdded { target, .. }
            | Event::TargetRemoved { target }
            | Event::RenderRequested { target }
            | Event::Resized { target, .. }
            | Event::DensityChanged { target, .. }
            | Event::Visibility { target, .. } => target,
        }
    }
}

/// Cloneable, non-blocking handle observers use to reach the session.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: UnboundedSender<Command>,
}

impl EventSender {
    pub(crate) fn new(tx: UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    pub(crate) fn command(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| Error::SessionClosed)
    }

    /// Deliver an event. Fails only once the session has stopped.
    pub fn send(&self, event: Event) -> Result<()> {
        self.command(Command::Event(event))
    }
}

/// Attaches size and density observers to a target.
///
/// Called at most once per target, after its first successful render. An
/// error is logged and otherwise ignored: the target keeps working but gets
/// no further automatic re-render triggers.
pub trait ObserverHost: Send + Sync {
    fn attach(
        &self,
        target: &TargetId,
        events: EventSender,
    ) -> std::result::Result<(), ObserverAttachError>;
}

/// Host without observers; targets only re-render on explicit events.
pub struct NoopObserverHost;

impl NoopObserverHost {
    pub fn new() -> Self {
        NoopObserverHost
    }
}

impl Default for NoopObserverHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverHost for NoopObserverHost {
    fn attach(
        &self,
        _target: &TargetId,
        _events: EventSender,
    ) -> std::result::Result<(), ObserverAttachError> {
        Ok(())
    }
}
