//! Renderer seam
//!
//! The scheduler never rasterizes anything itself. It hands a [`RenderJob`]
//! to a [`PageRenderer`] and consumes the returned page stream, attaching
//! each page as it arrives.

pub mod fixed;
pub mod layout;

pub use fixed::FixedPageRenderer;
pub use layout::{page_layout, PageLayout, PageSize};

use crate::{RenderError, TargetId};
use futures::stream::BoxStream;

/// Layout constraints for one render pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConstraints {
    /// Available container width in CSS px (0 when unknown)
    pub width: f64,
    /// Height of the viewing surface in CSS px
    pub height: f64,
    /// Backing-store pixels per CSS px
    pub device_pixel_ratio: f64,
}

/// A render pass request produced by the scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub target: TargetId,
    /// Document source the target displays (e.g. a PDF URL)
    pub document: String,
    pub constraints: RenderConstraints,
}

/// Highest page index a pass may attach. Read-time payloads are indexed by
/// page, so an absurd index would blow up every snapshot.
pub const MAX_PAGE_INDEX: u32 = 10_000;

/// A page produced by a render pass
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    /// 1-based page index
    pub index: u32,
    pub layout: PageLayout,
}

/// Pages of one pass, in strictly increasing index order.
///
/// The stream ends after the last page. The first `Err` item fails the pass
/// and the rest of the stream is dropped.
pub type PageStream = BoxStream<'static, Result<RenderedPage, RenderError>>;

/// External page renderer.
///
/// Must be callable repeatedly for the same target; every call supersedes the
/// pages of the previous one.
pub trait PageRenderer: Send + Sync {
    fn render(&self, job: RenderJob) -> PageStream;
}
