//! Page geometry for a render pass: fit-to-width scaling plus backing store size

use crate::rendering::RenderConstraints;
use serde::{Deserialize, Serialize};

/// Unscaled page size in document units (PDF points for PDFs)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    /// Factor applied to the base page size
    pub scale: f64,
    /// Page box size in CSS px, rounded up
    pub css_width: f64,
    pub css_height: f64,
    /// Canvas backing store size in device pixels, rounded down
    pub canvas_width: u32,
    pub canvas_height: u32,
}

/// Fit a page to the available width.
///
/// Without a usable width sample the page keeps its base size. The canvas is
/// oversampled by the device pixel ratio so it stays sharp on dense screens.
pub fn page_layout(base: PageSize, constraints: &RenderConstraints) -> PageLayout {
    let available = if constraints.width > 0.0 {
        constraints.width
    } else {
        base.width
    };
    let (scale, width) = if base.width > 0.0 {
        (available / base.width, available)
    } else {
        (1.0, base.width)
    };
    let height = base.height * scale;

    let dpr = if constraints.device_pixel_ratio > 0.0 {
        constraints.device_pixel_ratio
    } else {
        1.0
    };

    PageLayout {
        scale,
        css_width: width.ceil(),
        css_height: height.ceil(),
        canvas_width: (width * dpr).floor() as u32,
        canvas_height: (height * dpr).floor() as u32,
    }
}
