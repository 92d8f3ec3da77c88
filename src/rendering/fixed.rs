//! A renderer over pre-computed page geometry.
//!
//! Hosts that already know each document's page sizes (from an index or a
//! previous decode) can use this instead of a real rasterizer; it is also the
//! renderer the session tests drive.

use crate::rendering::{page_layout, PageRenderer, PageSize, PageStream, RenderJob, RenderedPage};
use crate::RenderError;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;

pub struct FixedPageRenderer {
    documents: HashMap<String, Vec<PageSize>>,
    fallback: Option<Vec<PageSize>>,
}

impl FixedPageRenderer {
    /// Renderer that knows no documents; every render fails until some are added.
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            fallback: None,
        }
    }

    /// Every document renders as `pages` pages of the same size.
    pub fn uniform(pages: u32, width: f64, height: f64) -> Self {
        Self {
            documents: HashMap::new(),
            fallback: Some(vec![PageSize { width, height }; pages as usize]),
        }
    }

    pub fn with_document(mut self, document: impl Into<String>, pages: Vec<PageSize>) -> Self {
        self.documents.insert(document.into(), pages);
        self
    }
}

impl Default for FixedPageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PageRenderer for FixedPageRenderer {
    fn render(&self, job: RenderJob) -> PageStream {
        let sizes = match self.documents.get(&job.document).or(self.fallback.as_ref()) {
            Some(sizes) => sizes.clone(),
            None => {
                let err = RenderError::Fetch(format!("unknown document {}", job.document));
                return stream::once(async move { Err::<RenderedPage, _>(err) }).boxed();
            }
        };
        if sizes.is_empty() {
            let err = RenderError::Decode(format!("{} has no pages", job.document));
            return stream::once(async move { Err::<RenderedPage, _>(err) }).boxed();
        }

        let constraints = job.constraints;
        stream::iter(sizes.into_iter().enumerate().map(move |(i, size)| {
            Ok(RenderedPage {
                index: i as u32 + 1,
                layout: page_layout(size, &constraints),
            })
        }))
        .boxed()
    }
}
