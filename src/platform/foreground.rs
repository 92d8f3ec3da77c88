/// Host foreground state, read synchronously on every accumulation tick

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag the host flips on visibility changes (tab hidden, app minimized).
#[derive(Debug, Clone)]
pub struct Foreground {
    visible: Arc<AtomicBool>,
}

impl Foreground {
    pub fn new(visible: bool) -> Self {
        Foreground {
            visible: Arc::new(AtomicBool::new(visible)),
        }
    }

    pub fn set(&self, visible: bool) {
        self.visible.store(visible, Ordering::Relaxed);
    }

    pub fn is_foreground(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }
}

impl Default for Foreground {
    fn default() -> Self {
        Self::new(true)
    }
}
