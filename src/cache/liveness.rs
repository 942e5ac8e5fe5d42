use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One activation of an observer.
///
/// Tokens handed out by [`Activation::token`] report live until the activation
/// is dropped. Dropping happens when the observer re-activates for a new
/// key or new dependencies, is deactivated, or goes away.
#[derive(Debug)]
pub struct Activation {
    live: Arc<AtomicBool>,
}

impl Activation {
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn token(&self) -> ActivationToken {
        ActivationToken {
            live: Arc::clone(&self.live),
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Activation {
    fn drop(&mut self) {
        self.live.store(false, Ordering::Release);
    }
}

/// Cheap handle a background fetch checks before writing consumer state.
#[derive(Debug, Clone)]
pub struct ActivationToken {
    live: Arc<AtomicBool>,
}

impl ActivationToken {
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}
