use std::panic::RefUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Deadline and cancellation state shared by every database call of one
/// runner operation.
///
/// Clones share the cancellation flag, so a clone handed to a signal handler
/// can abort work running on another thread.
#[derive(Debug, Clone)]
pub struct OpContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl OpContext {
    /// A context that never expires on its own.
    pub fn background() -> Self {
        Self {
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            // An unrepresentable deadline is as good as none.
            deadline: Instant::now().checked_add(timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|at| Instant::now() >= at)
    }

    /// Closure polled by SQLite while a statement runs; returning true
    /// interrupts the statement.
    pub(crate) fn interrupt_hook(
        &self,
    ) -> impl FnMut() -> bool + Send + RefUnwindSafe + 'static {
        let deadline = self.deadline;
        let cancelled = Arc::clone(&self.cancelled);
        move || {
            cancelled.load(Ordering::SeqCst) || deadline.is_some_and(|at| Instant::now() >= at)
        }
    }
}

impl Default for OpContext {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::OpContext;
    use std::time::Duration;

    #[test]
    fn background_context_never_expires() {
        let ctx = OpContext::background();
        assert!(!ctx.is_expired());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn zero_timeout_is_expired_immediately() {
        let ctx = OpContext::with_timeout(Duration::ZERO);
        assert!(ctx.is_expired());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let ctx = OpContext::with_timeout(Duration::from_secs(60));
        let handle = ctx.clone();
        assert!(!ctx.is_cancelled());

        handle.cancel();

        assert!(ctx.is_cancelled());
        assert!(!ctx.is_expired());
        let mut hook = ctx.interrupt_hook();
        assert!(hook());
    }
}
