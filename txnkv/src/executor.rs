use core::{pin::Pin, time::Duration};
use std::sync::Arc;

use txnkv_core::{MaybeSend, MaybeSendFuture, MaybeSync};

/// Minimal timer abstraction so lock-wait backoff does not depend on a concrete runtime.
pub trait Timer: MaybeSend + MaybeSync + 'static {
    /// Sleep for the given duration and yield back to the runtime.
    fn sleep(&self, dur: Duration) -> Pin<Box<dyn MaybeSendFuture<Output = ()>>>;
}

pub type TimerHandle = Arc<dyn Timer>;

impl<T> Timer for Arc<T>
where
    T: Timer + ?Sized,
{
    fn sleep(&self, dur: Duration) -> Pin<Box<dyn MaybeSendFuture<Output = ()>>> {
        (**self).sleep(dur)
    }
}

/// A blocking fallback for environments without an async runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingSleeper;

impl Timer for BlockingSleeper {
    fn sleep(&self, dur: Duration) -> Pin<Box<dyn MaybeSendFuture<Output = ()>>> {
        Box::pin(async move { std::thread::sleep(dur) })
    }
}

/// Timer that never sleeps.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTimer;

impl Timer for NoopTimer {
    fn sleep(&self, _dur: Duration) -> Pin<Box<dyn MaybeSendFuture<Output = ()>>> {
        Box::pin(async move {})
    }
}

/// The timer a client gets unless one is installed: [`TokioTimer`] when created inside a
/// Tokio runtime, [`BlockingSleeper`] otherwise.
pub(crate) fn ambient_timer() -> TimerHandle {
    #[cfg(feature = "tokio")]
    {
        if ::tokio::runtime::Handle::try_current().is_ok() {
            return Arc::new(TokioTimer);
        }
    }
    Arc::new(BlockingSleeper)
}

#[cfg(feature = "tokio")]
pub use self::tokio::TokioTimer;

#[cfg(feature = "tokio")]
mod tokio {
    use core::{pin::Pin, time::Duration};

    use txnkv_core::MaybeSendFuture;

    use super::Timer;

    /// Sleeps on the ambient Tokio runtime.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct TokioTimer;

    impl Timer for TokioTimer {
        fn sleep(&self, dur: Duration) -> Pin<Box<dyn MaybeSendFuture<Output = ()>>> {
            Box::pin(::tokio::time::sleep(dur))
        }
    }
}
