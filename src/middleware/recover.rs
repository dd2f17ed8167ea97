//! Panic containment around the handler.
//!
//! [`guard`] polls the handler future under `catch_unwind` and turns the
//! result into an [`Outcome`]. One panic payload is special: [`AbortHandler`]
//! means the client is already gone, so it comes back as
//! [`Outcome::Aborted`] and the caller must resume unwinding with it.
//!
//! Stack traces come from a panic hook installed on first use. The hook runs
//! at the panic site, before unwinding. While [`guard`] is polling its future
//! it parks a backtrace in a thread-local that [`guard`] picks up on the same
//! thread; panics outside a guard capture nothing. The previous hook still
//! runs for every panic except [`AbortHandler`], which is silent.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::{self, Future};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use futures_util::FutureExt;

use crate::error::PanicError;
use crate::response::Response;

/// Panic payload that aborts the response without it being logged or
/// recovered. The connection serving the request is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortHandler;

/// Aborts the current request. Use when the client has gone away and no
/// response should be attempted.
pub fn abort() -> ! {
    panic::panic_any(AbortHandler)
}

/// How a guarded handler finished.
#[derive(Debug)]
pub enum Outcome {
    Completed(Response),
    Recovered { error: PanicError, stack: String },
    /// The [`AbortHandler`] payload, to be passed to
    /// [`std::panic::resume_unwind`].
    Aborted(Box<dyn Any + Send>),
}

thread_local! {
    static PANIC_STACK: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
    /// Number of guards currently polling on this thread.
    static ARMED: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as inside a guarded poll until dropped.
struct Armed;

impl Armed {
    fn enter() -> Self {
        ARMED.with(|depth| depth.set(depth.get() + 1));
        Armed
    }

    fn is_active() -> bool {
        ARMED.with(|depth| depth.get() > 0)
    }
}

impl Drop for Armed {
    fn drop(&mut self) {
        ARMED.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

static HOOK: Once = Once::new();

pub(crate) fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if info.payload().is::<AbortHandler>() {
                return;
            }
            if Armed::is_active() {
                PANIC_STACK.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            }
            previous(info);
        }));
    });
}

/// Runs `fut` to completion, containing any panic it raises.
pub async fn guard<F>(fut: F) -> Outcome
where
    F: Future<Output = Response>,
{
    install_hook();
    let mut caught = std::pin::pin!(AssertUnwindSafe(fut).catch_unwind());
    let result = future::poll_fn(|cx| {
        let _armed = Armed::enter();
        caught.as_mut().poll(cx)
    })
    .await;

    match result {
        Ok(res) => Outcome::Completed(res),
        Err(payload) if payload.is::<AbortHandler>() => Outcome::Aborted(payload),
        Err(payload) => {
            // Falls back to the recovery site if someone replaced our hook.
            let stack = PANIC_STACK
                .with(|slot| slot.borrow_mut().take())
                .unwrap_or_else(Backtrace::force_capture);
            Outcome::Recovered { error: PanicError::from_payload(payload), stack: stack.to_string() }
        }
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::error::BoxError;

    async fn exploding() -> Response {
        panic!("db pool exhausted")
    }

    async fn exploding_later() -> Response {
        tokio::task::yield_now().await;
        panic::panic_any(BoxError::from("late failure"))
    }

    async fn aborting() -> Response {
        abort()
    }

    fn exploding_unguarded() {
        panic!("outside any guard")
    }

    #[tokio::test]
    async fn completed_passes_response_through() {
        let outcome = guard(async { Response::status(StatusCode::ACCEPTED) }).await;
        match outcome {
            Outcome::Completed(res) => assert_eq!(res.status_code(), StatusCode::ACCEPTED),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn panic_is_recovered_with_stack() {
        let outcome = guard(exploding()).await;
        match outcome {
            Outcome::Recovered { error, stack } => {
                assert_eq!(error.to_string(), "db pool exhausted");
                assert!(!stack.is_empty());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn panic_after_await_is_recovered() {
        let outcome = guard(exploding_later()).await;
        assert!(matches!(outcome, Outcome::Recovered { error: PanicError::Error(_), .. }));
    }

    #[tokio::test]
    async fn abort_is_not_recovered() {
        let outcome = guard(aborting()).await;
        match outcome {
            Outcome::Aborted(payload) => assert!(payload.is::<AbortHandler>()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn unguarded_panics_park_no_stack() {
        install_hook();
        assert!(panic::catch_unwind(exploding_unguarded).is_err());
        assert!(PANIC_STACK.with(|slot| slot.borrow().is_none()));
    }

    #[tokio::test]
    async fn stack_slot_is_emptied_after_recovery() {
        let outcome = guard(exploding()).await;
        assert!(matches!(outcome, Outcome::Recovered { .. }));
        assert!(PANIC_STACK.with(|slot| slot.borrow().is_none()));
    }
}
