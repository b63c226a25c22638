//! Session lifecycle control.
//!
//! One session per process: the controller owns the engine instance, runs
//! its prepare/preload chain, and guarantees cleanup happens exactly once,
//! whether the chain settles on its own or a termination signal preempts
//! it. The two finalization paths are mutually excluded by a
//! single-assignment flag swapped before either body runs.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use preload_engine::{EngineError, PreloadEngine};

/// Termination signals the controller recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    Interrupt,
    Terminate,
}

impl TermSignal {
    /// Signal name for diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        }
    }

    fn as_nix(self) -> nix::sys::signal::Signal {
        match self {
            Self::Interrupt => nix::sys::signal::Signal::SIGINT,
            Self::Terminate => nix::sys::signal::Signal::SIGTERM,
        }
    }
}

/// How a session ended. In either case cleanup has already run (or was
/// skipped because the other path claimed it).
#[derive(Debug)]
pub enum SessionOutcome {
    /// The prepare/preload chain settled, successfully or with the
    /// captured phase error.
    Completed(Result<(), EngineError>),
    /// A termination signal preempted the chain. The caller re-delivers
    /// the same signal so the process dies by it.
    Interrupted(TermSignal),
}

/// Drives one engine instance through its lifecycle.
pub struct SessionController<E: PreloadEngine> {
    engine: Arc<E>,
    /// Set by whichever finalization path runs first; the other skips
    /// cleanup entirely.
    finalized: Arc<AtomicBool>,
}

impl<E: PreloadEngine> SessionController<E> {
    /// Creates a controller owning the engine.
    pub fn new(engine: E) -> Self {
        Self {
            engine: Arc::new(engine),
            finalized: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs the session until the phase chain settles or `signal`
    /// resolves, whichever happens first, then finalizes.
    ///
    /// The chain runs as a spawned task: a signal does not cancel an
    /// in-flight phase; it is left to settle on its own while cleanup
    /// proceeds, which the engine contract makes safe. Neither
    /// phase is ever retried. Cleanup completes before this returns.
    pub async fn run<S>(&self, signal: S) -> SessionOutcome
    where
        S: Future<Output = TermSignal>,
    {
        let engine = Arc::clone(&self.engine);
        let phases = tokio::spawn(async move {
            engine.prepare().await?;
            engine.preload().await
        });

        tokio::pin!(signal);
        tokio::select! {
            joined = phases => {
                let result = joined.unwrap_or_else(|e| {
                    Err(EngineError::State(format!("phase task died: {e}")))
                });
                self.finalize().await;
                SessionOutcome::Completed(result)
            }
            sig = &mut signal => {
                info!(signal = sig.name(), "termination signal received");
                self.finalize().await;
                SessionOutcome::Interrupted(sig)
            }
        }
    }

    /// Invokes cleanup unless the other path already claimed it.
    async fn finalize(&self) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.engine.cleanup().await {
            warn!(error = %e, "cleanup failed");
        }
    }
}

/// Resolves when the process receives SIGINT or SIGTERM.
pub async fn termination_signal() -> TermSignal {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = interrupt.recv() => TermSignal::Interrupt,
        _ = terminate.recv() => TermSignal::Terminate,
    }
}

/// Re-delivers a termination signal to the current process.
///
/// The default disposition is restored first, so the process dies by the
/// signal itself and a supervising parent observes the real termination
/// cause instead of an exit code.
pub fn redeliver(sig: TermSignal) -> ! {
    use nix::sys::signal::{raise, signal, SigHandler};

    let signo = sig.as_nix();
    unsafe {
        let _ = signal(signo, SigHandler::SigDfl);
    }
    let _ = raise(signo);
    // Only reachable if the signal could not be re-raised.
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// What a mock phase does when invoked.
    #[derive(Clone, Copy)]
    enum Behavior {
        Ok,
        FailDomain,
        FailState,
        /// Never settles; used to park a phase so a signal can preempt it.
        Hang,
    }

    #[derive(Default)]
    struct Calls {
        prepare: AtomicU32,
        preload: AtomicU32,
        cleanup: AtomicU32,
        order: Mutex<Vec<&'static str>>,
        prepare_entered: Notify,
        preload_entered: Notify,
    }

    struct MockEngine {
        calls: Arc<Calls>,
        prepare: Behavior,
        preload: Behavior,
        cleanup_fails: bool,
    }

    impl MockEngine {
        fn new(prepare: Behavior, preload: Behavior) -> (Self, Arc<Calls>) {
            let calls = Arc::new(Calls::default());
            (
                Self {
                    calls: Arc::clone(&calls),
                    prepare,
                    preload,
                    cleanup_fails: false,
                },
                calls,
            )
        }

        async fn act(behavior: Behavior) -> Result<(), EngineError> {
            match behavior {
                Behavior::Ok => Ok(()),
                Behavior::FailDomain => Err(EngineError::Domain("architecture mismatch".into())),
                Behavior::FailState => Err(EngineError::State("boom".into())),
                Behavior::Hang => std::future::pending().await,
            }
        }
    }

    #[async_trait]
    impl PreloadEngine for MockEngine {
        async fn prepare(&self) -> Result<(), EngineError> {
            self.calls.prepare.fetch_add(1, Ordering::SeqCst);
            self.calls.order.lock().unwrap().push("prepare");
            self.calls.prepare_entered.notify_one();
            Self::act(self.prepare).await
        }

        async fn preload(&self) -> Result<(), EngineError> {
            self.calls.preload.fetch_add(1, Ordering::SeqCst);
            self.calls.order.lock().unwrap().push("preload");
            self.calls.preload_entered.notify_one();
            Self::act(self.preload).await
        }

        async fn cleanup(&self) -> Result<(), EngineError> {
            self.calls.cleanup.fetch_add(1, Ordering::SeqCst);
            self.calls.order.lock().unwrap().push("cleanup");
            if self.cleanup_fails {
                Err(EngineError::State("cleanup failed".into()))
            } else {
                Ok(())
            }
        }
    }

    fn no_signal() -> std::future::Pending<TermSignal> {
        std::future::pending()
    }

    #[tokio::test]
    async fn test_success_without_signal_cleans_up_once() {
        let (engine, calls) = MockEngine::new(Behavior::Ok, Behavior::Ok);
        let controller = SessionController::new(engine);

        let outcome = controller.run(no_signal()).await;

        assert!(matches!(outcome, SessionOutcome::Completed(Ok(()))));
        assert_eq!(calls.cleanup.load(Ordering::SeqCst), 1);
        assert_eq!(
            *calls.order.lock().unwrap(),
            vec!["prepare", "preload", "cleanup"]
        );
    }

    #[tokio::test]
    async fn test_domain_error_in_prepare_skips_preload_cleans_up_once() {
        let (engine, calls) = MockEngine::new(Behavior::FailDomain, Behavior::Ok);
        let controller = SessionController::new(engine);

        let outcome = controller.run(no_signal()).await;

        match outcome {
            SessionOutcome::Completed(Err(EngineError::Domain(msg))) => {
                assert_eq!(msg, "architecture mismatch");
            }
            other => panic!("wrong outcome: {other:?}"),
        }
        assert_eq!(calls.preload.load(Ordering::SeqCst), 0);
        assert_eq!(calls.cleanup.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unexpected_error_in_preload_cleans_up_once() {
        let (engine, calls) = MockEngine::new(Behavior::Ok, Behavior::FailState);
        let controller = SessionController::new(engine);

        let outcome = controller.run(no_signal()).await;

        assert!(matches!(
            outcome,
            SessionOutcome::Completed(Err(EngineError::State(_)))
        ));
        assert_eq!(calls.cleanup.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_signal_during_prepare_cleans_up_once() {
        let (engine, calls) = MockEngine::new(Behavior::Hang, Behavior::Ok);
        let controller = SessionController::new(engine);

        let signal_calls = Arc::clone(&calls);
        let signal = async move {
            signal_calls.prepare_entered.notified().await;
            TermSignal::Interrupt
        };

        let outcome = controller.run(signal).await;

        assert!(matches!(
            outcome,
            SessionOutcome::Interrupted(TermSignal::Interrupt)
        ));
        assert_eq!(calls.preload.load(Ordering::SeqCst), 0);
        assert_eq!(calls.cleanup.load(Ordering::SeqCst), 1);
        // Cleanup completed before the outcome was returned.
        assert_eq!(*calls.order.lock().unwrap(), vec!["prepare", "cleanup"]);
    }

    #[tokio::test]
    async fn test_signal_during_preload_cleans_up_once() {
        let (engine, calls) = MockEngine::new(Behavior::Ok, Behavior::Hang);
        let controller = SessionController::new(engine);

        let signal_calls = Arc::clone(&calls);
        let signal = async move {
            signal_calls.preload_entered.notified().await;
            TermSignal::Terminate
        };

        let outcome = controller.run(signal).await;

        assert!(matches!(
            outcome,
            SessionOutcome::Interrupted(TermSignal::Terminate)
        ));
        assert_eq!(calls.prepare.load(Ordering::SeqCst), 1);
        assert_eq!(calls.preload.load(Ordering::SeqCst), 1);
        assert_eq!(calls.cleanup.load(Ordering::SeqCst), 1);
        assert_eq!(
            *calls.order.lock().unwrap(),
            vec!["prepare", "preload", "cleanup"]
        );
    }

    #[tokio::test]
    async fn test_finalized_flag_skips_normal_cleanup() {
        let (engine, calls) = MockEngine::new(Behavior::Ok, Behavior::Ok);
        let controller = SessionController::new(engine);
        // The signal path already claimed finalization.
        controller.finalized.store(true, Ordering::SeqCst);

        let outcome = controller.run(no_signal()).await;

        assert!(matches!(outcome, SessionOutcome::Completed(Ok(()))));
        assert_eq!(calls.cleanup.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_mask_outcome() {
        let (mut engine, calls) = MockEngine::new(Behavior::Ok, Behavior::Ok);
        engine.cleanup_fails = true;
        let controller = SessionController::new(engine);

        let outcome = controller.run(no_signal()).await;

        assert!(matches!(outcome, SessionOutcome::Completed(Ok(()))));
        assert_eq!(calls.cleanup.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_phase_error_still_surfaced_after_cleanup() {
        let (engine, calls) = MockEngine::new(Behavior::Ok, Behavior::FailDomain);
        let controller = SessionController::new(engine);

        let outcome = controller.run(no_signal()).await;

        match outcome {
            SessionOutcome::Completed(Err(EngineError::Domain(_))) => {}
            other => panic!("wrong outcome: {other:?}"),
        }
        // The captured error is surfaced only after cleanup finished.
        assert_eq!(
            *calls.order.lock().unwrap(),
            vec!["prepare", "preload", "cleanup"]
        );
    }
}
