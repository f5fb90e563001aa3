//! # Shutdown Coordination
//!
//! File: cli/src/server/shutdown.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! A process-wide registry of cleanup callbacks (closing listeners, mostly) that run
//! exactly once, whichever of SIGINT, SIGTERM or a normal exit gets there first.
//!
//! ## Architecture
//!
//! - `ShutdownRegistry` holds an atomic "already triggered" flag and the callback list.
//!   `trigger()` flips the flag with a compare-and-set, so only the first caller drains
//!   and runs the callbacks.
//! - `SignalSource` abstracts where termination signals come from. `OsSignals` listens to
//!   the real process signals; tests feed scripted signals instead.
//! - `watch` connects the two: the first signal triggers the registry, a second
//!   interrupt while shutdown is in progress asks the caller to exit immediately.
//!
//! ## Examples
//!
//! ```rust
//! let registry = ShutdownRegistry::global();
//! registry.register(move || {
//!     let _ = close_tx.send(());
//! });
//!
//! let signals = OsSignals::install()?;
//! if watch(registry, signals).await == Escalation::ForceExit {
//!     std::process::exit(0);
//! }
//! ```
//!
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, info, warn};

type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// Callbacks to run once when the process shuts down.
#[derive(Default)]
pub struct ShutdownRegistry {
    triggered: AtomicBool,
    callbacks: Mutex<Vec<Cleanup>>,
}

static GLOBAL_REGISTRY: OnceLock<ShutdownRegistry> = OnceLock::new();

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static ShutdownRegistry {
        GLOBAL_REGISTRY.get_or_init(ShutdownRegistry::new)
    }

    /// Adds a cleanup callback. If shutdown has already been triggered the callback
    /// runs immediately on the calling thread.
    pub fn register<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // Checked under the lock so a concurrent trigger cannot miss this callback.
        let mut callbacks = self.lock();
        if self.triggered.load(Ordering::Acquire) {
            drop(callbacks);
            debug!("Shutdown already in progress, running cleanup immediately");
            cleanup();
            return;
        }
        callbacks.push(Box::new(cleanup));
    }

    /// Runs every registered callback. Returns `true` for the call that actually ran
    /// them and `false` for every later call.
    pub fn trigger(&self) -> bool {
        // Only the caller that flips the flag runs the callbacks.
        if self
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // Take the list out before running it so a callback can register another.
        let callbacks = std::mem::take(&mut *self.lock());
        debug!("Running {} shutdown callback(s)", callbacks.len());
        for cleanup in callbacks {
            cleanup();
        }
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Cleanup>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The termination signals the server reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => f.write_str("SIGINT"),
            ShutdownSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// A stream of termination signals. `None` means no more signals will arrive.
pub trait SignalSource: Send {
    fn recv(&mut self) -> impl Future<Output = Option<ShutdownSignal>> + Send;
}

/// Termination signals delivered to this process.
pub struct OsSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl OsSignals {
    /// Installs the signal handlers. Must be called from within a Tokio runtime.
    pub fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }
}

impl SignalSource for OsSignals {
    async fn recv(&mut self) -> Option<ShutdownSignal> {
        #[cfg(unix)]
        {
            tokio::select! {
                received = self.interrupt.recv() => received.map(|_| ShutdownSignal::Interrupt),
                received = self.terminate.recv() => received.map(|_| ShutdownSignal::Terminate),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .ok()
                .map(|_| ShutdownSignal::Interrupt)
        }
    }
}

/// What `watch` wants the caller to do once it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// A second interrupt arrived during shutdown; exit now.
    ForceExit,
    /// The signal source is exhausted.
    SourceClosed,
}

/// # Watch Signals (`watch`)
///
/// Triggers `registry` on the first signal from `signals`. Later signals never run
/// the callbacks again; a later interrupt returns `Escalation::ForceExit`.
pub async fn watch<S: SignalSource>(registry: &ShutdownRegistry, mut signals: S) -> Escalation {
    while let Some(signal) = signals.recv().await {
        // The first signal (or an earlier normal exit) starts the graceful shutdown.
        if registry.trigger() {
            info!("Received {}, shutting down gracefully...", signal);
            continue;
        }
        // Already shutting down: a second Ctrl+C means the user is done waiting.
        match signal {
            ShutdownSignal::Interrupt => {
                warn!("Received {} during shutdown, forcing exit", signal);
                return Escalation::ForceExit;
            }
            ShutdownSignal::Terminate => {
                debug!("Ignoring {}, shutdown already in progress", signal);
            }
        }
    }
    Escalation::SourceClosed
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Replays a fixed list of signals, then reports the source as closed.
    struct ScriptedSignals(VecDeque<ShutdownSignal>);

    impl ScriptedSignals {
        fn new(signals: &[ShutdownSignal]) -> Self {
            Self(signals.iter().copied().collect())
        }
    }

    impl SignalSource for ScriptedSignals {
        async fn recv(&mut self) -> Option<ShutdownSignal> {
            self.0.pop_front()
        }
    }

    fn counting_callback(registry: &ShutdownRegistry) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        registry.register(move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn test_trigger_runs_each_callback_once() {
        let registry = ShutdownRegistry::new();
        let first = counting_callback(&registry);
        let second = counting_callback(&registry);

        assert!(registry.trigger());
        assert!(!registry.trigger());

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert!(registry.is_triggered());
    }

    #[test]
    fn test_register_after_trigger_runs_immediately() {
        let registry = ShutdownRegistry::new();
        registry.trigger();

        let late = counting_callback(&registry);
        assert_eq!(late.load(Ordering::SeqCst), 1);

        registry.trigger();
        assert_eq!(late.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_triggers_run_callbacks_once() {
        let registry = Arc::new(ShutdownRegistry::new());
        let count = counting_callback(&registry);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.trigger())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_interrupt_forces_exit() {
        let registry = ShutdownRegistry::new();
        let count = counting_callback(&registry);

        let outcome = watch(
            &registry,
            ScriptedSignals::new(&[ShutdownSignal::Interrupt, ShutdownSignal::Interrupt]),
        )
        .await;

        assert_eq!(outcome, Escalation::ForceExit);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interrupt_and_terminate_run_cleanup_once() {
        let registry = ShutdownRegistry::new();
        let count = counting_callback(&registry);

        let outcome = watch(
            &registry,
            ScriptedSignals::new(&[
                ShutdownSignal::Terminate,
                ShutdownSignal::Terminate,
            ]),
        )
        .await;

        assert_eq!(outcome, Escalation::SourceClosed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_watch_after_normal_exit_trigger() {
        let registry = ShutdownRegistry::new();
        let count = counting_callback(&registry);
        registry.trigger();

        let outcome = watch(&registry, ScriptedSignals::new(&[ShutdownSignal::Interrupt])).await;

        assert_eq!(outcome, Escalation::ForceExit);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_signal_display() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
    }
}
