use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Lifecycle of the bridge process. `Stopping` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Stopping,
}

/// Why the process is about to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `DELETE /bridge` was accepted and its response delivered.
    ShutdownRequested,
    /// An OS signal forced termination.
    Signal(&'static str),
    /// No request arrived within the configured idle period.
    IdleTimeout,
    /// The control server ended on its own.
    ServerStopped,
    /// The accepted trigger was dropped without ever firing.
    Abandoned,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::ShutdownRequested => write!(f, "shutdown requested"),
            ExitReason::Signal(name) => write!(f, "received {}", name),
            ExitReason::IdleTimeout => write!(f, "idle timeout"),
            ExitReason::ServerStopped => write!(f, "control server stopped"),
            ExitReason::Abandoned => write!(f, "stop trigger abandoned"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRequest {
    pub code: i32,
    pub reason: ExitReason,
}

/// The one-shot permission to end the process. Exactly one exists per
/// bridge and it is handed out by the single accepted stop.
#[derive(Debug)]
pub struct ExitTrigger {
    tx: oneshot::Sender<ExitRequest>,
}

impl ExitTrigger {
    pub fn fire(self, code: i32, reason: ExitReason) {
        debug!(code, %reason, "exit trigger fired");
        if self.tx.send(ExitRequest { code, reason }).is_err() {
            warn!("exit listener is gone; nobody will act on the exit request");
        }
    }
}

/// Resolves once the exit trigger fires.
#[derive(Debug)]
pub struct ExitListener {
    rx: oneshot::Receiver<ExitRequest>,
}

impl ExitListener {
    pub async fn wait(&mut self) -> ExitRequest {
        match (&mut self.rx).await {
            Ok(request) => request,
            Err(_) => ExitRequest {
                code: 1,
                reason: ExitReason::Abandoned,
            },
        }
    }
}

/// Outcome of a stop request.
#[derive(Debug)]
pub enum StopDecision {
    /// This caller moved the bridge from Running to Stopping and now owns the
    /// exit trigger.
    Accepted(ExitTrigger),
    AlreadyStopping,
}

impl StopDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, StopDecision::Accepted(_))
    }
}

#[derive(Debug)]
struct Gate {
    state: ProcessState,
    trigger: Option<ExitTrigger>,
}

/// Mutual-exclusion guard around the Running → Stopping transition.
#[derive(Debug)]
pub struct ShutdownGate {
    inner: Mutex<Gate>,
}

impl ShutdownGate {
    pub fn new() -> (Self, ExitListener) {
        let (tx, rx) = oneshot::channel();
        let gate = Self {
            inner: Mutex::new(Gate {
                state: ProcessState::Running,
                trigger: Some(ExitTrigger { tx }),
            }),
        };
        (gate, ExitListener { rx })
    }

    fn lock(&self) -> MutexGuard<'_, Gate> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> ProcessState {
        self.lock().state
    }

    /// Attempt the transition and hand the decision to `respond` while still
    /// holding the lock, so the caller's response is built before any other
    /// stop request is decided.
    pub fn respond_to_stop<R>(&self, respond: impl FnOnce(StopDecision) -> R) -> R {
        let mut gate = self.lock();
        let decision = match (gate.state, gate.trigger.take()) {
            (ProcessState::Running, Some(trigger)) => {
                gate.state = ProcessState::Stopping;
                StopDecision::Accepted(trigger)
            }
            _ => {
                gate.state = ProcessState::Stopping;
                StopDecision::AlreadyStopping
            }
        };
        respond(decision)
    }

    pub fn request_stop(&self) -> StopDecision {
        self.respond_to_stop(|decision| decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn starts_running() {
        let (gate, _listener) = ShutdownGate::new();
        assert_eq!(gate.state(), ProcessState::Running);
    }

    #[test]
    fn only_first_request_is_accepted() {
        let (gate, _listener) = ShutdownGate::new();
        assert!(gate.request_stop().is_accepted());
        assert_eq!(gate.state(), ProcessState::Stopping);
        for _ in 0..5 {
            assert!(matches!(gate.request_stop(), StopDecision::AlreadyStopping));
        }
        assert_eq!(gate.state(), ProcessState::Stopping);
    }

    #[test]
    fn concurrent_requests_accept_exactly_once() {
        for _ in 0..50 {
            let (gate, _listener) = ShutdownGate::new();
            let gate = Arc::new(gate);
            let accepted = Arc::new(AtomicUsize::new(0));
            let barrier = Arc::new(std::sync::Barrier::new(8));

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let gate = Arc::clone(&gate);
                    let accepted = Arc::clone(&accepted);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        if gate.request_stop().is_accepted() {
                            accepted.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            assert_eq!(accepted.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn respond_runs_under_the_lock() {
        let (gate, _listener) = ShutdownGate::new();
        let observed = gate.respond_to_stop(|decision| {
            // The gate is still held: a nested attempt would deadlock, so
            // only the lock-free view is checked here.
            assert!(gate.inner.try_lock().is_err());
            decision.is_accepted()
        });
        assert!(observed);
    }

    #[tokio::test]
    async fn fired_trigger_reaches_listener() {
        let (gate, mut listener) = ShutdownGate::new();
        let StopDecision::Accepted(trigger) = gate.request_stop() else {
            panic!("first stop must be accepted");
        };
        trigger.fire(0, ExitReason::ShutdownRequested);

        let request = listener.wait().await;
        assert_eq!(request.code, 0);
        assert_eq!(request.reason, ExitReason::ShutdownRequested);
    }

    #[tokio::test]
    async fn dropped_trigger_resolves_as_abandoned() {
        let (gate, mut listener) = ShutdownGate::new();
        drop(gate.request_stop());

        let request = listener.wait().await;
        assert_eq!(request.reason, ExitReason::Abandoned);
        assert_ne!(request.code, 0);
    }
}
