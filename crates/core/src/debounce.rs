use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Quiet period used by input-driven requests.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct PendingCall<A> {
    args: A,
    due: Instant,
}

/// Coalesces bursts of calls into at most one execution per quiet window.
///
/// Only the most recently scheduled arguments ever come out. Time is read
/// from `tokio::time`, so a paused test runtime drives it deterministically.
#[derive(Debug, Clone)]
pub struct DebounceGate<A> {
    quiet_period: Duration,
    pending: Option<PendingCall<A>>,
}

impl<A> DebounceGate<A> {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            pending: None,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.due)
    }

    pub fn pending_args(&self) -> Option<&A> {
        self.pending.as_ref().map(|pending| &pending.args)
    }

    /// Schedules `args` after the gate's quiet period, replacing any pending
    /// call. Returns true when a pending call was replaced.
    pub fn schedule(&mut self, args: A) -> bool {
        self.schedule_with(args, self.quiet_period)
    }

    pub fn schedule_with(&mut self, args: A, quiet_period: Duration) -> bool {
        self.schedule_at(args, Instant::now() + quiet_period)
    }

    fn schedule_at(&mut self, args: A, due: Instant) -> bool {
        self.pending.replace(PendingCall { args, due }).is_some()
    }

    /// Drops the pending call, returning its arguments.
    pub fn cancel(&mut self) -> Option<A> {
        self.pending.take().map(|pending| pending.args)
    }

    /// Takes the pending call immediately, ignoring its deadline.
    pub fn flush(&mut self) -> Option<A> {
        self.cancel()
    }

    /// Takes the pending call when its deadline has passed at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<A> {
        let due = self.deadline()?;
        if due <= now { self.cancel() } else { None }
    }

    /// Resolves with the pending arguments once their deadline passes.
    ///
    /// Never resolves while nothing is scheduled. Cancel-safe: rescheduling
    /// between polls simply moves the deadline.
    pub async fn fire(&mut self) -> A {
        loop {
            let Some(due) = self.deadline() else {
                std::future::pending::<()>().await;
                continue;
            };

            sleep_until(due).await;
            if let Some(args) = self.take_due(Instant::now()) {
                return args;
            }
        }
    }

    /// Waits for the pending call and runs `call` with its arguments.
    pub async fn fire_with<R>(&mut self, call: impl FnOnce(A) -> R) -> R {
        let args = self.fire().await;
        call(args)
    }
}

impl<A> Default for DebounceGate<A> {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}
