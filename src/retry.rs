//! Bounded re-execution of transactional closures.
//!
//! [`retry`] runs a closure inside a transaction and re-runs it when
//! the commit loses the CAS race. Only
//! [`Error::Conflict`](crate::Error::Conflict) retries; every other
//! error rolls back and propagates immediately.

use crate::error::{Error, Result};
use crate::manager::Manager;
use std::time::{Duration, Instant};

/// Bounds on how long [`retry`] keeps re-executing.
///
/// Both bounds are optional; with neither set, conflicts retry
/// indefinitely.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy {
    retries: Option<u32>,
    timeout: Option<Duration>,
}

impl RetryPolicy {
    /// No bounds: retry until the commit succeeds.
    pub fn unbounded() -> Self {
        RetryPolicy::default()
    }

    /// Allow at most `retries` re-executions after the first attempt.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Stop retrying once `timeout` has elapsed.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Run `body` inside a transaction on `manager`, retrying on commit
/// conflicts within the policy's bounds.
///
/// The closure may run many times and must therefore be safe to
/// re-execute: derive everything from the manager's current state and
/// avoid irreversible side effects.
///
/// Fails with [`Error::RetryExhausted`] when the attempt bound is hit
/// and [`Error::RetryTimeout`] when the deadline passes.
pub fn retry<T>(
    manager: &Manager,
    policy: RetryPolicy,
    mut body: impl FnMut() -> Result<T>,
) -> Result<T> {
    let deadline = policy.timeout.map(|t| Instant::now() + t);
    let mut remaining = policy.retries;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let txn = manager.transaction();
        match body() {
            Ok(result) => match txn.commit() {
                Ok(()) => return Ok(result),
                Err(err) if err.is_conflict() => {}
                Err(err) => return Err(err),
            },
            // A conflict can surface inside the closure too, from an
            // explicit refreshing call; treat it the same way.
            Err(err) if err.is_conflict() => {
                txn.rollback();
            }
            Err(err) => {
                txn.rollback();
                return Err(err);
            }
        }

        if let Some(left) = remaining.as_mut() {
            if *left == 0 {
                return Err(Error::RetryExhausted { attempts });
            }
            *left -= 1;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(Error::RetryTimeout);
            }
        }
    }
}
