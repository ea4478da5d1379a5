//! Staggered connection attempts, after RFC 8305.
//!
//! Attempts start one at a time. When an attempt hasn't finished within the delay,
//! the next one starts alongside it, so a black-holed address can't hold up the
//! others. The first attempt to succeed wins and the rest are dropped.

use std::collections::VecDeque;
use std::future::Future;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt as _;
use tracing::trace;

/// Why no attempt succeeded.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StaggerError<E> {
    /// Every attempt failed. Carries the first failure.
    Failed(E),

    /// There was nothing to attempt.
    Exhausted,
}

/// A set of attempts raced with a start delay between them.
///
/// Without a delay, each attempt runs to completion before the next starts.
#[derive(Debug)]
pub(crate) struct Staggered<F, T, E> {
    queue: VecDeque<F>,
    running: FuturesUnordered<F>,
    delay: Option<Duration>,
    first_error: Option<E>,
    output: PhantomData<fn() -> T>,
}

impl<F, T, E> Staggered<F, T, E>
where
    F: Future<Output = Result<T, E>>,
{
    pub(crate) fn new(delay: Option<Duration>) -> Self {
        Self {
            queue: VecDeque::new(),
            running: FuturesUnordered::new(),
            delay,
            first_error: None,
            output: PhantomData,
        }
    }

    pub(crate) fn push(&mut self, attempt: F) {
        self.queue.push_back(attempt);
    }

    fn start_next(&mut self) -> bool {
        match self.queue.pop_front() {
            Some(attempt) => {
                self.running.push(attempt);
                true
            }
            None => false,
        }
    }

    /// Run until one attempt succeeds or all of them have failed.
    pub(crate) async fn finish(mut self) -> Result<T, StaggerError<E>> {
        loop {
            if self.running.is_empty() && !self.start_next() {
                break;
            }

            let outcome = match self.delay {
                Some(delay) if !self.queue.is_empty() => {
                    match tokio::time::timeout(delay, self.running.next()).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            trace!("attempt still pending, starting the next one");
                            self.start_next();
                            continue;
                        }
                    }
                }
                _ => self.running.next().await,
            };

            match outcome {
                Some(Ok(output)) => return Ok(output),
                Some(Err(error)) => {
                    trace!(remaining = self.running.len() + self.queue.len(), "attempt failed");
                    if self.first_error.is_none() {
                        self.first_error = Some(error);
                    }
                }
                None => {}
            }
        }

        Err(self
            .first_error
            .map_or(StaggerError::Exhausted, StaggerError::Failed))
    }
}

/// Reorder addresses so the families alternate, starting with the first address's.
pub(crate) fn interleave(addrs: Vec<SocketAddr>) -> Vec<SocketAddr> {
    let prefer_v6 = match addrs.first() {
        Some(first) => first.is_ipv6(),
        None => return addrs,
    };
    let (mut preferred, mut other): (VecDeque<_>, VecDeque<_>) =
        addrs.into_iter().partition(|addr| addr.is_ipv6() == prefer_v6);

    let mut ordered = Vec::with_capacity(preferred.len() + other.len());
    loop {
        match (preferred.pop_front(), other.pop_front()) {
            (None, None) => break,
            (a, b) => ordered.extend(a.into_iter().chain(b)),
        }
    }
    ordered
}
