//! Callback throttling.
//!
//! Cross-tab signals arrive in bursts: one logout can reach a tab through a
//! storage change *and* a channel broadcast within milliseconds. Wrapping
//! the dispatch in a [`Throttle`] collapses repeated triggers inside the
//! window into one invocation.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

type Pending = Box<dyn FnOnce() + Send>;

/// Edge configuration for a [`Throttle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleOptions {
    /// Collapse window.
    pub window: Duration,
    /// Fire immediately when the window has elapsed.
    pub leading: bool,
    /// Fire the latest swallowed callback at the end of the window.
    pub trailing: bool,
}

impl ThrottleOptions {
    /// Leading-edge-only semantics: the first trigger in a window fires,
    /// later ones are dropped.
    #[must_use]
    pub const fn leading(window: Duration) -> Self {
        Self {
            window,
            leading: true,
            trailing: false,
        }
    }

    /// Trailing-edge-only semantics: triggers are deferred and only the
    /// latest one fires at the end of the window.
    #[must_use]
    pub const fn trailing(window: Duration) -> Self {
        Self {
            window,
            leading: false,
            trailing: true,
        }
    }
}

struct Inner {
    last_fire: Option<Instant>,
    pending: Option<Pending>,
}

/// A rate limiter collapsing repeated triggers within a window.
#[derive(Clone)]
pub struct Throttle {
    options: ThrottleOptions,
    inner: Arc<Mutex<Inner>>,
}

impl Throttle {
    /// Creates a throttle with the given edge configuration.
    #[must_use]
    pub fn new(options: ThrottleOptions) -> Self {
        Self {
            options,
            inner: Arc::new(Mutex::new(Inner {
                last_fire: None,
                pending: None,
            })),
        }
    }

    /// Triggers the throttle with `callback`.
    ///
    /// Leading edge: runs `callback` immediately when the window has
    /// elapsed since the last fire. Trailing edge: stores `callback`
    /// (latest wins) and runs it once the window closes. With both edges
    /// disabled every trigger is dropped.
    pub fn run<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let window_elapsed = inner
            .last_fire
            .is_none_or(|last| now.duration_since(last) >= self.options.window);

        if self.options.leading && window_elapsed {
            inner.last_fire = Some(now);
            drop(inner);
            callback();
            return;
        }

        if self.options.trailing {
            let already_armed = inner.pending.is_some();
            inner.pending = Some(Box::new(callback));
            if !already_armed {
                let delay = inner.last_fire.map_or(self.options.window, |last| {
                    self.options
                        .window
                        .saturating_sub(now.duration_since(last))
                });
                let slot = Arc::clone(&self.inner);
                drop(inner);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let pending = {
                        let mut inner =
                            slot.lock().unwrap_or_else(PoisonError::into_inner);
                        inner.last_fire = Some(Instant::now());
                        inner.pending.take()
                    };
                    if let Some(pending) = pending {
                        pending();
                    }
                });
            }
        }
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn leading_edge_collapses_burst_to_one() {
        let throttle = Throttle::new(ThrottleOptions::leading(Duration::from_secs(5)));
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let fired = Arc::clone(&fired);
            throttle.run(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn leading_edge_fires_again_after_window() {
        let throttle =
            Throttle::new(ThrottleOptions::leading(Duration::from_millis(20)));
        let fired = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&fired);
        throttle.run(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(40)).await;
        let f = Arc::clone(&fired);
        throttle.run(move || {
            f.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn trailing_edge_fires_latest_once() {
        let throttle =
            Throttle::new(ThrottleOptions::trailing(Duration::from_millis(20)));
        let fired = Arc::new(Mutex::new(Vec::new()));

        for label in ["a", "b", "c"] {
            let fired = Arc::clone(&fired);
            throttle.run(move || {
                fired.lock().unwrap().push(label);
            });
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(*fired.lock().unwrap(), vec!["c"]);
    }
}
