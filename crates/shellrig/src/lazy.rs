//! Lazy output batching.
//!
//! A [`LazyOut`] sits between the read engine and the caller's output
//! callback, accumulating lines and releasing them in batches instead of
//! per poll tick. Delivery happens when either the configured interval
//! elapses with pending lines or the accumulated byte size crosses the
//! configured threshold, whichever comes first.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::OnOutput;

/// Minimum ticker period; the interval divided by five, floored here.
const MIN_TICK: Duration = Duration::from_millis(10);

#[derive(Default)]
struct LazyState {
    on_out: Option<OnOutput>,
    lines: Vec<String>,
    byte_len: usize,
    /// Earliest instant an interval-driven flush may fire.
    next_tick: Option<Instant>,
    ticker: Option<JoinHandle<()>>,
}

struct Inner {
    interval: Duration,
    size: usize,
    state: Mutex<LazyState>,
}

/// Batches output lines and delivers them on interval or size triggers.
///
/// Cloning is cheap and shares the batch; the engine keeps one clone and
/// the ticker task another.
#[derive(Clone)]
pub struct LazyOut {
    inner: Arc<Inner>,
}

impl LazyOut {
    /// Create a batcher with the given flush interval and size threshold.
    /// A zero interval disables the ticker; a zero size disables the size
    /// trigger.
    #[must_use]
    pub fn new(interval: Duration, size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                interval,
                size,
                state: Mutex::new(LazyState::default()),
            }),
        }
    }

    /// Install the downstream callback and start the ticker task.
    ///
    /// Replacing the callback flushes pending lines to the previous one
    /// first.
    pub fn set_out(&self, on_out: OnOutput) {
        self.flush();
        let ticker = if self.inner.interval.is_zero() {
            None
        } else {
            // Hold only a weak handle so the ticker cannot keep the batch
            // alive after the last owner is gone.
            let weak = Arc::downgrade(&self.inner);
            let period = (self.inner.interval / 5).max(MIN_TICK);
            Some(tokio::spawn(async move {
                let mut tick = tokio::time::interval(period);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tick.tick().await;
                    let Some(inner) = weak.upgrade() else { return };
                    flush_if_due(&inner);
                }
            }))
        };

        let mut state = self.lock();
        state.on_out = Some(on_out);
        state.next_tick = Some(Instant::now() + self.inner.interval);
        if let Some(old) = std::mem::replace(&mut state.ticker, ticker) {
            old.abort();
        }
    }

    /// Append lines to the pending batch, flushing inline if the size
    /// threshold is crossed. A no-op before [`set_out`](Self::set_out).
    pub fn add(&self, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        let flushed = {
            let mut state = self.lock();
            if state.on_out.is_none() {
                return;
            }
            state.byte_len += lines.iter().map(String::len).sum::<usize>();
            state.lines.extend_from_slice(lines);
            if self.inner.size > 0 && state.byte_len >= self.inner.size {
                Some(take_batch(&self.inner, &mut state))
            } else {
                None
            }
        };
        if let Some((on_out, batch)) = flushed {
            on_out(&batch);
        }
    }

    /// Deliver all pending lines immediately.
    pub fn flush(&self) {
        let flushed = {
            let mut state = self.lock();
            (!state.lines.is_empty() && state.on_out.is_some())
                .then(|| take_batch(&self.inner, &mut state))
        };
        if let Some((on_out, batch)) = flushed {
            on_out(&batch);
        }
    }

    /// Stop the ticker and deliver anything still pending.
    pub fn stop(&self) {
        if let Some(ticker) = self.lock().ticker.take() {
            ticker.abort();
        }
        self.flush();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LazyState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn flush_if_due(inner: &Inner) {
    let flushed = {
        let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        let due = !state.lines.is_empty()
            && state.on_out.is_some()
            && state.next_tick.is_some_and(|t| Instant::now() >= t);
        due.then(|| take_batch(inner, &mut state))
    };
    if let Some((on_out, batch)) = flushed {
        on_out(&batch);
    }
}

/// Take the pending batch and reset the interval clock. Caller invokes the
/// callback outside the lock.
fn take_batch(inner: &Inner, state: &mut LazyState) -> (OnOutput, Vec<String>) {
    state.byte_len = 0;
    state.next_tick = Some(Instant::now() + inner.interval);
    let batch = std::mem::take(&mut state.lines);
    let on_out = state.on_out.clone().unwrap_or_else(|| Arc::new(|_: &[String]| {}));
    (on_out, batch)
}

impl Drop for LazyOut {
    fn drop(&mut self) {
        // Last clone out stops the ticker; intermediate clones leave it be.
        if Arc::strong_count(&self.inner) == 1 {
            if let Some(ticker) = self.lock().ticker.take() {
                ticker.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> (OnOutput, Arc<Mutex<Vec<Vec<String>>>>) {
        let batches: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        let on_out: OnOutput = Arc::new(move |lines: &[String]| {
            sink.lock().unwrap().push(lines.to_vec());
        });
        (on_out, batches)
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn add_before_set_out_is_dropped() {
        let lazy = LazyOut::new(Duration::from_millis(100), 0);
        lazy.add(&lines(&["ignored"]));
        let (on_out, batches) = collector();
        lazy.set_out(on_out);
        lazy.flush();
        assert!(batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn size_threshold_flushes_inline() {
        let lazy = LazyOut::new(Duration::from_secs(3600), 8);
        let (on_out, batches) = collector();
        lazy.set_out(on_out);

        lazy.add(&lines(&["abc"]));
        assert!(batches.lock().unwrap().is_empty());
        lazy.add(&lines(&["defgh"]));
        let got = batches.lock().unwrap().clone();
        assert_eq!(got, vec![lines(&["abc", "defgh"])]);
    }

    #[tokio::test]
    async fn interval_flushes_from_ticker() {
        let lazy = LazyOut::new(Duration::from_millis(50), 0);
        let (on_out, batches) = collector();
        lazy.set_out(on_out);

        lazy.add(&lines(&["a"]));
        lazy.add(&lines(&["b"]));
        tokio::time::sleep(Duration::from_millis(120)).await;

        let got = batches.lock().unwrap().clone();
        assert_eq!(got, vec![lines(&["a", "b"])]);
        lazy.stop();
    }

    #[tokio::test]
    async fn stop_delivers_pending() {
        let lazy = LazyOut::new(Duration::from_secs(3600), 0);
        let (on_out, batches) = collector();
        lazy.set_out(on_out);

        lazy.add(&lines(&["tail"]));
        lazy.stop();
        let got = batches.lock().unwrap().clone();
        assert_eq!(got, vec![lines(&["tail"])]);
    }

    #[tokio::test]
    async fn flush_resets_interval_clock() {
        let lazy = LazyOut::new(Duration::from_millis(200), 0);
        let (on_out, batches) = collector();
        lazy.set_out(on_out);

        lazy.add(&lines(&["x"]));
        lazy.flush();
        assert_eq!(batches.lock().unwrap().len(), 1);

        // Freshly added lines wait for a full interval again.
        lazy.add(&lines(&["y"]));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(batches.lock().unwrap().len(), 1);
        lazy.stop();
    }
}
