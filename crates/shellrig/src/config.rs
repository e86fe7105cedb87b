//! Read engine configuration.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;

use crate::encoding::Decoder;
use crate::error::Result;
use crate::filter::Filter;

/// Callback receiving batches of completed output lines.
///
/// Shared behind an `Arc` because the lazy output batcher may invoke it
/// from its own ticker task.
pub type OnOutput = Arc<dyn Fn(&[String]) + Send + Sync>;

/// Hook invoked once before the first poll tick of a read.
pub type PreReadHook = Box<dyn FnMut() -> Result<()> + Send>;

/// Configuration for the interactive read engine.
///
/// Immutable after construction; the only session-mutable piece of state it
/// seeds is the end-prompt matcher list, which the engine may extend through
/// prompt auto-correction.
#[derive(Default)]
pub struct ReadConfig {
    /// Mirror sink receiving raw transport bytes before filtering, for
    /// upper-layer debugging or session recording.
    pub raw_out: Option<Arc<Mutex<dyn Write + Send>>>,

    /// Control-character filter override; defaults to
    /// [`DefaultFilter`](crate::filter::DefaultFilter).
    pub filter: Option<Arc<dyn Filter>>,

    /// Byte decoder override; defaults to lossy UTF-8.
    pub decoder: Option<Arc<dyn Decoder>>,

    /// Explicit end-prompt matchers. Empty means use the default detector.
    pub end_prompt: Vec<Regex>,

    /// Auto-correct the end-prompt matcher from the first default-detector
    /// match. Only effective while `end_prompt` is empty; the derived
    /// matcher can be less flexible than the default rule, so prefer an
    /// explicit matcher when the prompt is known.
    pub auto_prompt: bool,

    /// Emit the matched end-prompt line to the output callback.
    pub show_prompt: bool,

    /// Consecutive confirming poll ticks required before an end-prompt
    /// match terminates a read. Zero means the default of 3.
    pub read_confirm: u32,

    /// Poll interval between ticks. Zero means the default of 20ms.
    pub read_confirm_wait: Duration,

    /// Hook invoked before the read loop starts.
    pub before_read: Option<PreReadHook>,

    /// Flush batched output after this interval instead of immediately.
    /// Enables lazy batching together with `lazy_out_size`.
    pub lazy_out_interval: Duration,

    /// Flush batched output once the accumulated line bytes reach this
    /// size. Enables lazy batching together with `lazy_out_interval`.
    pub lazy_out_size: usize,
}

/// Default confirm count.
pub const DEFAULT_READ_CONFIRM: u32 = 3;

/// Default poll interval.
pub const DEFAULT_READ_CONFIRM_WAIT: Duration = Duration::from_millis(20);

impl ReadConfig {
    /// Create a configuration with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the raw mirror sink.
    #[must_use]
    pub fn raw_out(mut self, sink: impl Write + Send + 'static) -> Self {
        self.raw_out = Some(Arc::new(Mutex::new(sink)));
        self
    }

    /// Set the control-character filter.
    #[must_use]
    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Set the byte decoder.
    #[must_use]
    pub fn decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    /// Set explicit end-prompt matchers.
    #[must_use]
    pub fn end_prompt(mut self, matchers: Vec<Regex>) -> Self {
        self.end_prompt = matchers;
        self
    }

    /// Enable or disable prompt auto-correction.
    #[must_use]
    pub const fn auto_prompt(mut self, on: bool) -> Self {
        self.auto_prompt = on;
        self
    }

    /// Reveal matched end-prompt lines to the output callback.
    #[must_use]
    pub const fn show_prompt(mut self, on: bool) -> Self {
        self.show_prompt = on;
        self
    }

    /// Set the confirm count.
    #[must_use]
    pub const fn read_confirm(mut self, count: u32) -> Self {
        self.read_confirm = count;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn read_confirm_wait(mut self, wait: Duration) -> Self {
        self.read_confirm_wait = wait;
        self
    }

    /// Set the pre-read hook.
    #[must_use]
    pub fn before_read(mut self, hook: impl FnMut() -> Result<()> + Send + 'static) -> Self {
        self.before_read = Some(Box::new(hook));
        self
    }

    /// Enable lazy output batching.
    #[must_use]
    pub const fn lazy_out(mut self, interval: Duration, size: usize) -> Self {
        self.lazy_out_interval = interval;
        self.lazy_out_size = size;
        self
    }

    pub(crate) fn confirm_count(&self) -> u32 {
        if self.read_confirm == 0 {
            DEFAULT_READ_CONFIRM
        } else {
            self.read_confirm
        }
    }

    pub(crate) fn confirm_wait(&self) -> Duration {
        if self.read_confirm_wait.is_zero() {
            DEFAULT_READ_CONFIRM_WAIT
        } else {
            self.read_confirm_wait
        }
    }

    pub(crate) fn lazy_enabled(&self) -> bool {
        !self.lazy_out_interval.is_zero() || self.lazy_out_size > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_fall_back_to_defaults() {
        let cfg = ReadConfig::new();
        assert_eq!(cfg.confirm_count(), DEFAULT_READ_CONFIRM);
        assert_eq!(cfg.confirm_wait(), DEFAULT_READ_CONFIRM_WAIT);
        assert!(!cfg.lazy_enabled());
    }

    #[test]
    fn builder_round_trip() {
        let cfg = ReadConfig::new()
            .auto_prompt(true)
            .show_prompt(true)
            .read_confirm(5)
            .read_confirm_wait(Duration::from_millis(50))
            .lazy_out(Duration::from_millis(200), 4096);
        assert!(cfg.auto_prompt);
        assert!(cfg.show_prompt);
        assert_eq!(cfg.confirm_count(), 5);
        assert_eq!(cfg.confirm_wait(), Duration::from_millis(50));
        assert!(cfg.lazy_enabled());
    }
}
