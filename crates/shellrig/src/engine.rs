//! The interactive read engine.
//!
//! An [`Engine`] owns one writable input stream plus line readers for
//! stdout and optionally stderr, and drives the polling loop that turns an
//! interactive session into a sequence of completed commands: write a
//! command, read until the end-of-output prompt is confirmed, answer any
//! interactive sub-prompts along the way through interceptors.
//!
//! A prompt-looking line is not trusted immediately. The loop requires the
//! match to persist for a configured number of consecutive poll ticks
//! before terminating, which absorbs the jitter where a prompt-shaped line
//! appears mid-output and more data follows.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::config::{OnOutput, ReadConfig};
use crate::error::{Error, Result};
use crate::intercept::{self, Interceptor, Reply, append_newline};
use crate::lazy::LazyOut;
use crate::line_reader::{LineReader, ReaderOptions, StreamEnd};
use crate::prompt::{DefaultPrompt, PromptMatcher};

/// A cooperative cancellation token for in-flight reads.
///
/// Cancellation latches: once triggered, every subsequent read on the
/// owning engine returns [`Error::Canceled`] at its next poll tick.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drives an interactive session over one input stream and one or two
/// output streams.
pub struct Engine {
    cfg: ReadConfig,
    input: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    out: Option<LineReader>,
    err: Option<LineReader>,
    lazy: Option<LazyOut>,
    /// Session-mutable end-prompt matchers; seeded from the configuration
    /// and possibly extended by auto-correction.
    end_prompt: Vec<Regex>,
    matcher: Arc<dyn PromptMatcher>,
    prompt: String,
    cancel: Arc<AtomicBool>,
}

impl Engine {
    /// Bind to a transport's streams and start the line reader pumps.
    #[must_use]
    pub fn new(
        input: Box<dyn AsyncWrite + Send + Unpin>,
        output: Box<dyn AsyncRead + Send + Unpin>,
        error_output: Option<Box<dyn AsyncRead + Send + Unpin>>,
        mut cfg: ReadConfig,
    ) -> Self {
        let out = LineReader::with_options(
            output,
            ReaderOptions {
                filter: cfg.filter.clone(),
                decoder: cfg.decoder.clone(),
                raw_out: cfg.raw_out.clone(),
            },
        );
        let err = error_output.map(|source| {
            LineReader::with_options(
                source,
                ReaderOptions {
                    filter: cfg.filter.clone(),
                    decoder: cfg.decoder.clone(),
                    raw_out: None,
                },
            )
        });
        let end_prompt = std::mem::take(&mut cfg.end_prompt);
        let lazy = cfg
            .lazy_enabled()
            .then(|| LazyOut::new(cfg.lazy_out_interval, cfg.lazy_out_size));
        Self {
            cfg,
            input: Some(input),
            out: Some(out),
            err,
            lazy,
            end_prompt,
            matcher: Arc::new(DefaultPrompt),
            prompt: String::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the default end-prompt detection strategy.
    pub fn set_matcher(&mut self, matcher: impl PromptMatcher + 'static) {
        self.matcher = Arc::new(matcher);
    }

    /// A handle that cancels in-flight and future reads on this engine.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    /// The most recently matched end-of-output prompt. Prompts can change
    /// shape mid-session; this always reflects the latest match.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Write a command, appending a trailing newline unless one is already
    /// present. An empty command becomes a bare newline.
    pub async fn write(&mut self, cmd: &str) -> Result<()> {
        self.write_raw(&append_newline(cmd)).await
    }

    /// Write bytes to the input stream verbatim.
    pub async fn write_raw(&mut self, data: &str) -> Result<()> {
        let Some(input) = self.input.as_mut() else {
            return Err(Error::Session("engine stopped".to_string()));
        };
        if data.is_empty() {
            return Ok(());
        }
        input.write_all(data.as_bytes()).await?;
        input.flush().await?;
        Ok(())
    }

    /// Read until an end-of-output prompt is confirmed or `timeout`
    /// elapses.
    pub async fn read_to_end_line(
        &mut self,
        timeout: Duration,
        on_out: Option<OnOutput>,
        interceptors: &[Arc<dyn Interceptor>],
    ) -> Result<()> {
        self.read(true, timeout, on_out, interceptors).await
    }

    /// Read until the output stream ends or `timeout` elapses, ignoring
    /// end-of-output prompts.
    pub async fn read_all(
        &mut self,
        timeout: Duration,
        on_out: Option<OnOutput>,
        interceptors: &[Arc<dyn Interceptor>],
    ) -> Result<()> {
        self.read(false, timeout, on_out, interceptors).await
    }

    /// The read loop. Per tick: drain the stdout reader, emit completed
    /// lines, answer interceptor matches, and track the end-prompt confirm
    /// counter. On stream end, drain residual stderr with the same confirm
    /// discipline; on timeout or cancellation, return immediately.
    pub async fn read(
        &mut self,
        stop_on_end_prompt: bool,
        timeout: Duration,
        mut on_out: Option<OnOutput>,
        interceptors: &[Arc<dyn Interceptor>],
    ) -> Result<()> {
        if let Some(hook) = self.cfg.before_read.as_mut() {
            hook()?;
        }

        let lazy = self.lazy.clone();
        if let (Some(lazy), Some(out)) = (&lazy, on_out.clone()) {
            lazy.set_out(out);
            let shared = lazy.clone();
            on_out = Some(Arc::new(move |lines: &[String]| shared.add(lines)));
        }

        let builtins: [Arc<dyn Interceptor>; 2] = [intercept::more(), intercept::press_any_key()];
        let read_confirm = self.cfg.confirm_count();
        let deadline = tokio::time::Instant::now() + timeout;
        let mut ticker = tokio::time::interval(self.cfg.confirm_wait());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut match_buf = String::new();
        let mut stop = false;
        let mut confirm: u32 = 0;
        let mut read_err: Option<Error> = None;

        loop {
            ticker.tick().await;
            if self.cancel.load(Ordering::Relaxed) {
                return Err(Error::Canceled);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
            let Some(out) = self.out.as_ref() else {
                return Err(Error::Session("engine stopped".to_string()));
            };

            let mut matched_prompt: Option<String> = None;
            let mut response: Option<String> = None;

            // A tick with no pending data leaves `stop` untouched, so a
            // dropped prompt fragment keeps confirming across silent ticks.
            let (_, end) = out.pop_lines(|lines, remaining| {
                stop = false;
                if !lines.is_empty() {
                    if let Some(on_out) = &on_out {
                        on_out(lines);
                    }
                }

                if !remaining.is_empty() && self.is_end_line(remaining) {
                    matched_prompt = Some(remaining.to_string());
                    stop = stop_on_end_prompt;
                    if self.cfg.show_prompt {
                        if let Some(on_out) = &on_out {
                            on_out(&[remaining.to_string()]);
                        }
                    }
                    return true;
                }

                // The multi-line buffer only exists for caller rules; the
                // built-ins need no more than the fragment, so a read with
                // no caller rules accumulates nothing.
                let mut matched: Option<Reply> = None;
                if !interceptors.is_empty() {
                    accumulate(&mut match_buf, lines, remaining);
                    for rule in interceptors {
                        if let Some(reply) = rule.intercept(&match_buf) {
                            matched = Some(reply);
                            break;
                        }
                    }
                }
                if matched.is_none() && !remaining.is_empty() {
                    for rule in &builtins {
                        if let Some(reply) = rule.intercept(remaining) {
                            matched = Some(reply);
                            break;
                        }
                    }
                }
                if let Some(reply) = matched {
                    match_buf.clear();
                    if reply.show_output && !remaining.is_empty() {
                        if let Some(on_out) = &on_out {
                            on_out(&[remaining.to_string()]);
                        }
                    }
                    response = Some(reply.response);
                    return true;
                }
                false
            });

            if let Some(prompt) = matched_prompt {
                if self.cfg.auto_prompt && self.end_prompt.is_empty() {
                    if let Some(re) = self.matcher.derive(&prompt) {
                        tracing::debug!(prompt = %prompt, pattern = %re, "end prompt matcher corrected");
                        self.end_prompt.push(re);
                    }
                }
                self.prompt = prompt;
            }
            if let Some(response) = response {
                if let Err(err) = self.write_raw(&response).await {
                    tracing::warn!(error = %err, "interceptor response write failed");
                }
            }
            if let Some(end) = end {
                if !end.is_benign() {
                    read_err = Some(Error::Read(end_message(&end)));
                }
                break;
            }

            if stop {
                confirm += 1;
                if confirm >= read_confirm {
                    break;
                }
            } else {
                confirm = 0;
            }
        }

        // Residual stderr is collected into one payload; surfacing it beats
        // silently losing a late error message from the session.
        let mut err_text = String::new();
        if let Some(err_reader) = self.err.as_ref() {
            let mut confirm: u32 = 0;
            loop {
                let (popped, end) = err_reader.pop_lines(|lines, remaining| {
                    accumulate(&mut err_text, lines, remaining);
                    true
                });
                if let Some(end) = end {
                    if !end.is_benign() && read_err.is_none() {
                        read_err = Some(Error::Read(end_message(&end)));
                    }
                    break;
                }
                if popped == 0 {
                    confirm += 1;
                    if confirm >= read_confirm {
                        break;
                    }
                } else {
                    confirm = 0;
                }
                tokio::time::sleep(self.cfg.confirm_wait()).await;
            }
        }
        if !err_text.is_empty() {
            read_err = Some(match read_err.take() {
                Some(prior) => Error::Read(format!("{err_text}\n{prior}")),
                None => Error::Read(err_text),
            });
        }

        if let Some(lazy) = &lazy {
            lazy.flush();
        }

        match read_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Whether `text` matches the current end-prompt rule. An explicit
    /// matcher list is authoritative and skips the default detector's
    /// false-positive guards.
    pub fn is_end_line(&self, text: &str) -> bool {
        if !self.end_prompt.is_empty() {
            return self.end_prompt.iter().any(|re| re.is_match(text));
        }
        self.matcher.matches(text)
    }

    /// Tear down the engine: stop the lazy batcher and line reader pumps
    /// and drop the input stream. Idempotent.
    pub fn stop(&mut self) {
        if let Some(lazy) = self.lazy.take() {
            lazy.stop();
        }
        if let Some(out) = self.out.take() {
            out.stop();
        }
        if let Some(err) = self.err.take() {
            err.stop();
        }
        self.input = None;
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Append drained lines and the remaining fragment to `buf`,
/// newline-separated, skipping empty pieces.
fn accumulate(buf: &mut String, lines: &[String], remaining: &str) {
    let pieces = lines
        .iter()
        .map(String::as_str)
        .chain((!remaining.is_empty()).then_some(remaining));
    for piece in pieces {
        if piece.is_empty() {
            continue;
        }
        if !buf.is_empty() {
            buf.push('\n');
        }
        buf.push_str(piece);
    }
}

fn end_message(end: &StreamEnd) -> String {
    match end {
        StreamEnd::Eof => "end of stream".to_string(),
        StreamEnd::Error(err) => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explicit_engine(patterns: &[&str]) -> Engine {
        let (_tx, rx) = tokio::io::duplex(64);
        let (tx2, _rx2) = tokio::io::duplex(64);
        let cfg = ReadConfig::new().end_prompt(
            patterns
                .iter()
                .map(|p| Regex::new(p).unwrap())
                .collect(),
        );
        Engine::new(Box::new(tx2), Box::new(rx), None, cfg)
    }

    #[tokio::test]
    async fn explicit_matcher_skips_default_guards() {
        // `Password:` is guarded out of the default detector but an
        // explicit matcher list is authoritative.
        let engine = explicit_engine(&[r"Password:\s*$"]);
        assert!(engine.is_end_line("Password: "));
        assert!(!engine.is_end_line("[root@localhost ~]#"));
    }

    #[tokio::test]
    async fn default_matcher_applies_guards() {
        let engine = explicit_engine(&[]);
        assert!(engine.is_end_line("[root@localhost ~]#"));
        assert!(!engine.is_end_line("Password: "));
    }

    #[tokio::test]
    async fn write_appends_newline() {
        let (tx, mut rx) = tokio::io::duplex(64);
        let (_tx2, rx2) = tokio::io::duplex(64);
        let mut engine = Engine::new(Box::new(tx), Box::new(rx2), None, ReadConfig::new());

        engine.write("ls -l").await.unwrap();
        engine.write("").await.unwrap();
        engine.write("pwd\n").await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = tokio::io::AsyncReadExt::read(&mut rx, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ls -l\n\npwd\n");
    }

    #[tokio::test]
    async fn stopped_engine_rejects_writes() {
        let mut engine = explicit_engine(&[]);
        engine.stop();
        engine.stop();
        let err = engine.write("ls").await.unwrap_err();
        assert_eq!(err.op(), "session");
    }

    #[tokio::test]
    async fn cancel_handle_latches() {
        let engine = explicit_engine(&[]);
        let handle = engine.cancel_handle();
        assert!(!handle.is_canceled());
        handle.cancel();
        assert!(handle.is_canceled());
        assert!(handle.clone().is_canceled());
    }

    #[test]
    fn accumulate_skips_empty_pieces() {
        let mut buf = String::new();
        accumulate(&mut buf, &["a".to_string(), String::new()], "frag");
        assert_eq!(buf, "a\nfrag");
        accumulate(&mut buf, &[], "");
        assert_eq!(buf, "a\nfrag");
    }
}
