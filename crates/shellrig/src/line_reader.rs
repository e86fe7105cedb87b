//! Incremental line reading over a raw byte stream.
//!
//! A [`LineReader`] owns one readable transport endpoint and runs a
//! background pump that reads chunks, filters them, and splits the result
//! into complete decoded lines plus one trailing incomplete fragment. The
//! consumer drains it atomically through [`LineReader::pop_lines`].
//!
//! The tail after the last newline is held back undecoded and re-seeds the
//! raw buffer on the next read, so an escape sequence or line split across
//! two reads is retried whole.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::encoding::{Decoder, Utf8Lossy};
use crate::filter::{DefaultFilter, Filter};

/// Initial raw buffer size; doubled whenever a newline-less read fills it.
const INITIAL_BUF_SIZE: usize = 4096;

/// How the underlying stream terminated.
#[derive(Debug, Clone)]
pub enum StreamEnd {
    /// The stream reported end-of-file.
    Eof,
    /// The stream failed with an I/O error.
    Error(Arc<std::io::Error>),
}

impl StreamEnd {
    /// Whether this termination is a normal stream closure rather than a
    /// failure worth surfacing. Covers EOF plus the closed-pipe conditions
    /// transport cleanup races produce.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        match self {
            Self::Eof => true,
            Self::Error(err) => matches!(
                err.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
            ),
        }
    }
}

/// Options for constructing a [`LineReader`].
#[derive(Default)]
pub struct ReaderOptions {
    /// Control-character filter; defaults to [`DefaultFilter`].
    pub filter: Option<Arc<dyn Filter>>,
    /// Byte decoder; defaults to lossy UTF-8.
    pub decoder: Option<Arc<dyn Decoder>>,
    /// Mirror sink receiving every raw chunk before filtering.
    pub raw_out: Option<Arc<Mutex<dyn Write + Send>>>,
}

#[derive(Default)]
struct LineState {
    /// Completed lines accumulated since the last drain.
    lines: Vec<String>,
    /// Decoded text after the last newline seen so far.
    remaining: String,
    /// Byte length of the undecoded tail seeding the raw buffer; non-zero
    /// with an empty `remaining` means the consumer dropped the fragment
    /// and the seed must be skipped on the next read.
    remaining_offset: usize,
    /// Latched stream termination.
    end: Option<StreamEnd>,
}

/// Reads a byte stream into lines on a background task.
pub struct LineReader {
    state: Arc<Mutex<LineState>>,
    pump: JoinHandle<()>,
}

impl LineReader {
    /// Bind to a readable source with default options and start the pump.
    pub fn new<R>(source: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::with_options(source, ReaderOptions::default())
    }

    /// Bind to a readable source and start the pump.
    pub fn with_options<R>(source: R, options: ReaderOptions) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let state = Arc::new(Mutex::new(LineState::default()));
        let filter = options
            .filter
            .unwrap_or_else(|| Arc::new(DefaultFilter::new()));
        let decoder = options.decoder.unwrap_or_else(|| Arc::new(Utf8Lossy));
        let pump = tokio::spawn(pump(
            source,
            Arc::clone(&state),
            filter,
            decoder,
            options.raw_out,
        ));
        Self { state, pump }
    }

    /// Atomically drain completed lines and observe the remaining fragment.
    ///
    /// `consume` receives the pending lines and the current incomplete
    /// fragment; returning `true` drops the fragment so it is not
    /// re-offered on the next drain. Returns the number of items popped and
    /// the latched stream termination, if any. `consume` is not invoked
    /// when nothing is pending.
    pub fn pop_lines<F>(&self, consume: F) -> (usize, Option<StreamEnd>)
    where
        F: FnOnce(&[String], &str) -> bool,
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.lines.is_empty() && state.remaining.is_empty() {
            return (0, state.end.clone());
        }

        let drop_remaining = consume(&state.lines, &state.remaining);

        let mut popped = state.lines.len();
        state.lines.clear();
        if drop_remaining && !state.remaining.is_empty() {
            state.remaining.clear();
            popped += 1;
        }
        (popped, state.end.clone())
    }

    /// Stop the background pump. The latched state remains drainable.
    pub fn stop(&self) {
        self.pump.abort();
    }
}

impl Drop for LineReader {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump<R>(
    mut source: R,
    state: Arc<Mutex<LineState>>,
    filter: Arc<dyn Filter>,
    decoder: Arc<dyn Decoder>,
    raw_out: Option<Arc<Mutex<dyn Write + Send>>>,
) where
    R: AsyncRead + Send + Unpin,
{
    let mut buf = vec![0u8; INITIAL_BUF_SIZE];
    let mut offset = 0usize;
    loop {
        let n = match source.read(&mut buf[offset..]).await {
            Ok(0) => {
                latch(&state, StreamEnd::Eof);
                return;
            }
            Ok(n) => n,
            Err(err) => {
                latch(&state, StreamEnd::Error(Arc::new(err)));
                return;
            }
        };
        let size = offset + n;

        if let Some(sink) = &raw_out {
            let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(err) = sink.write_all(&buf[offset..size]) {
                tracing::warn!(error = %err, "raw mirror write failed");
            }
        }

        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);

        // If the consumer dropped the remaining fragment, the bytes that
        // seeded it must not be re-offered.
        let skip = if state.remaining.is_empty() && state.remaining_offset != 0 {
            std::mem::take(&mut state.remaining_offset)
        } else {
            0
        };

        let mut chunk = buf[skip..size].to_vec();
        filter.filter(&mut chunk);

        if let Some(i) = chunk.iter().rposition(|&b| b == b'\n') {
            let completed = decoder.decode(&chunk[..i]);
            if !completed.is_empty() {
                state.lines.extend(completed.split('\n').map(str::to_owned));
            }
            let tail = &chunk[i + 1..];
            state.remaining = decoder.decode(tail);
            buf[..tail.len()].copy_from_slice(tail);
            offset = tail.len();
        } else {
            // No newline: the whole chunk is the fragment. Grow the raw
            // buffer if this read filled it exactly to capacity.
            if size == buf.len() {
                buf.resize(size * 2, 0);
            }
            state.remaining = decoder.decode(&chunk);
            buf[..chunk.len()].copy_from_slice(&chunk);
            offset = chunk.len();
        }
        state.remaining_offset = offset;
    }
}

fn latch(state: &Mutex<LineState>, end: StreamEnd) {
    state
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .end
        .get_or_insert(end);
}
