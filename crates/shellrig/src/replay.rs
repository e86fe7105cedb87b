//! Session recording and byte-faithful replay.
//!
//! A recording is a flat file of raw session bytes as originally received,
//! followed by a trailer: a fixed marker line, then whitespace-separated
//! integers (wrapped at 16 per line) recording the byte count of each
//! original read call. A [`ReplayReader`] serves the data back one recorded
//! chunk per read, reproducing the exact chunk boundaries the live session
//! produced, which is what makes recordings useful for exercising the
//! split-sequence paths of the filter and line reader.
//!
//! Plug a [`ReplayWriter`] into [`ReadConfig::raw_out`] to record a live
//! session, then drive a [`Replay`] over the file.

use std::fs::File;
use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};

use crate::config::{OnOutput, ReadConfig};
use crate::engine::Engine;
use crate::error::{Error, Result};

const META_MARKER: &str = ">>>>>>>> bytes per read >>>>>>>>";
const COUNTS_PER_LINE: usize = 16;

/// Records raw session bytes plus per-write chunk sizes.
///
/// Implements [`std::io::Write`] so it can serve as the engine's raw
/// mirror sink; each `write` call is assumed to carry exactly one
/// transport read's worth of bytes.
pub struct ReplayWriter {
    data: Option<File>,
    sizes: Vec<usize>,
}

impl ReplayWriter {
    /// Create the recording file, creating parent directories as needed.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = File::create(path)?;
        Ok(Self {
            data: Some(data),
            sizes: Vec::new(),
        })
    }

    /// Append the trailer and close the file. A writer that is never
    /// finished leaves a plain data file with no trailer.
    pub fn finish(&mut self) -> Result<()> {
        let Some(mut data) = self.data.take() else {
            return Ok(());
        };
        data.write_all(trailer(&self.sizes).as_bytes())?;
        data.flush()?;
        Ok(())
    }
}

impl Write for ReplayWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let Some(data) = self.data.as_mut() else {
            return Ok(buf.len());
        };
        data.write_all(buf)?;
        if !buf.is_empty() {
            self.sizes.push(buf.len());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.data.as_mut() {
            Some(data) => data.flush(),
            None => Ok(()),
        }
    }
}

fn trailer(sizes: &[usize]) -> String {
    let counts = sizes
        .chunks(COUNTS_PER_LINE)
        .map(|chunk| {
            chunk
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n\n\n\n{META_MARKER}\n{counts}")
}

/// Serves a recording back with the original chunk boundaries.
///
/// Each read returns at most one recorded chunk; a chunk larger than the
/// caller's buffer is split and the remainder carried into the next read.
/// A file without a trailer is served in buffer-sized chunks.
pub struct ReplayReader {
    data: Vec<u8>,
    pos: usize,
    counts: Vec<usize>,
    cursor: usize,
    has_trailer: bool,
}

impl ReplayReader {
    /// Load a recording from disk and parse its trailer.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let (counts, has_trailer) = parse_trailer(&bytes)?;
        Ok(Self {
            data: bytes,
            pos: 0,
            counts,
            cursor: 0,
            has_trailer,
        })
    }
}

fn parse_trailer(bytes: &[u8]) -> Result<(Vec<usize>, bool)> {
    let text = String::from_utf8_lossy(bytes);
    let Some(i) = text.rfind(META_MARKER) else {
        return Ok((Vec::new(), false));
    };
    let mut counts = Vec::new();
    for token in text[i + META_MARKER.len()..].split_whitespace() {
        let n: usize = token
            .parse()
            .map_err(|_| Error::Read(format!("malformed replay trailer near {token:?}")))?;
        counts.push(n);
    }
    Ok((counts, true))
}

impl AsyncRead for ReplayReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();

        if !this.has_trailer {
            let n = buf.remaining().min(this.data.len() - this.pos);
            buf.put_slice(&this.data[this.pos..this.pos + n]);
            this.pos += n;
            return Poll::Ready(Ok(()));
        }

        // Skip zero-length entries so they are not mistaken for EOF.
        while this.cursor < this.counts.len() && this.counts[this.cursor] == 0 {
            this.cursor += 1;
        }
        if this.cursor >= this.counts.len() {
            return Poll::Ready(Ok(()));
        }

        let mut want = this.counts[this.cursor];
        let cap = buf.remaining();
        if want > cap {
            this.counts[this.cursor] = want - cap;
            want = cap;
        } else {
            this.cursor += 1;
        }
        let want = want.min(this.data.len() - this.pos);
        buf.put_slice(&this.data[this.pos..this.pos + want]);
        this.pos += want;
        Poll::Ready(Ok(()))
    }
}

/// Replays a recorded session through a full read engine.
pub struct Replay {
    engine: Engine,
}

impl Replay {
    /// Open a recording and bind an engine over it. The engine's input
    /// stream discards writes, so interceptor responses are harmless.
    pub fn open(path: impl AsRef<Path>, cfg: ReadConfig) -> Result<Self> {
        let reader = ReplayReader::open(path)?;
        let engine = Engine::new(Box::new(tokio::io::sink()), Box::new(reader), None, cfg);
        Ok(Self { engine })
    }

    /// Play the whole recording, delivering lines to `on_out`.
    pub async fn play(&mut self, timeout: Duration, on_out: Option<OnOutput>) -> Result<()> {
        self.engine.read_all(timeout, on_out, &[]).await
    }

    /// Tear down the underlying engine.
    pub fn stop(&mut self) {
        self.engine.stop();
    }
}

impl Deref for Replay {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        &self.engine
    }
}

impl DerefMut for Replay {
    fn deref_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
}
