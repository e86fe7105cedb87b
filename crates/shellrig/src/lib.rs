//! shellrig: Prompt-driven automation engine for interactive command-line sessions
//!
//! This crate drives line-oriented interactive programs (shells, device
//! CLIs, REPLs) over arbitrary byte-stream transports: write a command,
//! read until the end-of-output prompt is confirmed, answer interactive
//! sub-prompts automatically along the way.
//!
//! # Features
//!
//! - **Async-first design** with Tokio runtime
//! - **Control-character filtering**: backspace collapse, CR normalization,
//!   ANSI escape stripping, split-sequence safety across reads
//! - **Prompt detection** with a generic default heuristic, explicit
//!   matcher lists, and optional auto-correction from observed prompts
//! - **Interceptors** answering pagers, confirmation dialogs, and password
//!   prompts without a human in the loop
//! - **Lazy output batching** for chatty sessions
//! - **Session recording and replay** with byte-faithful chunk boundaries
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use shellrig::{CmdShell, ReadConfig};
//!
//! #[tokio::main]
//! async fn main() -> shellrig::Result<()> {
//!     let mut shell = CmdShell::spawn("bash", ["-i"], ReadConfig::new())?;
//!     shell.read_to_end_line(Duration::from_secs(5), None, &[]).await?;
//!     shell.write("uname -a").await?;
//!     let on_out = Arc::new(|lines: &[String]| {
//!         for line in lines {
//!             println!("{line}");
//!         }
//!     });
//!     shell.read_to_end_line(Duration::from_secs(30), Some(on_out), &[]).await?;
//!     shell.stop();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod filter;
pub mod intercept;
pub mod lazy;
pub mod line_reader;
pub mod prompt;
pub mod replay;
pub mod shell;

pub use config::{DEFAULT_READ_CONFIRM, DEFAULT_READ_CONFIRM_WAIT, OnOutput, PreReadHook, ReadConfig};
pub use encoding::{Decoder, Utf8Lossy};
pub use engine::{CancelHandle, Engine};
pub use error::{Error, Result};
pub use filter::{BareCr, DefaultFilter, Filter};
pub use intercept::{Interceptor, Reply, Scope};
pub use lazy::LazyOut;
pub use line_reader::{LineReader, ReaderOptions, StreamEnd};
pub use prompt::{DefaultPrompt, PromptMatcher, derive_prompt_regex, find_hostname};
pub use replay::{Replay, ReplayReader, ReplayWriter};
pub use shell::CmdShell;
