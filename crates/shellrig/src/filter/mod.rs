//! Control-character filtering.
//!
//! Raw device output is full of terminal noise: backspace erasures, carriage
//! returns used as in-place line rewrites, ANSI/VT100 escape sequences, and
//! UTF-8 replacement characters from half-decoded multibyte content. The
//! [`Filter`] capability normalizes a raw chunk before it is decoded and
//! split into lines.
//!
//! Filters are stateless per call and never expand their input. Continuity
//! of sequences split across reads is guaranteed by the line reader, which
//! holds back the un-terminated tail of every chunk and re-offers it whole
//! on the next read; a filter therefore leaves anything it cannot finish
//! recognizing untouched.

mod ansi;
mod backspace;
mod crlf;

pub use crlf::BareCr;

/// Normalizes a raw byte chunk in place.
pub trait Filter: Send + Sync {
    /// Filter `data` in place. Must never grow the buffer.
    fn filter(&self, data: &mut Vec<u8>);
}

impl<F> Filter for F
where
    F: Fn(&mut Vec<u8>) + Send + Sync,
{
    fn filter(&self, data: &mut Vec<u8>) {
        self(data);
    }
}

/// The default control-character filter.
///
/// Applies, in order: backspace collapse, CR/LF normalization, ANSI/VT100
/// CSI stripping, and removal of UTF-8 replacement-character runs.
/// Malformed or incomplete escape sequences pass through unchanged.
#[derive(Debug, Clone, Copy)]
pub struct DefaultFilter {
    bare_cr: BareCr,
    double_cr: bool,
}

impl Default for DefaultFilter {
    fn default() -> Self {
        Self {
            bare_cr: BareCr::EraseLine,
            double_cr: false,
        }
    }
}

impl DefaultFilter {
    /// Create a filter with the default behaviors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how a bare `\r` (not followed by `\n`) is handled.
    #[must_use]
    pub const fn bare_cr(mut self, mode: BareCr) -> Self {
        self.bare_cr = mode;
        self
    }

    /// Collapse `\r\r\n` (optionally followed by a NUL) to a single `\n`.
    ///
    /// Some devices terminate every line this way; without the collapse the
    /// extra `\r` erases the line content under [`BareCr::EraseLine`].
    #[must_use]
    pub const fn collapse_double_cr(mut self, on: bool) -> Self {
        self.double_cr = on;
        self
    }
}

impl Filter for DefaultFilter {
    fn filter(&self, data: &mut Vec<u8>) {
        if data.is_empty() {
            return;
        }
        backspace::collapse(data);
        crlf::normalize(data, self.bare_cr, self.double_cr);
        ansi::strip(data);
    }
}

/// Remove the byte ranges in `drops` from `data`, shifting the remainder
/// left. Ranges must be ascending; out-of-bounds or overlapping entries are
/// skipped.
pub(crate) fn drop_ranges(data: &mut Vec<u8>, drops: &[(usize, usize)]) {
    if drops.is_empty() {
        return;
    }
    let len = data.len();
    let mut write = 0;
    let mut read = 0;
    for &(start, end) in drops {
        if end > len || start >= end || start < read {
            continue;
        }
        data.copy_within(read..start, write);
        write += start - read;
        read = end;
    }
    data.copy_within(read..len, write);
    write += len - read;
    data.truncate(write);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn run(filter: &DefaultFilter, input: &[u8]) -> Vec<u8> {
        let mut data = input.to_vec();
        filter.filter(&mut data);
        data
    }

    #[test]
    fn drop_ranges_basic() {
        let mut data = b"abcdef".to_vec();
        drop_ranges(&mut data, &[(1, 2), (3, 5)]);
        assert_eq!(data, b"acf");
    }

    #[test]
    fn drop_ranges_skips_invalid() {
        let mut data = b"abcdef".to_vec();
        drop_ranges(&mut data, &[(2, 2), (4, 99), (1, 3)]);
        assert_eq!(data, b"adef");
    }

    // Vectors shared with the device captures the defaults were built from.
    #[test]
    fn default_filter_vectors() {
        let cases: &[(&[u8], &[u8])] = &[
            (b"abcc\x08", b"abc"),
            (b"\x08abcc\x08cc\x08\x08", b"abc"),
            (b"\x1b[Kabc", b"abc"),
            (b"\x1b[2habc", b"abc"),
            (b"\x1b[?25labc", b"abc"),
            (b"\x1b[;1fabc", b"abc"),
            (b"\x1b[1;1fabc", b"abc"),
            (b"\x1b[1@abc", b"abc"),
            (b"\x1b[1Aabc", b"abc"),
            (b"\x1b[31mabc\x1b[0m", b"abc"),
            (b"\x1b[31;47mabc\x1b[0m", b"abc"),
            (b"\x1b[31:47mabc\x1b[0m", b"abc"),
            (b"abc$\x08\x08\x08\r\n\r", b"abc$\n"),
        ];
        let filter = DefaultFilter::new();
        for (input, expect) in cases {
            assert_eq!(
                run(&filter, input),
                expect.to_vec(),
                "input: {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn cursor_addressed_rewrite_is_flattened() {
        let input = "\u{1b}[80;1HCD_DA11F_MX01#\u{1b}[80;1H\u{1b}[80;17H";
        assert_eq!(
            run(&DefaultFilter::new(), input.as_bytes()),
            b"CD_DA11F_MX01#"
        );
    }

    #[test]
    fn incomplete_csi_is_preserved() {
        // No final byte yet; more bytes are assumed incoming.
        assert_eq!(run(&DefaultFilter::new(), b"abc\x1b[31"), b"abc\x1b[31");
        assert_eq!(run(&DefaultFilter::new(), b"abc\x1b"), b"abc\x1b");
    }

    #[test]
    fn non_csi_escape_passes_through() {
        assert_eq!(run(&DefaultFilter::new(), b"\x1b]0;titleabc"), b"\x1b]0;titleabc");
    }

    #[test]
    fn replacement_char_runs_are_removed() {
        let input = b"ab\xef\xbf\xbd\xef\xbf\xbdcd";
        assert_eq!(run(&DefaultFilter::new(), input), b"abcd");
    }

    #[test]
    fn double_cr_before_lf_erases_line() {
        // 32 33 35 0D 0D 0A -> 0A: the first CR is not followed by LF, so it
        // erases back to line start; the remaining CRLF collapses.
        assert_eq!(
            run(&DefaultFilter::new(), &[0x32, 0x33, 0x35, 0x0d, 0x0d, 0x0a]),
            vec![0x0a]
        );
    }

    #[test]
    fn crlf_mid_stream_erase() {
        let input = &[0x32, 0x0a, 0x33, 0x35, 0x0d, 0x0d, 0x36, 0x0d, 0x0a];
        assert_eq!(run(&DefaultFilter::new(), input), vec![0x32, 0x0a, 0x36, 0x0a]);
    }

    #[test]
    fn double_cr_collapse_quirk() {
        let filter = DefaultFilter::new().collapse_double_cr(true);
        assert_eq!(run(&filter, b"235\r\r\n"), b"235\n");
        assert_eq!(run(&filter, b"235\r\r\n\x00rest\n"), b"235\nrest\n");
    }

    #[test]
    fn bare_cr_modes() {
        let keep = DefaultFilter::new().bare_cr(BareCr::Keep);
        assert_eq!(run(&keep, b"ab\rcd\n"), b"ab\rcd\n");
        let strip = DefaultFilter::new().bare_cr(BareCr::Strip);
        assert_eq!(run(&strip, b"ab\rcd\n"), b"abcd\n");
        let erase = DefaultFilter::new().bare_cr(BareCr::EraseLine);
        assert_eq!(run(&erase, b"ab\rcd\n"), b"cd\n");
    }

    #[test]
    fn trailing_partial_line_is_untouched_by_cr_handling() {
        // The CR after the last newline may belong to a CRLF that has not
        // fully arrived; it is deferred to the next chunk.
        assert_eq!(run(&DefaultFilter::new(), b"done\nabc\r"), b"done\nabc\r");
    }

    proptest! {
        // Filtering is idempotent on already-clean text.
        #[test]
        fn filter_idempotent_on_clean_text(s in "[a-zA-Z0-9 .,:#>-]{0,64}(\n[a-zA-Z0-9 .,:#>-]{0,64}){0,4}") {
            let filter = DefaultFilter::new();
            let mut once = s.clone().into_bytes();
            filter.filter(&mut once);
            let mut twice = once.clone();
            filter.filter(&mut twice);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn filter_never_expands(input in proptest::collection::vec(any::<u8>(), 0..256)) {
            let filter = DefaultFilter::new();
            let mut data = input.clone();
            filter.filter(&mut data);
            prop_assert!(data.len() <= input.len());
        }
    }
}
