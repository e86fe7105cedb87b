//! CR/LF normalization.

/// How a bare `\r` (one not followed by `\n`) is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BareCr {
    /// Leave the `\r` in place.
    Keep,
    /// Remove the `\r` only.
    Strip,
    /// The terminal interpretation: the cursor returns to column zero and
    /// subsequent text overwrites the line, so erase back to line start.
    #[default]
    EraseLine,
}

/// Normalize carriage returns in place: `\r\n` becomes `\n`, bare `\r`
/// follows `mode`, and with `double_cr` set, `\r\r\n` (optionally followed
/// by a NUL) collapses to a single `\n`.
///
/// Only content up to the last newline is processed; a trailing `\r` may be
/// the first half of a CRLF that has not fully arrived, so anything after
/// the final newline is deferred untouched to the next chunk.
pub(crate) fn normalize(data: &mut Vec<u8>, mode: BareCr, double_cr: bool) {
    let Some(last_nl) = data.iter().rposition(|&b| b == b'\n') else {
        return;
    };
    let boundary = last_nl + 1;

    let mut write = 0;
    let mut line_start = 0;
    let mut read = 0;
    while read < boundary {
        match data[read] {
            b'\r' if read + 1 < boundary && data[read + 1] == b'\n' => {
                read += 1; // drop the \r, the \n is written next pass
            }
            b'\r' if double_cr
                && read + 2 < boundary
                && data[read + 1] == b'\r'
                && data[read + 2] == b'\n' =>
            {
                data[write] = b'\n';
                write += 1;
                line_start = write;
                read += 3;
                if read < boundary && data[read] == b'\x00' {
                    read += 1;
                }
            }
            b'\r' => {
                match mode {
                    BareCr::Keep => {
                        data[write] = b'\r';
                        write += 1;
                    }
                    BareCr::Strip => {}
                    BareCr::EraseLine => write = line_start,
                }
                read += 1;
            }
            b'\n' => {
                data[write] = b'\n';
                write += 1;
                line_start = write;
                read += 1;
            }
            b => {
                data[write] = b;
                write += 1;
                read += 1;
            }
        }
    }
    data.drain(write..boundary);
}
