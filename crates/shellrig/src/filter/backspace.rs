//! Backspace-erasure collapse.

use super::drop_ranges;

/// Collapse backspace runs: a run of N backspaces erases the N characters
/// immediately preceding it, never crossing a newline and never reaching
/// into an earlier erasure.
///
/// Device quirk: `$` followed by backspaces followed immediately by `\r\n\r`
/// is an alternate erasure marker, not a real erase. The `$` is kept, the
/// backspaces are dropped, and the `\r\n\r` tail collapses to a single
/// `\n` instead of being handled as carriage returns later.
pub(crate) fn collapse(data: &mut Vec<u8>) {
    let len = data.len();
    let mut drops: Vec<(usize, usize)> = Vec::new();
    let mut floor = 0; // end of the previous erasure
    let mut pos = 0;
    while pos < len {
        if data[pos] != b'\x08' {
            pos += 1;
            continue;
        }
        let run_start = pos;
        while pos < len && data[pos] == b'\x08' {
            pos += 1;
        }
        let run = pos - run_start;

        if run_start > 0 && data[run_start - 1] == b'$' && data[pos..].starts_with(b"\r\n\r") {
            drops.push((run_start, pos)); // the backspaces
            drops.push((pos, pos + 1)); // leading \r, keeps the \n
            drops.push((pos + 2, pos + 3)); // trailing \r
            pos += 3;
            floor = pos;
            continue;
        }

        let mut erase_from = run_start.saturating_sub(run).max(floor);
        if let Some(nl) = data[floor..run_start].iter().rposition(|&b| b == b'\n') {
            erase_from = erase_from.max(floor + nl + 1);
        }
        drops.push((erase_from, pos));
        floor = pos;
    }
    drop_ranges(data, &drops);
}
