//! ANSI/VT100 escape stripping and replacement-character removal.

use super::drop_ranges;

/// The 3-byte UTF-8 encoding of U+FFFD REPLACEMENT CHARACTER.
const REPLACEMENT: [u8; 3] = [0xef, 0xbf, 0xbd];

/// Strip CSI escape sequences and U+FFFD runs in place.
///
/// CSI sequences follow the ECMA-48 grammar: `ESC [`, any number of
/// parameter bytes (0x30-0x3F), any number of intermediate bytes
/// (0x20-0x2F), and one final byte (0x40-0x7E). A sequence without a final
/// byte in the buffer is left untouched on the assumption that more bytes
/// are incoming; non-CSI escapes pass through as-is.
pub(crate) fn strip(data: &mut Vec<u8>) {
    let len = data.len();
    let mut drops: Vec<(usize, usize)> = Vec::new();
    let mut pos = 0;
    while pos < len {
        if let Some(end) = csi_end(data, pos) {
            drops.push((pos, end));
            pos = end;
        } else if let Some(end) = replacement_run_end(data, pos) {
            drops.push((pos, end));
            pos = end;
        } else {
            pos += 1;
        }
    }
    drop_ranges(data, &drops);
}

/// If `pos` starts a complete CSI sequence, return the index one past its
/// final byte.
fn csi_end(data: &[u8], pos: usize) -> Option<usize> {
    if data[pos] != 0x1b || data.get(pos + 1) != Some(&b'[') {
        return None;
    }
    let mut i = pos + 2;
    while i < data.len() && (0x30..=0x3f).contains(&data[i]) {
        i += 1;
    }
    while i < data.len() && (0x20..=0x2f).contains(&data[i]) {
        i += 1;
    }
    match data.get(i) {
        Some(b) if (0x40..=0x7e).contains(b) => Some(i + 1),
        _ => None,
    }
}

/// If `pos` starts a run of replacement characters, return the index one
/// past the run.
fn replacement_run_end(data: &[u8], pos: usize) -> Option<usize> {
    let mut i = pos;
    while data[i..].starts_with(&REPLACEMENT) {
        i += 3;
    }
    (i > pos).then_some(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stripped(input: &[u8]) -> Vec<u8> {
        let mut data = input.to_vec();
        strip(&mut data);
        data
    }

    #[test]
    fn color_sequences() {
        assert_eq!(stripped(b"\x1b[31mabc\x1b[0m"), b"abc");
    }

    #[test]
    fn private_parameters() {
        assert_eq!(stripped(b"\x1b[?25labc"), b"abc");
    }

    #[test]
    fn intermediate_bytes() {
        // 0x20 space is an intermediate byte; 'q' is the final byte.
        assert_eq!(stripped(b"\x1b[0 qabc"), b"abc");
    }

    #[test]
    fn incomplete_sequence_is_kept() {
        assert_eq!(stripped(b"abc\x1b[3"), b"abc\x1b[3");
    }

    #[test]
    fn lone_escape_is_kept() {
        assert_eq!(stripped(b"abc\x1b"), b"abc\x1b");
    }

    #[test]
    fn replacement_runs() {
        assert_eq!(stripped(b"a\xef\xbf\xbdb"), b"ab");
        assert_eq!(stripped(b"\xef\xbf\xbd\xef\xbf\xbd"), b"");
    }

    #[test]
    fn lone_partial_replacement_is_kept() {
        assert_eq!(stripped(b"a\xef\xbf"), b"a\xef\xbf");
    }
}
