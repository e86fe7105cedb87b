//! Byte-to-text decoding.
//!
//! Devices occasionally speak legacy national encodings; the [`Decoder`]
//! capability lets callers plug a custom conversion in front of the line
//! reader. Absent one, bytes are best-effort converted to UTF-8.

/// Decodes filtered bytes into text.
///
/// Decoding is best-effort: implementations that cannot represent a byte
/// sequence should substitute rather than fail, matching the text model of
/// the rest of the pipeline.
pub trait Decoder: Send + Sync {
    /// Decode a byte slice into a string.
    fn decode(&self, bytes: &[u8]) -> String;
}

impl<F> Decoder for F
where
    F: Fn(&[u8]) -> String + Send + Sync,
{
    fn decode(&self, bytes: &[u8]) -> String {
        self(bytes)
    }
}

/// The default decoder: lossy UTF-8 conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Lossy;

impl Decoder for Utf8Lossy {
    fn decode(&self, bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_lossy_passes_valid_text() {
        assert_eq!(Utf8Lossy.decode("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn utf8_lossy_substitutes_invalid_bytes() {
        let decoded = Utf8Lossy.decode(&[b'a', 0xff, b'b']);
        assert_eq!(decoded, "a\u{fffd}b");
    }

    #[test]
    fn closures_are_decoders() {
        let upper = |bytes: &[u8]| String::from_utf8_lossy(bytes).to_uppercase();
        assert_eq!(upper.decode(b"ok"), "OK");
    }
}
