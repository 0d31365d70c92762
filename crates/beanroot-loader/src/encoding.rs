//! Byte to text decoding for ledger sources.

use crate::LoadError;

/// Decode `bytes` as `encoding`.
///
/// `utf-8` and `latin-1` (with their usual aliases) are understood.
/// Invalid UTF-8 is replaced lossily; an unknown label decodes as UTF-8.
/// Either case also returns a [`LoadError::Decode`].
pub fn decode(bytes: &[u8], encoding: &str) -> (String, Option<LoadError>) {
    let label = encoding.trim().to_ascii_lowercase();
    match label.as_str() {
        "utf-8" | "utf8" => decode_utf8(bytes),
        "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" | "l1" => {
            (bytes.iter().copied().map(char::from).collect(), None)
        }
        _ => {
            let (text, _) = decode_utf8(bytes);
            let error = LoadError::Decode {
                message: format!("unknown encoding {encoding:?}, decoded as utf-8"),
            };
            (text, Some(error))
        }
    }
}

fn decode_utf8(bytes: &[u8]) -> (String, Option<LoadError>) {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), None),
        Err(err) => (
            String::from_utf8_lossy(bytes).into_owned(),
            Some(LoadError::Decode {
                message: format!("invalid utf-8 at byte {}", err.valid_up_to()),
            }),
        ),
    }
}
