//! Character set lookup and text codecs by charset name.

use crate::error::{AssemblageError, FetchError};
use bytes::Bytes;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};

/// Look up an encoding by its charset label (case-insensitive).
pub fn lookup(label: &str) -> Result<&'static Encoding, FetchError> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| FetchError::UnknownEncoding(label.to_string()))
}

/// Decode bytes into text with the declared charset, replacing malformed
/// sequences. A byte order mark is kept as text, never sniffed.
pub fn decode(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        tracing::debug!(encoding = encoding.name(), "Replaced malformed input while decoding");
    }
    text.into_owned()
}

/// Encode text back into bytes of the same charset.
///
/// Fails when the charset cannot represent some character, instead of
/// writing numeric character references into the content.
pub fn encode(encoding: &'static Encoding, text: &str) -> Result<Bytes, AssemblageError> {
    // encoding_rs only encodes UTF-16 labels as UTF-8.
    if encoding == UTF_16LE {
        return Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect());
    }
    if encoding == UTF_16BE {
        return Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect());
    }
    let (bytes, _, unmappable) = encoding.encode(text);
    if unmappable {
        return Err(AssemblageError::Unencodable(encoding.name().to_string()));
    }
    Ok(Bytes::from(bytes.into_owned()))
}
