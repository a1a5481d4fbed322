//! Raw header lookup and RFC 2047 encoded-word decoding.

use base64::Engine;
use tracing::warn;

/// A header value decoded from its transport encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHeader {
    pub text: String,
    /// Charset of the first encoded word, lowercased; `None` when the value
    /// carried no encoded words and was taken as-is.
    pub charset: Option<String>,
}

/// Finds a header in a raw RFC 5322 message and returns its unfolded value.
///
/// Only the header block (up to the first empty line) is searched; the name
/// is matched case-insensitively and the first occurrence wins.
pub fn raw_header(message: &[u8], name: &str) -> Option<String> {
    let text = decode_header_bytes(header_block(message));

    let mut current: Option<String> = None;
    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(value) = current.as_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if current.is_some() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case(name) {
                current = Some(value.trim().to_string());
            }
        }
    }
    current
}

/// Decodes all RFC 2047 encoded words in a header value.
///
/// Whitespace between two adjacent encoded words is dropped; malformed
/// encoded words are kept literally.
pub fn decode_header(raw: &str) -> DecodedHeader {
    let mut text = String::with_capacity(raw.len());
    let mut charset = None;
    let mut rest = raw;
    let mut after_word = false;

    while let Some(word) = next_encoded_word(rest) {
        let gap = &rest[..word.start];
        if !(after_word && gap.trim().is_empty()) {
            text.push_str(gap);
        }
        text.push_str(&decode_charset(word.charset, &word.bytes));
        if charset.is_none() {
            charset = Some(word.charset.to_ascii_lowercase());
        }
        after_word = true;
        rest = &rest[word.end..];
    }
    text.push_str(rest);

    DecodedHeader { text, charset }
}

struct EncodedWord<'a> {
    start: usize,
    end: usize,
    charset: &'a str,
    bytes: Vec<u8>,
}

fn next_encoded_word(s: &str) -> Option<EncodedWord<'_>> {
    let mut from = 0;
    while let Some(pos) = s[from..].find("=?") {
        let start = from + pos;
        if let Some(word) = parse_encoded_word(s, start) {
            return Some(word);
        }
        from = start + 2;
    }
    None
}

/// Parses `=?charset?E?payload?=` starting at `start`.
fn parse_encoded_word(s: &str, start: usize) -> Option<EncodedWord<'_>> {
    let body = &s[start + 2..];
    let (charset, rest) = body.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let payload_len = rest.find("?=")?;
    let payload = &rest[..payload_len];

    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }
    if payload.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => base64::engine::general_purpose::STANDARD_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?,
        "Q" | "q" => decode_q_encoding(payload),
        _ => return None,
    };

    let end = start + 2 + charset.len() + 1 + encoding.len() + 1 + payload_len + 2;
    // RFC 2231 allows a language suffix: `utf-8*fi`.
    let charset = charset.split('*').next().unwrap_or(charset);

    Some(EncodedWord {
        start,
        end,
        charset,
        bytes,
    })
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    None => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    match encoding_rs::Encoding::for_label(charset.as_bytes()) {
        Some(encoding) => encoding.decode(bytes).0.into_owned(),
        None => {
            warn!(charset, "Unknown charset, falling back to UTF-8 lossy");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Everything before the first empty line.
fn header_block(message: &[u8]) -> &[u8] {
    let mut start = 0;
    for (i, &b) in message.iter().enumerate() {
        if b != b'\n' {
            continue;
        }
        let line = &message[start..i];
        if line.is_empty() || line == b"\r" {
            return &message[..start];
        }
        start = i + 1;
    }
    message
}

/// UTF-8 first, then Windows-1252, which accepts every byte.
fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
    }
}
