//! Best-effort decoding of header strings and bodies
//!
//! A value wrapped in `=?...?=` is decoded as a single RFC 2047 encoded-word,
//! anything else goes through quoted-printable decoding. Failures never
//! surface: the original string is returned unchanged.
//!
//! The quoted-printable step is a heuristic. Plain ASCII that happens to be
//! valid quoted-printable (`a=3Db`, trailing spaces, `=` soft breaks) is
//! rewritten even when it was never encoded.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

lazy_static! {
    static ref ENCODED_WORD_RE: Regex = Regex::new(r"^=\?([^?]+)\?([BbQq])\?([^?]*)\?=$")
        .expect("encoded-word pattern is valid");
}

/// Decode one header value or body, falling back to the input
pub fn decode(value: &str) -> String {
    if value.starts_with("=?") && value.ends_with("?=") {
        return match decode_encoded_word(value) {
            Some(decoded) => decoded,
            None => {
                debug!("Keeping undecodable encoded-word as is: {}", value);
                value.to_string()
            }
        };
    }

    decode_quoted_printable(value)
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| value.to_string())
}

/// Decode every entry of an address list
pub fn decode_all(values: &[String]) -> Vec<String> {
    values.iter().map(|value| decode(value)).collect()
}

/// Decode a single `=?charset?encoding?text?=` word
pub fn decode_encoded_word(word: &str) -> Option<String> {
    let caps = ENCODED_WORD_RE.captures(word)?;
    let charset = caps.get(1)?.as_str();
    let encoding = caps.get(2)?.as_str();
    let text = caps.get(3)?.as_str();

    let content = match encoding {
        "B" | "b" => STANDARD.decode(text).ok()?,
        _ => decode_q(text.as_bytes())?,
    };

    convert_charset(charset, content)
}

fn decode_q(text: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut i = 0;

    while i < text.len() {
        match text[i] {
            b'_' => out.push(b' '),
            b'=' => {
                let hi = hex_value(*text.get(i + 1)?)?;
                let lo = hex_value(*text.get(i + 2)?)?;
                out.push(hi << 4 | lo);
                i += 2;
            }
            c if is_printable(c) || c == b'\n' || c == b'\r' || c == b'\t' => out.push(c),
            _ => return None,
        }
        i += 1;
    }

    Some(out)
}

fn convert_charset(charset: &str, content: Vec<u8>) -> Option<String> {
    if charset.eq_ignore_ascii_case("utf-8") {
        String::from_utf8(content).ok()
    } else if charset.eq_ignore_ascii_case("us-ascii") {
        Some(
            content
                .into_iter()
                .map(|b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
                .collect(),
        )
    } else if charset.eq_ignore_ascii_case("iso-8859-1") {
        Some(content.into_iter().map(char::from).collect())
    } else {
        debug!("Unsupported encoded-word charset: {}", charset);
        None
    }
}

/// Decode quoted-printable text, returning None on any invalid byte
pub fn decode_quoted_printable(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        let (content, ending) = split_line_ending(line);
        let trimmed = content.trim_end_matches([' ', '\t', '\r']);

        match trimmed.strip_suffix('=') {
            Some(rest) => {
                // Soft line break: nothing may sit between '=' and the line ending
                if trimmed.len() != content.len() || (ending.is_empty() && rest.is_empty()) {
                    return None;
                }
                decode_qp_line(rest.as_bytes(), &mut out)?;
            }
            None => {
                decode_qp_line(trimmed.as_bytes(), &mut out)?;
                out.extend_from_slice(ending.as_bytes());
            }
        }
    }

    Some(out)
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else {
        (line, "")
    }
}

fn decode_qp_line(line: &[u8], out: &mut Vec<u8>) -> Option<()> {
    let mut i = 0;

    while i < line.len() {
        let c = line[i];
        if c == b'=' {
            let escaped = match (line.get(i + 1), line.get(i + 2)) {
                (Some(&hi), Some(&lo)) => hex_value(hi).zip(hex_value(lo)),
                _ => None,
            };
            match escaped {
                Some((hi, lo)) => {
                    out.push(hi << 4 | lo);
                    i += 3;
                }
                // Badly encoded '=' is kept literally as long as something follows it
                None if i + 1 < line.len() => {
                    out.push(b'=');
                    i += 1;
                }
                None => return None,
            }
            continue;
        }

        // 8-bit bytes pass through; the caller checks the result is UTF-8
        if !is_printable(c) && c != b'\t' && c != b'\r' && c < 0x80 {
            return None;
        }
        out.push(c);
        i += 1;
    }

    Some(())
}

fn is_printable(c: u8) -> bool {
    (b' '..=b'~').contains(&c)
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}
