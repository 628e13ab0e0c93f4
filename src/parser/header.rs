//! RFC 5322 header handling: folding, encoded-words (RFC 2047) and dates.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, warn};

/// Unfolded header block of one message, in original order.
///
/// Names are lowercased; values are raw (still RFC 2047 encoded).
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Parse a raw header block (everything up to the first blank line).
    pub fn parse(raw: &[u8]) -> Self {
        let text = decode_header_bytes(raw);
        Self {
            entries: unfold_headers(&text),
        }
    }

    /// First raw value for `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First value for `name`, RFC 2047 decoded and trimmed. Empty when absent.
    pub fn decoded(&self, name: &str) -> String {
        self.get(name)
            .map(|v| decode_encoded_words(v).trim().to_string())
            .unwrap_or_default()
    }

    /// Raw value for `name`, trimmed. Empty when absent.
    pub fn raw(&self, name: &str) -> String {
        self.get(name).map(|v| v.trim().to_string()).unwrap_or_default()
    }
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
        // mbox "From " lines and other junk without a colon are skipped
    }

    result
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Whitespace between adjacent encoded-words is dropped. Malformed tokens are
/// kept verbatim; bytes invalid in the declared charset become U+FFFD.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some(decoded) = try_decode_one_word(after_start) {
            result.push_str(&decoded.text);
            remaining = &after_start[decoded.consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

struct DecodedWord {
    text: String,
    /// Bytes consumed after the initial `=?`.
    consumed: usize,
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => decode_base64(encoded_text),
        "Q" | "q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    // RFC 2231 language suffix: "UTF-8*it"
    let charset = charset.split('*').next().unwrap_or(charset);

    Some(DecodedWord {
        text: decode_charset(charset, &bytes),
        consumed: first_q + 1 + second_q + 1 + end + 2,
    })
}

/// Lenient base64 decoder for encoded-words: whitespace and stray characters
/// are skipped, missing padding is tolerated.
fn decode_base64(input: &str) -> Vec<u8> {
    fn value(c: u8) -> Option<u32> {
        match c {
            b'A'..=b'Z' => Some((c - b'A') as u32),
            b'a'..=b'z' => Some((c - b'a' + 26) as u32),
            b'0'..=b'9' => Some((c - b'0' + 52) as u32),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    let mut out = Vec::with_capacity(input.len() * 3 / 4);
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    for &c in input.as_bytes() {
        if c == b'=' {
            break;
        }
        let Some(v) = value(c) else { continue };
        acc = (acc << 6) | v;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    out
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
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    Err(_) => {
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

/// Decode bytes using a named charset, replacing invalid sequences.
pub fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    if charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("utf8") {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    match encoding_rs::Encoding::for_label(charset.trim().as_bytes()) {
        Some(encoding) => {
            let (decoded, _, _) = encoding.decode(bytes);
            decoded.into_owned()
        }
        None => {
            warn!(charset, "Unknown charset, falling back to UTF-8 lossy");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Format a `Date:` header for display.
///
/// The sender's own UTC offset is kept (no conversion to local time).
/// Returns the trimmed raw header when it cannot be parsed or `format` cannot
/// be rendered.
pub fn format_date(raw: &str, format: &str) -> String {
    use std::fmt::Write;

    if let Some(dt) = parse_date(raw) {
        let mut out = String::new();
        if write!(out, "{}", dt.format(format)).is_ok() {
            return out;
        }
        debug!(format, "Unrenderable date format, keeping raw date");
    }
    raw.trim().to_string()
}

/// Parse an email date string, keeping its UTC offset.
///
/// Supports RFC 2822, ISO 8601, and common broken real-world variants.
pub fn parse_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = strip_trailing_comment(date_str.trim());
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }

    let no_dow = strip_day_of_week(trimmed);
    let candidates = [no_dow.clone(), replace_named_tz(&no_dow)];

    let offset_formats = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%z",
    ];
    let naive_formats = [
        "%d %b %Y %H:%M:%S",
        "%d %b %Y %H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
    ];

    for candidate in &candidates {
        for fmt in &offset_formats {
            if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
                return Some(dt);
            }
        }
        for fmt in &naive_formats {
            if let Ok(ndt) = NaiveDateTime::parse_from_str(candidate, fmt) {
                return Some(Utc.from_utc_datetime(&ndt).fixed_offset());
            }
        }
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    debug!(date = trimmed, "Could not parse date");
    None
}

/// Attempt to parse a date using `mail-parser`'s built-in parser.
fn mail_parser_date(input: &str) -> Option<DateTime<FixedOffset>> {
    use mail_parser::MessageParser;

    // Wrap input in a minimal RFC 5322 message so mail-parser can parse it
    let fake_msg = format!("Date: {input}\n\n");
    let parsed = MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt).ok()
}

/// Drop a trailing `(CET)`-style comment.
fn strip_trailing_comment(s: &str) -> &str {
    if s.ends_with(')') {
        if let Some(open) = s.rfind('(') {
            return s[..open].trim_end();
        }
    }
    s
}

/// Strip leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in DAYS {
        if let Some(rest) = s.strip_prefix(day) {
            let rest = rest.strip_prefix(',').unwrap_or(rest);
            if rest.starts_with(' ') {
                return rest.trim().to_string();
            }
        }
    }
    s.to_string()
}

/// Replace well-known timezone abbreviations with numeric offsets.
fn replace_named_tz(s: &str) -> String {
    const TZS: [(&str, &str); 9] = [
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("UT", "+0000"),
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
    ];
    for (name, offset) in TZS {
        if let Some(head) = s.strip_suffix(name) {
            if head.ends_with(' ') {
                return format!("{head}{offset}");
            }
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?="), "Hola mundo");
    }

    #[test]
    fn test_decode_q_iso8859() {
        assert_eq!(
            decode_encoded_words("=?ISO-8859-1?Q?Comunicazione_d=E9l_Comune?="),
            "Comunicazione dél Comune"
        );
    }

    #[test]
    fn test_decode_adjacent_words_concatenated() {
        let input = "=?UTF-8?B?UE9TVEEgQ0VSVElGSUNBVEE6?= =?UTF-8?Q?_Fattura_n=C2=B0_12?=";
        assert_eq!(decode_encoded_words(input), "POSTA CERTIFICATA: Fattura n° 12");
    }

    #[test]
    fn test_decode_invalid_utf8_is_replaced() {
        let decoded = decode_encoded_words("=?UTF-8?Q?caff=E8?=");
        assert_eq!(decoded, "caff\u{FFFD}");
    }

    #[test]
    fn test_decode_malformed_word_kept() {
        assert_eq!(decode_encoded_words("=?broken"), "=?broken");
        assert_eq!(decode_encoded_words("Plain subject"), "Plain subject");
    }

    #[test]
    fn test_header_map_unfolds_and_decodes() {
        let raw = b"Subject: =?UTF-8?B?UmljaGllc3Rh?=\n\tdocumenti\nFrom: a@b.it\n";
        let headers = HeaderMap::parse(raw);
        assert_eq!(headers.decoded("subject"), "Richiesta documenti");
        assert_eq!(headers.raw("FROM"), "a@b.it");
        assert_eq!(headers.decoded("cc"), "");
    }

    #[test]
    fn test_format_date_keeps_sender_offset() {
        assert_eq!(
            format_date("Tue, 12 Mar 2024 09:15:00 +0100", "%d/%m/%Y %H:%M"),
            "12/03/2024 09:15"
        );
    }

    #[test]
    fn test_format_date_with_comment_and_named_tz() {
        assert_eq!(
            format_date("Tue, 12 Mar 2024 09:15:00 +0100 (CET)", "%d/%m/%Y %H:%M"),
            "12/03/2024 09:15"
        );
        assert!(parse_date("12 Mar 2024 09:15:00 CET").is_some());
    }

    #[test]
    fn test_format_date_bad_format_keeps_raw() {
        assert_eq!(
            format_date(" Tue, 12 Mar 2024 09:15:00 +0100 ", "%d/%Q"),
            "Tue, 12 Mar 2024 09:15:00 +0100"
        );
    }

    #[test]
    fn test_format_date_unparseable_kept_verbatim() {
        assert_eq!(format_date(" domani mattina ", "%d/%m/%Y %H:%M"), "domani mattina");
        assert_eq!(format_date("", "%d/%m/%Y %H:%M"), "");
    }
}
