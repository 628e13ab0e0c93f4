//! Mailbox parsing for `From`, `To` and `Cc` headers (RFC 5322 §3.4).
//!
//! The catalog only keeps bare addresses, so display names are parsed and
//! then discarded by the callers.

/// A single mailbox from an address header.
///
/// # Examples
/// - `"Ufficio Protocollo <protocollo@pec.comune.it>"` → `name = "Ufficio Protocollo"`, `address = "protocollo@pec.comune.it"`
/// - `"info@example.it (Info desk)"` → `name = ""`, `address = "info@example.it"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name (may be empty).
    pub name: String,
    /// Bare `local@domain` address (may be empty when the header is garbage).
    pub address: String,
}

impl Mailbox {
    /// Parse one mailbox. Input must already be RFC 2047 decoded.
    ///
    /// Comments in parentheses are dropped. When no address can be found the
    /// trimmed input is stored as the address.
    pub fn parse(raw: &str) -> Self {
        let cleaned = strip_comments(raw);
        let trimmed = cleaned.trim();

        if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if close > open {
                return Self {
                    name: unquote(&trimmed[..open]),
                    address: trimmed[open + 1..close].trim().to_string(),
                };
            }
        }

        Self {
            name: String::new(),
            address: unquote(trimmed),
        }
    }

    /// Parse a comma-separated address list.
    ///
    /// Commas inside quotes or angle brackets do not split. Group syntax
    /// (`team: a@x.it, b@y.it;`) is flattened into its members, and empty
    /// groups such as `undisclosed-recipients:;` yield nothing.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut out = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut in_angle = false;

        let flush = |segment: &mut String, out: &mut Vec<Self>| {
            let mailbox = Self::parse(segment);
            if !mailbox.address.is_empty() {
                out.push(mailbox);
            }
            segment.clear();
        };

        for ch in raw.chars() {
            match ch {
                '"' => {
                    in_quotes = !in_quotes;
                    current.push(ch);
                }
                '<' if !in_quotes => {
                    in_angle = true;
                    current.push(ch);
                }
                '>' if !in_quotes => {
                    in_angle = false;
                    current.push(ch);
                }
                // Group display name: drop it, keep collecting members.
                ':' if !in_quotes && !in_angle => current.clear(),
                ',' | ';' if !in_quotes && !in_angle => flush(&mut current, &mut out),
                _ => current.push(ch),
            }
        }
        flush(&mut current, &mut out);

        out
    }
}

/// Bare address of the first mailbox in `raw`, or the trimmed input when no
/// mailbox can be parsed.
pub fn bare_address(raw: &str) -> String {
    let mailbox = Mailbox::parse(raw);
    if mailbox.address.is_empty() {
        raw.trim().to_string()
    } else {
        mailbox.address
    }
}

/// Remove `( … )` comments outside quoted strings. Nesting is honored.
fn strip_comments(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    let mut in_quotes = false;
    for ch in s.chars() {
        match ch {
            '"' if depth == 0 => {
                in_quotes = !in_quotes;
                out.push(ch);
            }
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes && depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

fn unquote(s: &str) -> String {
    let trimmed = s.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}
