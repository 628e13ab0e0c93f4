//! Subject normalization for grouping.
//!
//! PEC providers prepend `POSTA CERTIFICATA:` to every subject, and Italian
//! clients add `R:`/`I:` (risposta/inoltro) on top of the usual `Re:`/`Fwd:`.

/// Reply/forward labels. Each may be followed by whitespace before its colon.
const REPLY_LABELS: [&str; 5] = ["re", "r", "fwd", "i", "oggetto"];

/// Collapse whitespace and strip leading certification/reply/forward labels.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
///
/// # Examples
/// - `"POSTA CERTIFICATA: Re: Oggetto: test"` → `"test"`
/// - `"R:  Hello\r\n  world"` → `"Hello world"`
pub fn normalize(subject: &str) -> String {
    let collapsed = subject.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut rest = collapsed.as_str();
    while let Some(stripped) = strip_label(rest) {
        rest = stripped;
    }
    rest.trim().to_string()
}

/// Strip one leading label (and the whitespace after its colon).
fn strip_label(s: &str) -> Option<&str> {
    let after_label = strip_certification(s).or_else(|| {
        REPLY_LABELS.iter().find_map(|label| {
            let rest = strip_prefix_ignore_case(s, label)?;
            rest.trim_start().strip_prefix(':')
        })
    })?;
    Some(after_label.trim_start())
}

/// `POSTA<ws>CERTIFICATA:`, colon immediately after the second word.
fn strip_certification(s: &str) -> Option<&str> {
    let rest = strip_prefix_ignore_case(s, "posta")?;
    let trimmed = rest.trim_start();
    if trimmed.len() == rest.len() {
        return None;
    }
    strip_prefix_ignore_case(trimmed, "certificata")?.strip_prefix(':')
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_examples() {
        assert_eq!(normalize("POSTA CERTIFICATA: Re: Oggetto: test"), "test");
        assert_eq!(normalize("R: Hello"), "Hello");
    }

    #[test]
    fn test_repeated_and_mixed_case_labels() {
        assert_eq!(normalize("Re: Re:Oggetto: test message"), "test message");
        assert_eq!(normalize("posta  certificata: I: FWD : Avviso"), "Avviso");
        assert_eq!(normalize("RE : r: Verbale"), "Verbale");
    }

    #[test]
    fn test_words_that_only_start_like_labels() {
        assert_eq!(normalize("Rettifica: atto"), "Rettifica: atto");
        assert_eq!(normalize("Informativa privacy"), "Informativa privacy");
        assert_eq!(normalize("POSTA CERTIFICATA : x"), "POSTA CERTIFICATA : x");
        assert_eq!(normalize("Re"), "Re");
    }

    #[test]
    fn test_whitespace_is_collapsed() {
        assert_eq!(normalize("  Subject with\r\n tabs\tand   spaces "), "Subject with tabs and spaces");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("Re:   "), "");
    }

    #[test]
    fn test_idempotent() {
        for s in [
            "POSTA CERTIFICATA: Re: Oggetto: test",
            "R: R: R:",
            "Fwd:  I:\tÈ arrivata la notifica",
            "nessun prefisso",
            "Re: POSTA CERTIFICATA: Re: doppio",
        ] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "input: {s:?}");
        }
    }
}
