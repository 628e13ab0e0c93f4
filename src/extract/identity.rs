//! Deterministic short identifiers derived from SHA-256.

use sha2::{Digest, Sha256};

/// Number of hex chars kept for message ids.
pub const MESSAGE_ID_HEX_LEN: usize = 12;

/// `prefix` followed by the first `len` hex chars of SHA-256(`input`).
pub fn short_hash(prefix: &str, input: &str, len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    format!("{prefix}{}", &hash[..len.min(hash.len())])
}

/// Stable id of an extracted message.
///
/// Keyed on the inner `Message-ID` when present, otherwise on
/// `"<sender>_<subject>_<raw date>"`. With 48 bits kept, two distinct messages
/// can collide; the catalog then treats them as one stored record.
pub fn message_id(message_id: &str, sender: &str, subject: &str, raw_date: &str) -> String {
    let key = if message_id.is_empty() {
        format!("{sender}_{subject}_{raw_date}")
    } else {
        message_id.to_string()
    };
    short_hash("email_", &key, MESSAGE_ID_HEX_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_hash_shape() {
        let id = short_hash("group_", "richiesta documenti", 8);
        assert!(id.starts_with("group_"));
        assert_eq!(id.len(), "group_".len() + 8);
        assert!(id["group_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
        // SHA-256("") is a well-known constant.
        assert_eq!(short_hash("", "", 8), "e3b0c442");
    }

    #[test]
    fn test_message_id_fallback_key() {
        let with_header = message_id("<abc@pec.it>", "a@b.it", "Oggetto", "Tue, 12 Mar 2024");
        assert_eq!(with_header, short_hash("email_", "<abc@pec.it>", 12));

        let without = message_id("", "a@b.it", "Oggetto", "Tue, 12 Mar 2024");
        assert_eq!(
            without,
            short_hash("email_", "a@b.it_Oggetto_Tue, 12 Mar 2024", 12)
        );
        assert_ne!(with_header, without);
    }
}
