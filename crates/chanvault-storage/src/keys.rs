//! Deterministic object-key derivation.
//!
//! A file's destination key is computed once, at discovery, from its
//! immutable identity, and never changes across retries. That keeps
//! re-uploads idempotent and leaves no orphaned duplicates.

const MAX_FILENAME_LEN: usize = 200;

/// Replace filesystem- and URL-hostile characters and cap the length,
/// preserving the extension when truncating.
pub fn sanitize_filename(filename: &str) -> String {
    let mut sanitized: String = filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.len() > MAX_FILENAME_LEN {
        let ext = sanitized
            .rfind('.')
            .map(|i| sanitized[i..].to_string())
            .unwrap_or_default();
        let keep = MAX_FILENAME_LEN.saturating_sub(ext.len());
        // Byte budget, cut on a char boundary so multibyte names stay
        // within the cap.
        let mut stem = String::with_capacity(keep);
        for c in sanitized.chars() {
            if stem.len() + c.len_utf8() > keep {
                break;
            }
            stem.push(c);
        }
        stem.push_str(&ext);
        sanitized = stem;
    }

    sanitized
}

/// Derive the object key for a discovered file:
/// `{channel_id}/{message_id}/{sanitized name}`.
pub fn object_key(channel_id: i64, message_id: i64, file_name: &str) -> String {
    format!(
        "{}/{}/{}",
        channel_id,
        message_id,
        sanitize_filename(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic() {
        let a = object_key(-100123, 42, "track.mp3");
        let b = object_key(-100123, 42, "track.mp3");
        assert_eq!(a, b);
        assert_eq!(a, "-100123/42/track.mp3");
    }

    #[test]
    fn invalid_characters_are_replaced() {
        assert_eq!(sanitize_filename("a/b\\c:d*e.pdf"), "a_b_c_d_e.pdf");
        assert_eq!(sanitize_filename("quo\"te?.mp3"), "quo_te_.mp3");
    }

    #[test]
    fn long_names_keep_extension() {
        let name = format!("{}.mp3", "x".repeat(300));
        let sanitized = sanitize_filename(&name);
        assert!(sanitized.len() <= 200);
        assert!(sanitized.ends_with(".mp3"));
    }

    #[test]
    fn multibyte_names_stay_within_the_byte_cap() {
        // Three bytes per char, so a char count under the cap can still
        // blow the byte budget.
        let name = format!("{}.mp3", "音".repeat(150));
        let sanitized = sanitize_filename(&name);
        assert!(sanitized.len() <= 200);
        assert!(sanitized.ends_with(".mp3"));
        // Still valid UTF-8 with whole characters only.
        assert!(sanitized.chars().all(|c| c == '音' || ".mp3".contains(c)));
    }

    #[test]
    fn distinct_identities_never_collide() {
        assert_ne!(object_key(1, 2, "f.pdf"), object_key(1, 3, "f.pdf"));
        assert_ne!(object_key(1, 2, "f.pdf"), object_key(2, 2, "f.pdf"));
    }
}
