//! Email address sanitizing and validation (RFC 5322 §3.4, the practical subset).

/// Characters allowed in the local part of an address.
fn is_local_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+/=?^_`{|}~.-".contains(c)
}

/// Strip everything that cannot appear in an address.
///
/// Whitespace and characters outside the allowed local/domain sets are
/// dropped; the result may still be invalid, check it with [`is_email`].
pub fn sanitize_email(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(at) = trimmed.find('@') else {
        return String::new();
    };

    let local: String = trimmed[..at].chars().filter(|&c| is_local_char(c)).collect();
    let domain: String = trimmed[at + 1..]
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '.')
        .collect();

    // Leading/trailing dots and hyphens never belong to a domain.
    let domain = domain.trim_matches(|c| c == '.' || c == '-');
    if local.is_empty() || domain.is_empty() {
        return String::new();
    }
    format!("{local}@{domain}")
}

/// Check that `address` is a syntactically well-formed mailbox.
///
/// # Examples
/// - `"editor@blog.example"` → `true`
/// - `"editor@localhost"` → `false` (needs a dotted domain)
/// - `"not an email address"` → `false`
pub fn is_email(address: &str) -> bool {
    if address.len() < 6 {
        return false;
    }

    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    if !local.chars().all(is_local_char) {
        return false;
    }
    if domain.contains("..") {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    labels.iter().all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_trims_whitespace() {
        assert_eq!(sanitize_email("  user@example.com \n"), "user@example.com");
    }

    #[test]
    fn test_sanitize_drops_invalid_chars() {
        assert_eq!(sanitize_email("us er@exa mple.com>"), "user@example.com");
    }

    #[test]
    fn test_sanitize_without_at() {
        assert_eq!(sanitize_email("nobody"), "");
    }

    #[test]
    fn test_is_email_valid() {
        assert!(is_email("user@example.com"));
        assert!(is_email("first.last+tag@mail.example.org"));
    }

    #[test]
    fn test_is_email_invalid() {
        assert!(!is_email(""));
        assert!(!is_email("a@b.c"));
        assert!(!is_email("user@localhost"));
        assert!(!is_email("user@@example.com"));
        assert!(!is_email("user@example..com"));
        assert!(!is_email("user@-example.com"));
        assert!(!is_email("not an email address"));
    }
}
