//! Client-side checks run before anything is sent to the server.

use std::sync::OnceLock;

use regex::Regex;

use crate::utils::digits_only;

/// Length of a verification code.
pub const CODE_LENGTH: usize = 6;

const COUNTRY_CODE: &str = "91";

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

/// 10 digits starting with 6-9.
fn is_mobile(digits: &str) -> bool {
    digits.len() == 10 && digits.starts_with(['6', '7', '8', '9'])
}

/// An email address, or an Indian mobile number with or without the
/// `91` country code. Separators in numbers are ignored.
pub fn validate_contact(contact: &str) -> bool {
    let contact = contact.trim();
    if contact.is_empty() {
        return false;
    }
    if email_regex().is_some_and(|re| re.is_match(contact)) {
        return true;
    }

    let digits = digits_only(contact);
    match digits.strip_prefix(COUNTRY_CODE) {
        Some(local) if digits.len() == 12 => is_mobile(local),
        _ => is_mobile(&digits),
    }
}

pub fn validate_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

/// Keep digits only, at most `CODE_LENGTH` of them.
pub fn sanitize_code(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).take(CODE_LENGTH).collect()
}

/// Hide most of a contact for display: `ra****sh@example.com`,
/// `98****10`. Anything else is returned unchanged.
pub fn mask_contact(contact: &str) -> String {
    if let Some((user, domain)) = contact.split_once('@') {
        let chars: Vec<char> = user.chars().collect();
        let masked = if chars.len() > 3 {
            let head: String = chars[..2].iter().collect();
            let tail: String = chars[chars.len() - 2..].iter().collect();
            format!("{}{}{}", head, "*".repeat(chars.len().saturating_sub(4)), tail)
        } else {
            user.to_string()
        };
        return format!("{}@{}", masked, domain);
    }

    let digits = digits_only(contact);
    if digits.len() == 10 {
        format!("{}****{}", &digits[..2], &digits[8..])
    } else {
        contact.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_contact_mobile() {
        assert!(validate_contact("9876543210"));
        assert!(validate_contact("919876543210"));
        assert!(validate_contact("+91 98765-43210"));
        assert!(validate_contact("6000000000"));
        assert!(!validate_contact("12345"));
        assert!(!validate_contact("5876543210"));
        assert!(!validate_contact("915876543210"));
        assert!(!validate_contact("98765432101"));
    }

    #[test]
    fn test_validate_contact_email() {
        assert!(validate_contact("a@b.com"));
        assert!(validate_contact("  student.one@school.edu.in "));
        assert!(!validate_contact("a@b"));
        assert!(!validate_contact("a b@c.com"));
        assert!(!validate_contact(""));
    }

    #[test]
    fn test_validate_code() {
        assert!(validate_code("123456"));
        assert!(validate_code("000000"));
        assert!(!validate_code("12345"));
        assert!(!validate_code("1234567"));
        assert!(!validate_code("12a456"));
        assert!(!validate_code("١٢٣٤٥٦"));
    }

    #[test]
    fn test_sanitize_code() {
        assert_eq!(sanitize_code("12-34 56"), "123456");
        assert_eq!(sanitize_code("123456789"), "123456");
        assert_eq!(sanitize_code("abc"), "");
    }

    #[test]
    fn test_mask_contact() {
        assert_eq!(mask_contact("rakesh@example.com"), "ra**sh@example.com");
        assert_eq!(mask_contact("abc@x.org"), "abc@x.org");
        assert_eq!(mask_contact("9876543210"), "98****10");
        assert_eq!(mask_contact("919876543210"), "919876543210");
    }
}
