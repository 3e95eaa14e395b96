use serde::Serializer;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Lowercase and trim, used for emails and usernames.
pub fn normalize_string(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Trim and upper-case the first character, the rest is left untouched.
pub fn capitalize_name(name: &str) -> String {
    let trimmed = name.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// True when the text is empty or only whitespace.
pub fn is_blank(text: Option<&str>) -> bool {
    text.map_or(true, |t| t.chars().all(char::is_whitespace))
}

pub fn serialize_datetime<S>(x: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match x.format(&Rfc3339) {
        Ok(formatted) => s.serialize_str(&formatted),
        Err(e) => Err(serde::ser::Error::custom(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_string("  Sam@Example.ORG "), "sam@example.org");
        assert_eq!(capitalize_name("  sam "), "Sam");
        assert_eq!(capitalize_name("mcDonald"), "McDonald");
        assert_eq!(capitalize_name("élodie"), "Élodie");
        assert_eq!(capitalize_name("   "), "");
    }

    #[test]
    fn test_blank() {
        assert!(is_blank(None));
        assert!(is_blank(Some(" \n\t")));
        assert!(!is_blank(Some(" hi ")));
    }
}
