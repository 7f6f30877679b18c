//! # Key Normalization
//!
//! @title Field Name Normalization
//! @author Ramprasad
//!
//! Field and object names are compared in one canonical form: lowercase
//! words separated by single spaces. Word boundaries come from separators
//! (`_`, `-`, `.`, whitespace, any other punctuation) and from case changes,
//! so `SellerFiscalInformation`, `seller_fiscal_information` and
//! `seller-fiscal information` all become `seller fiscal information`.

/// Normalizes an identifier or property name.
///
/// # Arguments
///
/// * `raw` - The name as written in source
///
/// # Returns
///
/// Lowercase words joined by single spaces. Empty when the input holds no
/// alphanumeric characters.
pub fn normalize_key(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            flush(&mut current, &mut words);
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let previous = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            // `userName`, `address2Line` and the `S` of `HTTPServer`
            if previous.is_lowercase()
                || previous.is_ascii_digit()
                || (previous.is_uppercase() && next_is_lower)
            {
                flush(&mut current, &mut words);
            }
        }
        current.extend(c.to_lowercase());
    }
    flush(&mut current, &mut words);

    words.join(" ")
}

fn flush(current: &mut String, words: &mut Vec<String>) {
    if !current.is_empty() {
        words.push(std::mem::take(current));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spaces_and_case() {
        assert_eq!(normalize_key("First Name"), "first name");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(
            normalize_key("SellerFiscalInformation"),
            "seller fiscal information"
        );
        assert_eq!(normalize_key("userID"), "user id");
    }

    #[test]
    fn test_leading_underscore() {
        assert_eq!(normalize_key("_customerName"), "customer name");
    }

    #[test]
    fn test_snake_and_kebab() {
        assert_eq!(normalize_key("first_name"), "first name");
        assert_eq!(normalize_key("date-of--birth"), "date of birth");
    }

    #[test]
    fn test_acronym_followed_by_word() {
        assert_eq!(normalize_key("HTTPServer"), "http server");
    }

    #[test]
    fn test_no_alphanumerics() {
        assert_eq!(normalize_key("__"), "");
    }
}
