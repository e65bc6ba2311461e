//! Requirement validation and the predefined requirement catalogue.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

pub const MIN_REQUIREMENT_CHARS: usize = 10;
pub const MAX_REQUIREMENT_CHARS: usize = 1000;

static RE_REQUIREMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[a-zA-Z0-9\s\.,!?'"_\-@/:]+$"#).unwrap());

/// Trims `raw` and checks its length and character set.
pub fn validate_requirement(raw: &str) -> Result<String, ValidationError> {
    let requirement = raw.trim();
    if requirement.is_empty() {
        return Err(ValidationError::EmptyRequirement);
    }

    let len = requirement.chars().count();
    if !(MIN_REQUIREMENT_CHARS..=MAX_REQUIREMENT_CHARS).contains(&len) {
        return Err(ValidationError::RequirementLength {
            len,
            min: MIN_REQUIREMENT_CHARS,
            max: MAX_REQUIREMENT_CHARS,
        });
    }

    if !RE_REQUIREMENT.is_match(requirement) {
        return Err(ValidationError::RequirementCharacters);
    }

    Ok(requirement.to_string())
}

/// A canned requirement selectable by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Predefined {
    pub key: &'static str,
    pub requirement: &'static str,
}

pub const PREDEFINED: &[Predefined] = &[
    Predefined {
        key: "search",
        requirement: "Search for a product on Amazon",
    },
    Predefined {
        key: "login",
        requirement: "Login to Amazon account",
    },
    Predefined {
        key: "cart",
        requirement: "Add item to cart",
    },
    Predefined {
        key: "checkout",
        requirement: "Complete checkout process",
    },
    Predefined {
        key: "full_flow",
        requirement: "Complete Amazon Purchase Flow: Login, Search, Add to Cart, Checkout",
    },
    Predefined {
        key: "failed_login",
        requirement: "Test failed login attempt",
    },
    Predefined {
        key: "out_of_stock",
        requirement: "Test out of stock item handling",
    },
    Predefined {
        key: "invalid_payment",
        requirement: "Test invalid payment method",
    },
    Predefined {
        key: "guest_checkout",
        requirement: "Test guest checkout without account",
    },
];

/// Looks up a predefined requirement by key.
pub fn predefined(key: &str) -> Result<&'static str, ValidationError> {
    PREDEFINED
        .iter()
        .find(|p| p.key == key.trim())
        .map(|p| p.requirement)
        .ok_or_else(|| ValidationError::UnknownPredefined(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_requirement_is_trimmed() {
        assert_eq!(
            validate_requirement("  Login to Amazon account \n").unwrap(),
            "Login to Amazon account"
        );
    }

    #[test]
    fn test_empty_requirement() {
        assert_eq!(
            validate_requirement("   "),
            Err(ValidationError::EmptyRequirement)
        );
    }

    #[test]
    fn test_length_bounds() {
        assert!(matches!(
            validate_requirement("too short"),
            Err(ValidationError::RequirementLength { len: 9, .. })
        ));
        assert!(validate_requirement("exactly 10").is_ok());
        assert!(validate_requirement(&"a".repeat(1000)).is_ok());
        assert!(matches!(
            validate_requirement(&"a".repeat(1001)),
            Err(ValidationError::RequirementLength { len: 1001, .. })
        ));
    }

    #[test]
    fn test_disallowed_characters() {
        assert_eq!(
            validate_requirement("Search for <script>alert(1)</script>"),
            Err(ValidationError::RequirementCharacters)
        );
        assert_eq!(
            validate_requirement("Pay with 100% discount"),
            Err(ValidationError::RequirementCharacters)
        );
        assert!(validate_requirement("Visit https://example.com/login, then check 'Welcome!'").is_ok());
    }

    #[test]
    fn test_every_predefined_requirement_validates() {
        for entry in PREDEFINED {
            assert!(
                validate_requirement(entry.requirement).is_ok(),
                "{} should validate",
                entry.key
            );
        }
    }

    #[test]
    fn test_predefined_lookup() {
        assert_eq!(predefined("login").unwrap(), "Login to Amazon account");
        assert_eq!(
            predefined("refund"),
            Err(ValidationError::UnknownPredefined("refund".to_string()))
        );
    }
}
