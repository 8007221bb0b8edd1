//! Node keys ("slugs") and title validation.
//!
//! A slug becomes a file name in the repository, so the format is
//! restricted and names used by structural files are reserved.

use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::node::TreeNode;
use crate::tree::find_by_key;

/// Slugs that collide with structural file names
pub const RESERVED_SLUGS: &[&str] = &["specification", "feature-toggles"];

/// Prefix used by example-map structural files
pub const MAP_PREFIX: &str = "map-";

/// Longest title accepted from user input
pub const MAX_TITLE_LEN: usize = 256;

const GENERATED_SLUG_LEN: usize = 21;

fn slug_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z\d](?:[A-Za-z\d_-]*[A-Za-z\d])?$").expect("slug pattern is valid")
    })
}

/// A fresh slug for a new node
pub fn generate_slug() -> String {
    let mut slug = Uuid::new_v4().simple().to_string();
    slug.truncate(GENERATED_SLUG_LEN);
    slug
}

/// Check slug format and reserved names
pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if !slug_pattern().is_match(slug) {
        return Err(ValidationError::InvalidSlug(slug.to_string()));
    }
    if RESERVED_SLUGS.contains(&slug) {
        return Err(ValidationError::ReservedSlug(slug.to_string()));
    }
    if slug.starts_with(MAP_PREFIX) {
        return Err(ValidationError::MapPrefix(slug.to_string()));
    }
    Ok(())
}

/// Validate a slug and make sure no node in `tree` already uses it
pub fn ensure_unique_slug(slug: &str, tree: &[TreeNode]) -> Result<(), ValidationError> {
    validate_slug(slug)?;
    if find_by_key(slug, tree).is_some() {
        return Err(ValidationError::DuplicateKey(slug.to_string()));
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    let len = title.chars().count();
    if len > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong {
            len,
            max: MAX_TITLE_LEN,
        });
    }
    Ok(())
}

/// A title entered as `Title #slug`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTitle {
    pub title: String,
    pub slug: Option<String>,
}

/// Split user input on its last `#` into a title and a new slug.
///
/// `current_key` is the key of the node being edited; keeping it is not a
/// collision.
pub fn parse_title_for_slug(
    input: &str,
    current_key: Option<&str>,
    tree: &[TreeNode],
) -> Result<ParsedTitle, ValidationError> {
    let input = input.trim();
    let Some((title, slug)) = input.rsplit_once('#') else {
        validate_title(input)?;
        return Ok(ParsedTitle {
            title: input.to_string(),
            slug: None,
        });
    };

    if slug.is_empty() {
        validate_title(input)?;
        return Ok(ParsedTitle {
            title: input.to_string(),
            slug: None,
        });
    }

    validate_slug(slug)?;
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::MissingTitle);
    }
    validate_title(title)?;
    if current_key != Some(slug) && find_by_key(slug, tree).is_some() {
        return Err(ValidationError::DuplicateKey(slug.to_string()));
    }
    Ok(ParsedTitle {
        title: title.to_string(),
        slug: Some(slug.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    #[test]
    fn test_generated_slugs_are_valid() {
        for _ in 0..20 {
            let slug = generate_slug();
            assert_eq!(slug.len(), GENERATED_SLUG_LEN);
            assert!(validate_slug(&slug).is_ok());
        }
    }

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("login-page").is_ok());
        assert!(validate_slug("a").is_ok());
        assert_eq!(
            validate_slug("-bad"),
            Err(ValidationError::InvalidSlug("-bad".to_string()))
        );
        assert!(validate_slug("has space").is_err());
        assert_eq!(
            validate_slug("specification"),
            Err(ValidationError::ReservedSlug("specification".to_string()))
        );
        assert_eq!(
            validate_slug("map-login"),
            Err(ValidationError::MapPrefix("map-login".to_string()))
        );
    }

    #[test]
    fn test_ensure_unique_slug() {
        let tree = vec![TreeNode::new("login", NodeType::Feature, "Login")];
        assert_eq!(
            ensure_unique_slug("login", &tree),
            Err(ValidationError::DuplicateKey("login".to_string()))
        );
        assert!(ensure_unique_slug("logout", &tree).is_ok());
    }

    #[test]
    fn test_parse_title_for_slug() {
        let tree = vec![TreeNode::new("login", NodeType::Feature, "Login")];

        let parsed = parse_title_for_slug("Sign in #sign-in", Some("login"), &tree).unwrap();
        assert_eq!(parsed.title, "Sign in");
        assert_eq!(parsed.slug.as_deref(), Some("sign-in"));

        let parsed = parse_title_for_slug("  Plain title ", None, &tree).unwrap();
        assert_eq!(parsed, ParsedTitle { title: "Plain title".to_string(), slug: None });

        assert_eq!(
            parse_title_for_slug("#only-slug", None, &tree),
            Err(ValidationError::MissingTitle)
        );
        assert_eq!(
            parse_title_for_slug("Other #login", None, &tree),
            Err(ValidationError::DuplicateKey("login".to_string()))
        );
        assert!(parse_title_for_slug("Log in #login", Some("login"), &tree).is_ok());
    }

    #[test]
    fn test_title_too_long() {
        let long = "x".repeat(MAX_TITLE_LEN + 1);
        assert!(matches!(
            validate_title(&long),
            Err(ValidationError::TitleTooLong { .. })
        ));
    }
}
