use serde::Serialize;

/// A reviewer comment that has passed validation. Never blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Comment(String);

impl Comment {
    /// Trim and validate. Returns `None` for empty or whitespace-only input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_comments_are_rejected() {
        assert!(Comment::parse("").is_none());
        assert!(Comment::parse("   \n\t").is_none());
        assert_eq!(Comment::parse("  ship it ").unwrap().as_str(), "ship it");
    }
}
