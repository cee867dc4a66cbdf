//! Topic validation for subscriptions and publishes
//!
//! A topic is accepted only if it is hierarchical, i.e. contains at least
//! one `/` separator. Validation happens before anything reaches the
//! transport.

use std::fmt;
use thiserror::Error;

/// Topic level separator
pub const TOPIC_SEPARATOR: char = '/';

/// Validated, immutable MQTT topic (or topic filter)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    /// Validate and wrap a topic name
    ///
    /// # Examples
    /// ```
    /// use cmdconfirm::protocol::{Topic, TopicError};
    ///
    /// assert!(Topic::parse("sensors/kitchen").is_ok());
    /// assert_eq!(Topic::parse(""), Err(TopicError::Empty));
    /// assert!(matches!(Topic::parse("kitchen"), Err(TopicError::MissingSeparator(_))));
    /// ```
    pub fn parse(topic: &str) -> Result<Self, TopicError> {
        if topic.is_empty() {
            return Err(TopicError::Empty);
        }
        if !topic.contains(TOPIC_SEPARATOR) {
            return Err(TopicError::MissingSeparator(topic.to_string()));
        }
        Ok(Self(topic.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Topic {
    type Error = TopicError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Topic::parse(value)
    }
}

/// Topic validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("Topic name cannot be empty")]
    Empty,
    #[error("{0} is not a valid topic name. Correct format is [topic]/[name]")]
    MissingSeparator(String),
}

/// Split a line of operator input into topics
///
/// Tokens are separated by whitespace; each one is validated on its own so
/// a bad token never hides the good ones next to it.
pub fn parse_topic_line(line: &str) -> Vec<Result<Topic, TopicError>> {
    line.split_whitespace().map(Topic::parse).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn topics_with_separator_are_accepted(
            head in "[a-zA-Z0-9_+#-]{0,16}",
            tail in "[a-zA-Z0-9_/+#-]{0,16}",
        ) {
            let raw = format!("{head}/{tail}");
            let topic = Topic::parse(&raw);
            prop_assert!(topic.is_ok(), "Topic with separator should pass: {}", raw);
            let topic = topic.unwrap();
            prop_assert_eq!(topic.as_str(), raw.as_str());
        }

        #[test]
        fn topics_without_separator_are_rejected(raw in "[^/]{1,32}") {
            prop_assert_eq!(
                Topic::parse(&raw),
                Err(TopicError::MissingSeparator(raw.clone()))
            );
        }
    }

    #[test]
    fn test_topic_validation_examples() {
        assert!(Topic::parse("a/b").is_ok());
        assert!(Topic::parse("command/confirm").is_ok());
        assert!(Topic::parse("/").is_ok());
        assert!(Topic::parse("sensors/+/temperature").is_ok());

        assert_eq!(Topic::parse(""), Err(TopicError::Empty));
        assert_eq!(
            Topic::parse("ab"),
            Err(TopicError::MissingSeparator("ab".to_string()))
        );
    }

    #[test]
    fn test_parse_topic_line_keeps_valid_tokens() {
        let results = parse_topic_line("  a/b   bad  c/d/e\t");
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().as_str(), "a/b");
        assert_eq!(
            results[1],
            Err(TopicError::MissingSeparator("bad".to_string()))
        );
        assert_eq!(results[2].as_ref().unwrap().as_str(), "c/d/e");
    }

    #[test]
    fn test_parse_topic_line_empty_input() {
        assert!(parse_topic_line("").is_empty());
        assert!(parse_topic_line("   \n").is_empty());
    }

    #[test]
    fn test_topic_error_message_names_topic() {
        let err = Topic::parse("lights").unwrap_err();
        assert_eq!(
            err.to_string(),
            "lights is not a valid topic name. Correct format is [topic]/[name]"
        );
    }
}
