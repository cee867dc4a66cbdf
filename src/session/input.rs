//! Operator input: where subscription topics come from

use crate::protocol::TopicError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

/// Prompt shown before each line of topics is read
pub const TOPIC_PROMPT: &str =
    "Enter topic names to subscribe to separated by a space. Topic name format is topic/name";

/// Source of whitespace-separated topic lines
#[async_trait]
pub trait TopicSource: Send {
    /// Ask the operator for input
    async fn prompt(&mut self) -> io::Result<()>;

    /// Next line, or `None` once input is exhausted
    async fn read_line(&mut self) -> io::Result<Option<String>>;

    /// Hook for a token that was not accepted; the session has already logged it
    fn reject(&mut self, _error: &TopicError) {}
}

/// Interactive source reading standard input
pub struct StdinTopicSource {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinTopicSource {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinTopicSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicSource for StdinTopicSource {
    async fn prompt(&mut self) -> io::Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(TOPIC_PROMPT.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        self.lines.next_line().await
    }
}

/// Pre-supplied lines, used for `--topics` and in tests
#[derive(Debug, Default)]
pub struct StaticTopicSource {
    lines: VecDeque<String>,
    prompts: usize,
    rejected: Vec<TopicError>,
}

impl StaticTopicSource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            prompts: 0,
            rejected: Vec::new(),
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts
    }

    pub fn rejected(&self) -> &[TopicError] {
        &self.rejected
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

#[async_trait]
impl TopicSource for StaticTopicSource {
    async fn prompt(&mut self) -> io::Result<()> {
        self.prompts += 1;
        Ok(())
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }

    fn reject(&mut self, error: &TopicError) {
        self.rejected.push(error.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_serves_lines_in_order() {
        let mut source = StaticTopicSource::new(["a/b", "c/d e/f"]);
        source.prompt().await.unwrap();

        assert_eq!(source.read_line().await.unwrap().as_deref(), Some("a/b"));
        assert_eq!(
            source.read_line().await.unwrap().as_deref(),
            Some("c/d e/f")
        );
        assert_eq!(source.read_line().await.unwrap(), None);
        assert_eq!(source.prompts(), 1);
    }

    #[test]
    fn test_static_source_records_rejections() {
        let mut source = StaticTopicSource::new(Vec::<String>::new());
        source.reject(&TopicError::MissingSeparator("ab".to_string()));
        assert_eq!(
            source.rejected(),
            &[TopicError::MissingSeparator("ab".to_string())]
        );
    }

    #[test]
    fn test_prompt_text() {
        assert!(TOPIC_PROMPT.contains("topic/name"));
    }
}
