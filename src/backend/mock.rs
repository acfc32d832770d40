//! Scripted adapter for testing without a live provider.
//!
//! [`MockAdapter`] returns pre-configured replies in order, allowing
//! downstream consumers to write deterministic tests against this crate.
//!
//! # Example
//!
//! ```
//! use protocol_wizard::backend::{MockAdapter, MockReply};
//!
//! let mock = MockAdapter::new(vec![
//!     MockReply::fail("rate limited"),
//!     MockReply::text("{\"ok\": true}"),
//! ]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::Adapter;
use crate::config::CallConfig;
use crate::error::{Error, Result};
use crate::types::CallResult;

const PROVIDER: &str = "mock";

/// One scripted outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Successful call with this content.
    Text(String),
    /// Failed call carrying this error message.
    Fail(String),
    /// `Err` returned from the adapter itself.
    Raise(String),
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        MockReply::Text(content.into())
    }

    pub fn fail(error: impl Into<String>) -> Self {
        MockReply::Fail(error.into())
    }

    pub fn raise(error: impl Into<String>) -> Self {
        MockReply::Raise(error.into())
    }
}

/// A test adapter that returns scripted replies in order.
///
/// Cycles back to the beginning when all replies have been consumed.
#[derive(Debug)]
pub struct MockAdapter {
    replies: Vec<MockReply>,
    index: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    configured: bool,
    tokens: Option<u64>,
}

impl MockAdapter {
    /// Create a mock with the given replies, returned in order.
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies,
            index: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            configured: true,
            tokens: None,
        }
    }

    /// A mock that always succeeds with the same content.
    pub fn always(content: impl Into<String>) -> Self {
        Self::new(vec![MockReply::text(content)])
    }

    /// A mock that always fails with the same error.
    pub fn failing(error: impl Into<String>) -> Self {
        Self::new(vec![MockReply::fail(error)])
    }

    /// Report the adapter as missing its credential.
    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Token count attached to successful replies.
    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Number of attempts made so far.
    pub fn calls(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    /// Prompts received, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self) -> Option<MockReply> {
        if self.replies.is_empty() {
            return None;
        }
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        Some(self.replies[idx].clone())
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn attempt(&self, prompt: &str, model: &str, _config: &CallConfig) -> Result<CallResult> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        match self.next_reply() {
            Some(MockReply::Text(content)) => {
                Ok(CallResult::success(PROVIDER, model, content, self.tokens))
            }
            Some(MockReply::Fail(error)) => Ok(CallResult::failure(PROVIDER, model, error)),
            Some(MockReply::Raise(error)) => Err(Error::Other(error)),
            None => Err(Error::Other("mock adapter has no replies".into())),
        }
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn is_configured(&self) -> bool {
        self.configured
    }
}
