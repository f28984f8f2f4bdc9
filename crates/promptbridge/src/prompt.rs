//! Prompt interception.
//!
//! The scripted side reaches the host by raising a text prompt whose message
//! starts with the invocation prefix. [`PromptInterceptor`] sits where the
//! host answers prompts, handles bridge calls and hands everything else to
//! the delegate that was there before.

use std::sync::Arc;

use crate::invocation::Response;
use crate::keystone::Keystone;

/// Something that answers text prompts raised by the scripted side.
pub trait PromptDelegate: Send + Sync {
    /// `None` leaves the prompt unanswered.
    fn answer_prompt(&self, prompt: &str, default_text: Option<&str>) -> Option<String>;
}

impl<F> PromptDelegate for F
where
    F: Fn(&str, Option<&str>) -> Option<String> + Send + Sync,
{
    fn answer_prompt(&self, prompt: &str, default_text: Option<&str>) -> Option<String> {
        self(prompt, default_text)
    }
}

pub struct PromptInterceptor {
    keystone: Arc<Keystone>,
    fallback: Option<Arc<dyn PromptDelegate>>,
}

impl PromptInterceptor {
    pub fn new(keystone: Arc<Keystone>) -> Self {
        Self {
            keystone,
            fallback: None,
        }
    }

    /// Forward prompts that are not bridge calls to `delegate`.
    pub fn with_fallback(mut self, delegate: Arc<dyn PromptDelegate>) -> Self {
        self.fallback = Some(delegate);
        self
    }

    pub fn is_bridge_call(&self, prompt: &str) -> bool {
        prompt.starts_with(self.keystone.invocation_prefix())
    }
}

impl PromptDelegate for PromptInterceptor {
    fn answer_prompt(&self, prompt: &str, default_text: Option<&str>) -> Option<String> {
        if self.is_bridge_call(prompt) {
            let answer = self
                .keystone
                .handle_raw_invocation(prompt, default_text)
                .unwrap_or_else(|| Response::EMPTY_JSON.to_string());
            return Some(answer);
        }
        self.fallback
            .as_ref()
            .and_then(|delegate| delegate.answer_prompt(prompt, default_text))
    }
}
