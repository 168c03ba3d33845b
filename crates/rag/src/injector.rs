//! Folding retrieved content into the outgoing prompt.

use recall_common::{RecallError, Result};

use crate::content::Content;

pub const USER_MESSAGE_PLACEHOLDER: &str = "{{userMessage}}";
pub const CONTENTS_PLACEHOLDER: &str = "{{contents}}";
pub const DEFAULT_PROMPT_TEMPLATE: &str = "{{userMessage}}\n\n[Context]\n{{contents}}";

/// Builds the final prompt from the user's message and the aggregated content.
pub trait ContentInjector: Send + Sync {
    fn inject(&self, contents: &[Content], user_message: &str) -> String;
}

/// A prompt template with exactly the two known placeholders. Validated once
/// at construction so rendering cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [USER_MESSAGE_PLACEHOLDER, CONTENTS_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(RecallError::Config(format!(
                    "prompt template is missing the {placeholder} placeholder"
                )));
            }
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitutes in a single left-to-right pass, so placeholder text that
    /// appears inside the user message or the contents is left alone.
    pub fn render(&self, user_message: &str, contents: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + user_message.len() + contents.len());
        let mut rest = self.template.as_str();

        loop {
            let next = [
                (rest.find(USER_MESSAGE_PLACEHOLDER), USER_MESSAGE_PLACEHOLDER, user_message),
                (rest.find(CONTENTS_PLACEHOLDER), CONTENTS_PLACEHOLDER, contents),
            ]
            .into_iter()
            .filter_map(|(pos, placeholder, value)| pos.map(|p| (p, placeholder, value)))
            .min_by_key(|(pos, _, _)| *pos);

            match next {
                Some((pos, placeholder, value)) => {
                    out.push_str(&rest[..pos]);
                    out.push_str(value);
                    rest = &rest[pos + placeholder.len()..];
                }
                None => {
                    out.push_str(rest);
                    return out;
                }
            }
        }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

/// Joins content texts with blank lines and renders them into the template.
/// An empty content list still renders; the context section is just empty.
#[derive(Debug, Clone, Default)]
pub struct DefaultContentInjector {
    template: PromptTemplate,
}

impl DefaultContentInjector {
    pub fn new(template: PromptTemplate) -> Self {
        Self { template }
    }
}

impl ContentInjector for DefaultContentInjector {
    fn inject(&self, contents: &[Content], user_message: &str) -> String {
        let joined = contents
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        self.template.render(user_message, &joined)
    }
}
