use serde::Serialize;

use crate::llm::openai::{
    ChatCompletionRequest, ChatMessage, ChatRole, ContentPart, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
};

pub const INSTRUCTION_TEXT: &str = "This provided image is a D&D 5e monster statblock. Please read the following pieces of information from the image, and output them in CSV format without any header and each value in double-quotes: name, challenge rating, armor class, type, and size. If you cannot find a statblock, return a string starting with \"error:\"  and a short message containing the problem.";

/// Everything needed for one vision completion. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionRequest {
    pub instruction_text: String,
    pub image_urls: Vec<String>,
    pub model_id: String,
    pub max_output_tokens: u32,
}

impl ExtractionRequest {
    /// Instruction first, then one image part per url in order. An empty
    /// image list is still a valid request.
    pub fn build(image_urls: &[String]) -> Self {
        Self {
            instruction_text: INSTRUCTION_TEXT.to_string(),
            image_urls: image_urls.to_vec(),
            model_id: DEFAULT_MODEL.to_string(),
            max_output_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_max_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn parts(&self) -> Vec<ContentPart> {
        let mut parts = Vec::with_capacity(self.image_urls.len() + 1);
        parts.push(ContentPart::Text(self.instruction_text.clone()));
        parts.extend(self.image_urls.iter().cloned().map(ContentPart::ImageUrl));
        parts
    }

    pub fn to_chat_request(&self) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: Some(self.model_id.clone()),
            messages: vec![ChatMessage::new(ChatRole::User, self.parts())],
            max_tokens: Some(self.max_output_tokens),
        }
    }
}
