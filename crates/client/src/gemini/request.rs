//! Gemini `generateContent` request body.

use serde::{Deserialize, Serialize};

use super::GeminiError;

/// One message in a Gemini conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Sampling options. Unset fields use the model's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// Body of `POST models/{model}:generateContent`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    /// Single-turn request carrying one user prompt.
    pub fn from_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text: Some(prompt.to_string()) }],
            }],
            generation_config: None,
        }
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    /// Validate the request before sending.
    pub fn validate(&self) -> Result<(), GeminiError> {
        let has_text = self
            .contents
            .iter()
            .flat_map(|c| &c.parts)
            .any(|p| p.text.as_deref().is_some_and(|t| !t.trim().is_empty()));

        if !has_text {
            return Err(GeminiError::InvalidPrompt("prompt cannot be empty".to_string()));
        }

        if let Some(temperature) = self.generation_config.as_ref().and_then(|c| c.temperature)
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(GeminiError::InvalidPrompt("temperature must be between 0 and 2".to_string()));
        }

        Ok(())
    }
}
