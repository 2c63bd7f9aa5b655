//! OpenAI-compatible chat completion client.

use anyhow::{anyhow, Result};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::time::Duration;

use batchrag_core::config::Settings;
use batchrag_core::traits::Generator;

pub struct OpenAiChatModel {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(api_base: &str, api_key: String, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> batchrag_core::Result<Self> {
        let key = settings.openai.api_key()?;
        Self::new(&settings.openai.api_base, key, &settings.models.chat, Duration::from_secs(settings.openai.timeout_secs))
            .map_err(|e| batchrag_core::Error::InvalidConfig(e.to_string()))
    }
}

/// An empty system prompt is left out instead of being sent as an empty message.
fn chat_messages(system_prompt: &str, user_prompt: &str) -> Value {
    let mut messages = Vec::with_capacity(2);
    if !system_prompt.trim().is_empty() {
        messages.push(json!({ "role": "system", "content": system_prompt }));
    }
    messages.push(json!({ "role": "user", "content": user_prompt }));
    Value::Array(messages)
}

impl Generator for OpenAiChatModel {
    fn generate(&self, system_prompt: &str, user_prompt: &str, temperature: f32) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = json!({
            "model": self.model,
            "messages": chat_messages(system_prompt, user_prompt),
            "temperature": temperature,
        });

        let res = self.client.post(&url).bearer_auth(&self.api_key).json(&body).send()?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().unwrap_or_default();
            return Err(anyhow!("OpenAI chat error {}: {}", status, text));
        }

        let payload: Value = res.json()?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("chat response has no message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_system_prompt_is_omitted() {
        let messages = chat_messages("", "make queries");
        assert_eq!(messages.as_array().map(Vec::len), Some(1));
        assert_eq!(messages[0]["role"], "user");

        let messages = chat_messages("be brief", "hello");
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "hello");
    }
}
