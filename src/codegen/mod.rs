//! LLM-driven modeling-script generation.

pub mod prompt;

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use crate::config::LlmSettings;
use crate::error::ForgeError;
use crate::llm::{CompletionModel, CompletionRequest};

/// Highest sampling temperature the generator will use.
pub const MAX_TEMPERATURE: f32 = 0.1;
/// Smallest output budget the generator will request.
pub const MIN_OUTPUT_TOKENS: u32 = 5000;

/// A failed script and the error it produced.
#[derive(Debug, Clone, Copy)]
pub struct PreviousAttempt<'a> {
    pub script: &'a str,
    pub error: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    pub user_request: &'a str,
    pub geometry: &'a str,
    pub semantic_context: Option<&'a str>,
    pub previous: Option<PreviousAttempt<'a>>,
}

/// Script text, already stripped of markdown fences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GeneratedScript(String);

impl GeneratedScript {
    pub fn new(raw: &str) -> Self {
        Self(strip_fences(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Remove leading and trailing triple-backtick fences (with an optional
/// language tag) and surrounding whitespace. Idempotent.
pub fn strip_fences(text: &str) -> String {
    let mut s = text.trim();
    loop {
        let mut changed = false;
        if let Some(rest) = s.strip_prefix("```") {
            s = match rest.find('\n') {
                Some(idx) => &rest[idx + 1..],
                None if rest.chars().all(|c| c.is_ascii_alphanumeric()) => "",
                None => rest,
            };
            changed = true;
        }
        if let Some(rest) = s.strip_suffix("```") {
            s = rest;
            changed = true;
        }
        s = s.trim();
        if !changed {
            break;
        }
    }
    s.to_string()
}

pub struct CodeGenerator {
    model: Arc<dyn CompletionModel>,
    temperature: f32,
    max_tokens: u32,
}

impl CodeGenerator {
    pub fn new(model: Arc<dyn CompletionModel>, settings: &LlmSettings) -> Self {
        Self {
            model,
            temperature: settings.temperature.clamp(0.0, MAX_TEMPERATURE),
            max_tokens: settings.max_tokens.max(MIN_OUTPUT_TOKENS),
        }
    }

    /// One completion call; no retries here, repair is driven by the agent.
    #[instrument(name = "codegen.generate", skip_all, fields(model = self.model.model_name(), retry = input.previous.is_some()))]
    pub async fn generate(
        &self,
        input: &GenerationInput<'_>,
    ) -> Result<GeneratedScript, ForgeError> {
        let request = CompletionRequest {
            system: Some(prompt::ROLE_PREAMBLE.to_string()),
            prompt: prompt::build_prompt(input),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let raw = self.model.complete(request).await.map_err(|e| match e {
            ForgeError::LlmFailure(_) | ForgeError::AuthMissing(_) => e,
            other => ForgeError::LlmFailure(other.to_string()),
        })?;

        let script = GeneratedScript::new(&raw);
        if script.as_str().is_empty() {
            return Err(ForgeError::LlmFailure(
                "model returned no script after removing fences".into(),
            ));
        }
        info!(lines = script.as_str().lines().count(), "Script generated");
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex;

    struct EchoModel {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionModel for EchoModel {
        async fn complete(&self, request: CompletionRequest) -> Result<String, ForgeError> {
            self.seen.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn test_strip_fences_variants() {
        assert_eq!(strip_fences("```python\nimport cadquery as cq\n```"), "import cadquery as cq");
        assert_eq!(strip_fences("```\nx = 1\n```\n"), "x = 1");
        assert_eq!(strip_fences("x = 1"), "x = 1");
        assert_eq!(strip_fences("```python"), "");
    }

    proptest! {
        #[test]
        fn strip_fences_is_idempotent(body in ".{0,80}", lang in "[a-z]{0,6}", fenced in any::<bool>()) {
            let input = if fenced { format!("```{}\n{}\n```", lang, body) } else { body };
            let once = strip_fences(&input);
            prop_assert_eq!(strip_fences(&once), once.clone());
        }
    }

    #[tokio::test]
    async fn test_generate_clamps_sampling_and_strips() {
        let model = Arc::new(EchoModel {
            reply: "```python\nimport cadquery as cq\nresult = cq.Workplane().box(1, 1, 1)\n```".into(),
            seen: Mutex::new(Vec::new()),
        });
        let settings = LlmSettings {
            temperature: 0.7,
            max_tokens: 1000,
            ..Default::default()
        };
        let generator = CodeGenerator::new(model.clone(), &settings);
        let script = generator
            .generate(&GenerationInput {
                user_request: "cube",
                geometry: "geometry",
                semantic_context: None,
                previous: None,
            })
            .await
            .unwrap();
        assert!(script.as_str().starts_with("import cadquery"));

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].temperature, MAX_TEMPERATURE);
        assert_eq!(seen[0].max_tokens, MIN_OUTPUT_TOKENS);
    }

    #[tokio::test]
    async fn test_empty_reply_is_llm_failure() {
        let model = Arc::new(EchoModel {
            reply: "```\n```".into(),
            seen: Mutex::new(Vec::new()),
        });
        let generator = CodeGenerator::new(model, &LlmSettings::default());
        let err = generator
            .generate(&GenerationInput {
                user_request: "cube",
                geometry: "geometry",
                semantic_context: None,
                previous: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.label(), "LLM_FAILURE");
    }
}
