use async_trait::async_trait;
use tracing::{error, info};

use crate::error::{LektorError, Result};

/// Scores a transcript against the checklist, optionally informed by the
/// mentor material that accompanies the lesson.
#[async_trait]
pub trait Grader: Send + Sync {
    async fn evaluate(
        &self,
        transcript: &str,
        checklist: &str,
        material_type: &str,
        material_text: &str,
    ) -> Result<String>;
}

/// AI provider for report grading.
#[derive(Clone, Debug, Default)]
pub enum Provider {
    #[default]
    Grok,
    Openai,
    Gemini,
}

pub struct ProviderConfig {
    pub api_url: &'static str,
    pub model: &'static str,
    pub env_var: &'static str,
}

impl Provider {
    pub fn config(&self) -> ProviderConfig {
        match self {
            Provider::Grok => ProviderConfig {
                api_url: "https://api.x.ai/v1/chat/completions",
                model: "grok-4-fast",
                env_var: "XAI_API_KEY",
            },
            Provider::Openai => ProviderConfig {
                api_url: "https://api.openai.com/v1/chat/completions",
                model: "gpt-5.1",
                env_var: "OPENAI_API_KEY",
            },
            Provider::Gemini => ProviderConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                model: "gemini-3-pro",
                env_var: "GEMINI_API_KEY",
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Grok => "Grok",
            Provider::Openai => "OpenAI",
            Provider::Gemini => "Gemini",
        }
    }

    /// Validate that the API key is set for this provider
    pub fn validate_api_key(&self) -> Result<String> {
        let config = self.config();
        std::env::var(config.env_var).map_err(|_| LektorError::MissingApiKey {
            env_var: config.env_var.to_string(),
        })
    }
}

const SYSTEM_PROMPT: &str = "You are an analytical quality assurance assistant.";

fn build_prompt(
    transcript: &str,
    checklist: &str,
    material_type: &str,
    material_text: &str,
) -> String {
    let material_context = if material_text.is_empty() {
        String::new()
    } else {
        match material_type {
            "slides" => format!("\n### SLIDE CONTENT ###\n{material_text}"),
            "notebook" => format!("\n### NOTEBOOK CONTENT ###\n{material_text}"),
            _ => String::new(),
        }
    };

    format!(
        r#"
### VIDEO TRANSCRIPT ###
{transcript}
{material_context}

### TASK ###
Review using this checklist:
{checklist}

### INSTRUCTIONS ###
1. For EACH checklist item:
   - Respond using format: [✅/❌/N/A] [Brief explanation]
2. After checklist, provide:
   - "What Went Wrong:" (bullet points)
   - "How to Improve:" (bullet points)
3. Use ONLY this format:

### RESPONSE FORMAT ###
1a: [✅/❌/N/A] [Explanation]
...
8b: [✅/❌/N/A] [Explanation]

What Went Wrong:
- [Issue 1]
- [Issue 2]

How to Improve:
- [Recommendation 1]
- [Recommendation 2]
"#
    )
}

/// Chat-completions implementation of [`Grader`].
pub struct ChatGrader {
    provider: Provider,
    api_key: String,
    client: reqwest::Client,
}

impl ChatGrader {
    pub fn new(provider: Provider) -> Result<Self> {
        let api_key = provider.validate_api_key()?;
        Ok(Self {
            provider,
            api_key,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl Grader for ChatGrader {
    async fn evaluate(
        &self,
        transcript: &str,
        checklist: &str,
        material_type: &str,
        material_text: &str,
    ) -> Result<String> {
        let config = self.provider.config();
        let user_input = build_prompt(transcript, checklist, material_type, material_text);

        info!(provider = %self.provider.name(), "requesting quality report");
        let response = self
            .client
            .post(config.api_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": config.model,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": user_input },
                ],
                "temperature": 0.2,
                "max_tokens": 4096,
                "top_p": 0.95,
            }))
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LektorError::GradeFailed {
                reason: format!("unexpected API response structure: {response:?}"),
            })?;

        Ok(content.trim().to_string())
    }
}

/// The body written in place of a report when grading fails.
pub fn error_marker_report(err: &LektorError) -> String {
    format!("Error in quality check: {err}")
}

/// Run the grader, degrading any failure into an error-marker report so the
/// stem still ends up with a report artifact instead of stalling.
pub async fn grade_or_error_marker(
    grader: &dyn Grader,
    transcript: &str,
    checklist: &str,
    material_type: &str,
    material_text: &str,
) -> String {
    match grader
        .evaluate(transcript, checklist, material_type, material_text)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "grading failed, writing error-marker report");
            error_marker_report(&e)
        }
    }
}
