use std::{env, sync::Arc};

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{DebateTranscript, Judge, JudgeError, Verdict, parse_score, parse_verdict};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 1000;

const SCORE_PROMPT: &str = "You judge an argument between a plaintiff and a defendant. \
Give a score close to 100 when the plaintiff argues more convincingly, close to 0 when the \
defendant does, and close to 50 when both are equally convincing. Logical evidence earns \
points; insults, emotional attacks and repeating earlier statements lose points. \
Reply only with JSON: {\"score\": <integer 0-100>}";

const VERDICT_PROMPT: &str = "You judge an argument between a plaintiff and a defendant and \
must pick exactly one winner. Score the winner's logic and empathy from 0 to 100. \
Logical evidence earns points; insults, emotional attacks and repeating earlier statements \
lose points. Reply only with JSON: {\"winner\": \"plaintiff\" or \"defendant\", \
\"winner_logic_score\": <integer>, \"winner_empathy_score\": <integer>, \
\"judgment_comment\": <comment on the whole debate>, \"winner_reason\": <why the winner \
earned points>, \"loser_reason\": <why the loser lost points>}";

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Bearer token.
    pub api_key: String,
    /// API root, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Model name sent with every request.
    pub model: String,
}

impl OpenAiConfig {
    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `OPENAI_MODEL`. Returns `None` without a key.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())?;
        Some(Self {
            api_key,
            base_url: env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into()),
        })
    }
}

#[derive(Debug, Error)]
enum OpenAiError {
    #[error("failed to build HTTP client")]
    ClientBuilder(#[source] reqwest::Error),
    #[error("request to `{url}` failed")]
    Send {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("`{url}` answered with status {status}")]
    Status { url: String, status: StatusCode },
    #[error("failed to decode completion response")]
    Decode(#[source] reqwest::Error),
}

impl From<OpenAiError> for JudgeError {
    fn from(err: OpenAiError) -> Self {
        JudgeError::Backend {
            message: err.to_string(),
            source: Box::new(err),
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Judge backed by an OpenAI chat completions model.
#[derive(Clone)]
pub struct OpenAiJudge {
    client: Client,
    url: Arc<str>,
    api_key: Arc<str>,
    model: Arc<str>,
}

impl OpenAiJudge {
    /// Build the HTTP client for `config`.
    pub fn new(config: OpenAiConfig) -> Result<Self, JudgeError> {
        let client = Client::builder()
            .build()
            .map_err(OpenAiError::ClientBuilder)?;
        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            url: url.into(),
            api_key: config.api_key.into(),
            model: config.model.into(),
        })
    }

    async fn complete(&self, system_prompt: &str, transcript: &str) -> Result<String, OpenAiError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: transcript,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(self.url.as_ref())
            .bearer_auth(self.api_key.as_ref())
            .json(&request)
            .send()
            .await
            .map_err(|source| OpenAiError::Send {
                url: self.url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OpenAiError::Status {
                url: self.url.to_string(),
                status,
            });
        }

        let completion = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(OpenAiError::Decode)?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

impl Judge for OpenAiJudge {
    fn verdict(&self, transcript: DebateTranscript) -> BoxFuture<'static, Result<Verdict, JudgeError>> {
        let judge = self.clone();
        Box::pin(async move {
            let reply = judge.complete(VERDICT_PROMPT, &transcript.to_string()).await?;
            parse_verdict(&reply)
        })
    }

    fn score(&self, transcript: DebateTranscript) -> BoxFuture<'static, Result<u8, JudgeError>> {
        let judge = self.clone();
        Box::pin(async move {
            let reply = judge.complete(SCORE_PROMPT, &transcript.to_string()).await?;
            parse_score(&reply)
        })
    }
}
