use log::{info, warn};
use regex::Regex;
use reqwest::{Client, ClientBuilder};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::OnceLock;

use crate::core::{PipelineConfig, StepResult};

const SYSTEM_PROMPT: &str = "You are a helpful assistant that analyzes website \
content to detect promotions. Always respond with valid JSON only.";

const DEFAULT_MODEL_CONFIDENCE: Decimal = dec!(0.8);

/// What the model tier concluded when it found a promotion.
#[derive(Debug, Clone)]
pub struct ModelDetection {
    pub text: String,
    pub confidence: Decimal,
    pub reasoning: String,
}

/// The strict JSON shape the model is instructed to return.
#[derive(Debug, Deserialize)]
struct ClassificationPayload {
    promotion_found: bool,
    #[serde(default)]
    promotion_text: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: String,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize, Serialize)]
struct ChatMessage {
    content: String,
}

/// Tier-2 classifier: hands cleaned page text to an external language model.
/// Every failure mode degrades to "no promotion found" — the model tier can
/// never fail the Classifier step.
pub struct ModelClient {
    client: Client,
    endpoint: String,
    model: String,
    input_limit: usize,
}

impl ModelClient {
    pub fn new(config: &PipelineConfig) -> StepResult<Self> {
        let client = ClientBuilder::new()
            .timeout(config.fallback_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: config.model_endpoint.clone(),
            model: config.model_name.clone(),
            input_limit: config.model_input_limit,
        })
    }

    pub async fn classify(
        &self,
        site_name: &str,
        page_text: &str,
        api_key: &str,
    ) -> Option<ModelDetection> {
        let text: String = page_text.chars().take(self.input_limit).collect();
        let prompt = format!(
            "You are analyzing the website content for {site_name} to detect if \
there are any active promotions, sales, or special offers.\n\nWebsite content:\n{text}\n\n\
Please analyze this content and determine if there are any current promotions, \
sales, discounts, or special offers.\n\nYour response MUST be in JSON format with \
the following structure:\n{{\n    \"promotion_found\": true/false,\n    \
\"promotion_text\": \"exact text of the promotion if found, or empty string if not found\",\n    \
\"confidence\": 0.0-1.0,\n    \"reasoning\": \"brief explanation of your decision\"\n}}\n\n\
Only return the JSON object, nothing else."
        );

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "max_tokens": 500,
            "temperature": 0.3,
            "response_format": { "type": "json_object" }
        });

        let response = match self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Model classification request failed: {e}");
                return None;
            }
        };

        let completion: ChatCompletion = match response.json().await {
            Ok(completion) => completion,
            Err(e) => {
                warn!("Model returned an undecodable completion envelope: {e}");
                return None;
            }
        };

        let content = completion.choices.first()?.message.content.trim();
        let payload: ClassificationPayload =
            match serde_json::from_str(strip_code_fences(content)) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Model returned malformed classification JSON: {e}");
                    return None;
                }
            };

        if !payload.promotion_found {
            return None;
        }

        let confidence = payload
            .confidence
            .and_then(Decimal::from_f64)
            .unwrap_or(DEFAULT_MODEL_CONFIDENCE)
            .clamp(Decimal::ZERO, Decimal::ONE);

        info!(
            "Model tier found a promotion (confidence {confidence}): {}",
            payload.reasoning
        );

        Some(ModelDetection {
            text: payload.promotion_text,
            confidence,
            reasoning: payload.reasoning,
        })
    }
}

/// Models sometimes wrap their JSON in markdown code fences despite being
/// told not to; tolerate "```json\n{...}\n```" and plain "```" fences.
pub fn strip_code_fences(content: &str) -> &str {
    let content = content.trim();
    let Some(rest) = content.strip_prefix("```") else {
        return content;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

fn whitespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Collapse a page down to its visible text: drop script/style/nav/header/
/// footer subtrees, then squeeze whitespace.
pub fn visible_text(html: &str) -> String {
    const EXCLUDED: &[&str] = &["script", "style", "nav", "header", "footer"];

    let document = Html::parse_document(html);
    let mut collected = String::new();

    for node in document.root_element().descendants() {
        if let Some(text) = node.value().as_text() {
            let excluded = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|element| EXCLUDED.contains(&element.name()))
            });
            if !excluded {
                collected.push_str(text);
                collected.push(' ');
            }
        }
    }

    whitespace_pattern()
        .replace_all(collected.trim(), " ")
        .into_owned()
}
