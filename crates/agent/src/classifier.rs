use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm::LlmClient;
use crate::prompts::{SENSITIVE_TOPIC_PROMPT, SENTIMENT_PROMPT};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentCategory {
    Negative,
    Neutral,
    Positive,
}

/// Sentiment contract: score in [-1, 1], a coarse category, and per-emotion
/// intensities in [0, 1].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    pub score: f32,
    pub category: SentimentCategory,
    #[serde(default)]
    pub emotions: BTreeMap<String, f32>,
}

impl SentimentAnalysis {
    pub fn neutral() -> Self {
        Self { score: 0.0, category: SentimentCategory::Neutral, emotions: BTreeMap::new() }
    }

    /// Emotion labels at or above the given intensity, strongest first.
    pub fn dominant_emotions(&self, min_intensity: f32) -> Vec<String> {
        let mut ranked: Vec<(&String, f32)> =
            self.emotions.iter().map(|(label, intensity)| (label, *intensity)).collect();
        ranked.retain(|(_, intensity)| *intensity >= min_intensity);
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.into_iter().map(|(label, _)| label.clone()).collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicCheck {
    #[serde(rename = "containsSensitiveTopics")]
    pub contains_sensitive_topics: bool,
    #[serde(rename = "detectedTopics", default)]
    pub detected_topics: Vec<String>,
}

/// Sentiment and sensitive-topic detection over a message. Implementations
/// absorb their own failures: a broken backend yields a neutral/no-topic
/// result, never an error, so the conversation can proceed.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn analyze_sentiment(&self, text: &str) -> SentimentAnalysis;
    async fn check_sensitive_topics(&self, text: &str) -> TopicCheck;
}

/// LLM-backed classifier. Prompts for JSON; falls back to keyword matching
/// when the reply does not parse, and to a neutral result when the transport
/// fails.
pub struct LlmClassifier {
    llm: Arc<dyn LlmClient>,
    sensitive_topics: Vec<String>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, sensitive_topics: Vec<String>) -> Self {
        Self { llm, sensitive_topics }
    }

    fn keyword_topic_check(&self, text: &str) -> TopicCheck {
        let lowered = text.to_lowercase();
        let detected_topics: Vec<String> = self
            .sensitive_topics
            .iter()
            .filter(|topic| lowered.contains(&topic.to_lowercase()))
            .cloned()
            .collect();
        TopicCheck { contains_sensitive_topics: !detected_topics.is_empty(), detected_topics }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn analyze_sentiment(&self, text: &str) -> SentimentAnalysis {
        let prompt = SENTIMENT_PROMPT.replace("{message}", text);
        let reply = match self.llm.complete(&prompt).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(error = %error, "sentiment analysis failed, assuming neutral");
                return SentimentAnalysis::neutral();
            }
        };

        match serde_json::from_str::<SentimentAnalysis>(strip_code_fences(&reply)) {
            Ok(analysis) if analysis.score.is_finite() => analysis,
            _ => {
                tracing::warn!("sentiment reply did not parse, using keyword fallback");
                keyword_sentiment(&reply)
            }
        }
    }

    async fn check_sensitive_topics(&self, text: &str) -> TopicCheck {
        if self.sensitive_topics.is_empty() {
            return TopicCheck::default();
        }

        let prompt = SENSITIVE_TOPIC_PROMPT
            .replace("{topics}", &self.sensitive_topics.join(", "))
            .replace("{message}", text);
        let reply = match self.llm.complete(&prompt).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(error = %error, "topic detection failed, assuming no topics");
                return TopicCheck::default();
            }
        };

        match serde_json::from_str::<TopicCheck>(strip_code_fences(&reply)) {
            Ok(check) => check,
            Err(_) => {
                tracing::warn!("topic reply did not parse, using keyword fallback");
                self.keyword_topic_check(text)
            }
        }
    }
}

/// Models often wrap JSON in markdown fences; peel them off before parsing.
fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches(['\r', '\n']).trim_end_matches('`').trim()
}

/// Crude fallback when the model answered in prose instead of JSON: scan the
/// reply itself for a polarity word.
fn keyword_sentiment(reply: &str) -> SentimentAnalysis {
    let lowered = reply.to_lowercase();
    let score = if lowered.contains("negative") {
        -0.5
    } else if lowered.contains("positive") {
        0.5
    } else {
        0.0
    };

    let category = if score < -0.1 {
        SentimentCategory::Negative
    } else if score > 0.1 {
        SentimentCategory::Positive
    } else {
        SentimentCategory::Neutral
    };

    SentimentAnalysis { score, category, emotions: BTreeMap::new() }
}
