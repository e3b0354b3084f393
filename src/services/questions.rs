use crate::domain::insights::format_answers;
use crate::domain::models::{Answer, Question, Trait, TraitScores};
use crate::domain::{question_bank, scoring};
use crate::services::ai::{json_array_candidates, AiReply, AiService};
use crate::services::cache::TtlCache;
use crate::services::telemetry::{TelemetrySample, TelemetryService};
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const DEFAULT_ADAPTIVE_COUNT: usize = 5;
pub const MAX_ADAPTIVE_COUNT: usize = 10;

const ADAPTIVE_SYSTEM_PROMPT: &str = r#"You write follow-up items for a Big-Five personality questionnaire.
Each item is a first-person statement the user rates from 1 (strongly disagree) to 5 (strongly agree).
Target the traits where the current scores are least certain (closest to 3) and avoid repeating earlier statements.
Reply with a JSON array only. Each element: {"text": string, "trait": one of openness|conscientiousness|extraversion|agreeableness|neuroticism, "weight": number between 0.5 and 2.0}."#;

/// Cache key: the shape of the request, not the individual answers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdaptiveKey {
    count: usize,
    profile: Vec<(Trait, u8)>,
}

impl AdaptiveKey {
    pub fn new(count: usize, scores: &TraitScores) -> Self {
        Self {
            count,
            profile: scoring::score_profile(scores),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedQuestion {
    text: String,
    #[serde(rename = "trait")]
    category: String,
    #[serde(default)]
    weight: Option<f32>,
}

impl GeneratedQuestion {
    fn into_question(self) -> Option<Question> {
        let text = self.text.trim();
        if text.is_empty() {
            return None;
        }
        let category = self.category.parse::<Trait>().ok()?;
        let weight = self
            .weight
            .filter(|w| w.is_finite())
            .unwrap_or(1.0)
            .clamp(0.5, 2.0);
        Some(Question::likert(format!("ai-{}", Uuid::new_v4()), text, category, weight))
    }
}

/// Reads a model reply as a question batch. The first JSON array holding at
/// least one usable item wins; items with unknown traits or no text are
/// skipped.
pub fn parse_question_reply(raw: &str, count: usize) -> AiReply<Vec<Question>> {
    for candidate in json_array_candidates(raw) {
        let Ok(items) = serde_json::from_str::<Vec<serde_json::Value>>(candidate) else {
            continue;
        };
        let questions: Vec<Question> = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<GeneratedQuestion>(item).ok())
            .filter_map(GeneratedQuestion::into_question)
            .take(count)
            .collect();
        if !questions.is_empty() {
            return AiReply::Parsed(questions);
        }
    }
    AiReply::Unrecognized(raw.to_string())
}

pub fn build_adaptive_prompt(previous: &[Answer], scores: &TraitScores, count: usize) -> String {
    let mut prompt = format!("Write {count} new statements.\n\nCurrent scores (1-5):\n");
    for (category, score) in scores {
        let _ = writeln!(prompt, "- {}: {:.2}", category, score);
    }
    prompt.push_str("\nAnswers so far:\n");
    for (answer, formatted) in previous.iter().zip(format_answers(previous)) {
        let _ = writeln!(
            prompt,
            "- [{}] \"{}\" -> {} ({})",
            answer.category, formatted.question, formatted.answer, formatted.value
        );
    }
    prompt
}

pub struct QuestionService {
    ai: Arc<AiService>,
    cache: TtlCache<AdaptiveKey, Vec<Question>>,
    telemetry: Arc<TelemetryService>,
}

impl QuestionService {
    pub fn new(ai: Arc<AiService>, cache_ttl: Duration, telemetry: Arc<TelemetryService>) -> Self {
        Self {
            ai,
            cache: TtlCache::new(cache_ttl),
            telemetry,
        }
    }

    /// Generated follow-up questions for a session in progress. Always
    /// returns a batch: any AI failure yields the static fallback questions.
    pub async fn request_adaptive_questions(
        &self,
        previous: &[Answer],
        scores: &TraitScores,
        count: usize,
    ) -> Vec<Question> {
        let count = count.clamp(1, MAX_ADAPTIVE_COUNT);
        let key = AdaptiveKey::new(count, scores);
        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!("Adaptive question cache hit ({} questions)", hit.len());
            return hit;
        }

        let started = Instant::now();
        let prompt = build_adaptive_prompt(previous, scores, count);
        let reply = match self.ai.complete(ADAPTIVE_SYSTEM_PROMPT, &prompt).await {
            Ok(text) => parse_question_reply(&text, count),
            Err(e) => {
                tracing::warn!("Adaptive question generation failed, using fallback: {}", e);
                self.telemetry
                    .record(TelemetrySample::error(e.to_string(), Some("adaptive_questions".into())))
                    .await;
                return question_bank::fallback_adaptive_questions(count);
            }
        };
        self.telemetry
            .record(TelemetrySample::metric(
                "ai.adaptive_questions.latency_ms",
                started.elapsed().as_millis() as f64,
            ))
            .await;

        match reply {
            AiReply::Parsed(questions) => {
                tracing::info!("Generated {} adaptive questions", questions.len());
                self.cache.insert(key, questions.clone()).await;
                questions
            }
            AiReply::Unrecognized(raw) => {
                tracing::warn!(
                    "Adaptive question reply had no usable JSON ({} chars), using fallback",
                    raw.len()
                );
                self.telemetry
                    .record(TelemetrySample::metric("ai.adaptive_questions.unrecognized", 1.0))
                    .await;
                question_bank::fallback_adaptive_questions(count)
            }
        }
    }

    pub async fn evict_expired(&self) -> usize {
        self.cache.evict_expired().await
    }

    pub async fn cached_batches(&self) -> usize {
        self.cache.len().await
    }
}
