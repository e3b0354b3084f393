use crate::domain::insights::{local_insights, split_insights, FormattedAnswer};
use crate::domain::models::TraitScores;
use crate::services::ai::{AiReply, AiService};
use crate::services::telemetry::{TelemetrySample, TelemetryService};
use std::fmt::Write as _;
use std::sync::Arc;

const INSIGHT_SYSTEM_PROMPT: &str = "You are a warm, non-clinical personality coach. \
Given Big-Five scores on a 1-5 scale and the user's answers, write exactly 5 short, \
specific insights as a numbered list. One or two sentences each. No diagnoses, no headings.";

pub fn build_insight_prompt(scores: &TraitScores, answers: &[FormattedAnswer]) -> String {
    let mut prompt = String::from("Scores:\n");
    for (category, score) in scores {
        let _ = writeln!(prompt, "- {}: {:.2}", category.label(), score);
    }
    if !answers.is_empty() {
        prompt.push_str("\nAnswers:\n");
        for a in answers {
            let _ = writeln!(prompt, "- \"{}\" -> {} ({})", a.question, a.answer, a.value);
        }
    }
    prompt
}

pub fn parse_insight_reply(raw: &str) -> AiReply<Vec<String>> {
    let insights = split_insights(raw);
    if insights.is_empty() {
        AiReply::Unrecognized(raw.to_string())
    } else {
        AiReply::Parsed(insights)
    }
}

pub struct InsightService {
    ai: Arc<AiService>,
    telemetry: Arc<TelemetryService>,
}

impl InsightService {
    pub fn new(ai: Arc<AiService>, telemetry: Arc<TelemetryService>) -> Self {
        Self { ai, telemetry }
    }

    /// AI-written insights, or the local rule table when the model is
    /// unavailable or its reply can't be split into insights.
    pub async fn generate(&self, scores: &TraitScores, answers: &[FormattedAnswer]) -> Vec<String> {
        let prompt = build_insight_prompt(scores, answers);
        let reply = match self.ai.complete(INSIGHT_SYSTEM_PROMPT, &prompt).await {
            Ok(text) => parse_insight_reply(&text),
            Err(e) => {
                tracing::warn!("Insight generation failed, using local rules: {}", e);
                self.telemetry
                    .record(TelemetrySample::error(e.to_string(), Some("insights".into())))
                    .await;
                return local_insights(scores);
            }
        };

        match reply {
            AiReply::Parsed(insights) => insights,
            AiReply::Unrecognized(raw) => {
                tracing::warn!("Insight reply could not be split ({} chars)", raw.len());
                self.telemetry
                    .record(TelemetrySample::metric("ai.insights.unrecognized", 1.0))
                    .await;
                local_insights(scores)
            }
        }
    }
}
