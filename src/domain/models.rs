use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lower and upper bound of the canonical trait scale.
pub const SCALE_MIN: f64 = 1.0;
pub const SCALE_MAX: f64 = 5.0;

/// Big-Five categories. Declaration order is the canonical order used for
/// every ordered output (insights, prompts, question round-robin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trait {
    Openness,
    Conscientiousness,
    Extraversion,
    Agreeableness,
    Neuroticism,
}

impl Trait {
    pub const ALL: [Trait; 5] = [
        Trait::Openness,
        Trait::Conscientiousness,
        Trait::Extraversion,
        Trait::Agreeableness,
        Trait::Neuroticism,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Trait::Openness => "openness",
            Trait::Conscientiousness => "conscientiousness",
            Trait::Extraversion => "extraversion",
            Trait::Agreeableness => "agreeableness",
            Trait::Neuroticism => "neuroticism",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Trait::Openness => "Openness",
            Trait::Conscientiousness => "Conscientiousness",
            Trait::Extraversion => "Extraversion",
            Trait::Agreeableness => "Agreeableness",
            Trait::Neuroticism => "Neuroticism",
        }
    }
}

impl fmt::Display for Trait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trait {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "openness" | "openness to experience" => Ok(Trait::Openness),
            "conscientiousness" => Ok(Trait::Conscientiousness),
            "extraversion" | "extroversion" => Ok(Trait::Extraversion),
            "agreeableness" => Ok(Trait::Agreeableness),
            "neuroticism" | "emotional stability" => Ok(Trait::Neuroticism),
            _ => Err(()),
        }
    }
}

/// Trait -> score on the 1-5 scale. Traits without answers are absent.
pub type TraitScores = BTreeMap<Trait, f64>;

/// Maps a 1-5 score onto 0-1 (used by the visualization payload).
pub fn to_unit_scale(score: f64) -> f64 {
    ((score - SCALE_MIN) / (SCALE_MAX - SCALE_MIN)).clamp(0.0, 1.0)
}

pub fn unit_scores(scores: &TraitScores) -> TraitScores {
    scores
        .iter()
        .map(|(t, s)| (*t, to_unit_scale(*s)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub value: i16,
    pub label: String,
}

/// The five-point agreement scale every question uses.
pub fn likert_options() -> Vec<AnswerOption> {
    [
        (1, "Strongly disagree"),
        (2, "Disagree"),
        (3, "Neutral"),
        (4, "Agree"),
        (5, "Strongly agree"),
    ]
    .into_iter()
    .map(|(value, label)| AnswerOption {
        value,
        label: label.to_string(),
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(rename = "trait")]
    pub category: Trait,
    pub weight: f32,
    pub options: Vec<AnswerOption>,
}

impl Question {
    pub fn likert(id: impl Into<String>, text: impl Into<String>, category: Trait, weight: f32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            category,
            weight,
            options: likert_options(),
        }
    }

    pub fn accepts(&self, value: i16) -> bool {
        self.options.iter().any(|o| o.value == value)
    }

    pub fn option_label(&self, value: i16) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.label.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: String,
    pub value: i16,
    #[serde(rename = "trait")]
    pub category: Trait,
    /// Statement as shown to the user. Generated questions are not in the
    /// bank, so their wording travels with the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_text: Option<String>,
}

#[derive(Debug, FromRow)]
pub struct TestResultRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub enc_answers: String,
    pub trait_scores: Json<TraitScores>,
    pub insights: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub insights_updated_at: Option<DateTime<Utc>>,
    pub share_count: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct SharedResult {
    pub share_id: String,
    pub test_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub view_count: i32,
}

impl SharedResult {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_trait_parsing() {
        assert_eq!("Openness".parse::<Trait>(), Ok(Trait::Openness));
        assert_eq!(" extroversion ".parse::<Trait>(), Ok(Trait::Extraversion));
        assert!("charisma".parse::<Trait>().is_err());
    }

    #[test]
    fn test_scores_serialize_with_trait_keys() {
        let mut scores = TraitScores::new();
        scores.insert(Trait::Openness, 4.0);
        let json = serde_json::to_value(&scores).unwrap();
        assert_eq!(json, serde_json::json!({ "openness": 4.0 }));

        let back: TraitScores = serde_json::from_value(json).unwrap();
        assert_eq!(back.get(&Trait::Openness), Some(&4.0));
    }

    #[test]
    fn test_answer_wire_format() {
        let answer: Answer = serde_json::from_value(serde_json::json!({
            "questionId": "bank-1",
            "value": 5,
            "trait": "openness"
        }))
        .unwrap();
        assert_eq!(answer.category, Trait::Openness);
        assert_eq!(answer.question_id, "bank-1");
        assert_eq!(answer.question_text, None);

        let generated: Answer = serde_json::from_value(serde_json::json!({
            "questionId": "ai-1",
            "value": 2,
            "trait": "neuroticism",
            "questionText": "I worry about small things."
        }))
        .unwrap();
        assert_eq!(generated.question_text.as_deref(), Some("I worry about small things."));
    }

    #[test]
    fn test_unit_scale_conversion() {
        assert_eq!(to_unit_scale(1.0), 0.0);
        assert_eq!(to_unit_scale(5.0), 1.0);
        assert_eq!(to_unit_scale(3.0), 0.5);
        assert_eq!(to_unit_scale(9.0), 1.0);
    }

    #[test]
    fn test_share_expiry() {
        let now = Utc::now();
        let share = SharedResult {
            share_id: "abc".to_string(),
            test_id: Uuid::new_v4(),
            created_at: now - Duration::days(31),
            expires_at: now - Duration::days(1),
            view_count: 3,
        };
        assert!(!share.is_active(now));
        assert!(share.is_active(now - Duration::days(2)));
    }
}
