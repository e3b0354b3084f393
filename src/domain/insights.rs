//! Deterministic insight tiers. The AI tier lives in `services::insights`
//! and falls back to [`local_insights`].

use crate::domain::models::{likert_options, Answer, Trait, TraitScores};
use crate::domain::question_bank;
use serde::Serialize;

pub const MAX_INSIGHTS: usize = 5;
const HIGH_THRESHOLD: f64 = 4.0;
const LOW_THRESHOLD: f64 = 2.0;

pub const GENERIC_INSIGHTS: [&str; MAX_INSIGHTS] = [
    "Your answers show a personality that adapts to the situation rather than following one fixed pattern.",
    "You balance several traits at once, which usually makes it easier to work with many kinds of people.",
    "Noticing when you feel most energized can tell you a lot about the environments where you thrive.",
    "Small, consistent habits tend to shift how you experience everyday stress more than big resolutions.",
    "Retaking the assessment in a few months is a good way to see which of these patterns are stable.",
];

/// (trait, sentence for scores above 4, sentence for scores below 2)
fn rule(category: Trait) -> (&'static str, &'static str) {
    match category {
        Trait::Openness => (
            "You are highly curious and open to new ideas, which makes you creative and adaptable.",
            "You prefer the familiar and practical, which gives you focus and a grounded approach.",
        ),
        Trait::Conscientiousness => (
            "You are organized and dependable; people can rely on you to follow through.",
            "You keep things flexible and spontaneous, though structure could help with long-term goals.",
        ),
        Trait::Extraversion => (
            "You draw energy from other people and tend to thrive in social settings.",
            "You recharge best on your own and bring depth to one-on-one conversations.",
        ),
        Trait::Agreeableness => (
            "You are warm and cooperative, and others likely see you as a supportive presence.",
            "You are direct and comfortable with disagreement, which helps in tough negotiations.",
        ),
        Trait::Neuroticism => (
            "You feel emotions intensely; building routines for stress can make a real difference.",
            "You stay calm under pressure and recover quickly from setbacks.",
        ),
    }
}

/// One sentence per trait whose score crosses a threshold, canonical order.
pub fn rule_insights(scores: &TraitScores) -> Vec<String> {
    Trait::ALL
        .iter()
        .filter_map(|category| {
            let score = scores.get(category)?;
            let (high, low) = rule(*category);
            if *score > HIGH_THRESHOLD {
                Some(high.to_string())
            } else if *score < LOW_THRESHOLD {
                Some(low.to_string())
            } else {
                None
            }
        })
        .collect()
}

/// Rule table, or the generic list when no trait crosses a threshold.
pub fn local_insights(scores: &TraitScores) -> Vec<String> {
    let insights = rule_insights(scores);
    if insights.is_empty() {
        GENERIC_INSIGHTS.iter().map(|s| s.to_string()).collect()
    } else {
        insights
    }
}

/// Splits free-form model output into separate insights. Understands
/// numbered lists, bullets and plain lines; drops headings ending in ':'.
pub fn split_insights(text: &str) -> Vec<String> {
    text.lines()
        .map(strip_list_marker)
        .map(|line| line.trim_matches(|c| c == '*' || c == '"').trim())
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .map(str::to_string)
        .take(MAX_INSIGHTS)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    for bullet in ["- ", "* ", "• ", "– "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return rest.trim();
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim();
        }
    }
    line
}

/// Question / answer pair rendered for a prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedAnswer {
    pub question: String,
    pub answer: String,
    pub value: i16,
}

/// Text comes from the answer itself when it carries it, else from the bank.
/// Every question uses the agreement scale, so unknown ids still get a label.
pub fn format_answers(answers: &[Answer]) -> Vec<FormattedAnswer> {
    let scale = likert_options();
    answers
        .iter()
        .map(|a| {
            let banked = question_bank::find_question(&a.question_id);
            let question = a
                .question_text
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
                .or_else(|| banked.map(|q| q.text.clone()))
                .unwrap_or_else(|| format!("{} item {}", a.category.label(), a.question_id));
            let answer = banked
                .and_then(|q| q.option_label(a.value))
                .or_else(|| {
                    scale
                        .iter()
                        .find(|o| o.value == a.value)
                        .map(|o| o.label.as_str())
                })
                .unwrap_or("Custom answer")
                .to_string();
            FormattedAnswer {
                question,
                answer,
                value: a.value,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(Trait, f64)]) -> TraitScores {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_rule_table_thresholds() {
        let s = scores(&[
            (Trait::Openness, 4.5),
            (Trait::Conscientiousness, 4.0),
            (Trait::Extraversion, 1.5),
            (Trait::Neuroticism, 2.0),
        ]);
        let insights = rule_insights(&s);

        assert_eq!(insights.len(), 2);
        assert_eq!(insights[0], rule(Trait::Openness).0);
        assert_eq!(insights[1], rule(Trait::Extraversion).1);
    }

    #[test]
    fn test_generic_tier_when_nothing_stands_out() {
        let s = scores(&[(Trait::Openness, 3.0), (Trait::Agreeableness, 2.5)]);
        let insights = local_insights(&s);

        assert_eq!(insights.len(), MAX_INSIGHTS);
        assert_eq!(insights[0], GENERIC_INSIGHTS[0]);
        assert_eq!(local_insights(&TraitScores::new()).len(), MAX_INSIGHTS);
    }

    #[test]
    fn test_local_insights_deterministic() {
        let s = scores(&[
            (Trait::Neuroticism, 4.8),
            (Trait::Openness, 1.2),
            (Trait::Agreeableness, 4.1),
        ]);
        let first = local_insights(&s);
        assert_eq!(first, local_insights(&s.clone()));
        // canonical order, not insertion order
        assert_eq!(first[0], rule(Trait::Openness).1);
        assert_eq!(first[2], rule(Trait::Neuroticism).0);
    }

    #[test]
    fn test_split_numbered_and_bulleted() {
        let text = "Here are your insights:\n\n1. You like ideas.\n2) You plan ahead.\n- You enjoy people.\n• **You stay calm.**\n\n3. You help others.\n4. Extra one";
        let insights = split_insights(text);

        assert_eq!(
            insights,
            vec![
                "You like ideas.",
                "You plan ahead.",
                "You enjoy people.",
                "You stay calm.",
                "You help others.",
            ]
        );
    }

    #[test]
    fn test_split_empty_reply() {
        assert!(split_insights("   \n\n").is_empty());
        assert!(split_insights("Insights:").is_empty());
    }

    #[test]
    fn test_format_answers_uses_bank_text() {
        let bank_q = &question_bank::bank()[0];
        let answers = vec![
            Answer {
                question_id: bank_q.id.clone(),
                value: 4,
                category: bank_q.category,
                question_text: None,
            },
            Answer {
                question_id: "ai-unknown".to_string(),
                value: 2,
                category: Trait::Extraversion,
                question_text: None,
            },
            Answer {
                question_id: "ai-unknown-2".to_string(),
                value: 9,
                category: Trait::Extraversion,
                question_text: None,
            },
        ];
        let formatted = format_answers(&answers);

        assert_eq!(formatted[0].question, bank_q.text);
        assert_eq!(formatted[0].answer, "Agree");
        assert_eq!(formatted[1].question, "Extraversion item ai-unknown");
        assert_eq!(formatted[1].answer, "Disagree");
        assert_eq!(formatted[2].answer, "Custom answer");
    }

    #[test]
    fn test_format_answers_generated_question() {
        let question = crate::domain::models::Question::likert(
            "ai-1234",
            "I love abstract puzzles.",
            Trait::Openness,
            1.0,
        );
        let mut session = crate::domain::test_flow::TestSession::new(vec![question], false, 6);
        session.answer(4).unwrap();

        let formatted = format_answers(&session.answers());
        assert_eq!(
            formatted,
            vec![FormattedAnswer {
                question: "I love abstract puzzles.".to_string(),
                answer: "Agree".to_string(),
                value: 4,
            }]
        );
    }
}
