//! Static Likert item bank, six statements per trait, plus the fixed batch
//! served when adaptive generation is unavailable.

use crate::domain::models::{Question, Trait};
use once_cell::sync::Lazy;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

pub const BANK_SIZE: usize = 30;

static BANK: Lazy<Vec<Question>> = Lazy::new(|| {
    let mut questions = Vec::with_capacity(BANK_SIZE);
    let mut next_id = 1;
    for category in Trait::ALL {
        for (text, weight) in statements(category) {
            questions.push(Question::likert(format!("bank-{next_id}"), *text, category, *weight));
            next_id += 1;
        }
    }
    questions
});

static FALLBACK: Lazy<Vec<Question>> = Lazy::new(|| {
    Trait::ALL
        .iter()
        .enumerate()
        .map(|(idx, category)| {
            Question::likert(format!("fb-{}", idx + 1), fallback_statement(*category), *category, 1.0)
        })
        .collect()
});

fn statements(category: Trait) -> &'static [(&'static str, f32)] {
    match category {
        Trait::Openness => &[
            ("I enjoy exploring ideas that challenge how I see the world.", 1.0),
            ("I am drawn to art, music or writing that feels unusual.", 1.0),
            ("I like trying a new route even when the old one works fine.", 0.8),
            ("I often daydream about how things could be done differently.", 1.0),
            ("I get curious about topics far outside my work.", 1.2),
            ("I prefer variety over routine.", 1.0),
        ],
        Trait::Conscientiousness => &[
            ("I finish tasks before I let myself relax.", 1.0),
            ("I keep my plans and commitments written down.", 0.8),
            ("People can count on me to be on time.", 1.0),
            ("I double-check my work before handing it in.", 1.0),
            ("I set goals and track my progress toward them.", 1.2),
            ("I keep my workspace in order.", 0.8),
        ],
        Trait::Extraversion => &[
            ("I feel energized after spending time in a group.", 1.2),
            ("I start conversations with people I have just met.", 1.0),
            ("I enjoy being the centre of attention.", 0.8),
            ("I would rather go out than stay in on a free evening.", 1.0),
            ("I speak up quickly in meetings.", 1.0),
            ("I make friends easily.", 1.0),
        ],
        Trait::Agreeableness => &[
            ("I go out of my way to help others.", 1.0),
            ("I trust people until they give me a reason not to.", 1.0),
            ("I try to see the other side in an argument.", 1.2),
            ("I feel other people's emotions strongly.", 1.0),
            ("I avoid harsh criticism even when I disagree.", 0.8),
            ("I enjoy cooperating more than competing.", 1.0),
        ],
        Trait::Neuroticism => &[
            ("I worry about things that might go wrong.", 1.2),
            ("My mood changes quickly.", 1.0),
            ("I get stressed out easily.", 1.0),
            ("Small setbacks can ruin my day.", 1.0),
            ("I often feel tense or nervous.", 1.0),
            ("I find it hard to let go of criticism.", 0.8),
        ],
    }
}

fn fallback_statement(category: Trait) -> &'static str {
    match category {
        Trait::Openness => "I actively look for experiences I have never had before.",
        Trait::Conscientiousness => "I stick to a plan even when something more fun comes up.",
        Trait::Extraversion => "Being around people recharges me more than being alone.",
        Trait::Agreeableness => "Keeping the peace matters more to me than winning a point.",
        Trait::Neuroticism => "I replay stressful situations in my head long after they end.",
    }
}

pub fn bank() -> &'static [Question] {
    &BANK
}

/// Fixed batch used when the adaptive service cannot produce questions.
pub fn fallback_adaptive_questions(count: usize) -> Vec<Question> {
    FALLBACK.iter().take(count.max(1)).cloned().collect()
}

/// Looks a question up in the bank or the fallback batch.
pub fn find_question(id: &str) -> Option<&'static Question> {
    bank().iter().chain(FALLBACK.iter()).find(|q| q.id == id)
}

/// Draws `count` bank questions, round-robin over the traits in canonical
/// order so coverage is as even as possible. Within a trait the order is a
/// shuffle driven by `seed`; the same seed always gives the same sample.
pub fn initial_questions(count: usize, seed: Option<u64>) -> Vec<Question> {
    let count = count.clamp(1, BANK_SIZE);
    let mut rng = StdRng::seed_from_u64(seed.unwrap_or_else(|| rand::thread_rng().gen()));

    let mut per_trait: Vec<Vec<&Question>> = Trait::ALL
        .iter()
        .map(|category| {
            let mut pool: Vec<&Question> = bank().iter().filter(|q| q.category == *category).collect();
            pool.shuffle(&mut rng);
            pool
        })
        .collect();

    let mut picked = Vec::with_capacity(count);
    let mut round = 0;
    while picked.len() < count {
        for pool in per_trait.iter_mut() {
            if picked.len() == count {
                break;
            }
            if let Some(question) = pool.get(round) {
                picked.push((*question).clone());
            }
        }
        round += 1;
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn test_bank_shape() {
        assert_eq!(bank().len(), BANK_SIZE);
        let ids: HashSet<&str> = bank().iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids.len(), BANK_SIZE);
        for category in Trait::ALL {
            assert_eq!(bank().iter().filter(|q| q.category == category).count(), 6);
        }
    }

    #[test]
    fn test_initial_questions_cover_traits_evenly() {
        let questions = initial_questions(12, Some(7));
        assert_eq!(questions.len(), 12);

        let mut counts: HashMap<Trait, usize> = HashMap::new();
        for q in &questions {
            *counts.entry(q.category).or_default() += 1;
        }
        assert_eq!(counts.len(), 5);
        let max = counts.values().max().unwrap();
        let min = counts.values().min().unwrap();
        assert!(max - min <= 1);
    }

    #[test]
    fn test_initial_questions_seeded() {
        assert_eq!(initial_questions(10, Some(42)), initial_questions(10, Some(42)));
    }

    #[test]
    fn test_initial_questions_clamped() {
        assert_eq!(initial_questions(0, Some(1)).len(), 1);
        let all = initial_questions(500, Some(1));
        assert_eq!(all.len(), BANK_SIZE);
        let ids: HashSet<&str> = all.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids.len(), BANK_SIZE);
    }

    #[test]
    fn test_fallback_batch() {
        let batch = fallback_adaptive_questions(5);
        assert_eq!(batch.len(), 5);
        assert!(batch.iter().all(|q| q.id.starts_with("fb-")));
        assert_eq!(fallback_adaptive_questions(2).len(), 2);
        assert!(find_question("fb-3").is_some());
        assert!(find_question("bank-30").is_some());
        assert!(find_question("bank-31").is_none());
    }
}
