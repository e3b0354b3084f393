use crate::domain::models::{Answer, Trait, TraitScores, SCALE_MAX, SCALE_MIN};
use std::collections::BTreeMap;

/// Straight average of answer values per trait, each value clamped into the
/// scale first. Traits nobody answered are left out of the map.
pub fn score_answers(answers: &[Answer]) -> TraitScores {
    let mut sums: BTreeMap<Trait, (f64, u32)> = BTreeMap::new();
    for answer in answers {
        let value = (answer.value as f64).clamp(SCALE_MIN, SCALE_MAX);
        let entry = sums.entry(answer.category).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(category, (total, count))| (category, total / count as f64))
        .collect()
}

/// Highest-scoring trait; ties go to the earlier trait in canonical order.
pub fn dominant_trait(scores: &TraitScores) -> Option<Trait> {
    let mut best: Option<(Trait, f64)> = None;
    for (category, score) in scores {
        match best {
            Some((_, top)) if *score <= top => {}
            _ => best = Some((*category, *score)),
        }
    }
    best.map(|(category, _)| category)
}

/// Scores rounded to whole points, in canonical order. Coarse enough that
/// similar profiles share an adaptive question batch.
pub fn score_profile(scores: &TraitScores) -> Vec<(Trait, u8)> {
    scores
        .iter()
        .map(|(category, score)| (*category, score.round().clamp(SCALE_MIN, SCALE_MAX) as u8))
        .collect()
}
