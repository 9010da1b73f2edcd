use crate::labels::{ClassLabelRegistry, UNKNOWN_LABEL};
use common::span_debug;

pub const DEFAULT_TOP_K: usize = 5;

/// Decimal places kept on every surfaced confidence.
pub const CONFIDENCE_DECIMALS: i32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedLabel {
    pub label: String,
    pub probability: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub top_label: String,
    pub confidence: f32,
    /// Sorted by probability, descending.
    pub ranked: Vec<RankedLabel>,
}

/// Rounds half away from zero. Every confidence leaving the service goes
/// through here so identical inputs produce identical output.
pub fn round_to(value: f32, decimals: i32) -> f32 {
    let factor = 10f64.powi(decimals);
    ((f64::from(value) * factor).round() / factor) as f32
}

pub fn round_confidence(value: f32) -> f32 {
    round_to(value, CONFIDENCE_DECIMALS)
}

/// Turns a classifier's probability vector into a top-1 result and a top-k
/// shortlist. Scores are taken as-is: no renormalization.
#[derive(Debug, Clone)]
pub struct PredictionRanker {
    pub k: usize,
}

impl PredictionRanker {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    pub fn rank(&self, probabilities: &[f32], labels: &ClassLabelRegistry) -> Ranking {
        let _s = span_debug!("rank");

        let (top_label, confidence) = match argmax(probabilities) {
            Some(top) => (
                labels.get(top).to_string(),
                round_confidence(probabilities[top]),
            ),
            None => (UNKNOWN_LABEL.to_string(), 0.0),
        };

        let k = self.k.min(labels.size());

        // sort_by is stable: equal scores keep index order
        let mut order: Vec<usize> = (0..probabilities.len()).collect();
        order.sort_by(|&a, &b| sort_key(probabilities[b]).total_cmp(&sort_key(probabilities[a])));

        let ranked = order
            .into_iter()
            .filter(|&index| labels.contains(index))
            .take(k)
            .map(|index| RankedLabel {
                label: labels.get(index).to_string(),
                probability: round_confidence(probabilities[index]),
            })
            .collect();

        Ranking {
            top_label,
            confidence,
            ranked,
        }
    }
}

impl Default for PredictionRanker {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K)
    }
}

/// Index of the largest score; the first occurrence wins ties.
pub fn argmax(probabilities: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &p) in probabilities.iter().enumerate() {
        let p = sort_key(p);
        match best {
            Some((_, best_p)) if p <= best_p => {}
            _ => best = Some((index, p)),
        }
    }
    best.map(|(index, _)| index)
}

/// NaN never outranks a real score.
fn sort_key(p: f32) -> f32 {
    if p.is_nan() { f32::NEG_INFINITY } else { p }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::ClassifierKind;

    fn digits() -> ClassLabelRegistry {
        ClassLabelRegistry::defaults(ClassifierKind::Digit)
    }

    #[test]
    fn top_label_is_argmax() {
        let probs = [0.01, 0.02, 0.7, 0.05, 0.02, 0.1, 0.03, 0.02, 0.03, 0.02];
        let ranking = PredictionRanker::default().rank(&probs, &digits());

        assert_eq!(ranking.top_label, "۲");
        assert_eq!(ranking.confidence, 0.7);
        assert_eq!(ranking.ranked[0].label, ranking.top_label);
    }

    #[test]
    fn ranked_list_is_sorted_and_truncated() {
        let probs = [0.05, 0.3, 0.1, 0.2, 0.02, 0.15, 0.08, 0.04, 0.03, 0.03];
        let ranking = PredictionRanker::default().rank(&probs, &digits());

        let scores: Vec<f32> = ranking.ranked.iter().map(|r| r.probability).collect();
        assert_eq!(scores, vec![0.3, 0.2, 0.15, 0.1, 0.08]);
        let labels: Vec<&str> = ranking.ranked.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["۱", "۳", "۵", "۲", "۶"]);
    }

    #[test]
    fn ties_keep_lowest_index_first() {
        let probs = [0.1, 0.4, 0.4, 0.1];
        let labels = ClassLabelRegistry::defaults(ClassifierKind::Character);
        let ranking = PredictionRanker::new(4).rank(&probs, &labels);

        assert_eq!(ranking.top_label, labels.get(1));
        let order: Vec<&str> = ranking.ranked.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(
            order,
            vec![labels.get(1), labels.get(2), labels.get(0), labels.get(3)]
        );
    }

    #[test]
    fn k_never_exceeds_label_count() {
        let probs = vec![0.1; 10];
        let ranking = PredictionRanker::new(50).rank(&probs, &digits());
        assert_eq!(ranking.ranked.len(), 10);

        let ranking = PredictionRanker::new(5).rank(&probs, &digits());
        assert_eq!(ranking.ranked.len(), 5);
    }

    #[test]
    fn indices_without_labels_are_skipped() {
        // 12 scores against a 10-label registry: 10 and 11 have no label
        let mut probs = vec![0.01; 12];
        probs[11] = 0.5;
        probs[10] = 0.3;
        probs[4] = 0.1;

        let ranking = PredictionRanker::new(3).rank(&probs, &digits());

        assert_eq!(ranking.top_label, UNKNOWN_LABEL);
        assert_eq!(ranking.confidence, 0.5);
        assert_eq!(ranking.ranked.len(), 3);
        assert_eq!(ranking.ranked[0].label, "۴");
    }

    #[test]
    fn confidences_are_rounded_to_four_places() {
        let probs = [0.123_456, 0.876_544, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let ranking = PredictionRanker::default().rank(&probs, &digits());

        assert_eq!(ranking.confidence, 0.8765);
        assert_eq!(ranking.ranked[1].probability, 0.1235);
    }

    #[test]
    fn ranking_is_reproducible() {
        let probs = [0.333_33, 0.333_33, 0.333_34, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let first = PredictionRanker::default().rank(&probs, &digits());
        let second = PredictionRanker::default().rank(&probs, &digits());
        assert_eq!(first, second);
    }

    #[test]
    fn nan_scores_sink_to_the_bottom() {
        let probs = [f32::NAN, 0.2, 0.8];
        assert_eq!(argmax(&probs), Some(2));

        let ranking = PredictionRanker::new(3).rank(&probs, &digits());
        assert_eq!(ranking.ranked[2].label, "۰");
    }

    #[test]
    fn empty_scores_produce_empty_ranking() {
        let ranking = PredictionRanker::default().rank(&[], &digits());
        assert_eq!(argmax(&[]), None);
        assert_eq!(ranking.top_label, UNKNOWN_LABEL);
        assert_eq!(ranking.confidence, 0.0);
        assert!(ranking.ranked.is_empty());
    }

    #[test]
    fn round_to_half_away_from_zero() {
        assert_eq!(round_to(0.123_45, 2), 0.12);
        assert_eq!(round_to(0.125, 2), 0.13);
        assert_eq!(round_to(12.345_67, 2), 12.35);
    }
}
