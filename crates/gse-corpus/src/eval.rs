//! Threshold metrics for scored validation pairs.
//!
//! Precision and recall follow the evaluation script the corpus has always
//! been judged with: both divide the number of correct decisions (true
//! positives plus true negatives) by that count plus the false positives or
//! false negatives respectively.

use serde::Deserialize;

/// Model similarity for one validation pair together with its gold label.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct ScoredPair {
    pub similarity: f32,
    pub label: u8,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Evaluation {
    pub total: usize,
    pub correct: usize,
    pub false_positive: usize,
    pub false_negative: usize,
}

impl Evaluation {
    /// Pairs scoring above `threshold` count as predicted positives.
    pub fn from_pairs(pairs: impl IntoIterator<Item = ScoredPair>, threshold: f32) -> Self {
        let mut eval = Self::default();
        for pair in pairs {
            eval.total += 1;
            let predicted = pair.similarity > threshold;
            match (predicted, pair.label) {
                (true, 1) | (false, 0) => eval.correct += 1,
                (true, 0) => eval.false_positive += 1,
                (false, 1) => eval.false_negative += 1,
                _ => {}
            }
        }
        eval
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.total)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.correct, self.correct + self.false_positive)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.correct, self.correct + self.false_negative)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(similarity: f32, label: u8) -> ScoredPair {
        ScoredPair { similarity, label }
    }

    #[test]
    fn counts_decisions_against_threshold() {
        let eval = Evaluation::from_pairs(
            [
                pair(0.9, 1),
                pair(0.2, 0),
                pair(0.7, 0),
                pair(0.5, 1),
                pair(0.51, 1),
            ],
            0.5,
        );
        assert_eq!(
            eval,
            Evaluation {
                total: 5,
                correct: 3,
                false_positive: 1,
                false_negative: 1,
            }
        );
        assert!((eval.accuracy() - 0.6).abs() < 1e-9);
        assert!((eval.precision() - 0.75).abs() < 1e-9);
        assert!((eval.recall() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn empty_input_reports_zeros() {
        let eval = Evaluation::from_pairs(Vec::<ScoredPair>::new(), 0.5);
        assert_eq!(eval.accuracy(), 0.0);
        assert_eq!(eval.precision(), 0.0);
        assert_eq!(eval.recall(), 0.0);
    }

    #[test]
    fn unknown_labels_only_count_toward_total() {
        let eval = Evaluation::from_pairs([pair(0.9, 3)], 0.5);
        assert_eq!(eval.total, 1);
        assert_eq!(eval.correct + eval.false_positive + eval.false_negative, 0);
    }
}
