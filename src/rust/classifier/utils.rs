use std::cmp::Ordering;

use super::adapter::LabelScore;

pub(crate) fn softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 1e-10 {
        exps.iter().map(|&x| x / sum).collect()
    } else {
        vec![1.0 / logits.len() as f32; logits.len()]
    }
}

/// Pairs labels with scores and sorts them best first. Ties keep label order.
pub(crate) fn rank_labels(labels: &[&str], scores: &[f32]) -> Vec<LabelScore> {
    let mut ranked: Vec<LabelScore> = labels
        .iter()
        .zip(scores)
        .map(|(label, &score)| LabelScore::new(*label, score))
        .collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[2.0, 1.0, 0.1]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
        assert!(softmax(&[]).is_empty());
    }

    #[test]
    fn test_rank_labels_descending() {
        let ranked = rank_labels(&["metal", "glass", "trash"], &[0.2, 0.7, 0.1]);
        let labels: Vec<_> = ranked.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["glass", "metal", "trash"]);
    }
}
