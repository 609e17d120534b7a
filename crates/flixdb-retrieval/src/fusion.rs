//! Linear score fusion over a shared candidate pool.
//!
//! Each component is min-max normalized over the pool before mixing; a
//! component whose values are all equal normalizes to 1.0 for every id.

use std::collections::HashMap;

use flixdb_core::types::DocId;

pub fn min_max<'a, I: IntoIterator<Item = &'a f32>>(values: I) -> Option<(f32, f32)> {
    values.into_iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

pub fn normalize(value: f32, (lo, hi): (f32, f32)) -> f32 {
    let range = hi - lo;
    if range < f32::EPSILON {
        1.0
    } else {
        (value - lo) / range
    }
}

/// Fused score per pool id, sorted descending with ties broken by id.
/// Ids absent from `text` score 0.0 on the text side before normalization.
pub fn linear_fusion(
    pool: &[DocId],
    vector_similarity: &HashMap<DocId, f32>,
    text_score: &HashMap<DocId, f32>,
    alpha: f32,
) -> Vec<(DocId, f32)> {
    let sims: Vec<f32> = pool.iter().map(|id| vector_similarity.get(id).copied().unwrap_or(0.0)).collect();
    let texts: Vec<f32> = pool.iter().map(|id| text_score.get(id).copied().unwrap_or(0.0)).collect();
    let (Some(sim_range), Some(text_range)) = (min_max(&sims), min_max(&texts)) else {
        return vec![];
    };

    let mut fused: Vec<(DocId, f32)> = pool
        .iter()
        .zip(sims.iter().zip(texts.iter()))
        .map(|(id, (&s, &t))| {
            let score = alpha * normalize(s, sim_range) + (1.0 - alpha) * normalize(t, text_range);
            (id.clone(), score)
        })
        .collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, f32)]) -> HashMap<DocId, f32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn alpha_extremes_follow_one_component() {
        let pool: Vec<DocId> = vec!["a".into(), "b".into(), "c".into()];
        let sim = map(&[("a", 0.9), ("b", 0.5), ("c", 0.1)]);
        let text = map(&[("a", 1.0), ("b", 3.0), ("c", 12.0)]);

        let vec_only: Vec<String> = linear_fusion(&pool, &sim, &text, 1.0).into_iter().map(|(id, _)| id).collect();
        assert_eq!(vec_only, vec!["a", "b", "c"]);
        let text_only: Vec<String> = linear_fusion(&pool, &sim, &text, 0.0).into_iter().map(|(id, _)| id).collect();
        assert_eq!(text_only, vec!["c", "b", "a"]);
    }

    #[test]
    fn degenerate_range_normalizes_to_one() {
        let pool: Vec<DocId> = vec!["a".into(), "b".into()];
        let sim = map(&[("a", 0.4), ("b", 0.4)]);
        let fused = linear_fusion(&pool, &sim, &HashMap::new(), 0.5);
        assert!(fused.iter().all(|(_, s)| (*s - 1.0).abs() < 1e-6));
        assert_eq!(fused[0].0, "a", "ties broken by id");
    }

    #[test]
    fn empty_pool_is_empty() {
        assert!(linear_fusion(&[], &HashMap::new(), &HashMap::new(), 0.5).is_empty());
    }
}
