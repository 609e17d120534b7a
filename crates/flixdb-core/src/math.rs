//! Vector helpers. Distances are cosine distances in `[0, 2]`, lower is closer.

pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Cosine distance `1 - cos(a, b)`. Zero vectors are treated as maximally
/// dissimilar to everything (distance 1.0).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 1.0;
    }
    let cos = dot / (na.sqrt() * nb.sqrt());
    (1.0 - cos).clamp(0.0, 2.0)
}

/// Display similarity derived from a cosine distance.
pub fn similarity(distance: f32) -> f32 {
    1.0 - distance
}
