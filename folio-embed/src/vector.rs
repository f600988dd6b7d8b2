//! Pure vector routines shared by providers, the store, and search ranking.

/// Dot product; 0.0 when lengths differ.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean norm.
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity in [-1, 1]. Mismatched lengths or a zero vector
/// yield 0.0 rather than an error, matching how missing embeddings rank.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let norm_a = norm(a);
    let norm_b = norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

/// Scale to unit length in place. A zero vector is left unchanged.
pub fn normalize(v: &mut [f32]) {
    let n = norm(v);
    if n > 0.0 {
        for x in v.iter_mut() {
            *x /= n;
        }
    }
}

/// Rank candidates by cosine similarity to `query`, best first. Ties break
/// toward the lower id so results are stable across runs. Returns at most
/// `limit` pairs of `(id, similarity)`.
pub fn rank_top_k<I>(query: &[f32], candidates: I, limit: usize) -> Vec<(i64, f32)>
where
    I: IntoIterator<Item = (i64, Vec<f32>)>,
{
    let mut scored: Vec<(i64, f32)> = candidates
        .into_iter()
        .map(|(id, v)| (id, cosine_similarity(query, &v)))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    #[test]
    fn test_cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < EPSILON);
    }

    #[test]
    fn test_cosine_parallel_vectors() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![2.0, 4.0, 6.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_cosine_opposite_vectors() {
        let a = vec![1.0, 2.0];
        let b = vec![-1.0, -2.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_cosine_similar_vectors() {
        let a = vec![0.6, 0.8];
        let b = vec![0.8, 0.6];
        let sim = cosine_similarity(&a, &b);
        assert!(sim > 0.9 && sim < 1.0);
    }

    #[test]
    fn test_cosine_zero_and_mismatched() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_normalize_to_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((norm(&v) - 1.0).abs() < EPSILON);
        assert!((v[0] - 0.6).abs() < EPSILON);
        assert!((v[1] - 0.8).abs() < EPSILON);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_rank_top_k_orders_descending() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            (1, vec![0.0, 1.0]),
            (2, vec![1.0, 0.0]),
            (3, vec![1.0, 1.0]),
        ];
        let ranked = rank_top_k(&query, candidates, 10);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].0, 2);
        assert_eq!(ranked[1].0, 3);
        assert_eq!(ranked[2].0, 1);
        assert!(ranked[0].1 >= ranked[1].1 && ranked[1].1 >= ranked[2].1);
    }

    #[test]
    fn test_rank_top_k_breaks_ties_by_lower_id() {
        let query = vec![1.0, 0.0];
        let candidates = vec![(9, vec![2.0, 0.0]), (3, vec![5.0, 0.0])];
        let ranked = rank_top_k(&query, candidates, 10);
        assert_eq!(ranked[0].0, 3);
        assert_eq!(ranked[1].0, 9);
    }

    #[test]
    fn test_rank_top_k_truncates() {
        let query = vec![1.0];
        let candidates = (0..20).map(|i| (i as i64, vec![1.0])).collect::<Vec<_>>();
        let ranked = rank_top_k(&query, candidates, 5);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].0, 0);
    }
}
