//! Vector post-processing shared by the embedders.

use crate::models::round_to_decimals;

/// Decimal places kept in normalized components.
const NORMALIZED_DECIMALS: i32 = 8;

/// Mean-pools multi-token model output into one vector.
///
/// `dims` is the raw output shape; its last entry is the hidden size. When the
/// data holds a whole number of tokens (more than one), the per-component mean
/// across tokens is returned. Any other shape is passed through unchanged.
#[must_use]
pub fn mean_pool(data: Vec<f32>, dims: &[usize]) -> Vec<f32> {
    if dims.len() < 2 {
        return data;
    }
    let hidden = dims[dims.len() - 1];
    if hidden == 0 || data.len() == hidden || data.len() % hidden != 0 {
        return data;
    }

    let tokens = data.len() / hidden;
    let mut pooled = vec![0.0f64; hidden];
    for token in data.chunks_exact(hidden) {
        for (acc, value) in pooled.iter_mut().zip(token) {
            *acc += f64::from(*value);
        }
    }
    pooled
        .into_iter()
        .map(|sum| (sum / tokens as f64) as f32)
        .collect()
}

/// L2-normalizes a vector, rounding components to 8 decimals.
///
/// Returns `None` for an empty vector or a zero / non-finite norm.
#[must_use]
pub fn normalize_rounded<T: Copy + Into<f64>>(values: &[T]) -> Option<Vec<f32>> {
    if values.is_empty() {
        return None;
    }
    let norm = values
        .iter()
        .map(|v| {
            let v: f64 = (*v).into();
            v * v
        })
        .sum::<f64>()
        .sqrt();
    if !norm.is_finite() || norm == 0.0 {
        return None;
    }
    Some(
        values
            .iter()
            .map(|v| {
                let v: f64 = (*v).into();
                round_to_decimals(v / norm, NORMALIZED_DECIMALS) as f32
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pool_averages_tokens() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let pooled = mean_pool(data, &[1, 2, 3]);
        assert_eq!(pooled, vec![2.5, 3.5, 4.5]);
    }

    #[test]
    fn test_mean_pool_single_token_passthrough() {
        let data = vec![0.1, 0.2, 0.3];
        assert_eq!(mean_pool(data.clone(), &[1, 3]), data);
    }

    #[test]
    fn test_mean_pool_irregular_shape_passthrough() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(mean_pool(data.clone(), &[1, 2]), data);
        assert_eq!(mean_pool(data.clone(), &[5]), data);
        assert_eq!(mean_pool(data.clone(), &[1, 0]), data);
    }

    #[test]
    fn test_normalize_rounded_unit_norm() {
        let v = normalize_rounded(&[3.0f32, 4.0]).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-7);
        assert!((v[1] - 0.8).abs() < 1e-7);
    }

    #[test]
    fn test_normalize_rounded_rejects_degenerate() {
        assert!(normalize_rounded::<f32>(&[]).is_none());
        assert!(normalize_rounded(&[0.0f64, 0.0]).is_none());
        assert!(normalize_rounded(&[f32::NAN, 1.0]).is_none());
        assert!(normalize_rounded(&[f32::INFINITY]).is_none());
    }

    #[test]
    fn test_normalize_rounded_eight_decimals() {
        let v = normalize_rounded(&[1.0f64, 1.0, 1.0]).unwrap();
        // 1/sqrt(3) = 0.5773502691...
        assert!((f64::from(v[0]) - 0.577_350_27).abs() < 1e-7);
    }
}
