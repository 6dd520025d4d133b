//! Automatic threshold selection.

use crate::{Result, SegmentationError};
use itertools::Itertools;
use ndarray::{Array2, ArrayView2};

/// Safety net for images where the iteration oscillates around the fixed point.
const MAX_LI_ITERATIONS: usize = 1000;

/// Li's iterative minimum cross-entropy threshold.
///
/// Starting from the mean intensity, the threshold is repeatedly moved to
/// `(m_b - m_f) / (ln m_b - ln m_f)` where `m_f` and `m_b` are the means of the
/// pixels above and at-or-below the current threshold, until it moves by less
/// than half the smallest gap between two distinct intensities. Intensities
/// are shifted so that the minimum is zero while iterating.
///
/// Non-finite pixels are ignored. Returns [`SegmentationError::DegenerateImage`]
/// if fewer than two distinct intensities remain.
pub fn li_threshold(image: ArrayView2<'_, f64>) -> Result<f64> {
    let mut values: Vec<f64> = image.iter().copied().filter(|v| v.is_finite()).collect();
    values.sort_by(f64::total_cmp);
    let (&min_value, &max_value) = match (values.first(), values.last()) {
        (Some(min_value), Some(max_value)) if min_value < max_value => (min_value, max_value),
        _ => return Err(SegmentationError::DegenerateImage),
    };
    let tolerance = values
        .iter()
        .dedup()
        .tuple_windows()
        .map(|(a, b)| b - a)
        .fold(max_value - min_value, f64::min)
        / 2.0;

    for v in &mut values {
        *v -= min_value;
    }
    let mut next = values.iter().sum::<f64>() / values.len() as f64;
    let mut current = -2.0 * tolerance;
    let mut iterations = 0;
    while (next - current).abs() > tolerance && iterations < MAX_LI_ITERATIONS {
        iterations += 1;
        current = next;
        let (mut fore_sum, mut fore_n, mut back_sum, mut back_n) = (0.0, 0usize, 0.0, 0usize);
        for &v in &values {
            if v > current {
                fore_sum += v;
                fore_n += 1;
            } else {
                back_sum += v;
                back_n += 1;
            }
        }
        if fore_n == 0 || back_n == 0 {
            break;
        }
        let mean_fore = fore_sum / fore_n as f64;
        let mean_back = back_sum / back_n as f64;
        if mean_back == 0.0 {
            break;
        }
        next = (mean_back - mean_fore) / (mean_back.ln() - mean_fore.ln());
    }
    Ok(next + min_value)
}

/// Foreground (1) where the intensity is strictly above `threshold`, background (0) elsewhere.
pub fn binary_threshold(image: ArrayView2<'_, f64>, threshold: f64) -> Array2<u8> {
    image.mapv(|v| u8::from(v > threshold))
}
