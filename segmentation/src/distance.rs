//! Exact Euclidean distance transform.

use crate::{Result, SegmentationError, Spacing};
use ndarray::{Array2, ArrayView2, Axis};

/// Lower envelope of the parabolas `weight * (x - q)^2 + f[q]` over all finite
/// samples (Felzenszwalb & Huttenlocher). Positions not reached by any
/// parabola stay at infinity.
fn lower_envelope(f: &[f64], weight: f64) -> Vec<f64> {
    // (vertex, leftmost x where this parabola is the lowest)
    let mut hull: Vec<(usize, f64)> = Vec::with_capacity(f.len());
    for q in (0..f.len()).filter(|&q| f[q].is_finite()) {
        let qf = q as f64;
        let mut start = f64::NEG_INFINITY;
        while let Some(&(p, left)) = hull.last() {
            let pf = p as f64;
            let crossing = ((f[q] + weight * qf * qf) - (f[p] + weight * pf * pf))
                / (2.0 * weight * (qf - pf));
            if crossing <= left {
                hull.pop();
            } else {
                start = crossing;
                break;
            }
        }
        hull.push((q, start));
    }

    let mut out = vec![f64::INFINITY; f.len()];
    if hull.is_empty() {
        return out;
    }
    let mut k = 0;
    for (x, value) in out.iter_mut().enumerate() {
        let xf = x as f64;
        while k + 1 < hull.len() && hull[k + 1].1 < xf {
            k += 1;
        }
        let p = hull[k].0;
        *value = weight * (xf - p as f64).powi(2) + f[p];
    }
    out
}

/// Distance from every foreground pixel to the nearest background pixel,
/// in the physical units of `spacing`. Background pixels are 0.
///
/// A mask without any background pixel has no defined distance and yields
/// [`SegmentationError::NoBackground`].
pub fn distance_map(mask: ArrayView2<'_, u8>, spacing: Spacing) -> Result<Array2<f64>> {
    if mask.is_empty() {
        return Ok(Array2::zeros(mask.raw_dim()));
    }
    if mask.iter().all(|&v| v != 0) {
        return Err(SegmentationError::NoBackground);
    }
    let mut squared = mask.mapv(|v| if v == 0 { 0.0 } else { f64::INFINITY });
    for (axis, step) in [(Axis(0), spacing.row), (Axis(1), spacing.col)] {
        let weight = step * step;
        for mut lane in squared.lanes_mut(axis) {
            let envelope = lower_envelope(&lane.to_vec(), weight);
            for (dst, src) in lane.iter_mut().zip(envelope) {
                *dst = src;
            }
        }
    }
    Ok(squared.mapv_into(f64::sqrt))
}
