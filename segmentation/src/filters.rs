//! Gaussian smoothing.

use crate::{Result, SegmentationError, Spacing};
use ndarray::{Array2, ArrayView2, Axis};

/// Kernel radius in units of sigma.
const TRUNCATE: f64 = 4.0;

fn gaussian_kernel(sigma_px: f64) -> Vec<f64> {
    let radius = (TRUNCATE * sigma_px + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma_px).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Half-sample symmetric reflection: `d c b a | a b c d | d c b a`.
fn mirror_index(index: isize, len: usize) -> usize {
    let len = len as isize;
    let period = 2 * len;
    let index = index.rem_euclid(period);
    if index >= len {
        (period - 1 - index) as usize
    } else {
        index as usize
    }
}

fn convolve_axis(image: ArrayView2<'_, f64>, kernel: &[f64], axis: Axis) -> Array2<f64> {
    let radius = (kernel.len() / 2) as isize;
    let mut out = Array2::zeros(image.raw_dim());
    for (lane_in, mut lane_out) in image.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        let len = lane_in.len();
        for (i, value) in lane_out.iter_mut().enumerate() {
            *value = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * lane_in[mirror_index(i as isize + k as isize - radius, len)])
                .sum();
        }
    }
    out
}

/// Separable Gaussian smoothing. `sigma` is given in physical units and
/// converted to pixels independently along each axis. A sigma of zero
/// returns a copy of the input.
pub fn gaussian_smooth(
    image: ArrayView2<'_, f64>,
    sigma: f64,
    spacing: Spacing,
) -> Result<Array2<f64>> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(SegmentationError::InvalidSigma(sigma));
    }
    if sigma == 0.0 || image.is_empty() {
        return Ok(image.to_owned());
    }
    let along_rows = convolve_axis(image, &gaussian_kernel(sigma / spacing.row), Axis(0));
    Ok(convolve_axis(
        along_rows.view(),
        &gaussian_kernel(sigma / spacing.col),
        Axis(1),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_kernel_is_normalized() {
        for sigma in [0.3, 1.0, 2.5] {
            let kernel = gaussian_kernel(sigma);
            assert_eq!(kernel.len() % 2, 1);
            assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_mirror_index() {
        let reflected: Vec<_> = (-3..7).map(|i| mirror_index(i, 4)).collect();
        assert_eq!(reflected, vec![2, 1, 0, 0, 1, 2, 3, 3, 2, 1]);
    }

    #[test]
    fn test_constant_image_is_unchanged() -> anyhow::Result<()> {
        let image = Array2::from_elem((6, 5), 3.5);
        let smoothed = gaussian_smooth(image.view(), 1.5, Spacing::default())?;
        assert!(smoothed.iter().all(|v| (v - 3.5).abs() < 1e-12));
        Ok(())
    }

    #[test]
    fn test_smoothing_preserves_mass_and_spreads_peak() -> anyhow::Result<()> {
        let mut image = Array2::zeros((21, 21));
        image[[10, 10]] = 1.0;
        let smoothed = gaussian_smooth(image.view(), 1.0, Spacing::default())?;
        assert!((smoothed.sum() - 1.0).abs() < 1e-9);
        assert!(smoothed[[10, 10]] < 1.0);
        assert!(smoothed[[10, 11]] > 0.0);
        assert!((smoothed[[9, 10]] - smoothed[[10, 11]]).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_zero_sigma_and_invalid_sigma() -> anyhow::Result<()> {
        let image = array![[1.0, 2.0], [3.0, 4.0]];
        assert_eq!(gaussian_smooth(image.view(), 0.0, Spacing::default())?, image);
        assert!(matches!(
            gaussian_smooth(image.view(), -1.0, Spacing::default()),
            Err(SegmentationError::InvalidSigma(_))
        ));
        Ok(())
    }
}
