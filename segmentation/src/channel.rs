//! Per-channel segmentation: smoothing, Li thresholding and splitting of
//! touching nuclei by a distance-transform watershed.

use crate::distance::distance_map;
use crate::filters::gaussian_smooth;
use crate::label::{connected_components, relabel_sequential};
use crate::maxima::regional_maxima;
use crate::threshold::{binary_threshold, li_threshold};
use crate::watershed::watershed_from_markers;
use crate::{Connectivity, Result, Spacing};
use log::debug;
use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

/// Parameters shared by every channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentationParams {
    /// Sigma of the Gaussian applied to the raw intensities, in physical units.
    pub sigma: f64,
    /// Sigma of the Gaussian applied to the distance map before peak detection.
    pub split_sigma: f64,
    /// Physical pixel size.
    pub spacing: Spacing,
    /// Neighbourhood for maxima, labelling and watershed.
    pub connectivity: Connectivity,
    /// Leave the pixels where two watershed basins meet unlabelled.
    pub mark_watershed_line: bool,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        SegmentationParams {
            sigma: 1.0,
            split_sigma: 1.0,
            spacing: Spacing::default(),
            connectivity: Connectivity::Four,
            mark_watershed_line: false,
        }
    }
}

/// Touching objects of a mask separated into individual labels.
#[derive(Debug, Clone)]
pub struct BlobSplit {
    /// Objects numbered 1..=num_labels, zero outside the input mask.
    pub labels: Array2<u32>,
    /// Number of objects.
    pub num_labels: u32,
    /// Smoothed distance map, zero outside the input mask.
    pub distance: Array2<f64>,
    /// Regional maxima of `distance` used as watershed seeds.
    pub peaks: Array2<u8>,
}

/// Segmentation result of a single channel.
#[derive(Debug, Clone)]
pub struct ChannelSegmentation {
    /// Li threshold of the smoothed intensities.
    pub threshold: f64,
    /// Foreground mask of the smoothed intensities.
    pub mask: Array2<u8>,
    /// Split of `mask` into individual objects.
    pub split: BlobSplit,
}

/// Separate touching objects of `mask`.
///
/// The distance map of the mask is smoothed with `smoothing` and zeroed
/// outside the mask; its regional maxima, labelled as connected components,
/// seed a watershed over the negated distance map. The flooded labels are
/// restricted to the mask and renumbered from 1.
pub fn split_blobs(
    mask: ArrayView2<'_, u8>,
    smoothing: f64,
    spacing: Spacing,
    connectivity: Connectivity,
    mark_watershed_line: bool,
) -> Result<BlobSplit> {
    let raw_distance = distance_map(mask, spacing)?;
    let smoothed = gaussian_smooth(raw_distance.view(), smoothing, spacing)?;
    let distance = Zip::from(&smoothed)
        .and(&mask)
        .map_collect(|&d, &m| if m == 0 { 0.0 } else { d });

    let peaks = regional_maxima(distance.view(), connectivity);
    let (markers, num_markers) = connected_components(peaks.view(), connectivity);
    debug!("found {num_markers} watershed seeds");

    let surface = distance.mapv(|d| -d);
    let flooded =
        watershed_from_markers(surface.view(), markers.view(), connectivity, mark_watershed_line)?;
    let masked = Zip::from(&flooded)
        .and(&mask)
        .map_collect(|&l, &m| if m == 0 { 0 } else { l });
    let (labels, num_labels) = relabel_sequential(masked.view());

    Ok(BlobSplit {
        labels,
        num_labels,
        distance,
        peaks,
    })
}

/// Smooth, threshold and split one channel.
pub fn segment_channel(
    image: ArrayView2<'_, f64>,
    params: &SegmentationParams,
) -> Result<ChannelSegmentation> {
    let smoothed = gaussian_smooth(image, params.sigma, params.spacing)?;
    let threshold = li_threshold(smoothed.view())?;
    let mask = binary_threshold(smoothed.view(), threshold);
    debug!(
        "li threshold {threshold:.3} keeps {} of {} pixels",
        mask.iter().filter(|&&v| v != 0).count(),
        mask.len()
    );
    let split = split_blobs(
        mask.view(),
        params.split_sigma,
        params.spacing,
        params.connectivity,
        params.mark_watershed_line,
    )?;
    Ok(ChannelSegmentation {
        threshold,
        mask,
        split,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::SegmentationError;
    use proptest::prelude::*;

    /// Binary disk of radius `radius` centered at `center`, drawn into `mask`.
    pub(crate) fn draw_disk(mask: &mut Array2<u8>, center: (f64, f64), radius: f64) {
        for ((r, c), v) in mask.indexed_iter_mut() {
            let dr = r as f64 - center.0;
            let dc = c as f64 - center.1;
            if dr * dr + dc * dc <= radius * radius {
                *v = 1;
            }
        }
    }

    /// Two overlapping disks forming a single connected blob.
    pub(crate) fn touching_disks() -> Array2<u8> {
        let mut mask = Array2::zeros((30, 44));
        draw_disk(&mut mask, (15.0, 13.0), 8.0);
        draw_disk(&mut mask, (15.0, 29.0), 8.0);
        mask
    }

    #[test]
    fn test_touching_disks_are_split() -> anyhow::Result<()> {
        let mask = touching_disks();
        let (_, components) = connected_components(mask.view(), Connectivity::Four);
        assert_eq!(components, 1);

        let split = split_blobs(mask.view(), 1.0, Spacing::default(), Connectivity::Four, false)?;
        assert_eq!(split.num_labels, 2);
        let left = split.labels[[15, 13]];
        let right = split.labels[[15, 29]];
        assert!(left != 0 && right != 0 && left != right);
        assert_eq!(split.peaks[[0, 0]], 0);
        assert_eq!(split.distance[[0, 0]], 0.0);
        Ok(())
    }

    #[test]
    fn test_segment_channel_on_synthetic_nuclei() -> anyhow::Result<()> {
        let mask = touching_disks();
        let image = mask.mapv(|v| if v == 1 { 900.0 } else { 100.0 });
        let segmentation = segment_channel(image.view(), &SegmentationParams::default())?;
        assert!(segmentation.threshold > 100.0 && segmentation.threshold < 900.0);
        assert_eq!(segmentation.split.num_labels, 2);
        assert_eq!(segmentation.mask[[15, 13]], 1);
        assert_eq!(segmentation.mask[[0, 0]], 0);
        Ok(())
    }

    #[test]
    fn test_empty_and_full_masks() -> anyhow::Result<()> {
        let empty = Array2::<u8>::zeros((10, 10));
        let split = split_blobs(empty.view(), 1.0, Spacing::default(), Connectivity::Four, false)?;
        assert_eq!(split.num_labels, 0);
        assert!(split.labels.iter().all(|&l| l == 0));

        let full = Array2::<u8>::ones((10, 10));
        assert!(matches!(
            split_blobs(full.view(), 1.0, Spacing::default(), Connectivity::Four, false),
            Err(SegmentationError::NoBackground)
        ));
        Ok(())
    }

    #[test]
    fn test_constant_channel_is_degenerate() {
        let image = Array2::from_elem((8, 8), 12.0);
        assert!(matches!(
            segment_channel(image.view(), &SegmentationParams::default()),
            Err(SegmentationError::DegenerateImage)
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]
        #[test]
        fn prop_labels_stay_inside_mask(
            bits in proptest::collection::vec(0u8..=1, 144),
            smoothing in 0.0f64..2.0,
            fully_connected in any::<bool>(),
            mark_watershed_line in any::<bool>(),
        ) {
            let mut mask = Array2::from_shape_vec((12, 12), bits).unwrap();
            // keep at least one background pixel
            mask[[0, 0]] = 0;
            let split = split_blobs(
                mask.view(),
                smoothing,
                Spacing::default(),
                Connectivity::from_fully_connected(fully_connected),
                mark_watershed_line,
            )
            .unwrap();
            for (&label, &m) in split.labels.iter().zip(mask.iter()) {
                prop_assert!(m != 0 || label == 0);
            }
            prop_assert!(split.labels.iter().all(|&l| l <= split.num_labels));
        }
    }
}
