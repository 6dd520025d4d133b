//! Connected-component labelling of binary masks and label bookkeeping.

use crate::Connectivity;
use image::{GrayImage, Luma};
use imageproc::region_labelling;
use ndarray::{Array2, ArrayView2};
use std::collections::{BTreeSet, HashMap};

impl From<Connectivity> for region_labelling::Connectivity {
    fn from(connectivity: Connectivity) -> Self {
        match connectivity {
            Connectivity::Four => region_labelling::Connectivity::Four,
            Connectivity::Eight => region_labelling::Connectivity::Eight,
        }
    }
}

/// Label the connected foreground components of `mask`.
///
/// Components are numbered 1..=N in raster order of their first pixel.
/// Returns the label image and N.
pub fn connected_components(
    mask: ArrayView2<'_, u8>,
    connectivity: Connectivity,
) -> (Array2<u32>, u32) {
    let (nrows, ncols) = mask.dim();
    let image = GrayImage::from_fn(ncols as u32, nrows as u32, |x, y| {
        Luma([u8::from(mask[[y as usize, x as usize]] != 0)])
    });
    let components =
        region_labelling::connected_components(&image, connectivity.into(), Luma([0u8]));
    let labels = Array2::from_shape_fn((nrows, ncols), |(row, col)| {
        components.get_pixel(col as u32, row as u32)[0]
    });
    relabel_sequential(labels.view())
}

/// Distinct nonzero labels present in `labels`, in increasing order.
pub fn present_labels(labels: ArrayView2<'_, u32>) -> Vec<u32> {
    labels
        .iter()
        .copied()
        .filter(|&l| l != 0)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Renumber labels so the ones present become 1..=N, keeping their relative
/// order. Returns the relabelled image and N.
pub fn relabel_sequential(labels: ArrayView2<'_, u32>) -> (Array2<u32>, u32) {
    let present = present_labels(labels);
    let mapping: HashMap<u32, u32> = present
        .iter()
        .zip(1..)
        .map(|(&old, new)| (old, new))
        .collect();
    let relabelled = labels.mapv(|l| if l == 0 { 0 } else { mapping[&l] });
    (relabelled, present.len() as u32)
}

/// Foreground mask (1 where the label is nonzero).
pub fn foreground(labels: ArrayView2<'_, u32>) -> Array2<u8> {
    labels.mapv(|l| u8::from(l != 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_connectivity_changes_component_count() {
        let mask = array![[1, 0, 0, 1], [0, 1, 0, 1], [0, 0, 0, 0], [1, 1, 0, 1]];
        let (labels, n) = connected_components(mask.view(), Connectivity::Four);
        assert_eq!(n, 5);
        assert_eq!(
            labels,
            array![[1, 0, 0, 2], [0, 3, 0, 2], [0, 0, 0, 0], [4, 4, 0, 5]]
        );
        let (labels, n) = connected_components(mask.view(), Connectivity::Eight);
        assert_eq!(n, 4);
        assert_eq!(
            labels,
            array![[1, 0, 0, 2], [0, 1, 0, 2], [0, 0, 0, 0], [3, 3, 0, 4]]
        );
    }

    #[test]
    fn test_nonbinary_mask_values_are_foreground() {
        let mask = array![[0, 3, 255], [0, 0, 0], [9, 0, 0]];
        let (labels, n) = connected_components(mask.view(), Connectivity::Four);
        assert_eq!(n, 2);
        assert_eq!(labels, array![[0, 1, 1], [0, 0, 0], [2, 0, 0]]);
    }

    #[test]
    fn test_non_square_mask_keeps_orientation() {
        let mask = array![[1, 1, 0, 0, 1], [0, 0, 0, 0, 1]];
        let (labels, n) = connected_components(mask.view(), Connectivity::Four);
        assert_eq!(n, 2);
        assert_eq!(labels.dim(), (2, 5));
        assert_eq!(labels, array![[1, 1, 0, 0, 2], [0, 0, 0, 0, 2]]);
    }

    #[test]
    fn test_empty_mask() {
        let mask = Array2::<u8>::zeros((3, 3));
        let (labels, n) = connected_components(mask.view(), Connectivity::Four);
        assert_eq!(n, 0);
        assert!(labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_relabel_sequential() {
        let labels = array![[0, 7, 7], [3, 0, 12], [3, 3, 0]];
        let (relabelled, n) = relabel_sequential(labels.view());
        assert_eq!(n, 3);
        assert_eq!(relabelled, array![[0, 2, 2], [1, 0, 3], [1, 1, 0]]);
        assert_eq!(present_labels(relabelled.view()), vec![1, 2, 3]);
        assert_eq!(foreground(labels.view()), array![[0, 1, 1], [1, 0, 1], [1, 1, 0]]);
    }
}
