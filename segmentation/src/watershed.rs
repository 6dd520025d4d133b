//! Marker-controlled watershed by priority flooding.

use crate::{ensure_same_shape, Connectivity, Result};
use log::debug;
use ndarray::{Array2, ArrayView2};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Internal marker for pixels on a dividing line. Never a valid input label.
const WATERSHED_LINE: u32 = u32::MAX;

/// Pixels are flooded in increasing order of level, ties broken by arrival.
type QueueEntry = Reverse<(OrderedFloat<f64>, u64, (usize, usize))>;

/// Flood `surface` from the nonzero pixels of `markers`.
///
/// Every pixel reachable from a marker receives the label of the basin that
/// floods it first. The flooding level of a pixel is the maximum of its own
/// value and the level of the pixel that reached it, so basins fill from
/// their lowest point outwards. With `mark_watershed_line`, pixels where two
/// basins meet are left at 0; otherwise the basin that arrives first wins.
pub fn watershed_from_markers(
    surface: ArrayView2<'_, f64>,
    markers: ArrayView2<'_, u32>,
    connectivity: Connectivity,
    mark_watershed_line: bool,
) -> Result<Array2<u32>> {
    ensure_same_shape(surface.dim(), markers.dim())?;
    let dim = surface.dim();
    let mut labels = markers.to_owned();
    let mut queued = markers.mapv(|l| l != 0);
    let mut heap: BinaryHeap<QueueEntry> = BinaryHeap::new();
    let mut age = 0u64;

    for (index, &label) in markers.indexed_iter() {
        if label == 0 {
            continue;
        }
        for neighbor in connectivity.neighbors(index, dim) {
            if !queued[neighbor] {
                queued[neighbor] = true;
                heap.push(Reverse((OrderedFloat(surface[neighbor]), age, neighbor)));
                age += 1;
            }
        }
    }

    while let Some(Reverse((level, _, index))) = heap.pop() {
        let mut basin = None;
        let mut on_line = false;
        for neighbor in connectivity.neighbors(index, dim) {
            let label = labels[neighbor];
            if label == 0 || label == WATERSHED_LINE {
                continue;
            }
            match basin {
                None => basin = Some(label),
                Some(b) if b != label => on_line = true,
                Some(_) => {}
            }
        }
        let Some(basin) = basin else {
            continue;
        };
        if mark_watershed_line && on_line {
            labels[index] = WATERSHED_LINE;
            continue;
        }
        labels[index] = basin;
        for neighbor in connectivity.neighbors(index, dim) {
            if !queued[neighbor] {
                queued[neighbor] = true;
                let neighbor_level = OrderedFloat(surface[neighbor]).max(level);
                heap.push(Reverse((neighbor_level, age, neighbor)));
                age += 1;
            }
        }
    }
    debug!("watershed flooded {age} pixels");

    labels.mapv_inplace(|l| if l == WATERSHED_LINE { 0 } else { l });
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SegmentationError;
    use ndarray::array;
    use pretty_assertions::assert_eq;

    /// Two basins separated by a ridge in the middle column.
    fn two_basins() -> (Array2<f64>, Array2<u32>) {
        let surface = array![
            [0.0, 1.0, 3.0, 1.0, 0.0],
            [0.0, 1.0, 3.0, 1.0, 0.0],
            [0.0, 1.0, 3.0, 1.0, 0.0],
        ];
        let mut markers = Array2::zeros((3, 5));
        markers[[1, 0]] = 1;
        markers[[1, 4]] = 2;
        (surface, markers)
    }

    #[test]
    fn test_basins_split_at_ridge() -> anyhow::Result<()> {
        let (surface, markers) = two_basins();
        let labels =
            watershed_from_markers(surface.view(), markers.view(), Connectivity::Four, false)?;
        assert_eq!(labels.column(0).to_vec(), vec![1, 1, 1]);
        assert_eq!(labels.column(1).to_vec(), vec![1, 1, 1]);
        assert_eq!(labels.column(3).to_vec(), vec![2, 2, 2]);
        assert_eq!(labels.column(4).to_vec(), vec![2, 2, 2]);
        assert!(labels.iter().all(|&l| l == 1 || l == 2));
        Ok(())
    }

    #[test]
    fn test_watershed_line_left_unlabelled() -> anyhow::Result<()> {
        let (surface, markers) = two_basins();
        let labels =
            watershed_from_markers(surface.view(), markers.view(), Connectivity::Four, true)?;
        assert_eq!(labels.column(2).to_vec(), vec![0, 0, 0]);
        assert_eq!(labels.column(1).to_vec(), vec![1, 1, 1]);
        assert_eq!(labels.column(3).to_vec(), vec![2, 2, 2]);
        Ok(())
    }

    #[test]
    fn test_no_markers_leaves_everything_unlabelled() -> anyhow::Result<()> {
        let surface = Array2::<f64>::zeros((3, 3));
        let markers = Array2::<u32>::zeros((3, 3));
        let labels =
            watershed_from_markers(surface.view(), markers.view(), Connectivity::Eight, false)?;
        assert!(labels.iter().all(|&l| l == 0));
        Ok(())
    }

    #[test]
    fn test_shape_mismatch() {
        let surface = Array2::<f64>::zeros((3, 3));
        let markers = Array2::<u32>::zeros((3, 4));
        assert!(matches!(
            watershed_from_markers(surface.view(), markers.view(), Connectivity::Four, false),
            Err(SegmentationError::ShapeMismatch { .. })
        ));
    }
}
