//! Regional maxima detection.

use crate::Connectivity;
use ndarray::{Array2, ArrayView2};
use std::collections::VecDeque;

/// Mark the regional maxima of `surface` with 1.
///
/// A regional maximum is a connected plateau of equal values whose every
/// neighbour is strictly lower. Plateaus at or below zero are never maxima,
/// so a distance map zeroed outside its mask only yields peaks inside objects.
pub fn regional_maxima(surface: ArrayView2<'_, f64>, connectivity: Connectivity) -> Array2<u8> {
    let dim = surface.dim();
    let mut visited = Array2::from_elem(dim, false);
    let mut markers = Array2::zeros(dim);
    let mut plateau = Vec::new();
    let mut queue = VecDeque::new();

    for (start, &value) in surface.indexed_iter() {
        if visited[start] || value.is_nan() || value <= 0.0 {
            continue;
        }
        plateau.clear();
        visited[start] = true;
        queue.push_back(start);
        let mut is_maximum = true;
        while let Some(index) = queue.pop_front() {
            plateau.push(index);
            for neighbor in connectivity.neighbors(index, dim) {
                let neighbor_value = surface[neighbor];
                if neighbor_value > value {
                    is_maximum = false;
                } else if neighbor_value == value && !visited[neighbor] {
                    visited[neighbor] = true;
                    queue.push_back(neighbor);
                }
            }
        }
        if is_maximum {
            for &index in &plateau {
                markers[index] = 1;
            }
        }
    }
    markers
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_isolated_peaks() {
        let surface = array![
            [0.0, 0.0, 0.0, 0.0, 0.0],
            [0.0, 2.0, 1.0, 3.0, 0.0],
            [0.0, 1.0, 1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0],
        ];
        let peaks = regional_maxima(surface.view(), Connectivity::Four);
        assert_eq!(
            peaks,
            array![
                [0, 0, 0, 0, 0],
                [0, 1, 0, 1, 0],
                [0, 0, 0, 0, 0],
                [0, 0, 0, 0, 0],
            ]
        );
    }

    #[test]
    fn test_plateau_is_one_maximum() {
        let surface = array![
            [1.0, 1.0, 1.0, 1.0],
            [1.0, 4.0, 4.0, 1.0],
            [1.0, 4.0, 3.0, 1.0],
        ];
        let peaks = regional_maxima(surface.view(), Connectivity::Four);
        assert_eq!(peaks.sum(), 3);
        assert_eq!(peaks[[2, 2]], 0);
    }

    #[test]
    fn test_plateau_with_higher_neighbor_is_not_maximum() {
        // the diagonal 5.0 only counts with full connectivity
        let surface = array![[2.0, 2.0, 0.0], [2.0, 2.0, 0.0], [0.0, 0.0, 5.0]];
        let four = regional_maxima(surface.view(), Connectivity::Four);
        assert_eq!(four.sum(), 5);
        let eight = regional_maxima(surface.view(), Connectivity::Eight);
        assert_eq!(eight.sum(), 1);
        assert_eq!(eight[[2, 2]], 1);
    }

    #[test]
    fn test_flat_zero_surface_has_no_maxima() {
        let surface = Array2::<f64>::zeros((4, 4));
        assert_eq!(regional_maxima(surface.view(), Connectivity::Eight).sum(), 0);
    }
}
