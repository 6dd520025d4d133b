//! Geodesic reconstruction by dilation.

use crate::{ensure_same_shape, Connectivity, Result};
use ndarray::{Array2, ArrayView2, Zip};
use std::collections::VecDeque;

/// Grow the seed inside `regions`, stepping only between neighbours that
/// carry the same nonzero region value.
fn flood_regions(
    seed: ArrayView2<'_, u8>,
    regions: ArrayView2<'_, u32>,
    connectivity: Connectivity,
) -> Result<Array2<u8>> {
    ensure_same_shape(seed.dim(), regions.dim())?;
    let dim = regions.dim();
    let mut out = Zip::from(&seed)
        .and(&regions)
        .map_collect(|&s, &r| u8::from(s != 0 && r != 0));
    let mut queue: VecDeque<_> = out
        .indexed_iter()
        .filter(|(_, &v)| v != 0)
        .map(|(index, _)| index)
        .collect();
    while let Some(index) = queue.pop_front() {
        let region = regions[index];
        for neighbor in connectivity.neighbors(index, dim) {
            if out[neighbor] == 0 && regions[neighbor] == region {
                out[neighbor] = 1;
                queue.push_back(neighbor);
            }
        }
    }
    Ok(out)
}

/// Binary reconstruction by dilation: every connected component of `mask`
/// that contains at least one seed pixel. Seed pixels outside `mask` are
/// ignored, so the result always lies inside `mask`.
pub fn reconstruct_by_dilation(
    seed: ArrayView2<'_, u8>,
    mask: ArrayView2<'_, u8>,
    connectivity: Connectivity,
) -> Result<Array2<u8>> {
    flood_regions(seed, mask.mapv(u32::from).view(), connectivity)
}

/// Reconstruction by dilation inside a label image: every labelled object
/// that contains at least one seed pixel, where growth never crosses from one
/// label into a touching neighbouring label.
pub fn reconstruct_labels_by_dilation(
    seed: ArrayView2<'_, u8>,
    labels: ArrayView2<'_, u32>,
    connectivity: Connectivity,
) -> Result<Array2<u8>> {
    flood_regions(seed, labels, connectivity)
}
