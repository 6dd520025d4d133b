//! Refinement of an unreliable channel mask against a reliable label image.

use crate::label::{foreground, relabel_sequential};
use crate::reconstruct::{reconstruct_by_dilation, reconstruct_labels_by_dilation};
use crate::{ensure_same_shape, Connectivity, Result};
use ndarray::{Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

/// Region the seed is allowed to grow into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconstructionDomain {
    /// The reliable foreground as a whole. Touching objects are recovered together.
    #[default]
    Foreground,
    /// Each reliable object separately. Growth stops at label boundaries.
    Labels,
}

/// An unreliable channel aligned to the objects of the reliable channel.
#[derive(Debug, Clone)]
pub struct RefinedChannel {
    /// Reconstructed mask, a subset of the reliable foreground.
    pub mask: Array2<u8>,
    /// Reliable labels restricted to `mask`, renumbered from 1.
    pub labels: Array2<u32>,
    /// Number of objects in `labels`.
    pub num_labels: u32,
}

/// Align `unreliable_mask` to the objects of `reliable_labels`.
///
/// The unreliable mask is first restricted to the reliable foreground; the
/// result seeds a reconstruction by dilation within `domain`, recovering the
/// full extent of every reliable object that the unreliable stain touches.
pub fn refine_channel_mask(
    reliable_labels: ArrayView2<'_, u32>,
    unreliable_mask: ArrayView2<'_, u8>,
    domain: ReconstructionDomain,
    connectivity: Connectivity,
) -> Result<RefinedChannel> {
    ensure_same_shape(reliable_labels.dim(), unreliable_mask.dim())?;
    let reliable_mask = foreground(reliable_labels);
    let seed = Zip::from(&unreliable_mask)
        .and(&reliable_mask)
        .map_collect(|&u, &r| u8::from(u != 0 && r != 0));
    let mask = match domain {
        ReconstructionDomain::Foreground => {
            reconstruct_by_dilation(seed.view(), reliable_mask.view(), connectivity)?
        }
        ReconstructionDomain::Labels => {
            reconstruct_labels_by_dilation(seed.view(), reliable_labels, connectivity)?
        }
    };
    let restricted = Zip::from(&reliable_labels)
        .and(&mask)
        .map_collect(|&l, &m| if m == 0 { 0 } else { l });
    let (labels, num_labels) = relabel_sequential(restricted.view());
    Ok(RefinedChannel {
        mask,
        labels,
        num_labels,
    })
}
