//!
//! Image primitives for segmenting nuclei in fluorescent microscopy images.
//!
//! All images are 2D `ndarray` arrays indexed `[row, col]`. Binary masks are
//! `u8` arrays restricted to {0, 1}, label images are `u32` arrays where 0 is
//! background and objects are numbered from 1 onwards.
//!
#![deny(missing_docs)]

use serde::{Deserialize, Serialize};

pub mod channel;
pub mod distance;
mod error;
pub mod filters;
pub mod label;
pub mod maxima;
pub mod reconstruct;
pub mod refine;
pub mod shape_stats;
pub mod threshold;
pub mod watershed;

pub use error::{Result, SegmentationError};

/// Physical size of a pixel along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spacing {
    /// Pixel height, i.e. distance between two consecutive rows.
    pub row: f64,
    /// Pixel width, i.e. distance between two consecutive columns.
    pub col: f64,
}

impl Default for Spacing {
    fn default() -> Self {
        Spacing::isotropic(1.0)
    }
}

impl Spacing {
    /// Square pixels of the given size.
    pub fn isotropic(size: f64) -> Self {
        Spacing {
            row: size,
            col: size,
        }
    }

    /// Physical area covered by a single pixel.
    pub fn pixel_area(&self) -> f64 {
        self.row * self.col
    }
}

const FACE_OFFSETS: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
const FULL_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Pixel neighbourhood used by the labelling, maxima, watershed and
/// reconstruction filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Pixels sharing an edge.
    #[default]
    Four,
    /// Pixels sharing an edge or a corner.
    Eight,
}

impl Connectivity {
    /// `fully_connected` follows the usual toolkit flag: true means corners count.
    pub fn from_fully_connected(fully_connected: bool) -> Self {
        if fully_connected {
            Connectivity::Eight
        } else {
            Connectivity::Four
        }
    }

    fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &FACE_OFFSETS,
            Connectivity::Eight => &FULL_OFFSETS,
        }
    }

    /// Neighbours of `(row, col)` that lie inside an image of shape `(nrows, ncols)`.
    pub(crate) fn neighbors(
        self,
        (row, col): (usize, usize),
        (nrows, ncols): (usize, usize),
    ) -> impl Iterator<Item = (usize, usize)> {
        self.offsets().iter().filter_map(move |&(dr, dc)| {
            let r = row.checked_add_signed(dr)?;
            let c = col.checked_add_signed(dc)?;
            (r < nrows && c < ncols).then_some((r, c))
        })
    }
}

/// Return an error unless both shapes are identical.
pub(crate) fn ensure_same_shape(left: (usize, usize), right: (usize, usize)) -> Result<()> {
    if left == right {
        Ok(())
    } else {
        Err(SegmentationError::ShapeMismatch { left, right })
    }
}
