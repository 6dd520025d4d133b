/// Errors raised by the segmentation filters.
#[derive(Debug, thiserror::Error)]
pub enum SegmentationError {
    /// The image is empty or has a single intensity, so no threshold separates
    /// foreground from background.
    #[error("image has no intensity variation, cannot select a threshold")]
    DegenerateImage,
    /// Every pixel of the mask is foreground, distances to background are undefined.
    #[error("mask has no background pixels, the distance transform is undefined")]
    NoBackground,
    /// Two images that must be aligned pixel for pixel have different shapes.
    #[error("image shapes differ: {left:?} vs {right:?}")]
    ShapeMismatch {
        /// shape of the first image as (rows, cols)
        left: (usize, usize),
        /// shape of the second image as (rows, cols)
        right: (usize, usize),
    },
    /// Smoothing sigma is negative or not finite.
    #[error("gaussian sigma must be finite and non-negative, got {0}")]
    InvalidSigma(f64),
}

/// Result type of the segmentation filters.
pub type Result<T> = std::result::Result<T, SegmentationError>;
