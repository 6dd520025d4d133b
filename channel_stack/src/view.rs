//! Rendering of intensity channels, masks and label images.

use anyhow::{ensure, Context, Result};
use image::{DynamicImage, GrayImage, RgbImage};
use itertools::{izip, zip_eq, Itertools, MinMaxResult};
use ndarray::{Array2, ArrayView2};

/// Gray level of label-image background when no intensity image is given.
const BACKGROUND_GRAY: u8 = 0;

fn u8_from_normalized(value: f64) -> u8 {
    (255.0 * value.clamp(0.0, 1.0)) as u8
}

/// Primary colour a channel is displayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeChannel {
    /// Red.
    Red,
    /// Green.
    Green,
    /// Blue.
    Blue,
}

impl CompositeChannel {
    /// Index of the RGB sample.
    pub fn rgb_index(self) -> usize {
        match self {
            CompositeChannel::Red => 0,
            CompositeChannel::Green => 1,
            CompositeChannel::Blue => 2,
        }
    }

    fn rgb_weights(self) -> [f64; 3] {
        let mut weights = [0.0; 3];
        weights[self.rgb_index()] = 1.0;
        weights
    }
}

/// Rescale finite values linearly onto [0, 1]. Constant and non-finite
/// values map to 0.
pub fn normalize_min_max(values: ArrayView2<'_, f64>) -> Array2<f64> {
    let (min, max) = match values.iter().copied().filter(|v| v.is_finite()).minmax() {
        MinMaxResult::NoElements => return Array2::zeros(values.raw_dim()),
        MinMaxResult::OneElement(v) => (v, v),
        MinMaxResult::MinMax(min, max) => (min, max),
    };
    let range = max - min;
    values.mapv(|v| {
        if range > 0.0 && v.is_finite() {
            (v - min) / range
        } else {
            0.0
        }
    })
}

/// An image to render.
pub enum ImageSpec<'a> {
    /// Channels min-max normalized and added into one RGB image.
    Composite {
        /// Intensity image and display colour of each channel.
        channels: Vec<(ArrayView2<'a, f64>, CompositeChannel)>,
    },
    /// Binary mask, nonzero pixels white.
    Mask {
        /// The mask.
        mask: ArrayView2<'a, u8>,
    },
    /// Label image, each label in a categorical colour over a gray background.
    Labels {
        /// The labels, 0 for background.
        labels: ArrayView2<'a, u32>,
        /// Intensities drawn in gray under background pixels.
        background: Option<ArrayView2<'a, f64>>,
    },
}

impl ImageSpec<'_> {
    /// Render to an 8-bit image.
    pub fn create_image(&self) -> Result<DynamicImage> {
        Ok(match self {
            ImageSpec::Composite { channels } => {
                ensure!(!channels.is_empty(), "A composite needs at least one channel.");
                let (nrows, ncols) = channels[0].0.dim();
                let mut rgb_buffer = vec![Array2::<f64>::zeros((nrows, ncols)); 3];
                for (values, channel) in channels {
                    ensure!(
                        values.dim() == (nrows, ncols),
                        "Composite channels differ in shape: {:?} and {:?}.",
                        values.dim(),
                        channels[0].0.dim()
                    );
                    let normalized = normalize_min_max(values.view());
                    for (buf, weight) in zip_eq(&mut rgb_buffer, channel.rgb_weights()) {
                        buf.zip_mut_with(&normalized, |b, &v| *b = (*b + weight * v).min(1.0));
                    }
                }
                rgb_image(
                    ncols,
                    nrows,
                    izip!(&rgb_buffer[0], &rgb_buffer[1], &rgb_buffer[2])
                        .flat_map(|(r, g, b)| [*r, *g, *b])
                        .map(u8_from_normalized)
                        .collect(),
                )?
            }
            ImageSpec::Mask { mask } => gray_image(
                mask.ncols(),
                mask.nrows(),
                mask.iter().map(|&m| if m == 0 { 0 } else { 255 }).collect(),
            )?,
            ImageSpec::Labels { labels, background } => {
                let gray = match background {
                    Some(background) => {
                        ensure!(
                            background.dim() == labels.dim(),
                            "Background of shape {:?} does not match labels of shape {:?}.",
                            background.dim(),
                            labels.dim()
                        );
                        normalize_min_max(background.view()).mapv(u8_from_normalized)
                    }
                    None => Array2::from_elem(labels.raw_dim(), BACKGROUND_GRAY),
                };
                rgb_image(
                    labels.ncols(),
                    labels.nrows(),
                    labels
                        .iter()
                        .zip(gray.iter())
                        .flat_map(|(&label, &g)| label_color(label).unwrap_or([g, g, g]))
                        .collect(),
                )?
            }
        })
    }
}

/// Categorical colour of a label, None for background.
pub fn label_color(label: u32) -> Option<[u8; 3]> {
    if label == 0 {
        return None;
    }
    let palette = colorous::TABLEAU10;
    Some(palette[(label as usize - 1) % palette.len()].as_array())
}

fn rgb_image(width: usize, height: usize, data: Vec<u8>) -> Result<DynamicImage> {
    Ok(RgbImage::from_vec(width as u32, height as u32, data)
        .with_context(|| format!("Pixel buffer does not fit a {width}x{height} RGB image"))?
        .into())
}

fn gray_image(width: usize, height: usize, data: Vec<u8>) -> Result<DynamicImage> {
    Ok(GrayImage::from_vec(width as u32, height as u32, data)
        .with_context(|| format!("Pixel buffer does not fit a {width}x{height} gray image"))?
        .into())
}
