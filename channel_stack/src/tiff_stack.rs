//! Reading multi-channel TIFF images.
//!
//! Two layouts are accepted: one grayscale page per channel, assigned to
//! stains in the given channel order, or a single RGB page whose samples are
//! assigned by the display colour of each stain.

use crate::Stain;
use anyhow::{bail, ensure, Context, Result};
use log::{info, warn};
use ndarray::{Array2, ArrayView2};
use segmentation::Spacing;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tiff::decoder::ifd::Value;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;

const MICROMETERS_PER_INCH: f64 = 25_400.0;
const MICROMETERS_PER_CENTIMETER: f64 = 10_000.0;

/// One intensity channel.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Stain imaged in the channel.
    pub stain: Stain,
    /// Intensities, rows by columns.
    pub image: Array2<f64>,
}

/// Channels of one field of view, all of the same shape.
#[derive(Debug, Clone)]
pub struct ChannelStack {
    channels: Vec<Channel>,
    spacing: Option<Spacing>,
}

enum PageLayout {
    Gray,
    Rgb,
}

struct Page {
    layout: PageLayout,
    samples: Vec<Array2<f64>>,
}

impl ChannelStack {
    /// Build a stack from channels of equal shape.
    pub fn new(channels: Vec<Channel>, spacing: Option<Spacing>) -> Result<Self> {
        ensure!(!channels.is_empty(), "A channel stack needs at least one channel.");
        let dim = channels[0].image.dim();
        for channel in &channels {
            ensure!(
                channel.image.dim() == dim,
                "Channel {} has shape {:?}, expected {:?}.",
                channel.stain,
                channel.image.dim(),
                dim
            );
        }
        if let Some(spacing) = spacing {
            ensure!(
                spacing.row > 0.0 && spacing.col > 0.0,
                "Pixel size must be positive, got {spacing:?}."
            );
        }
        Ok(ChannelStack { channels, spacing })
    }

    /// Read a TIFF image, assigning grayscale pages to `order` in sequence.
    pub fn read_tiff(path: &Path, order: &[Stain]) -> Result<Self> {
        let mut decoder = open_decoder(path)?;
        let spacing = read_spacing(&mut decoder)?;

        let mut pages = Vec::new();
        loop {
            let index = pages.len();
            pages.push(read_page(&mut decoder).with_context(|| {
                format!("While reading page {index} of {}", path.display())
            })?);
            if !decoder.more_images() {
                break;
            }
            decoder.next_image()?;
        }

        let single_rgb_page = matches!(
            pages.as_slice(),
            [Page {
                layout: PageLayout::Rgb,
                ..
            }]
        );
        let channels = match pages.pop() {
            Some(page) if single_rgb_page => assign_rgb_samples(page.samples, order)?,
            last => {
                pages.extend(last);
                ensure!(
                    pages.iter().all(|page| matches!(page.layout, PageLayout::Gray)),
                    "{} mixes RGB and grayscale pages.",
                    path.display()
                );
                ensure!(
                    pages.len() == order.len(),
                    "{} has {} grayscale pages but the channel order names {} stains.",
                    path.display(),
                    pages.len(),
                    order.len()
                );
                order
                    .iter()
                    .zip(pages)
                    .map(|(&stain, mut page)| Channel {
                        stain,
                        image: page.samples.remove(0),
                    })
                    .collect()
            }
        };
        let stack = ChannelStack::new(channels, spacing)?;
        info!(
            "read {} channels of shape {:?} from {}",
            stack.channels.len(),
            stack.dim(),
            path.display()
        );
        Ok(stack)
    }

    /// All channels, in channel order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Intensities of the given stain.
    pub fn channel(&self, stain: Stain) -> Option<ArrayView2<'_, f64>> {
        self.channels
            .iter()
            .find(|channel| channel.stain == stain)
            .map(|channel| channel.image.view())
    }

    /// Stains present, in channel order.
    pub fn stains(&self) -> Vec<Stain> {
        self.channels.iter().map(|channel| channel.stain).collect()
    }

    /// Physical pixel size recorded in the file, if any.
    pub fn spacing(&self) -> Option<Spacing> {
        self.spacing
    }

    /// Shape of every channel as (rows, columns).
    pub fn dim(&self) -> (usize, usize) {
        self.channels[0].image.dim()
    }
}

/// Number of rows, columns and pages of a TIFF image, without decoding pixels.
pub fn read_dimensions(path: &Path) -> Result<(usize, usize, usize)> {
    let mut decoder = open_decoder(path)?;
    let (width, height) = decoder.dimensions()?;
    let mut num_pages = 1;
    while decoder.more_images() {
        decoder.next_image()?;
        num_pages += 1;
    }
    Ok((height as usize, width as usize, num_pages))
}

/// Pixel size recorded in the resolution tags of the first page, if any.
pub fn read_resolution(path: &Path) -> Result<Option<Spacing>> {
    read_spacing(&mut open_decoder(path)?)
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>> {
    Ok(Decoder::new(BufReader::new(
        File::open(path).with_context(|| format!("Error opening TIFF image {}", path.display()))?,
    ))?
    .with_limits(Limits::unlimited()))
}

fn read_page<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Page> {
    let (width, height) = decoder.dimensions()?;
    let shape = (height as usize, width as usize);
    let (layout, num_samples) = match decoder.colortype()? {
        ColorType::Gray(_) => (PageLayout::Gray, 1),
        ColorType::RGB(_) => (PageLayout::Rgb, 3),
        other => bail!("Unsupported TIFF color type {other:?}, expected Gray or RGB."),
    };
    let data: Vec<f64> = match decoder.read_image()? {
        DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::F64(data) => data,
        _ => bail!("Only accepting TIFFs of datatype Uint8, Uint16, Uint32, Float32 and Float64."),
    };
    let interleaved = Array2::from_shape_vec((shape.0 * shape.1, num_samples), data)?;
    let samples = interleaved
        .columns()
        .into_iter()
        .map(|sample| sample.to_owned().into_shape_with_order(shape))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page { layout, samples })
}

fn assign_rgb_samples(samples: Vec<Array2<f64>>, order: &[Stain]) -> Result<Vec<Channel>> {
    let mut by_stain: Vec<Channel> = samples
        .into_iter()
        .enumerate()
        .filter_map(|(index, image)| {
            Stain::from_rgb_sample(index).map(|stain| Channel { stain, image })
        })
        .collect();
    let mut channels = Vec::with_capacity(order.len());
    for &stain in order {
        let Some(position) = by_stain.iter().position(|channel| channel.stain == stain) else {
            bail!("No RGB sample is displayed in the colour of {stain}.");
        };
        channels.push(by_stain.swap_remove(position));
    }
    if !by_stain.is_empty() {
        warn!(
            "ignoring RGB samples of stains missing from the channel order: {:?}",
            by_stain.iter().map(|channel| channel.stain).collect::<Vec<_>>()
        );
    }
    Ok(channels)
}

fn tag_as_u32(value: Value) -> Option<u32> {
    match value {
        Value::Byte(v) => Some(v.into()),
        Value::Short(v) => Some(v.into()),
        Value::Unsigned(v) => Some(v),
        _ => None,
    }
}

fn tag_as_f64(value: Value) -> Option<f64> {
    match value {
        Value::Rational(n, d) if d != 0 => Some(f64::from(n) / f64::from(d)),
        Value::Short(v) => Some(v.into()),
        Value::Unsigned(v) => Some(v.into()),
        Value::Float(v) => Some(v.into()),
        Value::Double(v) => Some(v),
        _ => None,
    }
}

/// Pixel size in micrometers from the resolution tags of the current page.
fn read_spacing<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Option<Spacing>> {
    let micrometers_per_unit = match decoder.find_tag(Tag::ResolutionUnit)?.and_then(tag_as_u32) {
        Some(2) => MICROMETERS_PER_INCH,
        Some(3) => MICROMETERS_PER_CENTIMETER,
        _ => return Ok(None),
    };
    let x_resolution = decoder.find_tag(Tag::XResolution)?.and_then(tag_as_f64);
    let y_resolution = decoder
        .find_tag(Tag::YResolution)?
        .and_then(tag_as_f64)
        .or(x_resolution);
    Ok(match (x_resolution, y_resolution) {
        (Some(x), Some(y)) if x > 0.0 && y > 0.0 => Some(Spacing {
            row: micrometers_per_unit / y,
            col: micrometers_per_unit / x,
        }),
        _ => None,
    })
}
