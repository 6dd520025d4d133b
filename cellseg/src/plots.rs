//! Figures written next to the tables: channel composite, label overlays and
//! the area histogram.

use crate::stats_table::ShapeStatsRow;
use anyhow::{Context, Result};
use channel_stack::view::ImageSpec;
use channel_stack::{ChannelStack, Stain};
use itertools::Itertools;
use ndarray::ArrayView2;
use plotly::color::Rgb;
use plotly::common::{Marker, Title};
use plotly::layout::{Axis, BarMode};
use plotly::{Histogram, Layout, Plot};
use std::path::Path;

const HISTOGRAM_OPACITY: f64 = 0.6;

fn stain_rgb(stain: Stain) -> Rgb {
    let [r, g, b] = match stain {
        Stain::Dapi => [31, 119, 180],
        Stain::Ph3 => [214, 39, 40],
        Stain::Ki67 => [44, 160, 44],
    };
    Rgb::new(r, g, b)
}

/// Overlaid histograms of object area, one trace per stain.
pub fn area_histogram(rows: &[ShapeStatsRow], bins: usize) -> Plot {
    let mut plot = Plot::new();
    for (stain, stain_rows) in rows
        .iter()
        .into_group_map_by(|row| row.stain)
        .into_iter()
        .sorted_by_key(|(stain, _)| *stain)
    {
        let areas = stain_rows.iter().map(|row| row.physical_size).collect_vec();
        let trace = Histogram::new(areas)
            .name(stain.name())
            .opacity(HISTOGRAM_OPACITY)
            .n_bins_x(bins)
            .marker(Marker::new().color(stain_rgb(stain)));
        plot.add_trace(trace);
    }
    plot.set_layout(
        Layout::new()
            .bar_mode(BarMode::Overlay)
            .x_axis(Axis::new().title(Title::with_text("area (µm²)")))
            .y_axis(Axis::new().title(Title::with_text("number of objects"))),
    );
    plot
}

/// Write the area histogram as a standalone HTML page.
pub fn write_area_histogram(path: &Path, rows: &[ShapeStatsRow], bins: usize) -> Result<()> {
    std::fs::write(path, area_histogram(rows, bins).to_html())
        .with_context(|| path.display().to_string())
}

/// Write the RGB composite of all channels, each in its stain colour.
pub fn write_composite(path: &Path, stack: &ChannelStack) -> Result<()> {
    let channels = stack
        .channels()
        .iter()
        .map(|channel| (channel.image.view(), channel.stain.color()))
        .collect();
    ImageSpec::Composite { channels }
        .create_image()?
        .save(path)
        .with_context(|| path.display().to_string())
}

/// Write a binary mask as a black and white image.
pub fn write_mask_image(path: &Path, mask: ArrayView2<'_, u8>) -> Result<()> {
    ImageSpec::Mask { mask }
        .create_image()?
        .save(path)
        .with_context(|| path.display().to_string())
}

/// Write a label image as categorical colours over the channel intensities.
pub fn write_label_overlay(
    path: &Path,
    labels: ArrayView2<'_, u32>,
    background: Option<ArrayView2<'_, f64>>,
) -> Result<()> {
    ImageSpec::Labels { labels, background }
        .create_image()?
        .save(path)
        .with_context(|| path.display().to_string())
}
