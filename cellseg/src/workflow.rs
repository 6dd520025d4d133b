//! Workflow configuration, output naming, and the in-process driver that runs
//! every step on one image and writes all outputs to a single directory.

use crate::plots::{write_area_histogram, write_composite, write_label_overlay, write_mask_image};
use crate::stats_table::{filter_interior, shape_stats_table, summarize, ShapeStatsRow, StainSummary};
use crate::{NpyFile, PngFile};
use anyhow::{bail, ensure, Context, Result};
use channel_stack::{ChannelStack, Stain};
use itertools::Itertools;
use log::info;
use martian::MartianFileType;
use martian_filetypes::json_file::JsonFile;
use martian_filetypes::tabular_file::CsvFile;
use martian_filetypes::FileTypeWrite;
use ndarray::{Array2, ArrayView2};
use ndarray_npy::{ReadNpyExt, ReadableElement, WritableElement, WriteNpyExt};
use segmentation::channel::{segment_channel, ChannelSegmentation, SegmentationParams};
use segmentation::refine::{refine_channel_mask, ReconstructionDomain, RefinedChannel};
use segmentation::{Connectivity, Spacing};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Settings of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Stain of each TIFF page, in page order.
    pub channel_order: Vec<Stain>,
    /// Stain whose labels delimit nuclei in the other channels.
    pub reference_stain: Stain,
    /// Sigma of the Gaussian applied before thresholding, in micrometers.
    pub gaussian_sigma: f64,
    /// Sigma of the Gaussian applied to the distance map.
    pub split_sigma: f64,
    /// Pixel size overriding the TIFF resolution tags.
    pub pixel_size_um: Option<f64>,
    /// Neighbourhood of the labelling filters.
    pub connectivity: Connectivity,
    /// Leave watershed lines unlabelled.
    pub mark_watershed_line: bool,
    /// Region refinement may grow into.
    pub reconstruction_domain: ReconstructionDomain,
    /// Drop border-touching objects from the interior table.
    pub exclude_border_objects: bool,
    /// Number of bins of the area histogram.
    pub histogram_bins: usize,
}

impl WorkflowConfig {
    /// Configuration from `parameters.toml`, or the compiled-in defaults.
    pub fn from_parameters() -> Result<Self> {
        Ok(WorkflowConfig {
            channel_order: Stain::parse_list(parameters_toml::channel_order()?)?,
            reference_stain: parameters_toml::reference_stain()?.parse()?,
            gaussian_sigma: *parameters_toml::gaussian_sigma()?,
            split_sigma: *parameters_toml::split_sigma()?,
            pixel_size_um: *parameters_toml::pixel_size_um()?,
            connectivity: Connectivity::from_fully_connected(*parameters_toml::fully_connected()?),
            mark_watershed_line: *parameters_toml::mark_watershed_line()?,
            reconstruction_domain: parse_reconstruction_domain(
                parameters_toml::reconstruction_domain()?,
            )?,
            exclude_border_objects: *parameters_toml::exclude_border_objects()?,
            histogram_bins: *parameters_toml::histogram_bins()?,
        })
    }

    /// Check the settings are consistent with each other.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.channel_order.contains(&self.reference_stain),
            "Reference stain {} is not among the channels {:?}.",
            self.reference_stain,
            self.channel_order
        );
        ensure!(self.histogram_bins > 0, "The area histogram needs at least one bin.");
        if let Some(pixel_size_um) = self.pixel_size_um {
            ensure!(
                pixel_size_um.is_finite() && pixel_size_um > 0.0,
                "Pixel size must be positive, got {pixel_size_um}."
            );
        }
        Ok(())
    }

    /// Pixel size: the configured override, else the one recorded in the
    /// image, else one micrometer.
    pub fn spacing(&self, from_image: Option<Spacing>) -> Spacing {
        self.pixel_size_um
            .map(Spacing::isotropic)
            .or(from_image)
            .unwrap_or_default()
    }

    /// Per-channel segmentation parameters at the given pixel size.
    pub fn segmentation_params(&self, spacing: Spacing) -> SegmentationParams {
        SegmentationParams {
            sigma: self.gaussian_sigma,
            split_sigma: self.split_sigma,
            spacing,
            connectivity: self.connectivity,
            mark_watershed_line: self.mark_watershed_line,
        }
    }

    /// Channels refined against the reference stain.
    pub fn unreliable_stains(&self) -> impl Iterator<Item = Stain> + '_ {
        self.channel_order
            .iter()
            .copied()
            .filter(|&stain| stain != self.reference_stain)
    }
}

/// Parse "foreground" or "labels".
pub fn parse_reconstruction_domain(s: &str) -> Result<ReconstructionDomain> {
    Ok(match s.trim().to_lowercase().as_str() {
        "foreground" => ReconstructionDomain::Foreground,
        "labels" => ReconstructionDomain::Labels,
        _ => bail!("Unknown reconstruction domain '{s}'. Expecting 'foreground' or 'labels'."),
    })
}

/// Write a 2D array as NPY.
pub fn write_npy<T: WritableElement>(file: &NpyFile, array: &Array2<T>) -> Result<()> {
    let path: &Path = file.as_ref();
    array
        .write_npy(file.buf_writer()?)
        .with_context(|| path.display().to_string())
}

/// Read a 2D array from NPY.
pub fn read_npy<T: ReadableElement>(path: &Path) -> Result<Array2<T>> {
    Array2::<T>::read_npy(BufReader::new(
        File::open(path).with_context(|| path.display().to_string())?,
    ))
    .with_context(|| path.display().to_string())
}

/// Intermediate images of one segmented channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationFiles {
    /// Li threshold mask.
    pub threshold_mask: NpyFile,
    /// Split labels.
    pub labels: NpyFile,
    /// Smoothed distance map.
    pub distance_map: NpyFile,
    /// Watershed seeds.
    pub peaks: NpyFile,
}

impl SegmentationFiles {
    /// Name the files of `stain` with `make_path`, which maps a file stem to a path.
    pub fn new(stain: Stain, make_path: impl Fn(String) -> NpyFile) -> Self {
        SegmentationFiles {
            threshold_mask: make_path(format!("{stain}_threshold_mask")),
            labels: make_path(format!("{stain}_labels")),
            distance_map: make_path(format!("{stain}_distance_map")),
            peaks: make_path(format!("{stain}_peaks")),
        }
    }

    /// Write every image of `segmentation`.
    pub fn write(&self, segmentation: &ChannelSegmentation) -> Result<()> {
        write_npy(&self.threshold_mask, &segmentation.mask)?;
        write_npy(&self.labels, &segmentation.split.labels)?;
        write_npy(&self.distance_map, &segmentation.split.distance)?;
        write_npy(&self.peaks, &segmentation.split.peaks)
    }
}

/// File stem of the refined labels of `stain`.
pub fn refined_labels_stem(stain: Stain) -> String {
    format!("{stain}_refined_labels")
}

/// File stem of the refined mask of `stain`, both as NPY and as image.
pub fn refined_mask_stem(stain: Stain) -> String {
    format!("{stain}_refined_mask")
}

/// File stem of the threshold mask image of `stain`.
pub fn threshold_mask_image_stem(stain: Stain) -> String {
    format!("{stain}_threshold_mask")
}

/// File stem of the label overlay of `stain`.
pub fn label_image_stem(stain: Stain) -> String {
    format!("{stain}_labels")
}

/// Threshold and split one channel of the stack.
pub fn segment_stain(
    stack: &ChannelStack,
    stain: Stain,
    params: &SegmentationParams,
) -> Result<ChannelSegmentation> {
    let image = stack
        .channel(stain)
        .with_context(|| format!("The image has no {stain} channel"))?;
    let segmentation = segment_channel(image, params)
        .with_context(|| format!("While segmenting the {stain} channel"))?;
    info!(
        "{stain}: threshold {:.3}, {} objects",
        segmentation.threshold, segmentation.split.num_labels
    );
    Ok(segmentation)
}

/// Align the threshold mask of `stain` to the reference labels.
pub fn refine_stain(
    stain: Stain,
    reference_labels: ArrayView2<'_, u32>,
    mask: ArrayView2<'_, u8>,
    config: &WorkflowConfig,
) -> Result<RefinedChannel> {
    let refined = refine_channel_mask(
        reference_labels,
        mask,
        config.reconstruction_domain,
        config.connectivity,
    )
    .with_context(|| {
        format!(
            "While refining the {stain} channel against {}",
            config.reference_stain
        )
    })?;
    info!(
        "{stain}: {} {} objects after refinement",
        refined.num_labels, config.reference_stain
    );
    Ok(refined)
}

/// Everything recorded in `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    /// Pixel size the statistics were computed at.
    pub spacing: Spacing,
    /// Stain the others were refined against.
    pub reference_stain: Stain,
    /// Whether the interior table drops border objects.
    pub exclude_border_objects: bool,
    /// Rows of `shape_stats.csv`.
    pub num_rows: usize,
    /// Rows of `shape_stats_interior.csv`.
    pub num_interior_rows: usize,
    /// Per-stain counts and area distribution.
    pub stains: Vec<StainSummary>,
}

/// Shape statistics of the final labels of each stain, the interior table
/// and the summary. Rows are ordered by stain, then label.
pub fn compute_shape_stats(
    stain_labels: &[(Stain, Array2<u32>)],
    thresholds: &[(Stain, f64)],
    spacing: Spacing,
    config: &WorkflowConfig,
) -> (Vec<ShapeStatsRow>, Vec<ShapeStatsRow>, WorkflowSummary) {
    let rows = shape_stats_table(
        stain_labels
            .iter()
            .sorted_by_key(|(stain, _)| *stain)
            .map(|(stain, labels)| (*stain, labels.view())),
        spacing,
    );
    let interior = if config.exclude_border_objects {
        filter_interior(&rows)
    } else {
        rows.clone()
    };
    let summary = WorkflowSummary {
        spacing,
        reference_stain: config.reference_stain,
        exclude_border_objects: config.exclude_border_objects,
        num_rows: rows.len(),
        num_interior_rows: interior.len(),
        stains: summarize(&rows, thresholds),
    };
    (rows, interior, summary)
}

/// Run the whole workflow on `image`, writing every output under `out_dir`.
pub fn run_workflow(image: &Path, out_dir: &Path, config: &WorkflowConfig) -> Result<WorkflowSummary> {
    config.validate()?;
    std::fs::create_dir_all(out_dir).with_context(|| out_dir.display().to_string())?;

    let stack = ChannelStack::read_tiff(image, &config.channel_order)?;
    let spacing = config.spacing(stack.spacing());
    info!("pixel size {spacing:?}");
    let params = config.segmentation_params(spacing);

    let mut segmentations = Vec::with_capacity(config.channel_order.len());
    for &stain in &config.channel_order {
        let segmentation = segment_stain(&stack, stain, &params)?;
        SegmentationFiles::new(stain, |stem| NpyFile::new(out_dir, stem)).write(&segmentation)?;
        write_mask_image(
            PngFile::new(out_dir, threshold_mask_image_stem(stain)).as_ref(),
            segmentation.mask.view(),
        )?;
        segmentations.push((stain, segmentation));
    }
    let Some((_, reference)) = segmentations
        .iter()
        .find(|(stain, _)| *stain == config.reference_stain)
    else {
        bail!("Reference stain {} was not segmented.", config.reference_stain);
    };

    let mut stain_labels = Vec::with_capacity(segmentations.len());
    for (stain, segmentation) in &segmentations {
        if *stain == config.reference_stain {
            stain_labels.push((*stain, segmentation.split.labels.clone()));
            continue;
        }
        let refined = refine_stain(
            *stain,
            reference.split.labels.view(),
            segmentation.mask.view(),
            config,
        )?;
        write_npy(
            &NpyFile::new(out_dir, refined_labels_stem(*stain)),
            &refined.labels,
        )?;
        write_npy(&NpyFile::new(out_dir, refined_mask_stem(*stain)), &refined.mask)?;
        write_mask_image(
            PngFile::new(out_dir, refined_mask_stem(*stain)).as_ref(),
            refined.mask.view(),
        )?;
        stain_labels.push((*stain, refined.labels));
    }

    let thresholds: Vec<_> = segmentations
        .iter()
        .map(|(stain, segmentation)| (*stain, segmentation.threshold))
        .collect();
    let (rows, interior, summary) = compute_shape_stats(&stain_labels, &thresholds, spacing, config);
    CsvFile::<ShapeStatsRow>::new(out_dir, "shape_stats").write(&rows)?;
    CsvFile::<ShapeStatsRow>::new(out_dir, "shape_stats_interior").write(&interior)?;
    JsonFile::<WorkflowSummary>::new(out_dir, "summary").write(&summary)?;

    write_composite(PngFile::new(out_dir, "composite").as_ref(), &stack)?;
    for (stain, labels) in &stain_labels {
        write_label_overlay(
            PngFile::new(out_dir, label_image_stem(*stain)).as_ref(),
            labels.view(),
            stack.channel(*stain),
        )?;
    }
    write_area_histogram(
        &out_dir.join("area_histogram.html"),
        &interior,
        config.histogram_bins,
    )?;
    info!(
        "wrote {} shape statistics rows ({} interior) to {}",
        rows.len(),
        interior.len(),
        out_dir.display()
    );
    Ok(summary)
}
