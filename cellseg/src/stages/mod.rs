//! Martian stages of the segmentation pipeline.
use crate::NpyFile;
use anyhow::{bail, Result};
use channel_stack::Stain;
use itertools::Itertools;
use std::collections::HashMap;

pub mod compute_shape_stats;
pub mod refine_channel_masks;
pub mod segment_channels;
pub mod write_segmentation_plots;

/// Parse the stain names keying a stage map, sorted by stain.
pub(crate) fn parse_stain_map<T>(map: HashMap<String, T>) -> Result<Vec<(Stain, T)>> {
    Ok(map
        .into_iter()
        .map(|(name, value)| Ok((name.parse::<Stain>()?, value)))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .sorted_by_key(|(stain, _)| *stain)
        .collect())
}

/// Final labels of every stain: the split labels of the reference stain and
/// the refined labels of the others.
pub(crate) fn final_stain_labels(
    reference_stain: Stain,
    labels: HashMap<String, NpyFile>,
    refined_labels: HashMap<String, NpyFile>,
) -> Result<Vec<(Stain, NpyFile)>> {
    let Some((_, reference_labels)) = parse_stain_map(labels)?
        .into_iter()
        .find(|(stain, _)| *stain == reference_stain)
    else {
        bail!("No labels for the reference stain {reference_stain}.");
    };
    let mut stain_labels = vec![(reference_stain, reference_labels)];
    for (stain, file) in parse_stain_map(refined_labels)? {
        if stain == reference_stain {
            bail!("The reference stain {reference_stain} cannot have refined labels.");
        }
        stain_labels.push((stain, file));
    }
    stain_labels.sort_by_key(|(stain, _)| *stain);
    Ok(stain_labels)
}

#[cfg(test)]
mod tests {
    use super::compute_shape_stats::{ComputeShapeStats, ComputeShapeStatsStageInputs};
    use super::refine_channel_masks::{RefineChannelMasks, RefineChannelMasksStageInputs};
    use super::segment_channels::{SegmentChannels, SegmentChannelsStageInputs};
    use super::write_segmentation_plots::{
        WriteSegmentationPlots, WriteSegmentationPlotsStageInputs,
    };
    use super::*;
    use crate::workflow::read_npy;
    use crate::workflow::tests::write_synthetic_stack;
    use crate::TiffFile;
    use martian::prelude::*;
    use martian_filetypes::FileTypeRead;
    use ndarray::Array2;
    use std::path::Path;

    #[test]
    fn test_parse_stain_map() -> Result<()> {
        let map = HashMap::from([("ki67".to_string(), 3), ("DAPI".to_string(), 1)]);
        assert_eq!(
            parse_stain_map(map)?,
            vec![(Stain::Dapi, 1), (Stain::Ki67, 3)]
        );
        assert!(parse_stain_map(HashMap::from([("gfp".to_string(), 0)])).is_err());
        Ok(())
    }

    #[test]
    fn test_pipeline() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let image = TiffFile::new(dir.path(), "cells");
        let shape = write_synthetic_stack(image.as_ref())?;
        let stage_dir = |name: &str| -> Result<std::path::PathBuf> {
            let path = dir.path().join(name);
            std::fs::create_dir(&path)?;
            Ok(path)
        };

        let segmented = SegmentChannels.test_run(
            stage_dir("segment")?,
            SegmentChannelsStageInputs {
                image: image.clone(),
                channel_order: None,
                gaussian_sigma: None,
                split_sigma: None,
                pixel_size_um: Some(0.5),
                fully_connected: None,
                mark_watershed_line: None,
            },
        )?;
        assert_eq!(segmented.labels.len(), 3);
        assert_eq!(segmented.row_spacing_um, 0.5);
        let dapi_labels: Array2<u32> = read_npy(segmented.labels["dapi"].as_ref())?;
        assert_eq!(dapi_labels.dim(), shape);
        for (stain, labels_file) in &segmented.labels {
            let labels: Array2<u32> = read_npy(labels_file.as_ref())?;
            assert_eq!(
                labels.iter().copied().max(),
                Some(segmented.num_labels[stain])
            );
            // the distance map is zero exactly off the threshold mask
            let mask: Array2<u8> = read_npy(segmented.threshold_masks[stain].as_ref())?;
            let distance: Array2<f64> = read_npy(segmented.distance_maps[stain].as_ref())?;
            assert_eq!(distance.dim(), shape);
            assert!(mask
                .iter()
                .zip(&distance)
                .all(|(&m, &d)| (m == 0) == (d == 0.0)));
        }

        let refined = RefineChannelMasks.test_run(
            stage_dir("refine")?,
            RefineChannelMasksStageInputs {
                labels: segmented.labels.clone(),
                threshold_masks: segmented.threshold_masks.clone(),
                reference_stain: None,
                reconstruction_domain: None,
                fully_connected: None,
            },
        )?;
        assert_eq!(
            refined.refined_labels.keys().sorted().collect_vec(),
            vec!["ki67", "ph3"]
        );
        assert_eq!(
            refined.refined_masks.keys().sorted().collect_vec(),
            vec!["ki67", "ph3"]
        );
        for (stain, labels_file) in &refined.refined_labels {
            let labels: Array2<u32> = read_npy(labels_file.as_ref())?;
            let mask: Array2<u8> = read_npy(refined.refined_masks[stain].as_ref())?;
            assert_eq!(
                labels.iter().copied().max().unwrap_or(0),
                refined.num_refined_labels[stain]
            );
            assert_eq!(mask, labels.mapv(|l| u8::from(l != 0)));
        }
        assert!(refined.num_refined_labels["ki67"] >= 1);

        let stats = ComputeShapeStats.test_run(
            stage_dir("stats")?,
            ComputeShapeStatsStageInputs {
                labels: segmented.labels.clone(),
                refined_labels: refined.refined_labels.clone(),
                thresholds: segmented.thresholds.clone(),
                reference_stain: None,
                row_spacing_um: segmented.row_spacing_um,
                col_spacing_um: segmented.col_spacing_um,
                exclude_border_objects: None,
            },
        )?;
        let rows = stats.shape_stats.read()?;
        let interior = stats.shape_stats_interior.read()?;
        assert!(!rows.is_empty());
        assert!(interior.len() < rows.len());
        let summary = stats.summary.read()?;
        assert_eq!(summary.num_rows, rows.len());
        assert_eq!(summary.stains.len(), 3);

        let plots = WriteSegmentationPlots.test_run(
            stage_dir("plots")?,
            WriteSegmentationPlotsStageInputs {
                image,
                channel_order: None,
                labels: segmented.labels,
                refined_labels: refined.refined_labels,
                threshold_masks: segmented.threshold_masks,
                refined_masks: refined.refined_masks,
                reference_stain: None,
                shape_stats_interior: stats.shape_stats_interior,
                histogram_bins: None,
            },
        )?;
        let composite: &Path = plots.composite.as_ref();
        assert!(composite.exists());
        assert_eq!(plots.label_images.len(), 3);
        assert_eq!(
            plots.threshold_mask_images.keys().sorted().collect_vec(),
            vec!["dapi", "ki67", "ph3"]
        );
        assert_eq!(
            plots.refined_mask_images.keys().sorted().collect_vec(),
            vec!["ki67", "ph3"]
        );
        for mask_image in plots
            .threshold_mask_images
            .values()
            .chain(plots.refined_mask_images.values())
        {
            let path: &Path = mask_image.as_ref();
            assert!(path.exists());
        }
        let histogram: &Path = plots.area_histogram.as_ref();
        assert!(histogram.exists());
        Ok(())
    }
}
