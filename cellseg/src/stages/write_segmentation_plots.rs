//! Martian stage WRITE_SEGMENTATION_PLOTS
#![allow(missing_docs)]

use crate::plots::{write_area_histogram, write_composite, write_label_overlay, write_mask_image};
use crate::stages::{final_stain_labels, parse_stain_map};
use crate::stats_table::ShapeStatsRow;
use crate::workflow::{
    label_image_stem, read_npy, refined_mask_stem, threshold_mask_image_stem, WorkflowConfig,
};
use crate::{HtmlFile, NpyFile, PngFile, TiffFile};
use anyhow::Result;
use channel_stack::{ChannelStack, Stain};
use martian::prelude::*;
use martian_derive::{make_mro, MartianStruct};
use martian_filetypes::tabular_file::CsvFile;
use martian_filetypes::FileTypeRead;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, MartianStruct)]
pub struct WriteSegmentationPlotsStageInputs {
    pub image: TiffFile,
    pub channel_order: Option<String>,
    pub labels: HashMap<String, NpyFile>,
    pub refined_labels: HashMap<String, NpyFile>,
    pub threshold_masks: HashMap<String, NpyFile>,
    pub refined_masks: HashMap<String, NpyFile>,
    pub reference_stain: Option<String>,
    pub shape_stats_interior: CsvFile<ShapeStatsRow>,
    pub histogram_bins: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, MartianStruct)]
pub struct WriteSegmentationPlotsStageOutputs {
    pub composite: PngFile,
    pub label_images: HashMap<String, PngFile>,
    pub threshold_mask_images: HashMap<String, PngFile>,
    pub refined_mask_images: HashMap<String, PngFile>,
    pub area_histogram: HtmlFile,
}

pub struct WriteSegmentationPlots;

#[make_mro(mem_gb = 4, volatile = strict)]
impl MartianMain for WriteSegmentationPlots {
    type StageInputs = WriteSegmentationPlotsStageInputs;
    type StageOutputs = WriteSegmentationPlotsStageOutputs;

    fn main(&self, args: Self::StageInputs, rover: MartianRover) -> Result<Self::StageOutputs> {
        let mut config = WorkflowConfig::from_parameters()?;
        if let Some(channel_order) = &args.channel_order {
            config.channel_order = Stain::parse_list(channel_order)?;
        }
        if let Some(reference_stain) = &args.reference_stain {
            config.reference_stain = reference_stain.parse()?;
        }
        if let Some(histogram_bins) = args.histogram_bins {
            config.histogram_bins = histogram_bins;
        }
        config.validate()?;

        let stack = ChannelStack::read_tiff(args.image.as_ref(), &config.channel_order)?;
        let composite: PngFile = rover.make_path("composite");
        write_composite(composite.as_ref(), &stack)?;

        let mut label_images = HashMap::new();
        for (stain, labels_file) in
            final_stain_labels(config.reference_stain, args.labels, args.refined_labels)?
        {
            let labels: Array2<u32> = read_npy(labels_file.as_ref())?;
            let label_image: PngFile = rover.make_path(label_image_stem(stain));
            write_label_overlay(label_image.as_ref(), labels.view(), stack.channel(stain))?;
            label_images.insert(stain.to_string(), label_image);
        }

        let mut threshold_mask_images = HashMap::new();
        for (stain, mask_file) in parse_stain_map(args.threshold_masks)? {
            let mask: Array2<u8> = read_npy(mask_file.as_ref())?;
            let mask_image: PngFile = rover.make_path(threshold_mask_image_stem(stain));
            write_mask_image(mask_image.as_ref(), mask.view())?;
            threshold_mask_images.insert(stain.to_string(), mask_image);
        }

        let mut refined_mask_images = HashMap::new();
        for (stain, mask_file) in parse_stain_map(args.refined_masks)? {
            let mask: Array2<u8> = read_npy(mask_file.as_ref())?;
            let mask_image: PngFile = rover.make_path(refined_mask_stem(stain));
            write_mask_image(mask_image.as_ref(), mask.view())?;
            refined_mask_images.insert(stain.to_string(), mask_image);
        }

        let area_histogram: HtmlFile = rover.make_path("area_histogram");
        write_area_histogram(
            area_histogram.as_ref(),
            &args.shape_stats_interior.read()?,
            config.histogram_bins,
        )?;

        Ok(WriteSegmentationPlotsStageOutputs {
            composite,
            label_images,
            threshold_mask_images,
            refined_mask_images,
            area_histogram,
        })
    }
}
