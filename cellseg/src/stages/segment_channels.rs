//! Martian stage SEGMENT_CHANNELS
//! Threshold each channel of the image and split touching nuclei, one chunk
//! per stain.
#![allow(missing_docs)]

use crate::workflow::{segment_stain, SegmentationFiles, WorkflowConfig};
use crate::{NpyFile, TiffFile};
use anyhow::Result;
use channel_stack::tiff_stack::{read_dimensions, read_resolution};
use channel_stack::{ChannelStack, Stain};
use martian::prelude::*;
use martian_derive::{make_mro, MartianStruct};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Intermediate float images held at once while segmenting one channel.
const IMAGES_PER_CHANNEL: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize, MartianStruct)]
pub struct SegmentChannelsStageInputs {
    pub image: TiffFile,
    pub channel_order: Option<String>,
    pub gaussian_sigma: Option<f64>,
    pub split_sigma: Option<f64>,
    pub pixel_size_um: Option<f64>,
    pub fully_connected: Option<bool>,
    pub mark_watershed_line: Option<bool>,
}

impl SegmentChannelsStageInputs {
    fn config(&self) -> Result<WorkflowConfig> {
        let mut config = WorkflowConfig::from_parameters()?;
        if let Some(channel_order) = &self.channel_order {
            config.channel_order = Stain::parse_list(channel_order)?;
        }
        if let Some(gaussian_sigma) = self.gaussian_sigma {
            config.gaussian_sigma = gaussian_sigma;
        }
        if let Some(split_sigma) = self.split_sigma {
            config.split_sigma = split_sigma;
        }
        if let Some(pixel_size_um) = self.pixel_size_um {
            config.pixel_size_um = Some(pixel_size_um);
        }
        if let Some(fully_connected) = self.fully_connected {
            config.connectivity = segmentation::Connectivity::from_fully_connected(fully_connected);
        }
        if let Some(mark_watershed_line) = self.mark_watershed_line {
            config.mark_watershed_line = mark_watershed_line;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, MartianStruct)]
pub struct SegmentChannelsStageOutputs {
    pub threshold_masks: HashMap<String, NpyFile>,
    pub labels: HashMap<String, NpyFile>,
    pub distance_maps: HashMap<String, NpyFile>,
    pub peaks: HashMap<String, NpyFile>,
    pub thresholds: HashMap<String, f64>,
    pub num_labels: HashMap<String, u32>,
    pub row_spacing_um: f64,
    pub col_spacing_um: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, MartianStruct)]
pub struct SegmentChannelsChunkInputs {
    stain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, MartianStruct)]
pub struct SegmentChannelsChunkOutputs {
    threshold_mask: NpyFile,
    labels: NpyFile,
    distance_map: NpyFile,
    peaks: NpyFile,
    threshold: f64,
    num_labels: u32,
}

pub struct SegmentChannels;

#[make_mro(volatile = strict)]
impl MartianStage for SegmentChannels {
    type StageInputs = SegmentChannelsStageInputs;
    type StageOutputs = SegmentChannelsStageOutputs;
    type ChunkInputs = SegmentChannelsChunkInputs;
    type ChunkOutputs = SegmentChannelsChunkOutputs;

    fn split(
        &self,
        args: Self::StageInputs,
        _rover: MartianRover,
    ) -> Result<StageDef<Self::ChunkInputs>> {
        let config = args.config()?;
        let (nrows, ncols, num_pages) = read_dimensions(args.image.as_ref())?;
        let image_gib = (nrows * ncols * std::mem::size_of::<f64>()) as f64 / 1024f64.powi(3);
        let mem_gib = (image_gib * (num_pages + IMAGES_PER_CHANNEL) as f64 + 1.0).ceil() as isize;
        println!("{num_pages} pages of {nrows}x{ncols} pixels, {mem_gib} GiB per chunk");

        Ok(config
            .channel_order
            .iter()
            .map(|stain| {
                (
                    SegmentChannelsChunkInputs {
                        stain: stain.to_string(),
                    },
                    Resource::with_mem_gb(mem_gib),
                )
            })
            .collect::<StageDef<_>>()
            .join_resource(Resource::with_mem_gb(1)))
    }

    fn main(
        &self,
        args: Self::StageInputs,
        chunk_args: Self::ChunkInputs,
        rover: MartianRover,
    ) -> Result<Self::ChunkOutputs> {
        let config = args.config()?;
        let stain: Stain = chunk_args.stain.parse()?;
        let stack = ChannelStack::read_tiff(args.image.as_ref(), &config.channel_order)?;
        let params = config.segmentation_params(config.spacing(stack.spacing()));

        let segmentation = segment_stain(&stack, stain, &params)?;
        let files = SegmentationFiles::new(stain, |stem| rover.make_path(stem));
        files.write(&segmentation)?;

        Ok(SegmentChannelsChunkOutputs {
            threshold_mask: files.threshold_mask,
            labels: files.labels,
            distance_map: files.distance_map,
            peaks: files.peaks,
            threshold: segmentation.threshold,
            num_labels: segmentation.split.num_labels,
        })
    }

    fn join(
        &self,
        args: Self::StageInputs,
        chunk_defs: Vec<Self::ChunkInputs>,
        chunk_outs: Vec<Self::ChunkOutputs>,
        _rover: MartianRover,
    ) -> Result<Self::StageOutputs> {
        let config = args.config()?;
        let spacing = config.spacing(read_resolution(args.image.as_ref())?);

        let mut outs = SegmentChannelsStageOutputs {
            threshold_masks: HashMap::new(),
            labels: HashMap::new(),
            distance_maps: HashMap::new(),
            peaks: HashMap::new(),
            thresholds: HashMap::new(),
            num_labels: HashMap::new(),
            row_spacing_um: spacing.row,
            col_spacing_um: spacing.col,
        };
        for (chunk_def, chunk_out) in chunk_defs.into_iter().zip(chunk_outs) {
            let stain = chunk_def.stain;
            outs.threshold_masks
                .insert(stain.clone(), chunk_out.threshold_mask);
            outs.labels.insert(stain.clone(), chunk_out.labels);
            outs.distance_maps
                .insert(stain.clone(), chunk_out.distance_map);
            outs.peaks.insert(stain.clone(), chunk_out.peaks);
            outs.thresholds.insert(stain.clone(), chunk_out.threshold);
            outs.num_labels.insert(stain, chunk_out.num_labels);
        }
        Ok(outs)
    }
}
