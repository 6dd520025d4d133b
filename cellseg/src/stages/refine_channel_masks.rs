//! Martian stage REFINE_CHANNEL_MASKS
#![allow(missing_docs)]

use crate::stages::parse_stain_map;
use crate::workflow::{
    parse_reconstruction_domain, read_npy, refine_stain, refined_labels_stem, refined_mask_stem,
    write_npy, WorkflowConfig,
};
use crate::NpyFile;
use anyhow::{Context, Result};
use martian::prelude::*;
use martian_derive::{make_mro, MartianStruct};
use ndarray::Array2;
use segmentation::Connectivity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, MartianStruct)]
pub struct RefineChannelMasksStageInputs {
    /// Split labels of every stain.
    pub labels: HashMap<String, NpyFile>,
    /// Li threshold masks of every stain.
    pub threshold_masks: HashMap<String, NpyFile>,
    pub reference_stain: Option<String>,
    pub reconstruction_domain: Option<String>,
    pub fully_connected: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, MartianStruct)]
pub struct RefineChannelMasksStageOutputs {
    /// Reference labels restricted to each other stain.
    pub refined_labels: HashMap<String, NpyFile>,
    /// Reconstructed mask of each other stain.
    pub refined_masks: HashMap<String, NpyFile>,
    pub num_refined_labels: HashMap<String, u32>,
}

pub struct RefineChannelMasks;

#[make_mro(mem_gb = 4, volatile = strict)]
impl MartianMain for RefineChannelMasks {
    type StageInputs = RefineChannelMasksStageInputs;
    type StageOutputs = RefineChannelMasksStageOutputs;

    fn main(&self, args: Self::StageInputs, rover: MartianRover) -> Result<Self::StageOutputs> {
        let mut config = WorkflowConfig::from_parameters()?;
        if let Some(reference_stain) = &args.reference_stain {
            config.reference_stain = reference_stain.parse()?;
        }
        if let Some(domain) = &args.reconstruction_domain {
            config.reconstruction_domain = parse_reconstruction_domain(domain)?;
        }
        if let Some(fully_connected) = args.fully_connected {
            config.connectivity = Connectivity::from_fully_connected(fully_connected);
        }
        let reference_stain = config.reference_stain;

        let reference_file = parse_stain_map(args.labels)?
            .into_iter()
            .find_map(|(stain, file)| (stain == reference_stain).then_some(file))
            .with_context(|| format!("No labels for the reference stain {reference_stain}"))?;
        let reference_labels: Array2<u32> = read_npy(reference_file.as_ref())?;

        let mut outs = RefineChannelMasksStageOutputs {
            refined_labels: HashMap::new(),
            refined_masks: HashMap::new(),
            num_refined_labels: HashMap::new(),
        };
        for (stain, mask_file) in parse_stain_map(args.threshold_masks)? {
            if stain == reference_stain {
                continue;
            }
            let mask: Array2<u8> = read_npy(mask_file.as_ref())?;
            let refined = refine_stain(stain, reference_labels.view(), mask.view(), &config)?;
            let refined_file: NpyFile = rover.make_path(refined_labels_stem(stain));
            write_npy(&refined_file, &refined.labels)?;
            outs.refined_labels.insert(stain.to_string(), refined_file);
            let mask_file: NpyFile = rover.make_path(refined_mask_stem(stain));
            write_npy(&mask_file, &refined.mask)?;
            outs.refined_masks.insert(stain.to_string(), mask_file);
            outs.num_refined_labels
                .insert(stain.to_string(), refined.num_labels);
        }
        Ok(outs)
    }
}
