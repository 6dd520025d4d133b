//! Martian stage COMPUTE_SHAPE_STATS
#![allow(missing_docs)]

use crate::stages::{final_stain_labels, parse_stain_map};
use crate::stats_table::ShapeStatsRow;
use crate::workflow::{compute_shape_stats, read_npy, WorkflowConfig, WorkflowSummary};
use crate::NpyFile;
use anyhow::Result;
use martian::prelude::*;
use martian_derive::{make_mro, MartianStruct};
use martian_filetypes::json_file::JsonFile;
use martian_filetypes::tabular_file::CsvFile;
use martian_filetypes::FileTypeWrite;
use segmentation::Spacing;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, MartianStruct)]
pub struct ComputeShapeStatsStageInputs {
    pub labels: HashMap<String, NpyFile>,
    pub refined_labels: HashMap<String, NpyFile>,
    pub thresholds: HashMap<String, f64>,
    pub reference_stain: Option<String>,
    pub row_spacing_um: f64,
    pub col_spacing_um: f64,
    pub exclude_border_objects: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, MartianStruct)]
pub struct ComputeShapeStatsStageOutputs {
    /// Every object of every stain.
    pub shape_stats: CsvFile<ShapeStatsRow>,
    /// Objects kept for plotting, border objects removed unless disabled.
    pub shape_stats_interior: CsvFile<ShapeStatsRow>,
    pub summary: JsonFile<WorkflowSummary>,
}

pub struct ComputeShapeStats;

#[make_mro(mem_gb = 4, volatile = strict)]
impl MartianMain for ComputeShapeStats {
    type StageInputs = ComputeShapeStatsStageInputs;
    type StageOutputs = ComputeShapeStatsStageOutputs;

    fn main(&self, args: Self::StageInputs, rover: MartianRover) -> Result<Self::StageOutputs> {
        let mut config = WorkflowConfig::from_parameters()?;
        if let Some(reference_stain) = &args.reference_stain {
            config.reference_stain = reference_stain.parse()?;
        }
        if let Some(exclude_border_objects) = args.exclude_border_objects {
            config.exclude_border_objects = exclude_border_objects;
        }
        let spacing = Spacing {
            row: args.row_spacing_um,
            col: args.col_spacing_um,
        };

        let stain_labels =
            final_stain_labels(config.reference_stain, args.labels, args.refined_labels)?
                .into_iter()
                .map(|(stain, file)| Ok((stain, read_npy::<u32>(file.as_ref())?)))
                .collect::<Result<Vec<_>>>()?;
        let thresholds = parse_stain_map(args.thresholds)?;

        let (rows, interior, summary) =
            compute_shape_stats(&stain_labels, &thresholds, spacing, &config);
        println!(
            "{} objects, {} after border filtering",
            rows.len(),
            interior.len()
        );

        let shape_stats: CsvFile<_> = rover.make_path("shape_stats");
        shape_stats.write(&rows)?;
        let shape_stats_interior: CsvFile<_> = rover.make_path("shape_stats_interior");
        shape_stats_interior.write(&interior)?;
        let summary_json: JsonFile<_> = rover.make_path("summary");
        summary_json.write(&summary)?;

        Ok(ComputeShapeStatsStageOutputs {
            shape_stats,
            shape_stats_interior,
            summary: summary_json,
        })
    }
}
