//! cellseg
#![deny(missing_docs)]

use anyhow::{Context, Result};
use cellseg::workflow::{parse_reconstruction_domain, run_workflow, WorkflowConfig};
use channel_stack::Stain;
use docopt::Docopt;
use flexi_logger::Logger;
use martian::prelude::*;
use segmentation::Connectivity;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const HEADER: &str = "# Copyright 2023 10x Genomics, Inc. All rights reserved.";

const USAGE: &str = "
Segment nuclei in multi-channel fluorescence images
Usage:
  cellseg martian <adapter>...
  cellseg mro [--file=<filename>] [--rewrite]
  cellseg run <image> --output=<dir> [options]
  cellseg --help
Options:
     --output=<dir>              Directory receiving every output.
     --parameters=<toml>         Parameters file replacing parameters.toml beside the executable.
     --channel-order=<stains>    Stains of the TIFF pages, e.g. dapi,ph3,ki67.
     --reference-stain=<stain>   Stain delimiting nuclei in the other channels.
     --sigma=<um>                Gaussian sigma before thresholding.
     --split-sigma=<um>          Gaussian sigma of the distance map.
     --pixel-size=<um>           Pixel size, overriding the TIFF resolution tags.
     --domain=<domain>           Reconstruction domain, foreground or labels.
     --bins=<n>                  Number of bins of the area histogram.
     --fully-connected           Count diagonal neighbours as connected.
     --watershed-line            Leave watershed lines unlabelled.
     --keep-border-objects       Keep objects touching the image border in the interior table.
     --help                      Show this screen.
";

#[derive(Deserialize)]
struct Args {
    // Martian interface
    cmd_martian: bool,
    cmd_mro: bool,
    arg_adapter: Vec<String>,
    flag_file: Option<String>,
    flag_rewrite: bool,

    // In-process workflow
    cmd_run: bool,
    arg_image: Option<PathBuf>,
    flag_output: Option<PathBuf>,
    flag_parameters: Option<PathBuf>,
    flag_channel_order: Option<String>,
    flag_reference_stain: Option<String>,
    flag_sigma: Option<f64>,
    flag_split_sigma: Option<f64>,
    flag_pixel_size: Option<f64>,
    flag_domain: Option<String>,
    flag_bins: Option<usize>,
    flag_fully_connected: bool,
    flag_watershed_line: bool,
    flag_keep_border_objects: bool,
}

impl Args {
    fn workflow_config(&self) -> Result<WorkflowConfig> {
        if let Some(parameters) = &self.flag_parameters {
            parameters_toml::load_from(parameters)?;
        }
        let mut config = WorkflowConfig::from_parameters()?;
        if let Some(channel_order) = &self.flag_channel_order {
            config.channel_order = Stain::parse_list(channel_order)?;
        }
        if let Some(reference_stain) = &self.flag_reference_stain {
            config.reference_stain = reference_stain.parse()?;
        }
        if let Some(sigma) = self.flag_sigma {
            config.gaussian_sigma = sigma;
        }
        if let Some(split_sigma) = self.flag_split_sigma {
            config.split_sigma = split_sigma;
        }
        if let Some(pixel_size) = self.flag_pixel_size {
            config.pixel_size_um = Some(pixel_size);
        }
        if let Some(domain) = &self.flag_domain {
            config.reconstruction_domain = parse_reconstruction_domain(domain)?;
        }
        if let Some(bins) = self.flag_bins {
            config.histogram_bins = bins;
        }
        if self.flag_fully_connected {
            config.connectivity = Connectivity::Eight;
        }
        if self.flag_watershed_line {
            config.mark_watershed_line = true;
        }
        if self.flag_keep_border_objects {
            config.exclude_border_objects = false;
        }
        Ok(config)
    }
}

fn run(image: &Path, output: &Path, config: &WorkflowConfig) -> Result<()> {
    let summary = run_workflow(image, output, config)
        .with_context(|| format!("While segmenting {}", image.display()))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn main() -> Result<()> {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let (stage_registry, mro_registry) = martian_stages![
        cellseg::stages::compute_shape_stats::ComputeShapeStats,
        cellseg::stages::refine_channel_masks::RefineChannelMasks,
        cellseg::stages::segment_channels::SegmentChannels,
        cellseg::stages::write_segmentation_plots::WriteSegmentationPlots,
    ];

    if args.cmd_martian {
        // Call the martian adapter
        let adapter = MartianAdapter::new(stage_registry);

        // Suppress any logging that would be emitted via crate log.
        let adapter = adapter.log_level(LevelFilter::Warn);

        let retcode = adapter.run(args.arg_adapter);
        std::process::exit(retcode);
    } else if args.cmd_mro {
        // Create the mro for all the stages in this adapter
        martian_make_mro(HEADER, args.flag_file, args.flag_rewrite, mro_registry)?;
    } else if args.cmd_run {
        let _logger = Logger::try_with_env_or_str("info")?.start()?;
        let config = args.workflow_config()?;
        let image = args.arg_image.as_deref().context("run requires <image>")?;
        let output = args.flag_output.as_deref().context("run requires --output")?;
        run(image, output, &config)?;
    }
    Ok(())
}
