//! parameters_toml
#![deny(missing_docs)]

use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde::Deserialize;
use std::borrow::Cow;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct Parameters {
    /// Sigma of the Gaussian applied to each channel before thresholding, in micrometers.
    gaussian_sigma: f64,
    /// Sigma of the Gaussian applied to the distance map before peak detection.
    split_sigma: f64,
    /// Isotropic pixel size in micrometers. When unset, taken from the TIFF
    /// resolution tags, or 1.0.
    pixel_size_um: Option<f64>,
    /// Use the 8-neighbourhood for maxima, labelling and watershed.
    fully_connected: bool,
    /// Leave the pixels where two watershed basins meet unlabelled.
    mark_watershed_line: bool,
    /// Drop objects touching the image border from the interior table and plot.
    exclude_border_objects: bool,
    /// Stain whose labels delimit nuclei in the other channels.
    reference_stain: Cow<'static, str>,
    /// Stains of the TIFF pages, comma separated, in page order.
    channel_order: Cow<'static, str>,
    /// Region reconstruction may grow into: "foreground" or "labels".
    reconstruction_domain: Cow<'static, str>,
    /// Number of bins of the area histogram.
    histogram_bins: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        DEFAULT_PARAMETERS
    }
}

const DEFAULT_PARAMETERS: Parameters = Parameters {
    gaussian_sigma: 1.0,
    split_sigma: 1.0,
    pixel_size_um: None,
    fully_connected: false,
    mark_watershed_line: false,
    exclude_border_objects: true,
    reference_stain: Cow::Borrowed("dapi"),
    channel_order: Cow::Borrowed("dapi,ph3,ki67"),
    reconstruction_domain: Cow::Borrowed("foreground"),
    histogram_bins: 40,
};
static PARAMETERS: OnceLock<Result<Parameters>> = OnceLock::new();

fn read_parameters(path: &Path) -> Result<Parameters> {
    let s = std::fs::read_to_string(path).with_context(|| path.display().to_string())?;
    toml::from_str(&s).with_context(|| path.display().to_string())
}

/// Return a reference to the global parameters.
/// The parameters may need to be loaded; if loading fails, return Err.
fn parameters() -> &'static Result<Parameters> {
    PARAMETERS.get_or_init(|| {
        let path = std::env::current_exe()
            .context("Unable to locate the running executable")?
            .with_file_name("parameters.toml");
        if !path.exists() {
            warn!(
                "could not find parameters.toml at {}, falling back to defaults",
                path.display()
            );
            Ok(DEFAULT_PARAMETERS)
        } else {
            read_parameters(&path)
        }
    })
}

/// Load the parameters from `path` instead of the file beside the executable.
/// Fails when the parameters have already been loaded.
pub fn load_from(path: &Path) -> Result<()> {
    let loaded = read_parameters(path)?;
    info!("loaded parameters from {}", path.display());
    if PARAMETERS.set(Ok(loaded)).is_err() {
        bail!(
            "parameters were already loaded before reading {}",
            path.display()
        );
    }
    Ok(())
}

/// Get a parameter from parameters.toml
macro_rules! parameter_getter {
    ($a:ident, $t:ty) => {
        /// Get this parameter from parameters.toml
        pub fn $a() -> Result<&'static $t> {
            let val = match parameters() {
                Err(e) => return Err(anyhow::anyhow!(e)),
                Ok(p) => &p.$a,
            };
            if DEFAULT_PARAMETERS.$a != *val {
                warn!("using non-default {} = {:?}", stringify!($a), val);
            }
            Ok(val)
        }
    };
}

parameter_getter!(gaussian_sigma, f64);
parameter_getter!(split_sigma, f64);
parameter_getter!(pixel_size_um, Option<f64>);
parameter_getter!(fully_connected, bool);
parameter_getter!(mark_watershed_line, bool);
parameter_getter!(exclude_border_objects, bool);
parameter_getter!(reference_stain, str);
parameter_getter!(channel_order, str);
parameter_getter!(reconstruction_domain, str);
parameter_getter!(histogram_bins, usize);

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "gaussian_sigma = 2.5\nchannel_order = \"ki67,dapi\"")?;
        let parameters = read_parameters(file.path())?;
        assert_eq!(parameters.gaussian_sigma, 2.5);
        assert_eq!(parameters.channel_order, "ki67,dapi");
        assert_eq!(parameters.split_sigma, DEFAULT_PARAMETERS.split_sigma);
        assert_eq!(parameters.histogram_bins, 40);
        assert!(parameters.exclude_border_objects);
        Ok(())
    }

    #[test]
    fn test_unknown_parameter_rejected() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "gausian_sigma = 2.5")?;
        assert!(read_parameters(file.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_empty_file_is_default() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        assert_eq!(read_parameters(file.path())?, Parameters::default());
        Ok(())
    }
}
