//! Fluorescent stains imaged in the sample.

use crate::view::CompositeChannel;
use anyhow::{bail, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

const DAPI: &str = "dapi";
const PH3: &str = "ph3";
const KI67: &str = "ki67";

/// Stain imaged in one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stain {
    /// Nuclear DNA stain, the reliable channel for nucleus boundaries.
    Dapi,
    /// Phospho-histone H3, marks mitotic cells.
    Ph3,
    /// Ki-67, marks proliferating cells.
    Ki67,
}

impl FromStr for Stain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_lowercase().as_str() {
            DAPI => Stain::Dapi,
            PH3 => Stain::Ph3,
            KI67 => Stain::Ki67,
            _ => bail!("Unknown stain '{s}'. Expecting one of '{DAPI}', '{PH3}' or '{KI67}'."),
        })
    }
}

impl Display for Stain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Stain {
    /// Every stain, in the default channel order.
    pub const ALL: [Stain; 3] = [Stain::Dapi, Stain::Ph3, Stain::Ki67];

    /// Lower-case name used in file names and tables.
    pub fn name(self) -> &'static str {
        match self {
            Stain::Dapi => DAPI,
            Stain::Ph3 => PH3,
            Stain::Ki67 => KI67,
        }
    }

    /// Colour of the stain in composites.
    pub fn color(self) -> CompositeChannel {
        match self {
            Stain::Dapi => CompositeChannel::Blue,
            Stain::Ph3 => CompositeChannel::Red,
            Stain::Ki67 => CompositeChannel::Green,
        }
    }

    /// Stain displayed in the given RGB sample (0 = red, 1 = green, 2 = blue).
    pub fn from_rgb_sample(sample: usize) -> Option<Self> {
        Stain::ALL
            .into_iter()
            .find(|stain| stain.color().rgb_index() == sample)
    }

    /// Parse a comma separated channel order such as `dapi,ph3,ki67`.
    pub fn parse_list(s: &str) -> Result<Vec<Self>> {
        let stains: Vec<Stain> = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Stain::from_str)
            .try_collect()?;
        if stains.is_empty() {
            bail!("Channel order '{s}' names no stain.");
        }
        if let Some(duplicate) = stains.iter().duplicates().next() {
            bail!("Stain '{duplicate}' appears more than once in channel order '{s}'.");
        }
        Ok(stains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() -> Result<()> {
        assert_eq!("DAPI".parse::<Stain>()?, Stain::Dapi);
        assert_eq!(" ki67 ".parse::<Stain>()?, Stain::Ki67);
        assert!("gfp".parse::<Stain>().is_err());
        assert_eq!(Stain::Ph3.to_string(), "ph3");
        assert_eq!(serde_json::to_string(&Stain::Ki67)?, r#""ki67""#);
        Ok(())
    }

    #[test]
    fn test_parse_list() -> Result<()> {
        assert_eq!(
            Stain::parse_list("ph3, dapi,ki67")?,
            vec![Stain::Ph3, Stain::Dapi, Stain::Ki67]
        );
        assert!(Stain::parse_list("dapi,dapi").is_err());
        assert!(Stain::parse_list(",").is_err());
        Ok(())
    }

    #[test]
    fn test_rgb_samples() {
        assert_eq!(Stain::from_rgb_sample(0), Some(Stain::Ph3));
        assert_eq!(Stain::from_rgb_sample(1), Some(Stain::Ki67));
        assert_eq!(Stain::from_rgb_sample(2), Some(Stain::Dapi));
        assert_eq!(Stain::from_rgb_sample(3), None);
    }
}
