//! cellseg
#![deny(missing_docs)]
pub mod plots;
pub mod stages;
pub mod stats_table;
pub mod workflow;
mod types {
    #![allow(missing_docs)]

    use martian_derive::martian_filetype;
    use serde::{Deserialize, Serialize};

    martian_filetype! {NpyFile, "npy"}
    martian_filetype! {TiffFile, "tiff"}
    martian_filetype! {PngFile, "png"}
    martian_filetype! {HtmlFile, "html"}
}

pub use types::*;
