//!
//! Multi-channel fluorescence images: reading stacked TIFF pages into one
//! intensity array per stain, and rendering channels, masks and label images
//! to 8-bit images.
//!
#![deny(missing_docs)]

pub mod stain;
pub mod tiff_stack;
pub mod view;

pub use stain::Stain;
pub use tiff_stack::{Channel, ChannelStack};
