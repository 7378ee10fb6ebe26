//! # Miscellaneous Blocks
pub mod cna;
