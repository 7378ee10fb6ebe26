//! # Model Families
pub mod vovnet;
