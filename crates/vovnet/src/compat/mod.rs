//! # Compat Layers
//!
//! Wrappers and utilities which smooth over gaps in the current ``burn`` release.
pub mod activation_wrapper;
pub mod conv_shape;
pub mod normalization_wrapper;
