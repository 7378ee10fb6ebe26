#![warn(missing_docs)]
//!# vovnet - `VoVNet` Backbones for Burn
//!
//! ## Notable Components
//!
//! * [`cache`] - pretrained weight cache and config prefabs.
//! * [`compat`] - compat code, ported or planned for an upcoming release of ``burn``.
//!   * [`compat::activation_wrapper::Activation`] - activation layer abstraction wrapper.
//!   * [`compat::normalization_wrapper::Normalization`] - norm layer abstraction wrapper.
//!   * [`compat::conv_shape`] - conv / pool output size arithmetic.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::blocks::cna`] - ``Conv2d + Norm + Activation`` block.
//!   * [`layers::pool::max_pool_2d_ceil`] - ceil-mode ``MaxPool2d``.
//! * [`models`] - complete model families.
//!   * [`models::vovnet`] - `VoVNet` one-shot aggregation backbones.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod compat;

pub mod layers;

pub mod cache;
pub mod models;
