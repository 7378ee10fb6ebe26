//! # `VoVNet`
//!
//! One-Shot Aggregation backbones, producing ``res2`` through ``res5``
//! feature maps at strides ``{4, 8, 16, 32}``.
//!
//! Well-known configs are listed in [`prefabs::PREFAB_VOVNET_MAP`].

pub mod features;
pub mod osa_module;
pub mod osa_stage;
pub mod prefabs;
pub mod stem;
pub mod vovnet_io;
pub mod vovnet_model;

pub use features::{FeatureKey, FeatureMaps, ShapeSpec};
pub use vovnet_model::{VoVNet, VoVNetContractConfig, VoVNetStructureConfig};
