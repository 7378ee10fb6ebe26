//! # Multi-Scale Feature Maps
//!
//! The backbone emits one map per stage, keyed ``res2`` through ``res5``.

use burn::prelude::{Backend, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Stage output key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FeatureKey {
    /// Stage 2; stride 4.
    Res2,
    /// Stage 3; stride 8.
    Res3,
    /// Stage 4; stride 16.
    Res4,
    /// Stage 5; stride 32.
    Res5,
}

impl FeatureKey {
    /// All keys, in stage order.
    pub const ALL: [FeatureKey; 4] = [
        FeatureKey::Res2,
        FeatureKey::Res3,
        FeatureKey::Res4,
        FeatureKey::Res5,
    ];

    /// The key label.
    pub fn name(&self) -> &'static str {
        match self {
            FeatureKey::Res2 => "res2",
            FeatureKey::Res3 => "res3",
            FeatureKey::Res4 => "res4",
            FeatureKey::Res5 => "res5",
        }
    }

    /// The stage index, ``2..=5``.
    pub fn stage_index(&self) -> usize {
        match self {
            FeatureKey::Res2 => 2,
            FeatureKey::Res3 => 3,
            FeatureKey::Res4 => 4,
            FeatureKey::Res5 => 5,
        }
    }
}

impl Display for FeatureKey {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Channel count and stride of a feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeSpec {
    /// Number of channels.
    pub channels: usize,

    /// Input resolution / map resolution.
    pub stride: usize,
}

/// Backbone output maps.
#[derive(Debug, Clone)]
pub struct FeatureMaps<B: Backend> {
    /// ``[batch, channels, h/4, w/4]``
    pub res2: Tensor<B, 4>,
    /// ``[batch, channels, h/8, w/8]``
    pub res3: Tensor<B, 4>,
    /// ``[batch, channels, h/16, w/16]``
    pub res4: Tensor<B, 4>,
    /// ``[batch, channels, h/32, w/32]``
    pub res5: Tensor<B, 4>,
}

impl<B: Backend> FeatureMaps<B> {
    /// Get a map by key.
    pub fn get(
        &self,
        key: FeatureKey,
    ) -> &Tensor<B, 4> {
        match key {
            FeatureKey::Res2 => &self.res2,
            FeatureKey::Res3 => &self.res3,
            FeatureKey::Res4 => &self.res4,
            FeatureKey::Res5 => &self.res5,
        }
    }

    /// Convert to a ``{label: map}`` mapping.
    pub fn into_map(self) -> BTreeMap<String, Tensor<B, 4>> {
        BTreeMap::from([
            (FeatureKey::Res2.to_string(), self.res2),
            (FeatureKey::Res3.to_string(), self.res3),
            (FeatureKey::Res4.to_string(), self.res4),
            (FeatureKey::Res5.to_string(), self.res5),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_keys() {
        let names: Vec<&str> = FeatureKey::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(names, vec!["res2", "res3", "res4", "res5"]);
        assert_eq!(FeatureKey::Res4.to_string(), "res4");
        assert_eq!(FeatureKey::Res5.stage_index(), 5);
        assert!(FeatureKey::Res2 < FeatureKey::Res3);
    }

    #[test]
    fn test_into_map() {
        let device = Default::default();
        let maps: FeatureMaps<B> = FeatureMaps {
            res2: Tensor::zeros([1, 2, 8, 8], &device),
            res3: Tensor::zeros([1, 3, 4, 4], &device),
            res4: Tensor::zeros([1, 4, 2, 2], &device),
            res5: Tensor::zeros([1, 5, 1, 1], &device),
        };
        assert_eq!(maps.get(FeatureKey::Res3).dims(), [1, 3, 4, 4]);

        let map = maps.into_map();
        assert_eq!(
            map.keys().cloned().collect::<Vec<_>>(),
            vec!["res2", "res3", "res4", "res5"]
        );
        assert_eq!(map["res5"].dims(), [1, 5, 1, 1]);
    }
}
