//! # Pretrained `VoVNet` Models and Configs

use crate::cache::disk::DiskCacheConfig;
use crate::cache::prefabs::{PreFabConfig, StaticPreFabConfig, StaticPreFabMap};
use crate::cache::weights::{StaticPretrainedWeightsDescriptor, StaticPretrainedWeightsMap};
use crate::models::vovnet::vovnet_model::{VoVNet, VoVNetContractConfig, VoVNetStructureConfig};
use burn::prelude::Backend;
use std::sync::Arc;

impl PreFabConfig<VoVNetContractConfig> {
    /// Convert to a prefab for [`VoVNetStructureConfig`].
    pub fn to_structure_prefab(&self) -> PreFabConfig<VoVNetStructureConfig> {
        let builder = self.builder.clone();
        PreFabConfig {
            name: self.name.clone(),
            description: self.description.clone(),
            builder: Arc::new(move || builder().to_structure()),
            weights: self.weights.clone(),
        }
    }

    /// Initialize a [`VoVNet`] with pretrained weights.
    ///
    /// The weights are fetched through the `disk_cache`.
    pub fn init_pretrained<B: Backend>(
        &self,
        weights_name: &str,
        disk_cache: &DiskCacheConfig,
        device: &B::Device,
    ) -> anyhow::Result<VoVNet<B>> {
        let descriptor = self.try_weights()?.try_lookup_by_name(weights_name)?;
        let path = descriptor.fetch_weights_to_disk_cache(disk_cache)?;

        tracing::info!(prefab = %self.name, weights = weights_name, "init pretrained VoVNet");
        self.new_config()
            .to_structure()
            .init(device)
            .load_pytorch_weights(path)
    }
}

impl From<&StaticPreFabConfig<VoVNetContractConfig>> for PreFabConfig<VoVNetStructureConfig> {
    fn from(config: &StaticPreFabConfig<VoVNetContractConfig>) -> Self {
        config.to_prefab().to_structure_prefab()
    }
}

impl From<&PreFabConfig<VoVNetContractConfig>> for PreFabConfig<VoVNetStructureConfig> {
    fn from(config: &PreFabConfig<VoVNetContractConfig>) -> Self {
        config.to_structure_prefab()
    }
}

/// ImageNet weights released with the paper.
static VOVNET39_IN1K: StaticPretrainedWeightsDescriptor = StaticPretrainedWeightsDescriptor {
    name: "in1k",
    description: "VoVNet-39 pretrained on ImageNet-1k",
    license: None,
    origin: Some("https://github.com/stigma0617/VoVNet.pytorch"),
    urls: &["https://dl.dropbox.com/s/1lnzsgnixd8gjra/vovnet39_torchvision.pth?dl=1"],
};

static VOVNET57_IN1K: StaticPretrainedWeightsDescriptor = StaticPretrainedWeightsDescriptor {
    name: "in1k",
    description: "VoVNet-57 pretrained on ImageNet-1k",
    license: None,
    origin: Some("https://github.com/stigma0617/VoVNet.pytorch"),
    urls: &["https://dl.dropbox.com/s/6bfu9gstbwfw31m/vovnet57_torchvision.pth?dl=1"],
};

/// Well-known [`super::VoVNet`] configs and weights.
pub static PREFAB_VOVNET_MAP: StaticPreFabMap<VoVNetContractConfig> = StaticPreFabMap {
    name: "vovnet",
    description: "Well-Known VoVNet configs",

    items: &[
        &StaticPreFabConfig {
            name: "vovnet27_slim",
            description: "VoVNet-27-slim [1, 1, 1, 1] OSA modules, 512 output channels",
            builder: VoVNetContractConfig::vovnet27_slim,
            weights: None,
        },
        &StaticPreFabConfig {
            name: "vovnet39",
            description: "VoVNet-39 [1, 1, 2, 2] OSA modules, 1024 output channels",
            builder: VoVNetContractConfig::vovnet39,
            weights: Some(&StaticPretrainedWeightsMap {
                items: &[&VOVNET39_IN1K],
            }),
        },
        &StaticPreFabConfig {
            name: "vovnet57",
            description: "VoVNet-57 [1, 1, 4, 3] OSA modules, 1024 output channels",
            builder: VoVNetContractConfig::vovnet57,
            weights: Some(&StaticPretrainedWeightsMap {
                items: &[&VOVNET57_IN1K],
            }),
        },
    ],
};
