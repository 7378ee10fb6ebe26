//! # `VoVNet` Core Model
//!
//! [`VoVNet`] is the core `VoVNet` backbone module.
//!
//! [`VoVNetContractConfig`] implements [`Config`], and provides
//! a high-level, table-driven configuration interface.
//! It provides [`VoVNetContractConfig::to_structure`] to convert
//! to a [`VoVNetStructureConfig`].
//!
//! [`VoVNetStructureConfig`] implements [`Config`], and provides
//! [`VoVNetStructureConfig::init`] to initialize a [`VoVNet`].
//!
//! [`VoVNet`] implements [`Module`], and provides
//! [`VoVNet::forward`], yielding multi-scale [`FeatureMaps`].

use crate::layers::blocks::cna::AbstractCNA2dConfig;
use crate::models::vovnet::features::{FeatureKey, FeatureMaps, ShapeSpec};
use crate::models::vovnet::osa_stage::{OsaStage, OsaStageConfig, OsaStageMeta};
use crate::models::vovnet::stem::{VoVNetStem, VoVNetStemConfig};
use crate::models::vovnet::vovnet_io::pytorch_stubs::load_pytorch_weights;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::{Backend, Tensor};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// `VoVNet-27-slim` inner 3x3 widths.
pub const VOVNET27_SLIM_STAGE_CHANNELS: [usize; 4] = [64, 80, 96, 112];
/// `VoVNet-27-slim` aggregation widths.
pub const VOVNET27_SLIM_CONCAT_CHANNELS: [usize; 4] = [128, 256, 384, 512];
/// `VoVNet-27-slim` modules per stage.
pub const VOVNET27_SLIM_BLOCKS: [usize; 4] = [1, 1, 1, 1];

/// `VoVNet-39` / `VoVNet-57` inner 3x3 widths.
pub const VOVNET_STAGE_CHANNELS: [usize; 4] = [128, 160, 192, 224];
/// `VoVNet-39` / `VoVNet-57` aggregation widths.
pub const VOVNET_CONCAT_CHANNELS: [usize; 4] = [256, 512, 768, 1024];
/// `VoVNet-39` modules per stage.
pub const VOVNET39_BLOCKS: [usize; 4] = [1, 1, 2, 2];
/// `VoVNet-57` modules per stage.
pub const VOVNET57_BLOCKS: [usize; 4] = [1, 1, 4, 3];

/// Inner 3x3 units per module, for all published variants.
pub const VOVNET_LAYERS_PER_BLOCK: usize = 5;

/// Number of OSA stages.
pub const NUM_STAGES: usize = 4;

/// High-level `VoVNet` model configuration.
#[derive(Config, Debug)]
pub struct VoVNetContractConfig {
    /// Inner 3x3 width, per stage.
    pub stage_channels: [usize; 4],

    /// Aggregation width, per stage; the stage output channels.
    pub concat_channels: [usize; 4],

    /// Number of OSA modules, per stage.
    pub blocks_per_stage: [usize; 4],

    /// Inner 3x3 units per OSA module.
    pub layers_per_block: usize,

    /// Number of classification classes.
    #[config(default = "1000")]
    pub num_classes: usize,

    /// Number of input image channels.
    #[config(default = "3")]
    pub in_channels: usize,

    /// Stem unit widths.
    #[config(default = "[64, 64, 128]")]
    pub stem_channels: [usize; 3],

    /// Norm / activation policy.
    #[config(default = "AbstractCNA2dConfig::default()")]
    pub cna: AbstractCNA2dConfig,
}

impl VoVNetContractConfig {
    /// `VoVNet-27-slim`.
    pub fn vovnet27_slim() -> Self {
        Self::new(
            VOVNET27_SLIM_STAGE_CHANNELS,
            VOVNET27_SLIM_CONCAT_CHANNELS,
            VOVNET27_SLIM_BLOCKS,
            VOVNET_LAYERS_PER_BLOCK,
        )
    }

    /// `VoVNet-39`.
    pub fn vovnet39() -> Self {
        Self::new(
            VOVNET_STAGE_CHANNELS,
            VOVNET_CONCAT_CHANNELS,
            VOVNET39_BLOCKS,
            VOVNET_LAYERS_PER_BLOCK,
        )
    }

    /// `VoVNet-57`.
    pub fn vovnet57() -> Self {
        Self::new(
            VOVNET_STAGE_CHANNELS,
            VOVNET_CONCAT_CHANNELS,
            VOVNET57_BLOCKS,
            VOVNET_LAYERS_PER_BLOCK,
        )
    }

    /// Convert to a [`VoVNetStructureConfig`].
    pub fn to_structure(self) -> VoVNetStructureConfig {
        self.into()
    }
}

impl From<VoVNetContractConfig> for VoVNetStructureConfig {
    fn from(config: VoVNetContractConfig) -> Self {
        let stem = VoVNetStemConfig::build(config.in_channels, config.stem_channels, &config.cna);

        let mut in_channels = stem.out_channels();
        let stages = (0..NUM_STAGES)
            .map(|idx| {
                let stage = OsaStageConfig::build(
                    FeatureKey::ALL[idx].stage_index(),
                    in_channels,
                    config.stage_channels[idx],
                    config.concat_channels[idx],
                    config.blocks_per_stage[idx],
                    config.layers_per_block,
                    &config.cna,
                );
                in_channels = config.concat_channels[idx];
                stage
            })
            .collect();

        VoVNetStructureConfig::new(stem, stages, config.num_classes)
    }
}

/// [`VoVNet`] Structure Config.
///
/// This config defines the full module tree of a `VoVNet` model.
/// [`VoVNetStructureConfig::init`] validates the channel chaining
/// before construction.
#[derive(Config, Debug)]
pub struct VoVNetStructureConfig {
    /// The stem config.
    pub stem: VoVNetStemConfig,

    /// Stage configs; ``res2`` through ``res5``.
    pub stages: Vec<OsaStageConfig>,

    /// The number of classes.
    pub num_classes: usize,
}

impl VoVNetStructureConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.stages.len() != NUM_STAGES {
            return Err(format!(
                "VoVNet requires {} stages, found {}",
                NUM_STAGES,
                self.stages.len()
            ));
        }
        if self.num_classes == 0 {
            return Err("num_classes must be > 0".to_string());
        }
        self.stem.try_validate()?;

        let mut in_channels = self.stem.out_channels();
        for (key, stage) in FeatureKey::ALL.iter().zip(self.stages.iter()) {
            stage.try_validate().map_err(|err| format!("{key}: {err}"))?;
            if stage.in_channels() != in_channels {
                return Err(format!(
                    "{key}: in_channels({}) != previous out_channels({})",
                    stage.in_channels(),
                    in_channels,
                ));
            }
            in_channels = stage.out_channels();
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Channel count and stride of each output map.
    pub fn output_shape(&self) -> BTreeMap<String, ShapeSpec> {
        shape_specs(
            self.stem.stride(),
            self.stages.iter().map(|s| s as &dyn OsaStageMeta),
        )
    }

    /// Predicted ``[height, width]`` of each output map.
    pub fn feature_resolutions(
        &self,
        input_resolution: [usize; 2],
    ) -> BTreeMap<String, [usize; 2]> {
        let mut resolution = self.stem.output_resolution(input_resolution);
        FeatureKey::ALL
            .iter()
            .zip(self.stages.iter())
            .map(|(key, stage)| {
                resolution = stage.output_resolution(resolution);
                (key.to_string(), resolution)
            })
            .collect()
    }

    /// Initialize a [`VoVNet`] model.
    ///
    /// # Panics
    ///
    /// If the config is not valid.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> VoVNet<B> {
        self.expect_valid();

        tracing::debug!(
            stem_channels = self.stem.out_channels(),
            blocks = ?self.stages.iter().map(|s| s.len()).collect::<Vec<_>>(),
            num_classes = self.num_classes,
            "init VoVNet"
        );

        let head_channels = self.stages[NUM_STAGES - 1].out_channels();
        let [stage2, stage3, stage4, stage5] = match <[OsaStageConfig; NUM_STAGES]>::try_from(
            self.stages,
        ) {
            Ok(stages) => stages.map(|c| c.init(device)),
            Err(stages) => panic!("VoVNet requires {} stages, found {}", NUM_STAGES, stages.len()),
        };

        VoVNet {
            stem: self.stem.init(device),
            stage2,
            stage3,
            stage4,
            stage5,
            head_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            classifier: init_classifier(head_channels, self.num_classes, device),
        }
    }
}

/// Build a ``Linear`` classifier with a zero bias.
fn init_classifier<B: Backend>(
    d_input: usize,
    num_classes: usize,
    device: &B::Device,
) -> Linear<B> {
    let mut classifier = LinearConfig::new(d_input, num_classes).init(device);
    classifier.bias = classifier.bias.map(|bias| bias.map(|t| t.zeros_like()));
    classifier
}

fn shape_specs<'a, I>(
    stem_stride: usize,
    stages: I,
) -> BTreeMap<String, ShapeSpec>
where
    I: Iterator<Item = &'a dyn OsaStageMeta>,
{
    let mut stride = stem_stride;
    FeatureKey::ALL
        .iter()
        .zip(stages)
        .map(|(key, stage)| {
            stride *= stage.stride();
            (
                key.to_string(),
                ShapeSpec {
                    channels: stage.out_channels(),
                    stride,
                },
            )
        })
        .collect()
}

/// `VoVNet` backbone.
#[derive(Module, Debug)]
pub struct VoVNet<B: Backend> {
    /// Stem.
    pub stem: VoVNetStem<B>,

    /// Stage 2; ``res2``.
    pub stage2: OsaStage<B>,
    /// Stage 3; ``res3``.
    pub stage3: OsaStage<B>,
    /// Stage 4; ``res4``.
    pub stage4: OsaStage<B>,
    /// Stage 5; ``res5``.
    pub stage5: OsaStage<B>,

    /// Head pooling.
    pub head_pool: AdaptiveAvgPool2d,
    /// Head classifier.
    pub classifier: Linear<B>,
}

impl<B: Backend> VoVNet<B> {
    /// The stages, in order.
    pub fn stages(&self) -> [&OsaStage<B>; NUM_STAGES] {
        [&self.stage2, &self.stage3, &self.stage4, &self.stage5]
    }

    /// Number of input channels.
    pub fn in_channels(&self) -> usize {
        self.stem.in_channels()
    }

    /// Number of classifier classes.
    pub fn num_classes(&self) -> usize {
        self.classifier.weight.dims()[1]
    }

    /// Channel count and stride of each output map.
    pub fn output_shape(&self) -> BTreeMap<String, ShapeSpec> {
        let stem_stride: usize = [&self.stem.cna1, &self.stem.cna2, &self.stem.cna3]
            .iter()
            .map(|c| c.conv.stride[0])
            .product();
        shape_specs(
            stem_stride,
            self.stages().into_iter().map(|s| s as &dyn OsaStageMeta),
        )
    }

    /// Predicted ``[height, width]`` of each output map.
    pub fn feature_resolutions(
        &self,
        input_resolution: [usize; 2],
    ) -> BTreeMap<String, [usize; 2]> {
        let mut resolution = [&self.stem.cna1, &self.stem.cna2, &self.stem.cna3]
            .iter()
            .fold(input_resolution, |r, c| c.output_resolution(r));
        FeatureKey::ALL
            .iter()
            .zip(self.stages())
            .map(|(key, stage)| {
                resolution = stage.output_resolution(resolution);
                (key.to_string(), resolution)
            })
            .collect()
    }

    /// Feature forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// The ``res2`` through ``res5`` maps.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> FeatureMaps<B> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())]
        );

        let x = self.stem.forward(input);

        let res2 = self.stage2.forward(x);
        let res3 = self.stage3.forward(res2.clone());
        let res4 = self.stage4.forward(res3.clone());
        let res5 = self.stage5.forward(res4.clone());

        assert_shape_contract_periodically!(
            ["batch", "channels", "height", "width"],
            &res5,
            &[("batch", batch), ("channels", self.stage5.out_channels())]
        );

        FeatureMaps {
            res2,
            res3,
            res4,
            res5,
        }
    }

    /// Classifier forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits.
    pub fn forward_classifier(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let x = self.forward(input).res5;
        let x = self.head_pool.forward(x);
        // [B, C, 1, 1] -> [B, C]
        let x = x.flatten(1, 3);
        self.classifier.forward(x)
    }

    /// Re-initialize the classifier with the specified number of output classes.
    pub fn with_classes(
        mut self,
        num_classes: usize,
    ) -> Self {
        let [d_input, _d_output] = self.classifier.weight.dims();
        self.classifier =
            init_classifier(d_input, num_classes, &self.classifier.weight.device());
        self
    }

    /// Load ``torch`` weights from a ``.pth`` file.
    pub fn load_pytorch_weights(
        self,
        path: PathBuf,
    ) -> anyhow::Result<Self> {
        load_pytorch_weights(self, path)
    }
}
