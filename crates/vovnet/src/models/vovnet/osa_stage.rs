//! # OSA Stage
//!
//! An [`OsaStage`] is an optional 3x3/2 ceil-mode [`MaxPool2dCeil`]
//! followed by a chain of [`OsaModule`]s.
//!
//! The first module maps the stage input to ``concat_channels``;
//! every later module is an identity module over ``concat_channels``.

use crate::layers::blocks::cna::AbstractCNA2dConfig;
use crate::layers::pool::max_pool_2d_ceil::{MaxPool2dCeil, MaxPool2dCeilConfig};
use crate::models::vovnet::osa_module::{OsaModule, OsaModuleConfig, OsaModuleMeta};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// Stage index which runs at the stem resolution.
pub const UNPOOLED_STAGE_INDEX: usize = 2;

/// Between-stage pooling kernel size.
pub const STAGE_POOL_KERNEL: usize = 3;

/// Between-stage pooling stride.
pub const STAGE_POOL_STRIDE: usize = 2;

/// Build the between-stage pooling config.
pub fn stage_pool_config() -> MaxPool2dCeilConfig {
    MaxPool2dCeilConfig::new([STAGE_POOL_KERNEL, STAGE_POOL_KERNEL])
        .with_strides([STAGE_POOL_STRIDE, STAGE_POOL_STRIDE])
}

/// [`OsaStage`] Meta API.
pub trait OsaStageMeta {
    /// Number of modules in the stage.
    fn len(&self) -> usize;

    /// Check if the stage is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Does the stage begin with a pool?
    fn pooled(&self) -> bool;

    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Stage stride, relative to the stage input.
    fn stride(&self) -> usize {
        if self.pooled() { STAGE_POOL_STRIDE } else { 1 }
    }

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        if self.pooled() {
            stage_pool_config().output_resolution(input_resolution)
        } else {
            input_resolution
        }
    }
}

/// [`OsaStage`] Config.
#[derive(Config, Debug)]
pub struct OsaStageConfig {
    /// Begin the stage with a pool.
    #[config(default = "true")]
    pub pool: bool,

    /// Module configs.
    pub modules: Vec<OsaModuleConfig>,
}

impl OsaStageMeta for OsaStageConfig {
    fn len(&self) -> usize {
        self.modules.len()
    }

    fn pooled(&self) -> bool {
        self.pool
    }

    fn in_channels(&self) -> usize {
        self.modules[0].in_channels()
    }

    fn out_channels(&self) -> usize {
        self.modules[self.modules.len() - 1].out_channels()
    }
}

impl OsaStageConfig {
    /// Build a stage config from a row of the width/depth tables.
    ///
    /// # Arguments
    ///
    /// - `stage_index`: the stage number, ``2..=5``; stage 2 is not pooled.
    /// - `in_channels`: the stage input channels.
    /// - `stage_channels`: inner 3x3 width.
    /// - `concat_channels`: aggregation width; the stage output channels.
    /// - `blocks`: number of modules.
    /// - `layers_per_block`: inner 3x3 units per module.
    /// - `cna`: the norm / activation policy.
    pub fn build(
        stage_index: usize,
        in_channels: usize,
        stage_channels: usize,
        concat_channels: usize,
        blocks: usize,
        layers_per_block: usize,
        cna: &AbstractCNA2dConfig,
    ) -> Self {
        let modules = (0..blocks)
            .map(|idx| {
                let (in_channels, identity) = if idx == 0 {
                    (in_channels, false)
                } else {
                    (concat_channels, true)
                };
                OsaModuleConfig::new(in_channels, stage_channels, concat_channels, layers_per_block)
                    .with_identity(identity)
                    .with_cna(cna.clone())
            })
            .collect();

        Self::new(modules).with_pool(stage_index != UNPOOLED_STAGE_INDEX)
    }

    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.modules.is_empty() {
            return Err("OsaStage must have at least one module".to_string());
        }
        for (idx, module) in self.modules.iter().enumerate() {
            module
                .try_validate()
                .map_err(|err| format!("OsaStage module {idx}: {err}"))?;
        }
        for (idx, pair) in self.modules.windows(2).enumerate() {
            if pair[0].out_channels() != pair[1].in_channels() {
                return Err(format!(
                    "OsaStage module {} out_channels({}) != module {} in_channels({})",
                    idx,
                    pair[0].out_channels(),
                    idx + 1,
                    pair[1].in_channels(),
                ));
            }
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// Initialize a new [`OsaStage`].
    ///
    /// # Panics
    ///
    /// If the config is not valid.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> OsaStage<B> {
        self.expect_valid();

        OsaStage {
            pool: self.pool.then(|| stage_pool_config().init()),
            modules: self
                .modules
                .into_iter()
                .map(|config| config.init(device))
                .collect(),
        }
    }
}

/// OSA Stage.
///
/// Implements [`OsaStageMeta`].
#[derive(Module, Debug)]
pub struct OsaStage<B: Backend> {
    /// Optional leading pool.
    pub pool: Option<MaxPool2dCeil>,

    /// Chained modules.
    pub modules: Vec<OsaModule<B>>,
}

impl<B: Backend> OsaStageMeta for OsaStage<B> {
    fn len(&self) -> usize {
        self.modules.len()
    }

    fn pooled(&self) -> bool {
        self.pool.is_some()
    }

    fn in_channels(&self) -> usize {
        self.modules[0].in_channels()
    }

    fn out_channels(&self) -> usize {
        self.modules[self.modules.len() - 1].out_channels()
    }
}

impl<B: Backend> OsaStage<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = match &self.pool {
            Some(pool) => pool.forward(input),
            None => input,
        };
        self.modules
            .iter()
            .fold(x, |x, module| module.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;
    use hamcrest::prelude::*;

    type B = NdArray<f32>;

    #[test]
    fn test_build() {
        let cna = AbstractCNA2dConfig::default();

        let config = OsaStageConfig::build(4, 512, 192, 768, 2, 5, &cna);
        config.expect_valid();

        assert_eq!(config.len(), 2);
        assert!(config.pooled());
        assert_eq!(config.stride(), 2);
        assert_eq!(config.in_channels(), 512);
        assert_eq!(config.out_channels(), 768);
        assert_eq!(config.output_resolution([28, 28]), [14, 14]);

        assert!(!config.modules[0].identity);
        assert_eq!(config.modules[0].aggregate_channels(), 512 + 5 * 192);
        assert!(config.modules[1].identity);
        assert_eq!(config.modules[1].in_channels, 768);
        assert_eq!(config.modules[1].aggregate_channels(), 768 + 5 * 192);

        let config = OsaStageConfig::build(2, 128, 128, 256, 1, 5, &cna);
        assert!(!config.pooled());
        assert_eq!(config.stride(), 1);
        assert_eq!(config.output_resolution([56, 56]), [56, 56]);
    }

    #[test]
    fn test_try_validate() {
        let err = OsaStageConfig::new(vec![]).try_validate().unwrap_err();
        assert_that!(err.as_str(), is(equal_to("OsaStage must have at least one module")));

        let config = OsaStageConfig::new(vec![
            OsaModuleConfig::new(8, 4, 16, 2),
            OsaModuleConfig::new(12, 4, 16, 2),
        ]);
        let err = config.try_validate().unwrap_err();
        assert_that!(
            err.as_str(),
            is(equal_to("OsaStage module 0 out_channels(16) != module 1 in_channels(12)"))
        );

        let config = OsaStageConfig::new(vec![
            OsaModuleConfig::new(8, 4, 16, 2),
            OsaModuleConfig::new(16, 4, 12, 2).with_identity(true),
        ]);
        let err = config.try_validate().unwrap_err();
        assert_that!(err.starts_with("OsaStage module 1: identity module"), is(true));
    }

    #[test]
    fn test_stage_forward() {
        let device = Default::default();
        let cna = AbstractCNA2dConfig::default();

        let stage: OsaStage<B> = OsaStageConfig::build(3, 8, 4, 12, 2, 2, &cna).init(&device);
        assert_eq!(stage.len(), 2);
        assert!(stage.pooled());
        assert_eq!(stage.in_channels(), 8);
        assert_eq!(stage.out_channels(), 12);
        assert!(!stage.modules[0].identity());
        assert!(stage.modules[1].identity());

        let batch_size = 2;
        let input = Tensor::random([batch_size, 8, 9, 8], Distribution::Default, &device);
        let output = stage.forward(input.clone());

        let [out_height, out_width] = stage.output_resolution([9, 8]);
        assert_eq!([out_height, out_width], [4, 4]);
        assert_shape_contract!(
            ["batch", "channels", "height", "width"],
            &output,
            &[
                ("batch", batch_size),
                ("channels", 12),
                ("height", out_height),
                ("width", out_width)
            ],
        );

        let expected = {
            let x = stage.pool.as_ref().unwrap().forward(input);
            let x = stage.modules[0].forward(x);
            stage.modules[1].forward(x)
        };
        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_unpooled_stage_keeps_resolution() {
        let device = Default::default();
        let cna = AbstractCNA2dConfig::default();

        let stage: OsaStage<B> = OsaStageConfig::build(2, 6, 4, 8, 1, 3, &cna).init(&device);
        assert!(stage.pool.is_none());

        let output = stage.forward(Tensor::random([1, 6, 7, 5], Distribution::Default, &device));
        assert_eq!(output.dims(), [1, 8, 7, 5]);
    }
}
