//! # One-Shot Aggregation Module
//!
//! An [`OsaModule`] is a chain of ``layers_per_block`` 3x3 [`CNA2d`] units.
//! The module input and every intermediate map are concatenated once,
//! along the channel axis, and reduced by a single 1x1 [`CNA2d`]:
//!
//! ```text
//! x_0 = input
//! x_i = cna_i(x_{i-1})                        i = 1..=L
//! y   = concat(cat[x_0, x_1, ..., x_L], dim=1)
//! y   = y + input                             (identity mode)
//! ```
//!
//! [`OsaModuleMeta`] defines a common meta API for [`OsaModule`]
//! and [`OsaModuleConfig`].

use crate::layers::blocks::cna::{AbstractCNA2dConfig, CNA2d, CNA2dMeta, LayerSpec};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// [`OsaModule`] Meta API.
pub trait OsaModuleMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Output channels of each inner 3x3 unit.
    fn stage_channels(&self) -> usize;

    /// Output channels of the 1x1 aggregation unit.
    fn concat_channels(&self) -> usize;

    /// Number of inner 3x3 units.
    fn layers_per_block(&self) -> usize;

    /// Whether the input is added to the output.
    fn identity(&self) -> bool;

    /// Number of channels entering the aggregation unit.
    ///
    /// ``in_channels + layers_per_block * stage_channels``
    fn aggregate_channels(&self) -> usize {
        self.in_channels() + self.layers_per_block() * self.stage_channels()
    }

    /// Number of output channels.
    fn out_channels(&self) -> usize {
        self.concat_channels()
    }
}

/// [`OsaModule`] Configuration.
#[derive(Config, Debug)]
pub struct OsaModuleConfig {
    /// Number of input channels.
    pub in_channels: usize,

    /// Output channels of each inner 3x3 unit.
    pub stage_channels: usize,

    /// Output channels of the 1x1 aggregation unit.
    pub concat_channels: usize,

    /// Number of inner 3x3 units.
    pub layers_per_block: usize,

    /// Add the input to the output.
    ///
    /// Requires ``in_channels == concat_channels``.
    #[config(default = "false")]
    pub identity: bool,

    /// Norm / activation policy for every unit.
    #[config(default = "AbstractCNA2dConfig::default()")]
    pub cna: AbstractCNA2dConfig,
}

impl OsaModuleMeta for OsaModuleConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn stage_channels(&self) -> usize {
        self.stage_channels
    }

    fn concat_channels(&self) -> usize {
        self.concat_channels
    }

    fn layers_per_block(&self) -> usize {
        self.layers_per_block
    }

    fn identity(&self) -> bool {
        self.identity
    }
}

impl OsaModuleConfig {
    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.layers_per_block == 0 {
            return Err("layers_per_block must be > 0".to_string());
        }
        if self.in_channels == 0 || self.stage_channels == 0 || self.concat_channels == 0 {
            return Err(format!(
                "channel counts must be > 0: in_channels={}, stage_channels={}, concat_channels={}",
                self.in_channels, self.stage_channels, self.concat_channels,
            ));
        }
        if self.identity && self.in_channels != self.concat_channels {
            return Err(format!(
                "identity module requires in_channels({}) == concat_channels({})",
                self.in_channels, self.concat_channels,
            ));
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        if let Err(err) = self.try_validate() {
            panic!("{}", err);
        }
    }

    /// The [`LayerSpec`]s of the inner 3x3 chain.
    pub fn layer_specs(&self) -> Vec<LayerSpec> {
        (0..self.layers_per_block)
            .map(|idx| {
                let in_channels = if idx == 0 {
                    self.in_channels
                } else {
                    self.stage_channels
                };
                LayerSpec::conv3x3(in_channels, self.stage_channels, 1)
            })
            .collect()
    }

    /// The [`LayerSpec`] of the 1x1 aggregation unit.
    pub fn concat_spec(&self) -> LayerSpec {
        LayerSpec::conv1x1(self.aggregate_channels(), self.concat_channels)
    }

    /// Initialize a new [`OsaModule`].
    ///
    /// # Panics
    ///
    /// If the config is not valid.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> OsaModule<B> {
        self.expect_valid();

        OsaModule {
            layers: self
                .layer_specs()
                .iter()
                .map(|spec| self.cna.build(spec).init(device))
                .collect(),
            concat: self.cna.build(&self.concat_spec()).init(device),
            identity: self.identity,
        }
    }
}

/// One-Shot Aggregation module.
///
/// Implements [`OsaModuleMeta`].
#[derive(Module, Debug)]
pub struct OsaModule<B: Backend> {
    /// Inner 3x3 chain.
    pub layers: Vec<CNA2d<B>>,

    /// 1x1 aggregation unit.
    pub concat: CNA2d<B>,

    /// Add the input to the output.
    pub identity: bool,
}

impl<B: Backend> OsaModuleMeta for OsaModule<B> {
    fn in_channels(&self) -> usize {
        self.layers[0].in_channels()
    }

    fn stage_channels(&self) -> usize {
        self.layers[0].out_channels()
    }

    fn concat_channels(&self) -> usize {
        self.concat.out_channels()
    }

    fn layers_per_block(&self) -> usize {
        self.layers.len()
    }

    fn identity(&self) -> bool {
        self.identity
    }
}

impl<B: Backend> OsaModule<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, concat_channels, height, width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch", "height", "width"],
            &[("in_channels", self.in_channels())]
        );

        let residual = self.identity.then(|| input.clone());

        let mut features = Vec::with_capacity(self.layers.len() + 1);
        features.push(input.clone());
        let mut x = input;
        for layer in &self.layers {
            x = layer.forward(x);
            features.push(x.clone());
        }

        let x = Tensor::cat(features, 1);

        assert_shape_contract_periodically!(
            ["batch", "aggregate_channels", "height", "width"],
            &x,
            &[
                ("batch", batch),
                ("aggregate_channels", self.aggregate_channels()),
                ("height", height),
                ("width", width)
            ]
        );

        let x = self.concat.forward(x);

        let x = match residual {
            Some(residual) => x + residual,
            None => x,
        };

        assert_shape_contract_periodically!(
            ["batch", "concat_channels", "height", "width"],
            &x,
            &[
                ("batch", batch),
                ("concat_channels", self.concat_channels()),
                ("height", height),
                ("width", width)
            ]
        );

        x
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
    fn test_config_meta() {
        let config = OsaModuleConfig::new(128, 128, 256, 5);
        config.expect_valid();

        assert_eq!(config.in_channels(), 128);
        assert_eq!(config.stage_channels(), 128);
        assert_eq!(config.concat_channels(), 256);
        assert_eq!(config.out_channels(), 256);
        assert_eq!(config.layers_per_block(), 5);
        assert!(!config.identity());
        assert_eq!(config.aggregate_channels(), 128 + 5 * 128);

        let specs = config.layer_specs();
        assert_that!(specs.len(), is(equal_to(5)));
        assert_eq!(specs[0].in_channels, 128);
        assert_eq!(specs[1].in_channels, 128);
        assert!(specs.iter().all(|s| s.kernel_size == 3 && s.stride == 1));

        let concat = config.concat_spec();
        assert_eq!(concat.in_channels, 768);
        assert_eq!(concat.out_channels, 256);
        assert_eq!(concat.kernel_size, 1);
    }

    #[test]
    fn test_try_validate() {
        assert!(
            OsaModuleConfig::new(256, 160, 256, 5)
                .with_identity(true)
                .try_validate()
                .is_ok()
        );

        let err = OsaModuleConfig::new(128, 160, 256, 5)
            .with_identity(true)
            .try_validate()
            .unwrap_err();
        assert_that!(err.contains("in_channels(128) == concat_channels(256)"), is(true));

        assert!(OsaModuleConfig::new(128, 160, 256, 0).try_validate().is_err());
        assert!(OsaModuleConfig::new(128, 0, 256, 5).try_validate().is_err());
    }

    #[test]
    #[should_panic(expected = "identity module requires in_channels(8) == concat_channels(16)")]
    fn test_identity_mismatch_fails_init() {
        let device = Default::default();
        let _module: OsaModule<B> = OsaModuleConfig::new(8, 4, 16, 2)
            .with_identity(true)
            .init(&device);
    }

    #[test]
    fn test_module() {
        let device = Default::default();

        let config = OsaModuleConfig::new(6, 4, 10, 3);
        let module: OsaModule<B> = config.init(&device);

        assert_eq!(module.in_channels(), 6);
        assert_eq!(module.stage_channels(), 4);
        assert_eq!(module.concat_channels(), 10);
        assert_eq!(module.layers_per_block(), 3);
        assert_eq!(module.aggregate_channels(), 18);
        assert_eq!(module.concat.in_channels(), 18);
        assert!(!module.identity());

        let batch_size = 2;
        let input = Tensor::random([batch_size, 6, 7, 5], Distribution::Default, &device);

        let output = module.forward(input.clone());
        assert_shape_contract!(
            ["batch", "out_channels", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_channels", 10),
                ("out_height", 7),
                ("out_width", 5)
            ],
        );

        let expected = {
            let x1 = module.layers[0].forward(input.clone());
            let x2 = module.layers[1].forward(x1.clone());
            let x3 = module.layers[2].forward(x2.clone());
            module
                .concat
                .forward(Tensor::cat(vec![input.clone(), x1, x2, x3], 1))
        };
        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_identity_module() {
        let device = Default::default();

        let module: OsaModule<B> = OsaModuleConfig::new(8, 4, 8, 2)
            .with_identity(true)
            .init(&device);
        assert!(module.identity());

        let input = Tensor::random([1, 8, 6, 6], Distribution::Default, &device);
        let output = module.forward(input.clone());
        assert_eq!(output.dims(), [1, 8, 6, 6]);

        let expected = {
            let x1 = module.layers[0].forward(input.clone());
            let x2 = module.layers[1].forward(x1.clone());
            module
                .concat
                .forward(Tensor::cat(vec![input.clone(), x1, x2], 1))
                + input
        };
        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    #[should_panic]
    fn test_forward_rejects_wrong_channels() {
        let device = Default::default();
        let module: OsaModule<B> = OsaModuleConfig::new(8, 4, 8, 2).init(&device);
        module.forward(Tensor::zeros([1, 6, 4, 4], &device));
    }
}
