//! # `VoVNet` Stem
//!
//! Three 3x3 [`CNA2d`] units; the first and last have stride 2,
//! so the stem output is at 1/4 of the input resolution:
//!
//! ```text,ignore
//!   cna1: in_channels    -> stem_channels[0], stride 2
//!   cna2: stem_channels[0] -> stem_channels[1], stride 1
//!   cna3: stem_channels[1] -> stem_channels[2], stride 2
//! ```

use crate::layers::blocks::cna::{AbstractCNA2dConfig, CNA2d, CNA2dConfig, CNA2dMeta, LayerSpec};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

/// Per-unit strides of the stem.
pub const STEM_STRIDES: [usize; 3] = [2, 1, 2];

/// [`VoVNetStem`] Config.
#[derive(Config, Debug)]
pub struct VoVNetStemConfig {
    /// The first unit.
    pub cna1: CNA2dConfig,

    /// The second unit.
    pub cna2: CNA2dConfig,

    /// The third unit.
    pub cna3: CNA2dConfig,
}

impl VoVNetStemConfig {
    /// Build a stem from channel widths and a norm / activation policy.
    pub fn build(
        in_channels: usize,
        stem_channels: [usize; 3],
        cna: &AbstractCNA2dConfig,
    ) -> Self {
        let [c1, c2, c3] = stem_channels;
        let [s1, s2, s3] = STEM_STRIDES;
        Self::new(
            cna.build(&LayerSpec::conv3x3(in_channels, c1, s1)),
            cna.build(&LayerSpec::conv3x3(c1, c2, s2)),
            cna.build(&LayerSpec::conv3x3(c2, c3, s3)),
        )
    }

    /// Number of input channels.
    pub fn in_channels(&self) -> usize {
        self.cna1.in_channels()
    }

    /// Number of output channels.
    pub fn out_channels(&self) -> usize {
        self.cna3.out_channels()
    }

    /// Total stem stride.
    pub fn stride(&self) -> usize {
        [&self.cna1, &self.cna2, &self.cna3]
            .iter()
            .map(|c| c.stride()[0])
            .product()
    }

    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        let units = [&self.cna1, &self.cna2, &self.cna3];
        for (idx, pair) in units.windows(2).enumerate() {
            if pair[0].out_channels() != pair[1].in_channels() {
                return Err(format!(
                    "stem cna{} out_channels({}) != cna{} in_channels({})",
                    idx + 1,
                    pair[0].out_channels(),
                    idx + 2,
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

    /// Get the output resolution for a given input resolution.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        let x = self.cna1.output_resolution(input_resolution);
        let x = self.cna2.output_resolution(x);
        self.cna3.output_resolution(x)
    }

    /// Initialize a [`VoVNetStem`].
    ///
    /// # Panics
    ///
    /// If the config is not valid.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> VoVNetStem<B> {
        self.expect_valid();
        VoVNetStem {
            cna1: self.cna1.init(device),
            cna2: self.cna2.init(device),
            cna3: self.cna3.init(device),
        }
    }
}

/// `VoVNet` stem.
#[derive(Module, Debug)]
pub struct VoVNetStem<B: Backend> {
    /// The first unit.
    pub cna1: CNA2d<B>,
    /// The second unit.
    pub cna2: CNA2d<B>,
    /// The third unit.
    pub cna3: CNA2d<B>,
}

impl<B: Backend> VoVNetStem<B> {
    /// Number of input channels.
    pub fn in_channels(&self) -> usize {
        self.cna1.in_channels()
    }

    /// Number of output channels.
    pub fn out_channels(&self) -> usize {
        self.cna3.out_channels()
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())]
        );

        let x = self.cna1.forward(input);
        let x = self.cna2.forward(x);
        let x = self.cna3.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[("batch", batch), ("out_channels", self.out_channels())]
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_build() {
        let config = VoVNetStemConfig::build(3, [64, 64, 128], &AbstractCNA2dConfig::default());
        config.expect_valid();

        assert_eq!(config.in_channels(), 3);
        assert_eq!(config.out_channels(), 128);
        assert_eq!(config.stride(), 4);

        assert_eq!(config.cna1.conv.channels, [3, 64]);
        assert_eq!(config.cna1.conv.stride, [2, 2]);
        assert_eq!(config.cna2.conv.channels, [64, 64]);
        assert_eq!(config.cna2.conv.stride, [1, 1]);
        assert_eq!(config.cna3.conv.channels, [64, 128]);
        assert_eq!(config.cna3.conv.stride, [2, 2]);

        assert_eq!(config.output_resolution([224, 224]), [56, 56]);
        assert_eq!(config.output_resolution([225, 100]), [57, 25]);
    }

    #[test]
    fn test_try_validate() {
        let cna = AbstractCNA2dConfig::default();
        let config = VoVNetStemConfig::new(
            cna.build(&LayerSpec::conv3x3(3, 8, 2)),
            cna.build(&LayerSpec::conv3x3(6, 8, 1)),
            cna.build(&LayerSpec::conv3x3(8, 16, 2)),
        );
        assert_eq!(
            config.try_validate(),
            Err("stem cna1 out_channels(8) != cna2 in_channels(6)".to_string())
        );
    }

    #[test]
    fn test_forward() {
        let device = Default::default();
        let config = VoVNetStemConfig::build(3, [4, 4, 8], &AbstractCNA2dConfig::default());
        let expected_resolution = config.output_resolution([32, 20]);

        let stem: VoVNetStem<B> = config.init(&device);
        assert_eq!(stem.in_channels(), 3);
        assert_eq!(stem.out_channels(), 8);

        let input = Tensor::random([2, 3, 32, 20], Distribution::Default, &device);
        let output = stem.forward(input.clone());
        assert_eq!(expected_resolution, [8, 5]);
        assert_eq!(output.dims(), [2, 8, 8, 5]);

        let expected = stem
            .cna3
            .forward(stem.cna2.forward(stem.cna1.forward(input)));
        output.to_data().assert_eq(&expected.to_data(), true);
    }
}
