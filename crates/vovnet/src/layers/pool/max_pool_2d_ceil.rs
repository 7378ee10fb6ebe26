//! # `MaxPool2dCeil`
//!
//! Max pooling with ``ceil_mode=True`` output sizing.
//!
//! ``burn``'s [`MaxPool2d`] only rounds the output size down.
//! [`MaxPool2dCeil`] pads the bottom/right edges of the input with ``-inf``
//! until the trailing partial window is complete, then pools with no padding.
//! Every window starts inside the input, so the padding never wins a max.

use crate::compat::conv_shape::expect_pool1d_output_size;
use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// [`MaxPool2dCeil`] Config.
#[derive(Config, Debug)]
pub struct MaxPool2dCeilConfig {
    /// The size of the kernel.
    pub kernel_size: [usize; 2],

    /// The strides.
    #[config(default = "[1, 1]")]
    pub strides: [usize; 2],
}

impl MaxPool2dCeilConfig {
    /// Initialize a [`MaxPool2dCeil`].
    pub fn init(&self) -> MaxPool2dCeil {
        MaxPool2dCeil {
            kernel_size: self.kernel_size,
            stride: self.strides,
            pool: MaxPool2dConfig::new(self.kernel_size)
                .with_strides(self.strides)
                .with_padding(PaddingConfig2d::Valid)
                .init(),
        }
    }

    /// Get the output resolution for a given input resolution.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        ceil_output_resolution(input_resolution, self.kernel_size, self.strides)
    }
}

/// Ceil-mode 2d max pooling.
#[derive(Module, Clone, Debug)]
pub struct MaxPool2dCeil {
    /// The size of the kernel.
    pub kernel_size: [usize; 2],

    /// The strides.
    pub stride: [usize; 2],

    pool: MaxPool2d,
}

impl MaxPool2dCeil {
    /// Get the output resolution for a given input resolution.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        ceil_output_resolution(input_resolution, self.kernel_size, self.stride)
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, channels, ceil((in_height - k) / s) + 1, ceil((in_width - k) / s) + 1]``
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [_, _, in_height, in_width] = input.dims();
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let pad_h =
            ((out_height - 1) * self.stride[0] + self.kernel_size[0]).saturating_sub(in_height);
        let pad_w =
            ((out_width - 1) * self.stride[1] + self.kernel_size[1]).saturating_sub(in_width);

        let x = if pad_h > 0 || pad_w > 0 {
            input.pad((0, pad_w, 0, pad_h), f32::NEG_INFINITY)
        } else {
            input
        };

        self.pool.forward(x)
    }
}

fn ceil_output_resolution(
    input_resolution: [usize; 2],
    kernel_size: [usize; 2],
    stride: [usize; 2],
) -> [usize; 2] {
    [0, 1].map(|i| {
        expect_pool1d_output_size(input_resolution[i], kernel_size[i], stride[i], 0, 1, true)
    })
}
