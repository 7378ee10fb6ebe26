//! # Convolution Shape Utilities
//!
//! Utilities for computing the output shape of convolution and pooling operations
//! without running them.

use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;

/// Predict the output size of a 1D convolution operation.
///
/// ```text
/// out_size = floor( ((in_size + 2*padding - dilation*(kernel_size-1) - 1) / stride) + 1 )
/// ```
///
/// # Reference
///
/// - [conv_arithmetic diagram](https://github.com/vdumoulin/conv_arithmetic/blob/master/README.md)
///   visual explanations of these convolution parameters.
/// - [pytorch conv1d](https://docs.pytorch.org/docs/stable/generated/torch.nn.Conv1d.html)
///
/// # Arguments
///
/// - `input_size`: The input dimension size, must be > 0.
/// - `kernel_size`: The kernel size, must be > 0.
/// - `stride`: The stride of the convolution, must be > 0.
/// - `padding`: The padding of the convolution, added evenly to all sides of the input.
/// - `dilation`: The dilation of the convolution, must be > 0.
///
/// # Returns
///
/// An `Option<usize>` representing the output size; or `None` for <= 0.
pub fn maybe_conv1d_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> Option<usize> {
    maybe_pool1d_output_size(input_size, kernel_size, stride, padding, dilation, false)
}

/// Predict the output size of a 1D convolution operation.
///
/// This is the ``panic``-ing variant of [`maybe_conv1d_output_size`].
///
/// # Panics
///
/// If the output size would be <= 0.
pub fn expect_conv1d_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> usize {
    match maybe_conv1d_output_size(input_size, kernel_size, stride, padding, dilation) {
        Some(size) => size,
        None => panic!(
            "conv1d output size <= 0: input_size={input_size}, kernel_size={kernel_size}, stride={stride}, padding={padding}, dilation={dilation}"
        ),
    }
}

/// Predict the output size of a 1D pooling window operation.
///
/// Floor mode matches [`maybe_conv1d_output_size`]; ceil mode rounds the
/// window count up, but never starts a window inside the right padding:
///
/// ```text
/// out_size = ceil( (in_size + 2*padding - dilation*(kernel_size-1) - 1) / stride ) + 1
/// if (out_size - 1) * stride >= in_size + padding { out_size -= 1 }
/// ```
///
/// # Arguments
///
/// - `input_size`: The input dimension size, must be > 0.
/// - `kernel_size`: The kernel size, must be > 0.
/// - `stride`: The stride of the window, must be > 0.
/// - `padding`: The padding, added evenly to all sides of the input.
/// - `dilation`: The dilation of the window, must be > 0.
/// - `ceil_mode`: round the output size up rather than down.
///
/// # Returns
///
/// An `Option<usize>` representing the output size; or `None` for <= 0.
pub fn maybe_pool1d_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
    ceil_mode: bool,
) -> Option<usize> {
    assert!(input_size > 0);
    assert!(kernel_size > 0);
    assert!(stride > 0);
    assert!(dilation > 0);

    let effective_size = input_size + 2 * padding;
    let kernel_width = 1 + dilation * (kernel_size - 1);

    let span = if ceil_mode {
        effective_size + stride - 1
    } else {
        effective_size
    };
    if span < kernel_width {
        return None;
    }

    let mut size = (span - kernel_width) / stride + 1;
    if ceil_mode && (size - 1) * stride >= input_size + padding {
        size -= 1;
    }

    if size < 1 { None } else { Some(size) }
}

/// Predict the output size of a 1D pooling window operation.
///
/// This is the ``panic``-ing variant of [`maybe_pool1d_output_size`].
///
/// # Panics
///
/// If the output size would be <= 0.
pub fn expect_pool1d_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
    ceil_mode: bool,
) -> usize {
    match maybe_pool1d_output_size(
        input_size,
        kernel_size,
        stride,
        padding,
        dilation,
        ceil_mode,
    ) {
        Some(size) => size,
        None => panic!(
            "pool1d output size <= 0: input_size={input_size}, kernel_size={kernel_size}, stride={stride}, padding={padding}, dilation={dilation}, ceil_mode={ceil_mode}"
        ),
    }
}

/// Predict the ``[height, width]`` output of a [`Conv2dConfig`].
///
/// # Panics
///
/// If either output dimension would be <= 0,
/// or if the config uses asymmetric explicit padding.
pub fn expect_conv2d_output_resolution(
    input_resolution: [usize; 2],
    conv: &Conv2dConfig,
) -> [usize; 2] {
    let padding = match &conv.padding {
        PaddingConfig2d::Valid => [0, 0],
        PaddingConfig2d::Explicit(height, width) => [*height, *width],
        PaddingConfig2d::Same => {
            return [0, 1].map(|i| input_resolution[i].div_ceil(conv.stride[i]));
        }
    };

    [0, 1].map(|i| {
        expect_conv1d_output_size(
            input_resolution[i],
            conv.kernel_size[i],
            conv.stride[i],
            padding[i],
            conv.dilation[i],
        )
    })
}
