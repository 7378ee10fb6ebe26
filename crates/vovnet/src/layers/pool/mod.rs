//! # Pooling Layers
pub mod max_pool_2d_ceil;
