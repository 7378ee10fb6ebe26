//! # `VoVNet` Weight I/O
//!
//! Loading of published ``torch`` state dicts onto [`super::VoVNet`] models.
pub mod pytorch_stubs;
