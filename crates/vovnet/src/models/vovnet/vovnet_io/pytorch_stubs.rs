#![allow(missing_docs)]
//! # `VoVNet` ``torch`` Stubs.
//!
//! The weights are loaded into stub modules built only from ``Conv2d``,
//! ``BatchNorm`` and ``Linear`` layers, then copied onto the target model.
//! There is insufficient information in loaded weights to derive the
//! stateless parts of a [`VoVNet`] (activations, pooling, norm kind).
//!
//! ``torch`` keys are remapped onto the stub tree:
//!
//! ```text,ignore
//! module.stem.stem_1/conv.weight
//!   -> stem.cna1.conv.weight
//! stage3.OSA3_1.layers.2.OSA3_1_2/norm.running_mean
//!   -> stage3.modules.0.layers.2.norm.running_mean
//! stage4.OSA4_2.concat.OSA4_2_concat/conv.weight
//!   -> stage4.modules.1.concat.conv.weight
//! ```
use crate::compat::normalization_wrapper::Normalization;
use crate::layers::blocks::cna::CNA2d;
use crate::models::vovnet::osa_module::OsaModule;
use crate::models::vovnet::osa_stage::OsaStage;
use crate::models::vovnet::stem::VoVNetStem;
use crate::models::vovnet::vovnet_model::VoVNet;
use anyhow::bail;
use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::nn::{BatchNorm, Linear};
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, Recorder};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::PathBuf;

/// Largest number of modules in a published stage.
const MAX_STAGE_MODULES: usize = 9;

/// The ``(pattern, replacement)`` key remaps, applied in order.
pub fn vovnet_key_remaps() -> Vec<(String, String)> {
    let mut remaps = vec![
        (r"^module\.".to_string(), "".to_string()),
        (r"^stem\.stem_(\d)/".to_string(), "stem.cna$1.".to_string()),
        (
            r"\.layers\.(\d+)\.OSA\d_\d+_\d+/".to_string(),
            ".layers.$1.".to_string(),
        ),
        (
            r"\.concat\.OSA\d_\d+_concat/".to_string(),
            ".concat.".to_string(),
        ),
    ];
    remaps.extend((1..=MAX_STAGE_MODULES).map(|idx| {
        (
            format!(r"\.OSA\d_{idx}\."),
            format!(".modules.{}.", idx - 1),
        )
    }));
    remaps
}

/// Load weights from ``torch`` weights path onto a [`VoVNet`] model.
///
/// The target must use ``BatchNorm`` normalization, and its classifier
/// must match the stored number of classes.
pub fn load_pytorch_weights<B: Backend>(
    vovnet: VoVNet<B>,
    path: PathBuf,
) -> anyhow::Result<VoVNet<B>> {
    let Some(device) = vovnet.devices().first().cloned() else {
        bail!("VoVNet model has no device");
    };
    let record = load_vovnet_stub_record::<B>(path, &device)?;
    record.copy_weights(vovnet)
}

/// Load a [`VoVNetStubRecord`] from ``torch`` weights path.
pub fn load_vovnet_stub_record<B: Backend>(
    path: PathBuf,
    device: &B::Device,
) -> anyhow::Result<VoVNetStubRecord<B>> {
    tracing::info!(path = %path.display(), "loading VoVNet torch weights");

    let load_args = vovnet_key_remaps()
        .into_iter()
        .fold(LoadArgs::new(path), |args, (pattern, replacement)| {
            args.with_key_remap(&pattern, &replacement)
        });

    let record = PyTorchFileRecorder::<FullPrecisionSettings>::new().load(load_args, device)?;

    Ok(record)
}

#[derive(Module, Debug)]
pub struct CnaStub<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNorm<B, 2>,
}

impl<B: Backend> CnaStubRecord<B> {
    pub fn copy_weights(
        self,
        target: CNA2d<B>,
    ) -> anyhow::Result<CNA2d<B>> {
        match target.norm {
            Normalization::Batch(norm) => Ok(CNA2d {
                conv: target.conv.load_record(self.conv),
                norm: norm.load_record(self.norm).into(),
                ..target
            }),
            norm => bail!("BatchNorm stub cannot be applied to {:?}", norm),
        }
    }
}

#[derive(Module, Debug)]
pub struct StemStub<B: Backend> {
    pub cna1: CnaStub<B>,
    pub cna2: CnaStub<B>,
    pub cna3: CnaStub<B>,
}

impl<B: Backend> StemStubRecord<B> {
    pub fn copy_weights(
        self,
        target: VoVNetStem<B>,
    ) -> anyhow::Result<VoVNetStem<B>> {
        Ok(VoVNetStem {
            cna1: self.cna1.copy_weights(target.cna1)?,
            cna2: self.cna2.copy_weights(target.cna2)?,
            cna3: self.cna3.copy_weights(target.cna3)?,
        })
    }
}

#[derive(Module, Debug)]
pub struct OsaModuleStub<B: Backend> {
    pub layers: Vec<CnaStub<B>>,
    pub concat: CnaStub<B>,
}

impl<B: Backend> OsaModuleStubRecord<B> {
    pub fn copy_weights(
        self,
        target: OsaModule<B>,
    ) -> anyhow::Result<OsaModule<B>> {
        if self.layers.len() != target.layers.len() {
            bail!(
                "OsaModule stub has {} layers, target has {}",
                self.layers.len(),
                target.layers.len()
            );
        }
        Ok(OsaModule {
            layers: self
                .layers
                .into_iter()
                .zip(target.layers)
                .map(|(s, t)| s.copy_weights(t))
                .collect::<anyhow::Result<Vec<_>>>()?,
            concat: self.concat.copy_weights(target.concat)?,
            identity: target.identity,
        })
    }
}

#[derive(Module, Debug)]
pub struct OsaStageStub<B: Backend> {
    pub modules: Vec<OsaModuleStub<B>>,
}

impl<B: Backend> OsaStageStubRecord<B> {
    pub fn copy_weights(
        self,
        target: OsaStage<B>,
    ) -> anyhow::Result<OsaStage<B>> {
        if self.modules.len() != target.modules.len() {
            bail!(
                "OsaStage stub has {} modules, target has {}",
                self.modules.len(),
                target.modules.len()
            );
        }
        Ok(OsaStage {
            modules: self
                .modules
                .into_iter()
                .zip(target.modules)
                .map(|(s, t)| s.copy_weights(t))
                .collect::<anyhow::Result<Vec<_>>>()?,
            pool: target.pool,
        })
    }
}

#[derive(Module, Debug)]
pub struct VoVNetStub<B: Backend> {
    pub stem: StemStub<B>,
    pub stage2: OsaStageStub<B>,
    pub stage3: OsaStageStub<B>,
    pub stage4: OsaStageStub<B>,
    pub stage5: OsaStageStub<B>,
    pub classifier: Linear<B>,
}

impl<B: Backend> VoVNetStubRecord<B> {
    pub fn copy_weights(
        self,
        target: VoVNet<B>,
    ) -> anyhow::Result<VoVNet<B>> {
        let stub_dims = self.classifier.weight.dims();
        let target_dims = target.classifier.weight.dims();
        if stub_dims != target_dims {
            bail!(
                "classifier stub has shape {:?}, target has {:?}; load with the stored classes, then use `with_classes`",
                stub_dims,
                target_dims
            );
        }

        Ok(VoVNet {
            stem: self.stem.copy_weights(target.stem)?,
            stage2: self.stage2.copy_weights(target.stage2)?,
            stage3: self.stage3.copy_weights(target.stage3)?,
            stage4: self.stage4.copy_weights(target.stage4)?,
            stage5: self.stage5.copy_weights(target.stage5)?,
            classifier: target.classifier.load_record(self.classifier),
            head_pool: target.head_pool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::blocks::cna::AbstractCNA2dConfig;
    use crate::models::vovnet::features::FeatureKey;
    use crate::models::vovnet::vovnet_model::VoVNetContractConfig;
    use burn::backend::NdArray;
    use burn::nn::GroupNormConfig;
    use burn::tensor::{Distribution, Tensor};
    use regex::Regex;

    type B = NdArray<f32>;

    fn tiny_config() -> VoVNetContractConfig {
        VoVNetContractConfig::new([4, 4, 4, 4], [8, 8, 12, 12], [1, 1, 2, 1], 2)
            .with_stem_channels([4, 4, 8])
            .with_num_classes(3)
    }

    fn cna_stub(cna: &CNA2d<B>) -> CnaStub<B> {
        let Normalization::Batch(norm) = &cna.norm else {
            panic!("expected BatchNorm");
        };
        CnaStub {
            conv: cna.conv.clone(),
            norm: norm.clone(),
        }
    }

    fn stage_stub(stage: &OsaStage<B>) -> OsaStageStub<B> {
        OsaStageStub {
            modules: stage
                .modules
                .iter()
                .map(|m| OsaModuleStub {
                    layers: m.layers.iter().map(cna_stub).collect(),
                    concat: cna_stub(&m.concat),
                })
                .collect(),
        }
    }

    fn model_stub(model: &VoVNet<B>) -> VoVNetStub<B> {
        VoVNetStub {
            stem: StemStub {
                cna1: cna_stub(&model.stem.cna1),
                cna2: cna_stub(&model.stem.cna2),
                cna3: cna_stub(&model.stem.cna3),
            },
            stage2: stage_stub(&model.stage2),
            stage3: stage_stub(&model.stage3),
            stage4: stage_stub(&model.stage4),
            stage5: stage_stub(&model.stage5),
            classifier: model.classifier.clone(),
        }
    }

    fn remap_key(key: &str) -> String {
        vovnet_key_remaps()
            .iter()
            .fold(key.to_string(), |key, (pattern, replacement)| {
                Regex::new(pattern)
                    .unwrap()
                    .replace_all(&key, replacement.as_str())
                    .to_string()
            })
    }

    #[test]
    fn test_key_remaps() {
        assert_eq!(vovnet_key_remaps().len(), 4 + MAX_STAGE_MODULES);

        for (key, expected) in [
            ("stem.stem_1/conv.weight", "stem.cna1.conv.weight"),
            ("module.stem.stem_3/norm.bias", "stem.cna3.norm.bias"),
            (
                "module.stage2.OSA2_1.layers.0.OSA2_1_0/conv.weight",
                "stage2.modules.0.layers.0.conv.weight",
            ),
            (
                "stage3.OSA3_1.layers.2.OSA3_1_2/norm.running_mean",
                "stage3.modules.0.layers.2.norm.running_mean",
            ),
            (
                "stage4.OSA4_2.layers.4.OSA4_2_4/norm.bias",
                "stage4.modules.1.layers.4.norm.bias",
            ),
            (
                "stage4.OSA4_4.concat.OSA4_4_concat/conv.weight",
                "stage4.modules.3.concat.conv.weight",
            ),
            (
                "module.stage5.OSA5_3.concat.OSA5_3_concat/norm.running_var",
                "stage5.modules.2.concat.norm.running_var",
            ),
            ("module.classifier.weight", "classifier.weight"),
            ("classifier.bias", "classifier.bias"),
        ] {
            assert_eq!(remap_key(key), expected, "{key}");
        }
    }

    #[test]
    fn test_copy_weights() {
        let device = Default::default();

        let source: VoVNet<B> = tiny_config().to_structure().init(&device);
        let target: VoVNet<B> = tiny_config().to_structure().init(&device);

        let record = model_stub(&source).into_record();
        let loaded = record.copy_weights(target).unwrap();

        let input = Tensor::random([1, 3, 32, 32], Distribution::Default, &device);
        let expected = source.forward(input.clone());
        let actual = loaded.forward(input.clone());
        for key in FeatureKey::ALL {
            actual
                .get(key)
                .to_data()
                .assert_eq(&expected.get(key).to_data(), true);
        }
        loaded
            .forward_classifier(input.clone())
            .to_data()
            .assert_eq(&source.forward_classifier(input).to_data(), true);

        assert!(loaded.stage2.pool.is_none());
        assert!(loaded.stage4.modules[1].identity);
    }

    #[test]
    fn test_copy_weights_rejects_group_norm() {
        let device = Default::default();

        let source: VoVNet<B> = tiny_config().to_structure().init(&device);
        let target: VoVNet<B> = tiny_config()
            .with_cna(AbstractCNA2dConfig::new().with_norm(GroupNormConfig::new(2, 0).into()))
            .to_structure()
            .init(&device);

        let err = model_stub(&source)
            .into_record()
            .copy_weights(target)
            .unwrap_err();
        assert!(err.to_string().starts_with("BatchNorm stub cannot be applied to Group"));
    }

    #[test]
    fn test_copy_weights_rejects_depth_mismatch() {
        let device = Default::default();

        let source: VoVNet<B> = tiny_config().to_structure().init(&device);
        let mut config = tiny_config();
        config.blocks_per_stage = [1, 1, 1, 1];
        let target: VoVNet<B> = config.to_structure().init(&device);

        let err = model_stub(&source)
            .into_record()
            .copy_weights(target)
            .unwrap_err();
        assert_eq!(err.to_string(), "OsaStage stub has 2 modules, target has 1");
    }

    #[test]
    fn test_copy_weights_rejects_class_mismatch() {
        let device = Default::default();

        let source: VoVNet<B> = tiny_config().to_structure().init(&device);
        let target: VoVNet<B> = tiny_config().to_structure().init(&device).with_classes(5);

        let err = model_stub(&source)
            .into_record()
            .copy_weights(target)
            .unwrap_err();
        assert!(err.to_string().starts_with("classifier stub has shape [12, 3]"));
    }
}
