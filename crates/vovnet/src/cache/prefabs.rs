//! # Config Prefabs for Well-Known Model Configurations
//!
//! A [`StaticPreFabMap`] is an explicit, static ``name -> config builder``
//! table; each entry may carry a [`StaticPretrainedWeightsMap`].

use crate::cache::weights::{PretrainedWeightsMap, StaticPretrainedWeightsMap};
use anyhow::bail;
use burn::config::Config;
use std::fmt::Debug;
use std::sync::Arc;

/// Static builder for a [`PreFabConfig`]
pub struct StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Name of the model config pre-fab.
    pub name: &'static str,

    /// Description of the model config pre-fab.
    pub description: &'static str,

    /// Builder function for the config.
    pub builder: fn() -> C,

    /// Pretrained weights available for the config.
    pub weights: Option<&'static StaticPretrainedWeightsMap<'static>>,
}

impl<C> StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Convert to a [`PreFabConfig<C>`].
    pub fn to_prefab(&self) -> PreFabConfig<C> {
        let builder = self.builder;
        PreFabConfig {
            name: self.name.to_string(),
            description: self.description.to_string(),
            builder: Arc::new(builder),
            weights: self.weights.map(|w| w.to_directory()),
        }
    }
}

impl<C> From<&StaticPreFabConfig<C>> for PreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    fn from(config: &StaticPreFabConfig<C>) -> Self {
        config.to_prefab()
    }
}

impl<C> Debug for StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        self.to_prefab().fmt(f)
    }
}

/// A [`Config`] Well-Known Pre-Fab.
#[derive(Clone)]
pub struct PreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Name of the model config pre-fab.
    pub name: String,

    /// Description of the model config pre-fab.
    pub description: String,

    /// Builder function for the config.
    pub builder: Arc<dyn Fn() -> C + Send + Sync>,

    /// Pretrained weights available for the config.
    pub weights: Option<PretrainedWeightsMap>,
}

impl<C> Debug for PreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let pretty = f.alternate();

        let type_name = std::any::type_name::<C>();
        let mut handle = f.debug_struct(&format!("PreFabConfig<{}>", type_name));

        handle
            .field("name", &self.name)
            .field("description", &self.description)
            .field(
                "weights",
                &self.weights.as_ref().map(|w| w.names()),
            );

        if pretty {
            handle.field("config", &self.new_config());
        }

        handle.finish()
    }
}

impl<C> PreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Build a new config.
    pub fn new_config(&self) -> C {
        (self.builder)()
    }

    /// Get the weights map, or an error if there are none.
    pub fn try_weights(&self) -> anyhow::Result<&PretrainedWeightsMap> {
        match &self.weights {
            Some(weights) => Ok(weights),
            None => bail!("No pretrained weights for prefab: {}", self.name),
        }
    }
}

/// Static map of [`StaticPreFabConfig`]s.
pub struct StaticPreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Name of the map.
    pub name: &'static str,

    /// Description of the map.
    pub description: &'static str,

    /// The prefab entries.
    pub items: &'static [&'static StaticPreFabConfig<C>],
}

impl<C> Debug for StaticPreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("StaticPreFabMap")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("items", &self.names())
            .finish()
    }
}

impl<C> StaticPreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// The prefab names, in table order.
    pub fn names(&self) -> Vec<&'static str> {
        self.items.iter().map(|p| p.name).collect()
    }

    /// Lookup a prefab by name.
    pub fn lookup_prefab(
        &self,
        name: &str,
    ) -> Option<PreFabConfig<C>> {
        self.items
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.to_prefab())
    }

    /// Lookup a prefab.
    pub fn try_lookup_prefab(
        &self,
        name: &str,
    ) -> anyhow::Result<PreFabConfig<C>> {
        match self.lookup_prefab(name) {
            Some(p) => Ok(p),
            None => bail!("Prefab not found: {}", name),
        }
    }

    /// Lookup a prefab.
    ///
    /// # Panics
    ///
    /// If the name is not in the map.
    pub fn expect_lookup_prefab(
        &self,
        name: &str,
    ) -> PreFabConfig<C> {
        match self.try_lookup_prefab(name) {
            Ok(p) => p,
            Err(e) => panic!("{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::weights::StaticPretrainedWeightsDescriptor;

    #[derive(Config, Debug)]
    struct TestConfig {
        width: usize,
    }

    static TEST_MAP: StaticPreFabMap<TestConfig> = StaticPreFabMap {
        name: "test",
        description: "test prefabs",
        items: &[
            &StaticPreFabConfig {
                name: "small",
                description: "a small config",
                builder: || TestConfig::new(8),
                weights: None,
            },
            &StaticPreFabConfig {
                name: "large",
                description: "a large config",
                builder: || TestConfig::new(64),
                weights: Some(&StaticPretrainedWeightsMap {
                    items: &[&StaticPretrainedWeightsDescriptor {
                        name: "v1",
                        description: "first release",
                        license: None,
                        origin: None,
                        urls: &["https://example.com/large.pth"],
                    }],
                }),
            },
        ],
    };

    #[test]
    fn test_lookup() {
        assert_eq!(TEST_MAP.names(), vec!["small", "large"]);

        let prefab = TEST_MAP.expect_lookup_prefab("large");
        assert_eq!(prefab.name, "large");
        assert_eq!(prefab.new_config().width, 64);
        assert_eq!(prefab.try_weights().unwrap().names(), vec!["v1"]);

        let prefab = TEST_MAP.expect_lookup_prefab("small");
        assert_eq!(prefab.new_config().width, 8);
        assert_eq!(
            prefab.try_weights().unwrap_err().to_string(),
            "No pretrained weights for prefab: small"
        );

        assert!(TEST_MAP.lookup_prefab("medium").is_none());
        assert_eq!(
            TEST_MAP.try_lookup_prefab("medium").unwrap_err().to_string(),
            "Prefab not found: medium"
        );
    }

    #[test]
    #[should_panic(expected = "Prefab not found: medium")]
    fn test_expect_lookup_panics() {
        TEST_MAP.expect_lookup_prefab("medium");
    }

    #[test]
    fn test_debug() {
        let prefab = TEST_MAP.expect_lookup_prefab("small");
        let text = format!("{:?}", prefab);
        assert!(text.contains("name: \"small\""));
        assert!(!text.contains("width"));

        let text = format!("{:#?}", prefab);
        assert!(text.contains("width: 8"));
    }
}
