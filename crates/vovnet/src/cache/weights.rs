//! # Pretrained Weight Descriptors

use crate::cache::disk::DiskCacheConfig;
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

const X25: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_SDLC);

/// Build a cache key (bare cache file name) from a name and URL.
///
/// The key is ``{name}-{url crc hash}-{url basename}``;
/// any ``?query`` suffix is dropped from the basename.
pub fn url_to_cache_key(
    name: Option<&str>,
    url: &str,
) -> String {
    let hash = X25.checksum(url.as_bytes()).to_string();
    let path = url.split_once('?').map_or(url, |(path, _)| path);
    let base_name = path.rsplit_once('/').map_or(path, |(_, base)| base);
    match name {
        Some(n) => format!("{}-{}-{}", n, hash, base_name),
        None => format!("{}-{}", hash, base_name),
    }
}

/// Get the cache resource key for a pretrained weights file.
///
/// # Arguments
///
/// - `cache_key`: the cache key (the bare cache file name).
///
/// # Returns
///
/// The cache resource key.
pub fn pretrained_weights_resource_key(cache_key: &str) -> Vec<String> {
    vec!["weights".to_string(), cache_key.to_string()]
}

/// Static [`PretrainedWeightsDescriptor`] provider.
#[derive(Debug)]
pub struct StaticPretrainedWeightsDescriptor<'a> {
    /// Name of the weights.
    pub name: &'a str,

    /// Description of the weights.
    pub description: &'a str,

    /// License.
    pub license: Option<&'a str>,

    /// Source URL.
    pub origin: Option<&'a str>,

    /// URLs to download the weights from.
    pub urls: &'a [&'a str],
}

impl StaticPretrainedWeightsDescriptor<'_> {
    /// Convert to a [`PretrainedWeightsDescriptor`].
    pub fn to_descriptor(&self) -> PretrainedWeightsDescriptor {
        PretrainedWeightsDescriptor {
            name: self.name.to_string(),
            description: self.description.to_string(),
            license: self.license.map(|s| s.to_string()),
            origin: self.origin.map(|s| s.to_string()),
            urls: self.urls.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl From<&StaticPretrainedWeightsDescriptor<'_>> for PretrainedWeightsDescriptor {
    fn from(descriptor: &StaticPretrainedWeightsDescriptor) -> Self {
        descriptor.to_descriptor()
    }
}

/// A descriptor for a pretrained weights file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PretrainedWeightsDescriptor {
    /// Name of the weights.
    pub name: String,

    /// Description of the weights.
    pub description: String,

    /// License.
    pub license: Option<String>,

    /// Source URL.
    pub origin: Option<String>,

    /// URLs to download the weights from.
    pub urls: Vec<String>,
}

impl PretrainedWeightsDescriptor {
    /// The primary download URL.
    pub fn primary_url(&self) -> anyhow::Result<&str> {
        match self.urls.first() {
            Some(url) => Ok(url),
            None => bail!("Descriptor has no urls: {}", self.name),
        }
    }

    /// Cache Key
    ///
    /// The key is ``{name}-{url crc hash}-{url basename}``.
    pub fn cache_key(&self) -> anyhow::Result<String> {
        Ok(url_to_cache_key(Some(&self.name), self.primary_url()?))
    }

    /// Read-Through Cache the Model Weights
    ///
    /// # Returns
    ///
    /// The disk location of the cached weights.
    pub fn fetch_weights_to_disk_cache(
        &self,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<PathBuf> {
        let url = self.primary_url()?;
        let resource = pretrained_weights_resource_key(&self.cache_key()?);

        tracing::info!(name = %self.name, url, "fetching pretrained weights");
        disk_cache.fetch_resource(url, &resource)
    }
}

/// Static [`PretrainedWeightsMap`] builder.
#[derive(Debug)]
pub struct StaticPretrainedWeightsMap<'a> {
    /// List of static descriptors.
    pub items: &'a [&'a StaticPretrainedWeightsDescriptor<'a>],
}

impl StaticPretrainedWeightsMap<'_> {
    /// Convert to a [`PretrainedWeightsMap`].
    pub fn to_directory(&self) -> PretrainedWeightsMap {
        PretrainedWeightsMap {
            items: self
                .items
                .iter()
                .map(|d| (d.name.to_string(), d.to_descriptor()))
                .collect(),
        }
    }
}

impl From<&StaticPretrainedWeightsMap<'_>> for PretrainedWeightsMap {
    fn from(directory: &StaticPretrainedWeightsMap) -> Self {
        directory.to_directory()
    }
}

/// Directory of [`PretrainedWeightsDescriptor`]s.
#[derive(Debug, Clone, Default)]
pub struct PretrainedWeightsMap {
    /// Map of descriptors.
    pub items: BTreeMap<String, PretrainedWeightsDescriptor>,
}

impl PretrainedWeightsMap {
    /// The descriptor names.
    pub fn names(&self) -> Vec<&str> {
        self.items.keys().map(|k| k.as_str()).collect()
    }

    /// Lookup a descriptor by name.
    pub fn lookup_by_name(
        &self,
        name: &str,
    ) -> Option<PretrainedWeightsDescriptor> {
        self.items.get(name).cloned()
    }

    /// Lookup a descriptor.
    pub fn try_lookup_by_name(
        &self,
        name: &str,
    ) -> anyhow::Result<PretrainedWeightsDescriptor> {
        match self.lookup_by_name(name) {
            Some(d) => Ok(d),
            None => bail!("Descriptor not found: {}", name),
        }
    }

    /// Lookup a descriptor.
    pub fn expect_lookup_by_name(
        &self,
        name: &str,
    ) -> PretrainedWeightsDescriptor {
        match self.try_lookup_by_name(name) {
            Ok(p) => p,
            Err(e) => panic!("{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static MY_WEIGHTS: StaticPretrainedWeightsDescriptor = StaticPretrainedWeightsDescriptor {
        name: "my_model",
        description: "some description of my model.",
        urls: &["https://example.com/a/my_model.pth?dl=1", "bar"],
        license: Some("MIT"),
        origin: Some("https://github.com/my_org/my_model"),
    };

    #[test]
    fn test_url_to_cache_key() {
        let url = "https://dl.dropbox.com/s/1lnzsgnixd8gjra/vovnet39_torchvision.pth?dl=1";
        let key = url_to_cache_key(Some("in1k"), url);
        assert_eq!(key, url_to_cache_key(Some("in1k"), url));
        assert!(key.starts_with("in1k-"));
        assert!(key.ends_with("-vovnet39_torchvision.pth"));

        let hash = X25.checksum(url.as_bytes()).to_string();
        assert_eq!(
            url_to_cache_key(None, url),
            format!("{}-vovnet39_torchvision.pth", hash)
        );

        assert_ne!(
            url_to_cache_key(None, "https://a.com/x/w.pth"),
            url_to_cache_key(None, "https://a.com/y/w.pth")
        );
    }

    #[test]
    fn test_static_descriptor_to_descriptor() {
        let d_desc = MY_WEIGHTS.to_descriptor();

        assert_eq!(d_desc.name, MY_WEIGHTS.name.to_string());
        assert_eq!(d_desc.description, MY_WEIGHTS.description.to_string());
        assert_eq!(d_desc.license.as_deref(), Some("MIT"));
        assert_eq!(d_desc.urls, vec!["https://example.com/a/my_model.pth?dl=1", "bar"]);

        assert_eq!(d_desc.primary_url().unwrap(), MY_WEIGHTS.urls[0]);
        assert!(
            d_desc
                .cache_key()
                .unwrap()
                .ends_with("-my_model.pth")
        );
    }

    #[test]
    fn test_descriptor_without_urls() {
        let desc = PretrainedWeightsDescriptor {
            name: "empty".to_string(),
            description: "".to_string(),
            license: None,
            origin: None,
            urls: vec![],
        };
        assert_eq!(
            desc.cache_key().unwrap_err().to_string(),
            "Descriptor has no urls: empty"
        );
    }

    #[test]
    fn test_weights_map() {
        let map = StaticPretrainedWeightsMap {
            items: &[&MY_WEIGHTS],
        }
        .to_directory();

        assert_eq!(map.names(), vec!["my_model"]);
        assert_eq!(map.expect_lookup_by_name("my_model"), MY_WEIGHTS.to_descriptor());
        assert!(map.lookup_by_name("nope").is_none());
        assert_eq!(
            map.try_lookup_by_name("nope").unwrap_err().to_string(),
            "Descriptor not found: nope"
        );
    }
}
