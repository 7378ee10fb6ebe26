//! # Prefab / Weight Caches
pub mod disk;
pub mod prefabs;
pub mod weights;
