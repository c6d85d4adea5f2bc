//! Sorting layers - named priority buckets for process ordering
//!
//! Every process belongs to exactly one sorting layer. The queue ticks
//! processes in ascending layer order; processes on the same layer keep the
//! order in which they were attached.
//!
//! The registry always contains the default layer (id 0, order 0). It is
//! created with the registry and can never be removed, so processes whose
//! layer disappears always have somewhere to go.

use serde::{Deserialize, Serialize};

use crate::error::{ProcessError, Result};

/// Name of the layer every registry starts with
pub const DEFAULT_SORTING_LAYER: &str = "default";

/// Stable identifier for a sorting layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SortingLayerId(u32);

impl SortingLayerId {
    /// Id of the default layer
    pub const DEFAULT: Self = Self(0);

    /// Create an id from its raw value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw ID
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Whether this is the default layer
    pub const fn is_default(&self) -> bool {
        self.0 == 0
    }
}

/// A named priority bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortingLayer {
    /// Stable id, never reused while the layer is alive
    pub id: SortingLayerId,
    /// Sort key (lower = ticked earlier)
    pub order: i32,
    /// Human-readable name, unique within a registry
    pub name: String,
}

impl SortingLayer {
    fn new(id: SortingLayerId, name: impl Into<String>, order: i32) -> Self {
        Self {
            id,
            order,
            name: name.into(),
        }
    }

    /// Whether this is the default layer
    pub fn is_default(&self) -> bool {
        self.id.is_default()
    }
}

/// Lookup key for layer removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKey<'a> {
    /// By stable id
    Id(SortingLayerId),
    /// By name
    Name(&'a str),
}

impl From<SortingLayerId> for LayerKey<'_> {
    fn from(id: SortingLayerId) -> Self {
        LayerKey::Id(id)
    }
}

impl<'a> From<&'a str> for LayerKey<'a> {
    fn from(name: &'a str) -> Self {
        LayerKey::Name(name)
    }
}

/// Ordered registry of sorting layers
#[derive(Debug, Clone)]
pub struct SortingLayers {
    /// Layers, sorted by order after each call to `sort`
    layers: Vec<SortingLayer>,
    /// Names in the same positions as `layers`
    names: Vec<String>,
    /// Next candidate id
    next_id: u32,
}

impl SortingLayers {
    /// Create a registry holding only the default layer
    pub fn new() -> Self {
        Self {
            layers: vec![SortingLayer::new(SortingLayerId::DEFAULT, DEFAULT_SORTING_LAYER, 0)],
            names: vec![DEFAULT_SORTING_LAYER.to_string()],
            next_id: 1,
        }
    }

    /// Add a layer
    ///
    /// A name of the form `layer_<id>` is generated when none is given. A
    /// requested name that is already taken gets the id appended.
    pub fn add_layer(&mut self, name: Option<&str>, order: Option<i32>) -> &SortingLayer {
        let id = self.allocate_id();

        let name = match name {
            Some(name) if !self.has_layer(name) => name.to_string(),
            Some(name) => {
                let unique = format!("{}_{}", name, id.raw());
                log::warn!("Sorting layer '{}' already exists, using '{}'", name, unique);
                unique
            }
            None => format!("layer_{}", id.raw()),
        };

        log::debug!("Added sorting layer '{}' ({:?})", name, id);
        self.names.push(name.clone());
        self.layers.push(SortingLayer::new(id, name, order.unwrap_or(0)));

        &self.layers[self.layers.len() - 1]
    }

    fn allocate_id(&mut self) -> SortingLayerId {
        loop {
            let candidate = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if candidate == 0 {
                continue;
            }
            let id = SortingLayerId(candidate);
            if !self.layers.iter().any(|l| l.id == id) {
                return id;
            }
        }
    }

    /// Remove a layer
    ///
    /// `on_removal` receives the layer id before the layer is erased so that
    /// dependents can be reassigned. Returns false if the layer does not
    /// exist or is the default layer.
    pub fn remove_layer<'a>(
        &mut self,
        key: impl Into<LayerKey<'a>>,
        on_removal: impl FnOnce(SortingLayerId),
    ) -> bool {
        let index = match self.index_of(key.into()) {
            Some(index) => index,
            None => return false,
        };

        let id = self.layers[index].id;
        if id.is_default() {
            log::warn!("Refusing to remove the default sorting layer");
            return false;
        }

        on_removal(id);

        let layer = self.layers.remove(index);
        self.names.remove(index);
        log::debug!("Removed sorting layer '{}' ({:?})", layer.name, id);
        true
    }

    fn index_of(&self, key: LayerKey<'_>) -> Option<usize> {
        match key {
            LayerKey::Id(id) => self.layers.iter().position(|l| l.id == id),
            LayerKey::Name(name) => self.names.iter().position(|n| n == name),
        }
    }

    /// Change a layer's order in place; call [`sort`](Self::sort) afterwards
    pub fn set_layer_order(&mut self, id: SortingLayerId, order: i32) -> Result<()> {
        let layer = self
            .layers
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(ProcessError::UnknownSortingLayer(id))?;
        layer.order = order;
        Ok(())
    }

    /// Stable sort by ascending order, keeping the name list parallel
    pub fn sort(&mut self) {
        self.layers.sort_by_key(|l| l.order);
        self.names = self.layers.iter().map(|l| l.name.clone()).collect();
    }

    /// Get a layer by id
    pub fn get_layer_from_id(&self, id: SortingLayerId) -> Result<&SortingLayer> {
        self.layers
            .iter()
            .find(|l| l.id == id)
            .ok_or(ProcessError::UnknownSortingLayer(id))
    }

    /// Get a layer by name
    pub fn get_layer(&self, name: &str) -> Option<&SortingLayer> {
        self.index_of(LayerKey::Name(name)).map(|i| &self.layers[i])
    }

    /// Check whether a layer with this name exists
    pub fn has_layer(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Check whether a layer with this id exists
    pub fn contains(&self, id: SortingLayerId) -> bool {
        self.layers.iter().any(|l| l.id == id)
    }

    /// Order of a layer, or the default order if the id is unknown
    pub fn order_of(&self, id: SortingLayerId) -> i32 {
        self.get_layer_from_id(id).map(|l| l.order).unwrap_or(0)
    }

    /// The default layer
    pub fn default_layer(&self) -> &SortingLayer {
        self.layers
            .iter()
            .find(|l| l.is_default())
            .unwrap_or(&self.layers[0])
    }

    /// Layer names in registry order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Iterate layers in registry order
    pub fn iter(&self) -> impl Iterator<Item = &SortingLayer> {
        self.layers.iter()
    }

    /// Get layer count (including the default layer)
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false, the default layer cannot be removed
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Serialize every layer except the default one
    pub fn to_json(&self) -> Result<String> {
        let custom: Vec<&SortingLayer> = self.layers.iter().filter(|l| !l.is_default()).collect();
        serde_json::to_string(&custom).map_err(|e| ProcessError::Serialization(e.to_string()))
    }

    /// Load layers previously written by [`to_json`](Self::to_json)
    ///
    /// Layers whose id or name is already taken are skipped. Returns the
    /// number of layers added.
    pub fn load_json(&mut self, json: &str) -> Result<usize> {
        let loaded: Vec<SortingLayer> =
            serde_json::from_str(json).map_err(|e| ProcessError::Serialization(e.to_string()))?;

        let mut added = 0;
        for layer in loaded {
            if layer.is_default() || self.contains(layer.id) || self.has_layer(&layer.name) {
                log::warn!(
                    "Skipping sorting layer '{}' ({:?}): already present",
                    layer.name,
                    layer.id
                );
                continue;
            }
            self.next_id = self.next_id.max(layer.id.raw().wrapping_add(1));
            self.names.push(layer.name.clone());
            self.layers.push(layer);
            added += 1;
        }

        self.sort();
        Ok(added)
    }
}

impl Default for SortingLayers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layer() {
        let layers = SortingLayers::new();
        assert_eq!(layers.len(), 1);
        assert!(layers.has_layer(DEFAULT_SORTING_LAYER));
        assert_eq!(layers.default_layer().id, SortingLayerId::DEFAULT);
        assert_eq!(layers.default_layer().order, 0);
    }

    #[test]
    fn test_add_assigns_fresh_ids() {
        let mut layers = SortingLayers::new();
        let a = layers.add_layer(Some("background"), Some(-10)).id;
        let b = layers.add_layer(None, None).id;

        assert_ne!(a, b);
        assert!(!a.is_default());
        assert_eq!(layers.get_layer_from_id(b).unwrap().name, format!("layer_{}", b.raw()));
    }

    #[test]
    fn test_duplicate_name_is_made_unique() {
        let mut layers = SortingLayers::new();
        layers.add_layer(Some("ui"), None);
        let second = layers.add_layer(Some("ui"), None).clone();

        assert_ne!(second.name, "ui");
        assert_eq!(layers.len(), 3);
    }

    #[test]
    fn test_removed_ids_are_not_reused() {
        let mut layers = SortingLayers::new();
        let a = layers.add_layer(Some("a"), None).id;
        assert!(layers.remove_layer(a, |_| {}));

        let b = layers.add_layer(Some("b"), None).id;
        assert_ne!(a, b);
    }

    #[test]
    fn test_remove_invokes_callback_first() {
        let mut layers = SortingLayers::new();
        let id = layers.add_layer(Some("fx"), Some(3)).id;

        let mut seen = None;
        assert!(layers.remove_layer("fx", |removed| seen = Some(removed)));
        assert_eq!(seen, Some(id));
        assert!(!layers.has_layer("fx"));
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn test_remove_default_or_missing_fails() {
        let mut layers = SortingLayers::new();
        let mut called = false;

        assert!(!layers.remove_layer(DEFAULT_SORTING_LAYER, |_| called = true));
        assert!(!layers.remove_layer(SortingLayerId::new(99), |_| called = true));
        assert!(!called);
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn test_sort_is_stable_and_keeps_names_parallel() {
        let mut layers = SortingLayers::new();
        layers.add_layer(Some("late"), Some(10));
        layers.add_layer(Some("first_tie"), Some(5));
        layers.add_layer(Some("second_tie"), Some(5));
        layers.add_layer(Some("early"), Some(-1));
        layers.sort();

        assert_eq!(
            layers.names(),
            &["early", "default", "first_tie", "second_tie", "late"]
        );
        let names: Vec<&str> = layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, layers.names());
    }

    #[test]
    fn test_set_order_does_not_resort() {
        let mut layers = SortingLayers::new();
        let id = layers.add_layer(Some("hud"), Some(1)).id;
        layers.set_layer_order(id, -5).unwrap();

        assert_eq!(layers.names()[1], "hud");
        assert_eq!(layers.order_of(id), -5);

        layers.sort();
        assert_eq!(layers.names()[0], "hud");
    }

    #[test]
    fn test_unknown_layer_lookup() {
        let mut layers = SortingLayers::new();
        let missing = SortingLayerId::new(42);

        assert_eq!(
            layers.get_layer_from_id(missing).unwrap_err(),
            ProcessError::UnknownSortingLayer(missing)
        );
        assert!(layers.set_layer_order(missing, 1).is_err());
    }

    #[test]
    fn test_json_skips_default_layer() {
        let mut layers = SortingLayers::new();
        let physics = layers.add_layer(Some("physics"), Some(-3)).id;
        layers.add_layer(Some("render"), Some(7));

        let json = layers.to_json().unwrap();
        assert!(!json.contains(DEFAULT_SORTING_LAYER));

        let mut restored = SortingLayers::new();
        assert_eq!(restored.load_json(&json).unwrap(), 2);
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.get_layer("physics").unwrap().id, physics);
        assert_eq!(restored.names()[0], "physics");

        // New ids continue past the loaded ones
        let fresh = restored.add_layer(None, None).id;
        assert!(fresh.raw() > physics.raw());
    }
}
