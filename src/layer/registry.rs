use std::{collections::HashMap, fmt::{Debug, Formatter, Result as FmtResult}};

use tracing::debug;

use crate::{
    device,
    layer::layer_acc::LayerAcc,
    model::layer_type::LayerType,
    network::config::DeviceType,
    utils::error::{InferError, Result},
};

/// Builds a fresh, uninitialized layer implementation.
pub type LayerAccFactory = fn() -> Box<dyn LayerAcc>;

pub fn create_acc<T: LayerAcc + Default + 'static>() -> Box<dyn LayerAcc> {
    Box::new(T::default())
}

/// Maps (operator kind, device kind) to the factory that implements it.
///
/// Built explicitly, never through global state. Each device contributes its
/// own list, so a device can be linked in or left out independently.
#[derive(Default)]
pub struct LayerRegistry {
    factories: HashMap<(LayerType, DeviceType), LayerAccFactory>,
}

impl LayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every implementation this crate ships.
    pub fn with_builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register_all(DeviceType::Cpu, device::cpu::layer_accs())?;
        registry.register_all(DeviceType::Graph, device::graph::layer_builders())?;
        Ok(registry)
    }

    pub fn register(
        &mut self,
        layer_type: LayerType,
        device: DeviceType,
        factory: LayerAccFactory,
    ) -> Result<()> {
        if self.factories.contains_key(&(layer_type, device)) {
            return Err(InferError::Build(format!(
                "{} layer is already registered for device {}",
                layer_type, device
            )));
        }
        debug!("register {} layer for {}", layer_type, device);
        self.factories.insert((layer_type, device), factory);
        Ok(())
    }

    pub fn register_all(
        &mut self,
        device: DeviceType,
        entries: impl IntoIterator<Item = (LayerType, LayerAccFactory)>,
    ) -> Result<()> {
        for (layer_type, factory) in entries {
            self.register(layer_type, device, factory)?;
        }
        Ok(())
    }

    /// `None` when the pair is not registered; callers treat that as fatal.
    pub fn create(&self, layer_type: LayerType, device: DeviceType) -> Option<Box<dyn LayerAcc>> {
        self.factories
            .get(&(layer_type, device))
            .map(|factory| factory())
    }

    pub fn contains(&self, layer_type: LayerType, device: DeviceType) -> bool {
        self.factories.contains_key(&(layer_type, device))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Layer types available on `device`, sorted.
    pub fn supported_layers(&self, device: DeviceType) -> Vec<LayerType> {
        let mut layers: Vec<LayerType> = self
            .factories
            .keys()
            .filter(|(_, d)| *d == device)
            .map(|(l, _)| *l)
            .collect();
        layers.sort();
        layers
    }
}

impl Debug for LayerRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let mut keys: Vec<_> = self.factories.keys().collect();
        keys.sort();
        write!(f, "LayerRegistry({:?})", keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_both_devices() {
        let registry = LayerRegistry::with_builtin().unwrap();
        let all = vec![LayerType::Permute, LayerType::Convolution, LayerType::ReLU];
        assert_eq!(registry.supported_layers(DeviceType::Cpu), all);
        assert_eq!(registry.supported_layers(DeviceType::Graph), all);
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn duplicate_pair_is_a_build_error() {
        let mut registry = LayerRegistry::new();
        registry
            .register_all(DeviceType::Cpu, device::cpu::layer_accs())
            .unwrap();
        let err = registry
            .register_all(DeviceType::Cpu, device::cpu::layer_accs())
            .unwrap_err();
        assert!(matches!(err, InferError::Build(_)));

        // the same operator on another device is independent
        registry
            .register_all(DeviceType::Graph, device::graph::layer_builders())
            .unwrap();
    }

    #[test]
    fn unregistered_pair_creates_nothing() {
        let registry = LayerRegistry::new();
        assert!(registry.create(LayerType::Permute, DeviceType::Cpu).is_none());
        assert!(!registry.contains(LayerType::Permute, DeviceType::Cpu));
    }
}
