//! Capability registry: an explicit name-to-handler map built at startup.

use super::Capability;
use crate::error::{MontageError, Result};
use crate::llm::ToolDescriptor;
use std::collections::HashMap;
use std::sync::Arc;

/// The fixed set of capabilities available to a run.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: Vec<Arc<dyn Capability>>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability. Names must be unique.
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Result<()> {
        let name = capability.name().to_string();
        if self.index.contains_key(&name) {
            return Err(MontageError::InvalidInput(format!(
                "Capability '{}' is already registered",
                name
            )));
        }
        self.index.insert(name, self.capabilities.len());
        self.capabilities.push(capability);
        Ok(())
    }

    /// Look up a capability by exact name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.index.get(name).map(|&i| self.capabilities[i].clone())
    }

    /// Tool descriptors in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.capabilities.iter().map(|c| c.descriptor()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Capability>> {
        self.capabilities.iter()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Restrict the registry to the named capabilities. An empty list keeps all of them.
    pub fn subset(&self, names: &[String]) -> Result<Self> {
        if names.is_empty() {
            return Ok(self.clone());
        }

        let mut subset = Self::new();
        for name in names {
            if subset.index.contains_key(name) {
                continue;
            }
            let capability = self
                .get(name)
                .ok_or_else(|| MontageError::InvalidInput(format!("Unknown agent: {}", name)))?;
            subset.register(capability)?;
        }
        Ok(subset)
    }
}
