use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::{EngineCapability, InferenceEngine};

/// Thread-safe registry of inference engines.
///
/// Engines are wrapped in `Mutex` because inference takes `&mut self`. A
/// pipeline run locks its engine for the duration of the run; concurrent
/// runs must use distinct engines.
pub struct EngineRegistry {
    engines: HashMap<String, Arc<Mutex<dyn InferenceEngine>>>,
    default_name: Option<String>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
            default_name: None,
        }
    }

    /// Register an engine. The first registered engine becomes the default.
    pub fn register<E: InferenceEngine + 'static>(&mut self, engine: E) {
        let name = engine.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.engines.insert(name, Arc::new(Mutex::new(engine)));
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.engines.contains_key(name) {
            return Err(anyhow!("engine '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Mutex<dyn InferenceEngine>>> {
        self.engines.get(name).cloned()
    }

    pub fn default_engine(&self) -> Option<Arc<Mutex<dyn InferenceEngine>>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Registered engine names, sorted for stable CLI output.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select an engine supporting the requested capability, preferring the
    /// default when it qualifies.
    pub fn engine_for_capability(
        &self,
        capability: EngineCapability,
    ) -> Result<Arc<Mutex<dyn InferenceEngine>>> {
        if let Some(default_engine) = self.default_engine() {
            let supports = {
                let guard = default_engine
                    .lock()
                    .map_err(|_| anyhow!("default engine lock poisoned"))?;
                guard.supports(capability)
            };
            if supports {
                return Ok(default_engine);
            }
        }

        for engine in self.engines.values() {
            let supports = {
                let guard = engine
                    .lock()
                    .map_err(|_| anyhow!("engine lock poisoned"))?;
                guard.supports(capability)
            };
            if supports {
                return Ok(engine.clone());
            }
        }

        Err(anyhow!(
            "no registered engine supports capability {:?}",
            capability
        ))
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}
