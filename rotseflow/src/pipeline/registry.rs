//! Init-time registry of stage factories.

use crate::config::{PA_MODULE, QA_MODULE};
use crate::errors::{ConfigurationError, RotseflowError};
use crate::stages::monitoring::{CheckHdus, CountPixels, TargetSnr};
use crate::stages::processing::{
    ChooseRefstars, Coaddition, FindData, ImageDifferencing, MakeSubimages, Photometry, SourceExtraction,
};
use crate::stages::{MonitoringStage, ProcessingStage, StageInit};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds a processing stage from its configuration.
pub type ProcessingFactory =
    Arc<dyn Fn(&StageInit<'_>) -> Result<Arc<dyn ProcessingStage>, RotseflowError> + Send + Sync>;

/// Builds a monitoring stage from its configuration.
pub type MonitoringFactory =
    Arc<dyn Fn(&StageInit<'_>) -> Result<Arc<dyn MonitoringStage>, RotseflowError> + Send + Sync>;

type Key = (String, String);

/// Maps `(module, class)` names to stage factories.
#[derive(Clone, Default)]
pub struct StageRegistry {
    processing: HashMap<Key, ProcessingFactory>,
    monitoring: HashMap<Key, MonitoringFactory>,
}

fn shared_pa<S, E>(built: Result<S, E>) -> Result<Arc<dyn ProcessingStage>, RotseflowError>
where
    S: ProcessingStage + 'static,
    E: Into<RotseflowError>,
{
    built.map(|stage| Arc::new(stage) as Arc<dyn ProcessingStage>).map_err(Into::into)
}

fn shared_qa<S, E>(built: Result<S, E>) -> Result<Arc<dyn MonitoringStage>, RotseflowError>
where
    S: MonitoringStage + 'static,
    E: Into<RotseflowError>,
{
    built.map(|stage| Arc::new(stage) as Arc<dyn MonitoringStage>).map_err(Into::into)
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in stages.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_processing(PA_MODULE, "Find_Data", |init| shared_pa(FindData::new(init)));
        registry.register_processing(PA_MODULE, "Coaddition", |init| shared_pa(Coaddition::new(init)));
        registry.register_processing(PA_MODULE, "Source_Extraction", |init| {
            shared_pa(SourceExtraction::new(init))
        });
        registry.register_processing(PA_MODULE, "Make_Subimages", |init| shared_pa(MakeSubimages::new(init)));
        registry.register_processing(PA_MODULE, "Image_Differencing", |init| {
            shared_pa(ImageDifferencing::new(init))
        });
        registry.register_processing(PA_MODULE, "Choose_Refstars", |init| shared_pa(ChooseRefstars::new(init)));
        registry.register_processing(PA_MODULE, "Photometry", |init| shared_pa(Photometry::new(init)));

        registry.register_monitoring(QA_MODULE, "Count_Pixels", |init| shared_qa(CountPixels::check(init)));
        registry.register_monitoring(QA_MODULE, "Check_HDUs", |init| shared_qa(CheckHdus::check(init)));
        registry.register_monitoring(QA_MODULE, "Target_SNR", |init| shared_qa(TargetSnr::check(init)));

        registry
    }

    /// Registers a processing stage factory.
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_processing<F>(&mut self, module: impl Into<String>, class: impl Into<String>, factory: F)
    where
        F: Fn(&StageInit<'_>) -> Result<Arc<dyn ProcessingStage>, RotseflowError> + Send + Sync + 'static,
    {
        let key = (module.into(), class.into());
        debug!(module = %key.0, class = %key.1, "Registering processing stage");
        if self.processing.insert(key.clone(), Arc::new(factory)).is_some() {
            warn!(module = %key.0, class = %key.1, "Replacing registered processing stage");
        }
    }

    /// Registers a monitoring stage factory.
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_monitoring<F>(&mut self, module: impl Into<String>, class: impl Into<String>, factory: F)
    where
        F: Fn(&StageInit<'_>) -> Result<Arc<dyn MonitoringStage>, RotseflowError> + Send + Sync + 'static,
    {
        let key = (module.into(), class.into());
        debug!(module = %key.0, class = %key.1, "Registering monitoring stage");
        if self.monitoring.insert(key.clone(), Arc::new(factory)).is_some() {
            warn!(module = %key.0, class = %key.1, "Replacing registered monitoring stage");
        }
    }

    /// Builds the processing stage registered as `module.class`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for an unknown name, or whatever the
    /// factory returns.
    pub fn create_processing(
        &self,
        module: &str,
        class: &str,
        init: &StageInit<'_>,
    ) -> Result<Arc<dyn ProcessingStage>, RotseflowError> {
        let factory = self
            .processing
            .get(&(module.to_string(), class.to_string()))
            .ok_or_else(|| ConfigurationError::unknown_stage(module, class))?;
        factory(init)
    }

    /// Builds the monitoring stage registered as `module.class`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for an unknown name, or whatever the
    /// factory returns.
    pub fn create_monitoring(
        &self,
        module: &str,
        class: &str,
        init: &StageInit<'_>,
    ) -> Result<Arc<dyn MonitoringStage>, RotseflowError> {
        let factory = self
            .monitoring
            .get(&(module.to_string(), class.to_string()))
            .ok_or_else(|| ConfigurationError::unknown_stage(module, class))?;
        factory(init)
    }

    /// Returns true if a processing stage is registered under the name.
    #[must_use]
    pub fn has_processing(&self, module: &str, class: &str) -> bool {
        self.processing.contains_key(&(module.to_string(), class.to_string()))
    }

    /// Returns true if a monitoring stage is registered under the name.
    #[must_use]
    pub fn has_monitoring(&self, module: &str, class: &str) -> bool {
        self.monitoring.contains_key(&(module.to_string(), class.to_string()))
    }

    /// Registered processing stages as `module.class`, sorted.
    #[must_use]
    pub fn processing_names(&self) -> Vec<String> {
        sorted_names(self.processing.keys())
    }

    /// Registered monitoring stages as `module.class`, sorted.
    #[must_use]
    pub fn monitoring_names(&self) -> Vec<String> {
        sorted_names(self.monitoring.keys())
    }
}

fn sorted_names<'a>(keys: impl Iterator<Item = &'a Key>) -> Vec<String> {
    let mut names: Vec<String> = keys.map(|(module, class)| format!("{module}.{class}")).collect();
    names.sort();
    names
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRegistry")
            .field("processing", &self.processing_names())
            .field("monitoring", &self.monitoring_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KwArgs;
    use crate::external::StageServices;
    use crate::core::Capability;
    use crate::testing::MockProcessingStage;

    #[test]
    fn test_builtins_registered() {
        let registry = StageRegistry::with_builtins();
        assert!(registry.has_processing(PA_MODULE, "Coaddition"));
        assert!(registry.has_monitoring(QA_MODULE, "Check_HDUs"));
        assert!(!registry.has_processing(QA_MODULE, "Coaddition"));
        assert_eq!(registry.processing_names().len(), 7);
        assert_eq!(registry.monitoring_names().len(), 3);
    }

    #[test]
    fn test_unknown_stage_is_configuration_error() {
        let registry = StageRegistry::with_builtins();
        let kwargs = KwArgs::new();
        let services = StageServices::new();
        let init = StageInit::new("Flat_Field", &kwargs, &services);

        let err = registry.create_processing(PA_MODULE, "Flat_Field", &init).unwrap_err();
        let info = err.error_info().cloned().unwrap();
        assert_eq!(info.code, "CONFIG-001-UNKNOWN_STAGE");
    }

    #[test]
    fn test_custom_registration_replaces() {
        let mut registry = StageRegistry::new();
        registry.register_processing("custom", "Initialize", |init| {
            let stage: Arc<dyn ProcessingStage> =
                Arc::new(MockProcessingStage::new(init.name, Capability::Request, Capability::Images));
            Ok(stage)
        });
        registry.register_processing("custom", "Initialize", |init| {
            let stage: Arc<dyn ProcessingStage> =
                Arc::new(MockProcessingStage::new(init.name, Capability::Request, Capability::Coadds));
            Ok(stage)
        });

        let kwargs = KwArgs::new();
        let services = StageServices::new();
        let stage = registry
            .create_processing("custom", "Initialize", &StageInit::new("Initialize", &kwargs, &services))
            .unwrap();

        assert_eq!(stage.output_capability(), Capability::Coadds);
        assert_eq!(registry.processing_names(), vec!["custom.Initialize".to_string()]);
    }
}
