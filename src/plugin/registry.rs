//! The set of plugins for one build.
//!
//! [`RegistryBuilder`] loads plugins one at a time; [`Registry`] is the frozen
//! result. Dropping a builder after a failed load unloads everything it had
//! already loaded, so a build never sees a partial registry.

use super::loader::{self, PluginModule};
use super::provider::{PluginTransform, Provider};
use super::{BuildContext, HeadInsert, Kind, PluginError};
use crate::config::SiteConfig;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, instrument, warn};

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    providers: Vec<Provider>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Provider) -> Result<(), PluginError> {
        if self.providers.iter().any(|p| p.name() == provider.name()) {
            return Err(PluginError::Duplicate(provider.name().to_string()));
        }
        self.providers.push(provider);
        Ok(())
    }

    /// Load a plugin from an already-resolved module.
    pub fn load(
        &mut self,
        module: Box<dyn PluginModule>,
        name: &str,
        settings: &Map<String, Value>,
    ) -> Result<(), PluginError> {
        if self.providers.iter().any(|p| p.name() == name) {
            return Err(PluginError::Duplicate(name.to_string()));
        }
        let provider = loader::load(module, name, settings)?;
        self.register(provider)
    }

    /// Load a plugin from a shared library on disk.
    pub fn load_native(
        &mut self,
        path: &Path,
        name: &str,
        settings: &Map<String, Value>,
    ) -> Result<(), PluginError> {
        if self.providers.iter().any(|p| p.name() == name) {
            return Err(PluginError::Duplicate(name.to_string()));
        }
        let provider = loader::load_native(path, name, settings)?;
        self.register(provider)
    }

    pub fn finish(self) -> Registry {
        Registry {
            providers: self.providers,
        }
    }
}

/// Frozen, read-only set of providers, in registration order.
#[derive(Debug, Default)]
pub struct Registry {
    providers: Vec<Provider>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every `[[plugins]]` entry in file order. Relative paths are
    /// resolved against `root`. The first failure aborts the whole load.
    #[instrument(skip_all, fields(count = config.plugins.len()))]
    pub fn load_from_config(config: &SiteConfig, root: &Path) -> Result<Self, PluginError> {
        let mut builder = RegistryBuilder::new();
        for plugin in &config.plugins {
            let path = root.join(&plugin.path);
            let settings = plugin.settings_json().map_err(|e| PluginError::Config {
                plugin: plugin.name.clone(),
                message: e.to_string(),
            })?;
            if let Err(err) = builder.load_native(&path, &plugin.name, &settings) {
                warn!(plugin = %plugin.name, step = err.step(), "plugin load failed, aborting");
                return Err(err);
            }
        }
        let registry = builder.finish();
        info!(plugins = registry.len(), "plugin registry frozen");
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn get(&self, name: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.name() == name)
    }

    pub fn of_kind(&self, kind: Kind) -> impl Iterator<Item = &Provider> {
        self.providers.iter().filter(move |p| p.kind() == kind)
    }

    /// Page transforms of every content provider, in registration order.
    pub fn content_transforms(
        &self,
        ctx: &BuildContext,
    ) -> Result<Vec<PluginTransform<'_>>, PluginError> {
        self.of_kind(Kind::ContentProvider)
            .map(|provider| provider.transform(ctx))
            .collect()
    }

    /// Head markup of every head-fragment plugin, in registration order.
    pub fn head_inserts(&self, ctx: &BuildContext) -> Result<Vec<HeadInsert>, PluginError> {
        self.of_kind(Kind::HeadFragment)
            .map(|provider| {
                Ok(HeadInsert {
                    plugin: provider.name().to_string(),
                    slot: provider.slot().unwrap_or_default(),
                    markup: provider.head_fragment(ctx)?,
                })
            })
            .collect()
    }

    /// Run one tool by name.
    #[instrument(skip(self, ctx))]
    pub fn run_tool(
        &self,
        name: &str,
        ctx: &BuildContext,
        dry_run: bool,
    ) -> Result<(), PluginError> {
        let provider = self
            .of_kind(Kind::Tool)
            .find(|p| p.name() == name)
            .ok_or_else(|| PluginError::UnknownTool(name.to_string()))?;
        provider.run_tool(ctx, dry_run)?;
        info!(tool = name, dry_run, "tool finished");
        Ok(())
    }

    /// Names of the registered tools.
    pub fn tools(&self) -> Vec<&str> {
        self.of_kind(Kind::Tool).map(Provider::name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginConfig;
    use crate::enrich::Transform;
    use crate::plugin::HeadSlot;
    use crate::plugin::abi::DO_SYMBOL;
    use crate::test_helpers::plugins::{
        self, Greeter, SiteMeta, Shouter, Suffixer, content_module, head_module, tool_module,
    };
    use crate::types::{Content, Page};

    fn no_settings() -> Map<String, Value> {
        Map::new()
    }

    fn registry() -> Registry {
        let mut builder = RegistryBuilder::new();
        builder
            .load(content_module::<Shouter>("a"), "shouter", &no_settings())
            .unwrap();
        builder
            .load(tool_module::<Greeter>("b"), "greeter", &no_settings())
            .unwrap();
        builder
            .load(content_module::<Suffixer>("c"), "suffixer", &no_settings())
            .unwrap();
        builder
            .load(head_module::<SiteMeta>("d"), "meta", &no_settings())
            .unwrap();
        builder.finish()
    }

    #[test]
    fn keeps_registration_order() {
        let registry = registry();
        let names: Vec<_> = registry.providers().iter().map(Provider::name).collect();
        assert_eq!(names, vec!["shouter", "greeter", "suffixer", "meta"]);
        assert_eq!(registry.tools(), vec!["greeter"]);
    }

    #[test]
    fn content_transforms_in_registration_order() {
        let registry = registry();
        let transforms = registry.content_transforms(&BuildContext::default()).unwrap();
        let names: Vec<_> = transforms.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["shouter", "suffixer"]);

        let mut page = Page::default();
        page.contents.push(Content::paragraph("abc"));
        for transform in &transforms {
            transform.apply(&mut page).unwrap();
        }
        // Suffixer sees the shouter's output.
        assert_eq!(page.contents, vec![Content::paragraph("ABC~")]);
    }

    #[test]
    fn head_inserts_carry_slot() {
        let registry = registry();
        let inserts = registry
            .head_inserts(&BuildContext {
                site_title: "T".into(),
                ..BuildContext::default()
            })
            .unwrap();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].plugin, "meta");
        assert_eq!(inserts[0].slot, HeadSlot::End);
        assert!(inserts[0].markup.contains("\"T\""));
    }

    #[test]
    fn unknown_tool_is_error() {
        let registry = registry();
        let err = registry
            .run_tool("shouter", &BuildContext::default(), true)
            .unwrap_err();
        assert!(matches!(err, PluginError::UnknownTool(name) if name == "shouter"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut builder = RegistryBuilder::new();
        builder
            .load(content_module::<Shouter>("a"), "same", &no_settings())
            .unwrap();
        let err = builder
            .load(tool_module::<Greeter>("b"), "same", &no_settings())
            .unwrap_err();
        assert!(matches!(err, PluginError::Duplicate(name) if name == "same"));
    }

    #[test]
    fn failed_plugin_is_never_registered() {
        let mut builder = RegistryBuilder::new();
        let broken = plugins::module_without(content_module::<Shouter>("x"), DO_SYMBOL);
        assert!(builder.load(broken, "broken", &no_settings()).is_err());
        let registry = builder.finish();
        assert!(registry.get("broken").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn load_from_config_is_all_or_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = SiteConfig::default();
        config.plugins = vec![PluginConfig {
            name: "missing".into(),
            path: "plugins/libmissing.so".into(),
            ..PluginConfig::default()
        }];
        let err = Registry::load_from_config(&config, tmp.path()).unwrap_err();
        assert_eq!(err.plugin(), "missing");
        assert_eq!(err.step(), "open");
    }

    #[test]
    fn load_from_empty_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let registry = Registry::load_from_config(&SiteConfig::default(), tmp.path()).unwrap();
        assert!(registry.is_empty());
    }
}
