//! A loaded, checked plugin and its typed calls.

use super::abi::{
    ContentProviderCall, HeadFragmentCall, RawOutcome, RawStr, RawTransform, ToolCall,
};
use super::config::{Config, ForeignConfig};
use super::loader::PluginModule;
use super::{BuildContext, HeadSlot, Kind, PluginError};
use crate::enrich::{EnrichError, Transform};
use crate::types::Page;
use std::ffi::c_void;
use tracing::debug;

/// The `do` call pointer, typed by kind after its signature was checked.
pub(crate) enum Operation {
    ContentProvider(ContentProviderCall),
    Tool(ToolCall),
    HeadFragment(HeadFragmentCall),
}

impl Operation {
    /// # Safety
    /// `call` must be the call pointer of a `do` entry whose signature matched
    /// `kind`'s contract.
    pub(crate) unsafe fn from_call(kind: Kind, call: *const c_void) -> Self {
        unsafe {
            match kind {
                Kind::ContentProvider => Self::ContentProvider(std::mem::transmute::<
                    *const c_void,
                    ContentProviderCall,
                >(call)),
                Kind::Tool => {
                    Self::Tool(std::mem::transmute::<*const c_void, ToolCall>(call))
                }
                Kind::HeadFragment => Self::HeadFragment(std::mem::transmute::<
                    *const c_void,
                    HeadFragmentCall,
                >(call)),
            }
        }
    }
}

/// Runtime handle for one registered plugin. Immutable once built.
pub struct Provider {
    name: String,
    kind: Kind,
    slot: Option<HeadSlot>,
    operation: Operation,
    config: ForeignConfig,
    // Declared last: dropped after the config, so the module is unloaded last.
    module: Box<dyn PluginModule>,
}

impl Provider {
    pub(crate) fn new(
        name: String,
        kind: Kind,
        config: ForeignConfig,
        operation: Operation,
        slot: Option<HeadSlot>,
        module: Box<dyn PluginModule>,
    ) -> Self {
        Self {
            name,
            kind,
            slot,
            operation,
            config,
            module,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Head slot of a head-fragment plugin.
    pub fn slot(&self) -> Option<HeadSlot> {
        self.slot
    }

    pub fn config(&self) -> &dyn Config {
        &self.config
    }

    pub fn origin(&self) -> String {
        self.module.describe()
    }

    fn wrong_kind(&self, expected: Kind) -> PluginError {
        PluginError::WrongKind {
            plugin: self.name.clone(),
            expected,
            actual: self.kind,
        }
    }

    fn failed(&self, message: String) -> PluginError {
        PluginError::Call {
            plugin: self.name.clone(),
            message,
        }
    }

    fn context_json(&self, ctx: &BuildContext) -> Result<String, PluginError> {
        serde_json::to_string(ctx).map_err(|e| self.failed(e.to_string()))
    }

    /// Ask a content provider for its page transform for this build.
    pub fn transform(&self, ctx: &BuildContext) -> Result<PluginTransform<'_>, PluginError> {
        let Operation::ContentProvider(call) = self.operation else {
            return Err(self.wrong_kind(Kind::ContentProvider));
        };
        let json = self.context_json(ctx)?;
        let mut raw = RawTransform::empty();
        let outcome = unsafe { call(self.config.as_raw(), RawStr::new(&json), &mut raw) };
        let transform = PluginTransform {
            provider: self,
            raw,
        };
        unsafe { outcome.into_result() }.map_err(|message| self.failed(message))?;
        if transform.raw.apply.is_none() {
            return Err(self.failed("returned no page transform".to_string()));
        }
        Ok(transform)
    }

    /// Run a tool once for the whole build.
    pub fn run_tool(&self, ctx: &BuildContext, dry_run: bool) -> Result<(), PluginError> {
        let Operation::Tool(call) = self.operation else {
            return Err(self.wrong_kind(Kind::Tool));
        };
        let json = self.context_json(ctx)?;
        let outcome = unsafe { call(self.config.as_raw(), RawStr::new(&json), dry_run) };
        unsafe { outcome.into_result() }
            .map(|_| ())
            .map_err(|message| PluginError::Tool {
                plugin: self.name.clone(),
                message,
            })
    }

    /// Markup a head-fragment plugin contributes for this build.
    pub fn head_fragment(&self, ctx: &BuildContext) -> Result<String, PluginError> {
        let Operation::HeadFragment(call) = self.operation else {
            return Err(self.wrong_kind(Kind::HeadFragment));
        };
        let json = self.context_json(ctx)?;
        let outcome = unsafe { call(self.config.as_raw(), RawStr::new(&json)) };
        unsafe { outcome.into_result() }.map_err(|message| self.failed(message))
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("slot", &self.slot)
            .field("origin", &self.module.describe())
            .finish()
    }
}

/// A content provider's page transform, valid while its provider is alive.
pub struct PluginTransform<'a> {
    provider: &'a Provider,
    raw: RawTransform,
}

impl std::fmt::Debug for PluginTransform<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginTransform")
            .field("provider", &self.provider.name())
            .finish()
    }
}

// Plugins are trusted to make their transform callable from any thread.
unsafe impl Send for PluginTransform<'_> {}
unsafe impl Sync for PluginTransform<'_> {}

impl PluginTransform<'_> {
    fn call(&self, page_json: &str) -> Result<String, String> {
        let Some(apply) = self.raw.apply else {
            return Err("transform has no apply entry".to_string());
        };
        let outcome: RawOutcome = unsafe { apply(self.raw.handle, RawStr::new(page_json)) };
        unsafe { outcome.into_result() }
    }
}

impl Transform for PluginTransform<'_> {
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn apply(&self, page: &mut Page) -> Result<(), EnrichError> {
        let failed = |message: String| EnrichError::Transform {
            transform: self.provider.name().to_string(),
            message,
        };
        let json = serde_json::to_string(&*page).map_err(|e| failed(e.to_string()))?;
        let returned = self.call(&json).map_err(failed)?;
        let mut updated: Page = serde_json::from_str(&returned)
            .map_err(|e| failed(format!("returned an unreadable page: {e}")))?;
        // The page keeps its identity whatever the plugin sends back.
        updated.location = page.location.clone();
        debug!(
            plugin = self.provider.name(),
            location = %page.location,
            before = page.contents.len(),
            after = updated.contents.len(),
            "applied plugin transform"
        );
        *page = updated;
        Ok(())
    }
}

impl Drop for PluginTransform<'_> {
    fn drop(&mut self) {
        if let Some(release) = self.raw.release
            && !self.raw.handle.is_null()
        {
            unsafe { release(self.raw.handle) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::loader::load;
    use crate::test_helpers::plugins::{
        Greeter, SiteMeta, Shouter, content_module, failing_tool_module, head_module,
        tool_module,
    };
    use crate::types::{Content, Location};
    use serde_json::{Map, Value};

    fn settings(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn content_transform_rewrites_page() {
        let provider = load(content_module::<Shouter>("s"), "shouter", &Map::new()).unwrap();
        let transform = provider.transform(&BuildContext::default()).unwrap();
        let mut page = Page::new(Location::new("notes/a"));
        page.contents.push(Content::paragraph("quiet words"));
        transform.apply(&mut page).unwrap();
        assert_eq!(page.contents, vec![Content::paragraph("QUIET WORDS")]);
        assert_eq!(page.location.as_str(), "notes/a");
        assert_eq!(transform.name(), "shouter");
    }

    #[test]
    fn content_transform_uses_plugin_config() {
        let provider = load(
            content_module::<Shouter>("s"),
            "shouter",
            &settings(&[("suffix", Value::from("!"))]),
        )
        .unwrap();
        assert_eq!(provider.config().get("suffix").unwrap(), Value::from("!"));
        let transform = provider.transform(&BuildContext::default()).unwrap();
        let mut page = Page::default();
        page.contents.push(Content::paragraph("hey"));
        transform.apply(&mut page).unwrap();
        assert_eq!(page.contents, vec![Content::paragraph("HEY!")]);
    }

    #[test]
    fn tool_runs_with_dry_run_flag() {
        let provider = load(tool_module::<Greeter>("g"), "greeter", &Map::new()).unwrap();
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = BuildContext {
            output_dir: tmp.path().to_path_buf(),
            ..BuildContext::default()
        };
        provider.run_tool(&ctx, true).unwrap();
        assert!(!tmp.path().join("greeting.txt").exists());
        provider.run_tool(&ctx, false).unwrap();
        assert!(tmp.path().join("greeting.txt").exists());
    }

    #[test]
    fn tool_failure_is_tool_error() {
        let provider = load(failing_tool_module(), "doomed", &Map::new()).unwrap();
        let err = provider.run_tool(&BuildContext::default(), false).unwrap_err();
        match err {
            PluginError::Tool { plugin, message } => {
                assert_eq!(plugin, "doomed");
                assert_eq!(message, "nothing to do");
            }
            other => panic!("expected tool error, got {other}"),
        }
    }

    #[test]
    fn head_fragment_sees_context() {
        let provider = load(head_module::<SiteMeta>("h"), "meta", &Map::new()).unwrap();
        let ctx = BuildContext {
            site_title: "Field Notes".into(),
            ..BuildContext::default()
        };
        let markup = provider.head_fragment(&ctx).unwrap();
        assert_eq!(markup, r#"<meta name="site" content="Field Notes">"#);
    }

    #[test]
    fn calling_wrong_kind_is_rejected() {
        let provider = load(tool_module::<Greeter>("g"), "greeter", &Map::new()).unwrap();
        let err = provider.transform(&BuildContext::default()).unwrap_err();
        assert!(matches!(
            err,
            PluginError::WrongKind {
                expected: Kind::ContentProvider,
                actual: Kind::Tool,
                ..
            }
        ));
    }
}
