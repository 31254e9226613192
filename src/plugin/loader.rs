//! Opening plugin modules and checking them against the ABI.
//!
//! [`PluginModule`] is the seam between symbol resolution and the checks in
//! [`load`]: [`NativeModule`] resolves exports from a shared library through
//! `libloading`, [`StaticModule`] from a table of addresses for plugins linked
//! into the host binary. Both go through exactly the same checks.

use super::abi::{
    DO_SYMBOL, DoFn, INIT_SYMBOL, InitFn, KIND_SYMBOL, KindMarker, MAGIC, RawConfig, RawStr,
};
use super::config::{Config, ConfigAccessError, ForeignConfig};
use super::provider::{Operation, Provider};
use super::{HeadSlot, Kind, PluginError};
use libloading::Library;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::ffi::{CStr, c_void};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// A source of exported symbols.
pub trait PluginModule: Send + Sync {
    /// Address of an exported symbol, `None` when it is not exported.
    fn symbol(&self, name: &str) -> Option<*const c_void>;

    /// Human-readable origin, used in logs.
    fn describe(&self) -> String;
}

/// A shared library opened from disk.
pub struct NativeModule {
    path: PathBuf,
    digest: String,
    library: Library,
}

impl NativeModule {
    /// Open a shared library. Its static initializers run here.
    pub fn open(path: &Path) -> Result<Self, String> {
        let bytes = fs::read(path).map_err(|e| e.to_string())?;
        let digest = format!("{:x}", Sha256::digest(&bytes));
        let library = unsafe { Library::new(path) }.map_err(|e| e.to_string())?;
        Ok(Self {
            path: path.to_path_buf(),
            digest,
            library,
        })
    }

    /// SHA-256 of the module file, hex encoded.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl PluginModule for NativeModule {
    fn symbol(&self, name: &str) -> Option<*const c_void> {
        let symbol = unsafe { self.library.get::<*const c_void>(name.as_bytes()) }.ok()?;
        let address = *symbol;
        (!address.is_null()).then_some(address)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Symbols resolved from a table of addresses.
#[derive(Debug, Default)]
pub struct StaticModule {
    label: String,
    symbols: HashMap<String, usize>,
}

impl StaticModule {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            symbols: HashMap::new(),
        }
    }

    pub fn with_symbol(mut self, name: &str, address: *const c_void) -> Self {
        self.symbols.insert(name.to_string(), address as usize);
        self
    }
}

impl PluginModule for StaticModule {
    fn symbol(&self, name: &str) -> Option<*const c_void> {
        self.symbols
            .get(name)
            .filter(|address| **address != 0)
            .map(|address| *address as *const c_void)
    }

    fn describe(&self) -> String {
        format!("linked:{}", self.label)
    }
}

/// Open a shared library and load it as plugin `name`.
pub fn load_native(
    path: &Path,
    name: &str,
    settings: &Map<String, Value>,
) -> Result<Provider, PluginError> {
    let module = NativeModule::open(path).map_err(|reason| PluginError::Load {
        plugin: name.to_string(),
        path: path.to_path_buf(),
        reason,
    })?;
    info!(
        plugin = name,
        path = %path.display(),
        sha256 = module.digest(),
        "opened plugin module"
    );
    load(Box::new(module), name, settings)
}

/// Check a module against the ABI and initialise it with `settings`.
#[instrument(skip(module, settings), fields(origin = %module.describe()))]
pub fn load(
    module: Box<dyn PluginModule>,
    name: &str,
    settings: &Map<String, Value>,
) -> Result<Provider, PluginError> {
    let lookup = |symbol: &'static str| {
        module.symbol(symbol).ok_or_else(|| PluginError::Symbol {
            plugin: name.to_string(),
            symbol,
        })
    };
    let kind_address = lookup(KIND_SYMBOL)?;
    let init_address = lookup(INIT_SYMBOL)?;
    let do_address = lookup(DO_SYMBOL)?;

    let kind = read_kind(kind_address, name)?;
    debug!(%kind, "kind marker accepted");

    let config = init(init_address, name, settings)?;

    let do_fn = unsafe { std::mem::transmute::<*const c_void, DoFn>(do_address) };
    let entry = unsafe { do_fn() };
    let expected = kind.signature();
    let found = (!entry.signature.is_null()).then(|| unsafe { CStr::from_ptr(entry.signature) });
    if found != Some(expected) || entry.call.is_null() {
        return Err(PluginError::Signature {
            plugin: name.to_string(),
            expected: expected.to_string_lossy().into_owned(),
            found: match found {
                Some(found) if !entry.call.is_null() => found.to_string_lossy().into_owned(),
                Some(found) => format!("{} (null call)", found.to_string_lossy()),
                None => "<none>".to_string(),
            },
        });
    }
    let operation = unsafe { Operation::from_call(kind, entry.call) };

    let slot = match kind {
        Kind::HeadFragment => Some(head_slot(&config, name)?),
        _ => None,
    };

    info!(plugin = name, %kind, "registered plugin");
    Ok(Provider::new(
        name.to_string(),
        kind,
        config,
        operation,
        slot,
        module,
    ))
}

fn read_kind(address: *const c_void, name: &str) -> Result<Kind, PluginError> {
    let marker = unsafe { std::ptr::read_unaligned(address.cast::<KindMarker>()) };
    if marker.magic != MAGIC {
        return Err(PluginError::Type {
            plugin: name.to_string(),
            reason: "kind export is not a nocturne kind marker".to_string(),
        });
    }
    Kind::from_raw(marker.kind).ok_or_else(|| PluginError::Type {
        plugin: name.to_string(),
        reason: format!("unknown kind {}", marker.kind),
    })
}

fn init(
    address: *const c_void,
    name: &str,
    settings: &Map<String, Value>,
) -> Result<ForeignConfig, PluginError> {
    let rejected = |message: String| PluginError::Config {
        plugin: name.to_string(),
        message,
    };
    let settings_json = serde_json::to_string(settings).map_err(|e| rejected(e.to_string()))?;

    let init_fn = unsafe { std::mem::transmute::<*const c_void, InitFn>(address) };
    let mut raw = RawConfig::empty();
    let outcome = unsafe { init_fn(RawStr::new(&settings_json), &mut raw) };
    // Owns whatever init filled in, even on failure.
    let config = ForeignConfig::new(raw);
    unsafe { outcome.into_result() }.map_err(rejected)?;
    if !config.is_complete() {
        return Err(rejected("init returned an incomplete config".to_string()));
    }
    Ok(config)
}

/// `location` setting of a head fragment, `end` when the plugin has none.
fn head_slot(config: &ForeignConfig, name: &str) -> Result<HeadSlot, PluginError> {
    match config.get("location") {
        Ok(Value::String(value)) if value.trim().is_empty() => Ok(HeadSlot::End),
        Ok(Value::String(value)) => HeadSlot::parse(&value).ok_or_else(|| PluginError::Config {
            plugin: name.to_string(),
            message: format!("unknown head location `{value}`"),
        }),
        Ok(other) => Err(PluginError::Config {
            plugin: name.to_string(),
            message: format!("head location must be a string, got {other}"),
        }),
        Err(ConfigAccessError::UnknownKey(_) | ConfigAccessError::Plugin(_)) => Ok(HeadSlot::End),
        Err(e) => Err(PluginError::Config {
            plugin: name.to_string(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::plugins::{
        self, Greeter, SiteMeta, Shouter, content_module, head_module, tool_module,
    };

    fn no_settings() -> Map<String, Value> {
        Map::new()
    }

    #[test]
    fn loads_content_provider() {
        let provider = load(content_module::<Shouter>("shouter"), "shouter", &no_settings())
            .unwrap();
        assert_eq!(provider.name(), "shouter");
        assert_eq!(provider.kind(), Kind::ContentProvider);
        assert_eq!(provider.slot(), None);
    }

    #[test]
    fn missing_do_is_symbol_error() {
        let module = plugins::module_without(content_module::<Shouter>("x"), DO_SYMBOL);
        let err = load(module, "half", &no_settings()).unwrap_err();
        match err {
            PluginError::Symbol { plugin, symbol } => {
                assert_eq!(plugin, "half");
                assert_eq!(symbol, DO_SYMBOL);
            }
            other => panic!("expected symbol error, got {other}"),
        }
    }

    #[test]
    fn missing_kind_is_symbol_error() {
        let module = plugins::module_without(tool_module::<Greeter>("x"), KIND_SYMBOL);
        let err = load(module, "nokind", &no_settings()).unwrap_err();
        assert_eq!(err.step(), "lookup");
    }

    #[test]
    fn bad_magic_is_type_error() {
        let module = plugins::module_with_marker(content_module::<Shouter>("x"), &plugins::BAD_MAGIC);
        let err = load(module, "fake", &no_settings()).unwrap_err();
        assert!(matches!(err, PluginError::Type { .. }));
        assert!(err.to_string().contains("fake"));
    }

    #[test]
    fn unknown_kind_is_type_error() {
        let module =
            plugins::module_with_marker(content_module::<Shouter>("x"), &plugins::UNKNOWN_KIND);
        let err = load(module, "odd", &no_settings()).unwrap_err();
        assert_eq!(err.step(), "kind");
        assert!(err.to_string().contains("unknown kind 9"));
    }

    #[test]
    fn rejected_settings_carry_plugin_message() {
        let mut settings = Map::new();
        settings.insert("colour".into(), Value::from("red"));
        let err = load(content_module::<Shouter>("x"), "shouter", &settings).unwrap_err();
        match err {
            PluginError::Config { plugin, message } => {
                assert_eq!(plugin, "shouter");
                assert!(message.contains("colour"), "{message}");
            }
            other => panic!("expected config error, got {other}"),
        }
    }

    #[test]
    fn incomplete_config_is_config_error() {
        let err = load(plugins::broken_config_module(), "broken", &no_settings()).unwrap_err();
        assert_eq!(err.step(), "init");
    }

    #[test]
    fn kind_and_signature_mismatch_is_signature_error() {
        // Tool marker, content provider do entry.
        let module = plugins::module_with_marker(content_module::<Shouter>("x"), &plugins::TOOL_MARKER);
        let err = load(module, "confused", &no_settings()).unwrap_err();
        match err {
            PluginError::Signature {
                expected, found, ..
            } => {
                assert!(expected.contains("bool"));
                assert!(found.contains("PageTransform"));
            }
            other => panic!("expected signature error, got {other}"),
        }
    }

    #[test]
    fn head_fragment_slot_from_config() {
        let mut settings = Map::new();
        settings.insert("location".into(), Value::from("start"));
        let provider = load(head_module::<SiteMeta>("x"), "meta", &settings).unwrap();
        assert_eq!(provider.slot(), Some(HeadSlot::Start));

        let provider = load(head_module::<SiteMeta>("x"), "meta", &no_settings()).unwrap();
        assert_eq!(provider.slot(), Some(HeadSlot::End));
    }

    #[test]
    fn head_fragment_bad_slot_is_config_error() {
        let mut settings = Map::new();
        settings.insert("location".into(), Value::from("footer"));
        let err = load(head_module::<SiteMeta>("x"), "meta", &settings).unwrap_err();
        assert!(matches!(err, PluginError::Config { .. }));
    }

    #[test]
    fn missing_file_is_load_error() {
        let err = load_native(Path::new("/nonexistent/libnothing.so"), "ghost", &no_settings())
            .unwrap_err();
        assert_eq!(err.step(), "open");
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn non_library_file_is_load_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("fake.so");
        fs::write(&path, b"not a shared object").unwrap();
        let err = load_native(&path, "fake", &no_settings()).unwrap_err();
        assert!(matches!(err, PluginError::Load { .. }));
    }

    #[test]
    fn static_module_ignores_null_addresses() {
        let module = StaticModule::new("t").with_symbol("x", std::ptr::null());
        assert!(module.symbol("x").is_none());
        assert_eq!(module.describe(), "linked:t");
    }
}
