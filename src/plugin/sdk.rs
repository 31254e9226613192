//! Writing plugins in Rust.
//!
//! Implement one of [`ContentPlugin`], [`ToolPlugin`] or [`HeadPlugin`] and
//! export it from a `cdylib` crate with the matching macro:
//!
//! ```ignore
//! use nocturne::plugin::sdk::{ContentPlugin, PageTransform};
//! use nocturne::plugin::{BuildContext, SerdeConfig};
//!
//! #[derive(Default, serde::Serialize, serde::Deserialize)]
//! struct Settings { words_per_minute: u32 }
//!
//! struct ReadingTime;
//!
//! impl ContentPlugin for ReadingTime {
//!     type Config = SerdeConfig<Settings>;
//!     fn transform(config: &Self::Config, _ctx: &BuildContext) -> Result<PageTransform, String> {
//!         let wpm = config.inner().words_per_minute.max(1);
//!         Ok(Box::new(move |page| { /* ... */ Ok(()) }))
//!     }
//! }
//!
//! nocturne::export_content_provider!(ReadingTime);
//! ```
//!
//! The same plugin can be linked into a host binary instead and registered
//! through [`linked_content_provider`]; it then passes the exact checks a
//! shared library would.
//!
//! Panics never cross the boundary: every entry point catches them and
//! reports a failure outcome.

use super::BuildContext;
use super::abi::{
    CONTENT_PROVIDER_SIGNATURE, ContentProviderCall, DO_SYMBOL, DoEntry, DoFn,
    HEAD_FRAGMENT_SIGNATURE, HeadFragmentCall, INIT_SYMBOL, InitFn, KIND_CONTENT_PROVIDER,
    KIND_HEAD_FRAGMENT, KIND_SYMBOL, KIND_TOOL, KindMarker, RawConfig, RawOutcome, RawStr,
    RawTransform, TOOL_SIGNATURE, ToolCall,
};
use super::config::Config;
use super::loader::StaticModule;
use crate::types::Page;
use serde_json::{Map, Value};
use std::ffi::c_void;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Page transform handed back by a content provider.
pub type PageTransform = Box<dyn Fn(&mut Page) -> Result<(), String> + Send + Sync>;

pub trait ContentPlugin {
    type Config: Config + Default + 'static;
    fn transform(config: &Self::Config, ctx: &BuildContext) -> Result<PageTransform, String>;
}

pub trait ToolPlugin {
    type Config: Config + Default + 'static;
    fn run(config: &Self::Config, ctx: &BuildContext, dry_run: bool) -> Result<(), String>;
}

pub trait HeadPlugin {
    type Config: Config + Default + 'static;
    fn fragment(config: &Self::Config, ctx: &BuildContext) -> String;
}

pub static CONTENT_PROVIDER_MARKER: KindMarker = KindMarker::new(KIND_CONTENT_PROVIDER);
pub static TOOL_MARKER: KindMarker = KindMarker::new(KIND_TOOL);
pub static HEAD_FRAGMENT_MARKER: KindMarker = KindMarker::new(KIND_HEAD_FRAGMENT);

fn guarded(body: impl FnOnce() -> Result<String, String>) -> RawOutcome {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(payload)) => RawOutcome::ok(payload),
        Ok(Err(message)) => RawOutcome::err(message),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "plugin panicked".to_string());
            RawOutcome::err(format!("panic: {message}"))
        }
    }
}

fn read_str<'a>(raw: RawStr) -> Result<&'a str, String> {
    unsafe { raw.as_str() }.map_err(|e| format!("text is not UTF-8: {e}"))
}

fn read_context(raw: RawStr) -> Result<BuildContext, String> {
    serde_json::from_str(read_str(raw)?).map_err(|e| format!("unreadable build context: {e}"))
}

/// # Safety
/// `config` must be a vtable filled in by [`init`] for `C`.
unsafe fn config_ref<'a, C: 'static>(config: *const RawConfig) -> Result<&'a C, String> {
    let handle = unsafe { config.as_ref() }
        .map(|raw| raw.handle)
        .filter(|handle| !handle.is_null())
        .ok_or_else(|| "missing config".to_string())?;
    Ok(unsafe { &*handle.cast::<C>() })
}

// ----------------------------------------------------------------------
// Init and the config vtable
// ----------------------------------------------------------------------

/// `nocturne_plugin_init` for config type `C`: default, then `set(settings)`.
///
/// # Safety
/// `out` must point to a writable [`RawConfig`].
pub unsafe extern "C" fn init<C: Config + Default + 'static>(
    settings: RawStr,
    out: *mut RawConfig,
) -> RawOutcome {
    guarded(|| {
        let values: Map<String, Value> = match read_str(settings)? {
            "" => Map::new(),
            json => serde_json::from_str(json).map_err(|e| format!("unreadable settings: {e}"))?,
        };
        let mut config = C::default();
        config.set(&values).map_err(|e| e.to_string())?;
        let out = unsafe { out.as_mut() }.ok_or_else(|| "missing config slot".to_string())?;
        *out = RawConfig {
            handle: Box::into_raw(Box::new(config)).cast::<c_void>(),
            set: Some(config_set::<C>),
            get: Some(config_get::<C>),
            release: Some(config_release::<C>),
        };
        Ok(String::new())
    })
}

unsafe extern "C" fn config_set<C: Config + 'static>(
    handle: *mut c_void,
    values: RawStr,
) -> RawOutcome {
    guarded(|| {
        let values: Map<String, Value> = serde_json::from_str(read_str(values)?)
            .map_err(|e| format!("unreadable settings: {e}"))?;
        let config = unsafe { handle.cast::<C>().as_mut() }
            .ok_or_else(|| "missing config".to_string())?;
        config.set(&values).map_err(|e| e.to_string())?;
        Ok(String::new())
    })
}

unsafe extern "C" fn config_get<C: Config + 'static>(
    handle: *const c_void,
    key: RawStr,
) -> RawOutcome {
    guarded(|| {
        let config =
            unsafe { handle.cast::<C>().as_ref() }.ok_or_else(|| "missing config".to_string())?;
        let value = config.get(read_str(key)?).map_err(|e| e.to_string())?;
        serde_json::to_string(&value).map_err(|e| e.to_string())
    })
}

unsafe extern "C" fn config_release<C: 'static>(handle: *mut c_void) {
    if !handle.is_null() {
        drop(unsafe { Box::from_raw(handle.cast::<C>()) });
    }
}

// ----------------------------------------------------------------------
// Do entries
// ----------------------------------------------------------------------

pub fn content_provider_entry<P: ContentPlugin>() -> DoEntry {
    let call: ContentProviderCall = content_provider_call::<P>;
    DoEntry {
        signature: CONTENT_PROVIDER_SIGNATURE.as_ptr(),
        call: call as *const c_void,
    }
}

pub fn tool_entry<P: ToolPlugin>() -> DoEntry {
    let call: ToolCall = tool_call::<P>;
    DoEntry {
        signature: TOOL_SIGNATURE.as_ptr(),
        call: call as *const c_void,
    }
}

pub fn head_fragment_entry<P: HeadPlugin>() -> DoEntry {
    let call: HeadFragmentCall = head_fragment_call::<P>;
    DoEntry {
        signature: HEAD_FRAGMENT_SIGNATURE.as_ptr(),
        call: call as *const c_void,
    }
}

unsafe extern "C" fn content_provider_call<P: ContentPlugin>(
    config: *const RawConfig,
    context: RawStr,
    out: *mut RawTransform,
) -> RawOutcome {
    guarded(|| {
        let config = unsafe { config_ref::<P::Config>(config) }?;
        let ctx = read_context(context)?;
        let transform: PageTransform = P::transform(config, &ctx)?;
        let out = unsafe { out.as_mut() }.ok_or_else(|| "missing transform slot".to_string())?;
        *out = RawTransform {
            handle: Box::into_raw(Box::new(transform)).cast::<c_void>(),
            apply: Some(transform_apply),
            release: Some(transform_release),
        };
        Ok(String::new())
    })
}

unsafe extern "C" fn transform_apply(handle: *const c_void, page_json: RawStr) -> RawOutcome {
    guarded(|| {
        let transform = unsafe { handle.cast::<PageTransform>().as_ref() }
            .ok_or_else(|| "missing transform".to_string())?;
        let mut page: Page = serde_json::from_str(read_str(page_json)?)
            .map_err(|e| format!("unreadable page: {e}"))?;
        transform(&mut page)?;
        serde_json::to_string(&page).map_err(|e| e.to_string())
    })
}

unsafe extern "C" fn transform_release(handle: *mut c_void) {
    if !handle.is_null() {
        drop(unsafe { Box::from_raw(handle.cast::<PageTransform>()) });
    }
}

unsafe extern "C" fn tool_call<P: ToolPlugin>(
    config: *const RawConfig,
    context: RawStr,
    dry_run: bool,
) -> RawOutcome {
    guarded(|| {
        let config = unsafe { config_ref::<P::Config>(config) }?;
        let ctx = read_context(context)?;
        P::run(config, &ctx, dry_run).map(|()| String::new())
    })
}

unsafe extern "C" fn head_fragment_call<P: HeadPlugin>(
    config: *const RawConfig,
    context: RawStr,
) -> RawOutcome {
    guarded(|| {
        let config = unsafe { config_ref::<P::Config>(config) }?;
        let ctx = read_context(context)?;
        Ok(P::fragment(config, &ctx))
    })
}

// ----------------------------------------------------------------------
// Linked plugins
// ----------------------------------------------------------------------

extern "C" fn content_provider_do<P: ContentPlugin>() -> DoEntry {
    content_provider_entry::<P>()
}

extern "C" fn tool_do<P: ToolPlugin>() -> DoEntry {
    tool_entry::<P>()
}

extern "C" fn head_fragment_do<P: HeadPlugin>() -> DoEntry {
    head_fragment_entry::<P>()
}

fn linked_module(
    label: &str,
    marker: &'static KindMarker,
    init: InitFn,
    do_fn: DoFn,
) -> StaticModule {
    StaticModule::new(label)
        .with_symbol(KIND_SYMBOL, (marker as *const KindMarker).cast::<c_void>())
        .with_symbol(INIT_SYMBOL, init as *const c_void)
        .with_symbol(DO_SYMBOL, do_fn as *const c_void)
}

/// Module for a content provider linked into the host binary.
pub fn linked_content_provider<P: ContentPlugin>(label: &str) -> StaticModule {
    linked_module(
        label,
        &CONTENT_PROVIDER_MARKER,
        init::<P::Config>,
        content_provider_do::<P>,
    )
}

/// Module for a tool linked into the host binary.
pub fn linked_tool<P: ToolPlugin>(label: &str) -> StaticModule {
    linked_module(label, &TOOL_MARKER, init::<P::Config>, tool_do::<P>)
}

/// Module for a head fragment linked into the host binary.
pub fn linked_head_fragment<P: HeadPlugin>(label: &str) -> StaticModule {
    linked_module(
        label,
        &HEAD_FRAGMENT_MARKER,
        init::<P::Config>,
        head_fragment_do::<P>,
    )
}

// ----------------------------------------------------------------------
// Export macros
// ----------------------------------------------------------------------

/// Export a [`ContentPlugin`] from a `cdylib`.
#[macro_export]
macro_rules! export_content_provider {
    ($plugin:ty) => {
        $crate::__export_plugin!(
            $plugin,
            KIND_CONTENT_PROVIDER,
            ContentPlugin,
            content_provider_entry
        );
    };
}

/// Export a [`ToolPlugin`] from a `cdylib`.
#[macro_export]
macro_rules! export_tool {
    ($plugin:ty) => {
        $crate::__export_plugin!(
            $plugin,
            KIND_TOOL,
            ToolPlugin,
            tool_entry
        );
    };
}

/// Export a [`HeadPlugin`] from a `cdylib`.
#[macro_export]
macro_rules! export_head_fragment {
    ($plugin:ty) => {
        $crate::__export_plugin!(
            $plugin,
            KIND_HEAD_FRAGMENT,
            HeadPlugin,
            head_fragment_entry
        );
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __export_plugin {
    ($plugin:ty, $kind:ident, $trait:ident, $entry:ident) => {
        #[unsafe(no_mangle)]
        pub static NOCTURNE_PLUGIN_KIND: $crate::plugin::abi::KindMarker =
            $crate::plugin::abi::KindMarker::new($crate::plugin::abi::$kind);

        /// # Safety
        /// Called by the host with a writable config slot.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn nocturne_plugin_init(
            settings: $crate::plugin::abi::RawStr,
            out: *mut $crate::plugin::abi::RawConfig,
        ) -> $crate::plugin::abi::RawOutcome {
            unsafe { $crate::plugin::sdk::init::<<$plugin as $crate::plugin::sdk::$trait>::Config>(settings, out) }
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn nocturne_plugin_do() -> $crate::plugin::abi::DoEntry {
            $crate::plugin::sdk::$entry::<$plugin>()
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::SerdeConfig;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Flag {
        flag: bool,
    }

    fn init_with(json: &str) -> (RawConfig, Result<String, String>) {
        let mut raw = RawConfig::empty();
        let outcome = unsafe { init::<SerdeConfig<Flag>>(RawStr::new(json), &mut raw) };
        (raw, unsafe { outcome.into_result() })
    }

    fn release(raw: RawConfig) {
        if let Some(release) = raw.release {
            unsafe { release(raw.handle) };
        }
    }

    #[test]
    fn init_fills_vtable() {
        let (raw, result) = init_with(r#"{"flag": true}"#);
        assert!(result.is_ok());
        assert!(!raw.handle.is_null());

        let get = raw.get.unwrap();
        let value = unsafe { get(raw.handle, RawStr::new("flag")).into_result() };
        assert_eq!(value, Ok("true".to_string()));
        release(raw);
    }

    #[test]
    fn init_accepts_empty_settings() {
        let (raw, result) = init_with("");
        assert!(result.is_ok());
        release(raw);
    }

    #[test]
    fn init_reports_unknown_keys() {
        let (raw, result) = init_with(r#"{"flagg": true}"#);
        let message = result.unwrap_err();
        assert!(message.contains("flagg"), "{message}");
        assert!(raw.handle.is_null());
    }

    #[test]
    fn vtable_set_validates() {
        let (raw, _) = init_with("{}");
        let set = raw.set.unwrap();
        let bad = unsafe { set(raw.handle, RawStr::new(r#"{"flag": "yes"}"#)).into_result() };
        assert!(bad.is_err());
        let good = unsafe { set(raw.handle, RawStr::new(r#"{"flag": true}"#)).into_result() };
        assert!(good.is_ok());
        release(raw);
    }

    #[test]
    fn panics_become_failures() {
        let outcome = guarded(|| panic!("boom"));
        let message = unsafe { outcome.into_result() }.unwrap_err();
        assert_eq!(message, "panic: boom");
    }

    #[test]
    fn entries_carry_kind_signatures() {
        struct Noop;
        impl HeadPlugin for Noop {
            type Config = SerdeConfig<Flag>;
            fn fragment(_: &Self::Config, _: &BuildContext) -> String {
                String::new()
            }
        }
        let entry = head_fragment_entry::<Noop>();
        let signature = unsafe { std::ffi::CStr::from_ptr(entry.signature) };
        assert_eq!(signature, HEAD_FRAGMENT_SIGNATURE);
        assert!(!entry.call.is_null());
    }
}
