//! C ABI shared by the host and native plugin modules.
//!
//! A plugin module exports three fixed names:
//!
//! | Export | Shape |
//! |--------|-------|
//! | [`KIND_SYMBOL`] | `static KindMarker` |
//! | [`INIT_SYMBOL`] | [`InitFn`] |
//! | [`DO_SYMBOL`] | [`DoFn`], returning a [`DoEntry`] |
//!
//! Rust has no stable ABI for closures or trait objects, so everything that
//! crosses the boundary is `#[repr(C)]`: borrowed strings ([`RawStr`]), owned
//! buffers that carry their own release function ([`RawBuffer`]), and small
//! vtables ([`RawConfig`], [`RawTransform`]). Structured values (settings,
//! build context, pages) travel as JSON text.
//!
//! The `Do` entry's call pointer is only trusted after its signature string
//! matches the one mandated for the module's kind, character for character.

use std::ffi::{CStr, c_char, c_void};

pub const KIND_SYMBOL: &str = "NOCTURNE_PLUGIN_KIND";
pub const INIT_SYMBOL: &str = "nocturne_plugin_init";
pub const DO_SYMBOL: &str = "nocturne_plugin_do";

pub const MAGIC: [u8; 8] = *b"NOCTURNE";

pub const KIND_CONTENT_PROVIDER: u32 = 1;
pub const KIND_TOOL: u32 = 2;
pub const KIND_HEAD_FRAGMENT: u32 = 3;

pub const CONTENT_PROVIDER_SIGNATURE: &CStr =
    c"nocturne/1 fn(&Config, &BuildContext) -> PageTransform";
pub const TOOL_SIGNATURE: &CStr =
    c"nocturne/1 fn(&Config, &BuildContext, bool) -> Result<(), Error>";
pub const HEAD_FRAGMENT_SIGNATURE: &CStr = c"nocturne/1 fn(&Config, &BuildContext) -> String";

/// The `NOCTURNE_PLUGIN_KIND` static.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindMarker {
    pub magic: [u8; 8],
    pub kind: u32,
}

impl KindMarker {
    pub const fn new(kind: u32) -> Self {
        Self { magic: MAGIC, kind }
    }
}

/// Borrowed UTF-8 text, valid only for the duration of one call.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl RawStr {
    pub fn new(text: &str) -> Self {
        Self {
            ptr: text.as_ptr(),
            len: text.len(),
        }
    }

    /// # Safety
    /// `ptr` must point to `len` readable bytes that outlive `'a`.
    pub unsafe fn as_str<'a>(self) -> Result<&'a str, std::str::Utf8Error> {
        if self.ptr.is_null() || self.len == 0 {
            return Ok("");
        }
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
        std::str::from_utf8(bytes)
    }
}

pub type ReleaseBufferFn = unsafe extern "C" fn(ptr: *mut u8, len: usize, capacity: usize);

/// Owned bytes, released by whichever side allocated them.
#[repr(C)]
#[derive(Debug)]
pub struct RawBuffer {
    pub ptr: *mut u8,
    pub len: usize,
    pub capacity: usize,
    pub release: Option<ReleaseBufferFn>,
}

impl RawBuffer {
    pub const fn empty() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            len: 0,
            capacity: 0,
            release: None,
        }
    }

    pub fn from_string(text: String) -> Self {
        let mut bytes = std::mem::ManuallyDrop::new(text.into_bytes());
        Self {
            ptr: bytes.as_mut_ptr(),
            len: bytes.len(),
            capacity: bytes.capacity(),
            release: Some(release_vec),
        }
    }

    /// Copy the bytes out (lossy UTF-8) and hand the buffer back to its owner.
    ///
    /// # Safety
    /// The buffer must come from [`RawBuffer::from_string`] on either side of
    /// the boundary and must not be used afterwards.
    pub unsafe fn into_string(self) -> String {
        let text = if self.ptr.is_null() || self.len == 0 {
            String::new()
        } else {
            let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
            String::from_utf8_lossy(bytes).into_owned()
        };
        if let Some(release) = self.release
            && !self.ptr.is_null()
        {
            unsafe { release(self.ptr, self.len, self.capacity) };
        }
        text
    }
}

unsafe extern "C" fn release_vec(ptr: *mut u8, len: usize, capacity: usize) {
    drop(unsafe { Vec::from_raw_parts(ptr, len, capacity) });
}

/// Success flag plus payload: the result text on success, the message on failure.
#[repr(C)]
#[derive(Debug)]
pub struct RawOutcome {
    pub ok: bool,
    pub payload: RawBuffer,
}

impl RawOutcome {
    pub fn ok(payload: String) -> Self {
        Self {
            ok: true,
            payload: RawBuffer::from_string(payload),
        }
    }

    pub fn err(message: String) -> Self {
        Self {
            ok: false,
            payload: RawBuffer::from_string(message),
        }
    }

    /// # Safety
    /// See [`RawBuffer::into_string`].
    pub unsafe fn into_result(self) -> Result<String, String> {
        let ok = self.ok;
        let text = unsafe { self.payload.into_string() };
        if ok { Ok(text) } else { Err(text) }
    }
}

pub type ConfigSetFn = unsafe extern "C" fn(handle: *mut c_void, values_json: RawStr) -> RawOutcome;
pub type ConfigGetFn = unsafe extern "C" fn(handle: *const c_void, key: RawStr) -> RawOutcome;
pub type ReleaseHandleFn = unsafe extern "C" fn(handle: *mut c_void);

/// Config capability vtable filled in by the plugin's init.
///
/// `get` answers with the field's value as JSON.
#[repr(C)]
#[derive(Debug)]
pub struct RawConfig {
    pub handle: *mut c_void,
    pub set: Option<ConfigSetFn>,
    pub get: Option<ConfigGetFn>,
    pub release: Option<ReleaseHandleFn>,
}

impl RawConfig {
    pub const fn empty() -> Self {
        Self {
            handle: std::ptr::null_mut(),
            set: None,
            get: None,
            release: None,
        }
    }
}

pub type TransformApplyFn =
    unsafe extern "C" fn(handle: *const c_void, page_json: RawStr) -> RawOutcome;

/// Page transform returned by a content provider: page JSON in, page JSON out.
#[repr(C)]
#[derive(Debug)]
pub struct RawTransform {
    pub handle: *mut c_void,
    pub apply: Option<TransformApplyFn>,
    pub release: Option<ReleaseHandleFn>,
}

impl RawTransform {
    pub const fn empty() -> Self {
        Self {
            handle: std::ptr::null_mut(),
            apply: None,
            release: None,
        }
    }
}

/// What `nocturne_plugin_do` hands back: a signature descriptor and the
/// untyped call pointer it describes.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DoEntry {
    pub signature: *const c_char,
    pub call: *const c_void,
}

pub type InitFn = unsafe extern "C" fn(settings_json: RawStr, out: *mut RawConfig) -> RawOutcome;
pub type DoFn = unsafe extern "C" fn() -> DoEntry;

pub type ContentProviderCall = unsafe extern "C" fn(
    config: *const RawConfig,
    context_json: RawStr,
    out: *mut RawTransform,
) -> RawOutcome;
pub type ToolCall =
    unsafe extern "C" fn(config: *const RawConfig, context_json: RawStr, dry_run: bool) -> RawOutcome;
pub type HeadFragmentCall =
    unsafe extern "C" fn(config: *const RawConfig, context_json: RawStr) -> RawOutcome;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_round_trip_releases() {
        let buffer = RawBuffer::from_string("hello".to_string());
        assert_eq!(buffer.len, 5);
        let text = unsafe { buffer.into_string() };
        assert_eq!(text, "hello");
    }

    #[test]
    fn empty_buffer_is_empty_string() {
        assert_eq!(unsafe { RawBuffer::empty().into_string() }, "");
    }

    #[test]
    fn outcome_maps_to_result() {
        assert_eq!(
            unsafe { RawOutcome::ok("x".into()).into_result() },
            Ok("x".to_string())
        );
        assert_eq!(
            unsafe { RawOutcome::err("bad".into()).into_result() },
            Err("bad".to_string())
        );
    }

    #[test]
    fn raw_str_views_borrowed_text() {
        let owned = String::from("settings");
        let raw = RawStr::new(&owned);
        assert_eq!(unsafe { raw.as_str() }, Ok("settings"));
    }

    #[test]
    fn signatures_are_distinct_per_kind() {
        assert_ne!(CONTENT_PROVIDER_SIGNATURE, HEAD_FRAGMENT_SIGNATURE);
        assert_ne!(CONTENT_PROVIDER_SIGNATURE, TOOL_SIGNATURE);
        assert_ne!(TOOL_SIGNATURE, HEAD_FRAGMENT_SIGNATURE);
    }
}
