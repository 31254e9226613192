//! Plugin settings, reachable only through a capability contract.
//!
//! The host never knows a plugin's concrete settings type. It can hand over
//! a key/value map to validate and assign ([`Config::set`]) and read one field
//! back by name ([`Config::get`]); both reject keys the plugin does not know.
//!
//! - [`SerdeConfig`] implements the contract for any serde struct and is what
//!   plugin authors normally use.
//! - [`ForeignConfig`] is the host's view of a config living inside a loaded
//!   module, driven through the [`RawConfig`] vtable.

use super::abi::{RawConfig, RawStr};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigAccessError {
    #[error("unknown setting `{0}`")]
    UnknownKey(String),
    #[error("invalid settings: {0}")]
    Invalid(String),
    /// Message reported by a plugin across the native boundary.
    #[error("{0}")]
    Plugin(String),
}

/// Validate-and-assign plus read-one-field.
pub trait Config: Send + Sync {
    fn set(&mut self, values: &Map<String, Value>) -> Result<(), ConfigAccessError>;
    fn get(&self, key: &str) -> Result<Value, ConfigAccessError>;
}

/// [`Config`] for any serde struct.
///
/// `set` only accepts keys the struct serializes, then deserializes the
/// merged object so every field is type-checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SerdeConfig<T>(pub T);

impl<T> SerdeConfig<T> {
    pub fn inner(&self) -> &T {
        &self.0
    }
}

impl<T> Config for SerdeConfig<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn set(&mut self, values: &Map<String, Value>) -> Result<(), ConfigAccessError> {
        let mut current = match serde_json::to_value(&self.0) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(ConfigAccessError::Invalid("settings must be a table".into())),
            Err(e) => return Err(ConfigAccessError::Invalid(e.to_string())),
        };
        let mut unknown: Vec<&str> = values
            .keys()
            .filter(|key| !current.contains_key(*key))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(ConfigAccessError::UnknownKey(unknown.join(", ")));
        }
        for (key, value) in values {
            current.insert(key.clone(), value.clone());
        }
        self.0 = serde_json::from_value(Value::Object(current))
            .map_err(|e| ConfigAccessError::Invalid(e.to_string()))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Value, ConfigAccessError> {
        match serde_json::to_value(&self.0) {
            Ok(Value::Object(mut map)) => map
                .remove(key)
                .ok_or_else(|| ConfigAccessError::UnknownKey(key.to_string())),
            Ok(_) => Err(ConfigAccessError::UnknownKey(key.to_string())),
            Err(e) => Err(ConfigAccessError::Invalid(e.to_string())),
        }
    }
}

/// A config object owned by a loaded module.
///
/// Released through the module's own release function on drop, so it must be
/// dropped before the module is unloaded.
#[derive(Debug)]
pub struct ForeignConfig {
    raw: RawConfig,
}

// Plugins are trusted to make their config handle usable from any thread.
unsafe impl Send for ForeignConfig {}
unsafe impl Sync for ForeignConfig {}

impl ForeignConfig {
    pub(crate) fn new(raw: RawConfig) -> Self {
        Self { raw }
    }

    /// Whether init filled in a complete vtable.
    pub(crate) fn is_complete(&self) -> bool {
        !self.raw.handle.is_null() && self.raw.set.is_some() && self.raw.get.is_some()
    }

    pub(crate) fn as_raw(&self) -> *const RawConfig {
        &self.raw
    }
}

impl Config for ForeignConfig {
    fn set(&mut self, values: &Map<String, Value>) -> Result<(), ConfigAccessError> {
        let Some(set) = self.raw.set else {
            return Err(ConfigAccessError::Plugin("config has no set entry".into()));
        };
        let json = serde_json::to_string(values)
            .map_err(|e| ConfigAccessError::Invalid(e.to_string()))?;
        let outcome = unsafe { set(self.raw.handle, RawStr::new(&json)) };
        unsafe { outcome.into_result() }
            .map(|_| ())
            .map_err(ConfigAccessError::Plugin)
    }

    fn get(&self, key: &str) -> Result<Value, ConfigAccessError> {
        let Some(get) = self.raw.get else {
            return Err(ConfigAccessError::Plugin("config has no get entry".into()));
        };
        let outcome = unsafe { get(self.raw.handle, RawStr::new(key)) };
        let json = unsafe { outcome.into_result() }.map_err(ConfigAccessError::Plugin)?;
        serde_json::from_str(&json).map_err(|e| ConfigAccessError::Invalid(e.to_string()))
    }
}

impl Drop for ForeignConfig {
    fn drop(&mut self) {
        if let Some(release) = self.raw.release
            && !self.raw.handle.is_null()
        {
            unsafe { release(self.raw.handle) };
        }
    }
}
