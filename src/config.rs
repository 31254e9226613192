//! Site configuration module.
//!
//! Handles loading, validating, and merging `nocturne.toml`. Stock defaults
//! are serialized to a TOML table and the user's file is merged on top, so a
//! config file only needs the keys it wants to change.
//!
//! ## Config File Location
//!
//! ```text
//! content/
//! ├── nocturne.toml        # Site config (overrides stock defaults)
//! ├── index.org
//! └── notes/
//!     └── rust.org
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! [website]
//! title = "Notes"
//! url = "https://example.com"
//! language = "en"
//! preview = "Things I wrote down"   # default page description
//! styles = ["/styles/main.css"]
//! extra_head = []                    # raw elements added to every <head>
//! toc = false                        # table of contents unless a page overrides
//! tomb = true                        # end-marker after the last paragraph
//!
//! [author]
//! name = ""
//! email = ""
//!
//! [[navigation]]
//! title = "Home"
//! link = "/index.html"
//! hide = "index"                     # not shown on this page
//!
//! [syntax]
//! stylesheet = "/highlight/theme.css"
//! script = "/highlight/highlight.js"
//! default_language = ""
//!
//! [math]
//! script = "/math/mathjax.js"
//!
//! [gallery]
//! folder = "images"
//! lazy = true
//!
//! [build]
//! source_extension = "org"
//! output_dir = "dist"
//! max_processes = 4                  # omit for auto = CPU cores
//!
//! [[plugins]]
//! name = "reading-time"
//! path = "plugins/libreading_time.so"
//! [plugins.settings]
//! words_per_minute = 220
//! ```
//!
//! Unknown keys are rejected to catch typos early. Plugin `settings` tables
//! are the one exception: they are handed to the plugin untouched and the
//! plugin's own init rejects what it does not know.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the config file looked up in the content root.
pub const CONFIG_FILE: &str = "nocturne.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `nocturne.toml`.
///
/// Built once before any page is processed and passed by reference to every
/// stage; nothing mutates it afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub website: WebsiteConfig,
    pub author: AuthorConfig,
    pub navigation: Vec<NavLink>,
    pub syntax: SyntaxConfig,
    pub math: MathConfig,
    pub gallery: GalleryConfig,
    pub build: BuildConfig,
    /// Native plugins, registered in file order.
    pub plugins: Vec<PluginConfig>,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build.source_extension.trim().is_empty() {
            return Err(ConfigError::Validation(
                "build.source_extension must not be empty".into(),
            ));
        }
        if self.build.source_extension.starts_with('.') {
            return Err(ConfigError::Validation(
                "build.source_extension is given without the leading dot".into(),
            ));
        }
        if self.build.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "build.max_processes must be at least 1".into(),
            ));
        }
        for link in &self.navigation {
            if link.title.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "navigation entries need a title".into(),
                ));
            }
        }
        let mut names = HashSet::new();
        for plugin in &self.plugins {
            if plugin.name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "plugins entries need a name".into(),
                ));
            }
            if plugin.path.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "plugin `{}` has no path",
                    plugin.name
                )));
            }
            if !names.insert(plugin.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "plugin `{}` is declared twice",
                    plugin.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a declared plugin by name.
    pub fn plugin(&self, name: &str) -> Option<&PluginConfig> {
        self.plugins.iter().find(|p| p.name == name)
    }
}

/// Site identity and page-level defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebsiteConfig {
    pub title: String,
    /// Absolute site URL, used for `og:url`.
    pub url: String,
    pub language: String,
    /// Description used when a page sets no `#+preview:`.
    pub preview: String,
    /// Stylesheets linked from every page.
    pub styles: Vec<String>,
    /// Raw head elements added to every page, subject to `#+exclude_head:`.
    pub extra_head: Vec<String>,
    pub toc: bool,
    pub tomb: bool,
}

impl Default for WebsiteConfig {
    fn default() -> Self {
        Self {
            title: "Notes".to_string(),
            url: String::new(),
            language: "en".to_string(),
            preview: String::new(),
            styles: vec!["/styles/main.css".to_string()],
            extra_head: Vec::new(),
            toc: false,
            tomb: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorConfig {
    pub name: String,
    pub email: String,
}

/// One entry of the header navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NavLink {
    pub title: String,
    pub link: String,
    /// Page location on which this link is not shown (usually its own target).
    pub hide: String,
}

/// Syntax highlighting assets, added to pages that contain source code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyntaxConfig {
    pub stylesheet: String,
    pub script: String,
    /// Language given to source blocks that declare none.
    pub default_language: String,
}

impl Default for SyntaxConfig {
    fn default() -> Self {
        Self {
            stylesheet: "/highlight/theme.css".to_string(),
            script: "/highlight/highlight.js".to_string(),
            default_language: String::new(),
        }
    }
}

/// Math rendering script, added to pages that contain math delimiters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MathConfig {
    pub script: String,
}

impl Default for MathConfig {
    fn default() -> Self {
        Self {
            script: "/math/mathjax.js".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GalleryConfig {
    /// Folder prefix for gallery lists without a `#+gallery:` directive.
    pub folder: String,
    /// Emit `loading="lazy"` on gallery tiles.
    pub lazy: bool,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            folder: "images".to_string(),
            lazy: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Extension of source files, without the dot.
    pub source_extension: String,
    /// Output directory, relative to the content root unless absolute.
    pub output_dir: String,
    /// Maximum number of parallel page builds.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            source_extension: "org".to_string(),
            output_dir: "dist".to_string(),
            max_processes: None,
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &BuildConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// One `[[plugins]]` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginConfig {
    pub name: String,
    /// Path of the native module, relative to the content root unless absolute.
    pub path: String,
    /// Raw settings handed to the plugin's init.
    pub settings: toml::Table,
}

impl PluginConfig {
    /// Settings as the JSON object passed across the plugin boundary.
    pub fn settings_json(
        &self,
    ) -> Result<serde_json::Map<String, serde_json::Value>, serde_json::Error> {
        serde_json::to_value(&self.settings).and_then(serde_json::from_value)
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely, arrays included.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `nocturne.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the directory has no config file.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(root: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = root.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the site config from the content root.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `nocturne.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Nocturne Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file at the root of the content directory as nocturne.toml.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Website
# ---------------------------------------------------------------------------
[website]
title = "Notes"

# Absolute URL of the deployed site, used for og:url.
url = ""

language = "en"

# Description for pages that do not set #+preview:
preview = ""

# Stylesheets linked from every page.
styles = ["/styles/main.css"]

# Raw elements appended to every <head>. A page drops any element containing
# one of its #+exclude_head: values.
extra_head = []

# Table of contents on every page (pages override with #+toc: on/off).
toc = false

# End-marker after the last paragraph (pages override with #+tomb: on/off).
tomb = true

# ---------------------------------------------------------------------------
# Author, shown in the page header
# ---------------------------------------------------------------------------
[author]
name = ""
email = ""

# ---------------------------------------------------------------------------
# Navigation, one [[navigation]] table per link
# ---------------------------------------------------------------------------
# [[navigation]]
# title = "Home"
# link = "/index.html"
# hide = "index"    # page location on which this link is not shown

# ---------------------------------------------------------------------------
# Syntax highlighting, added to pages with source blocks
# ---------------------------------------------------------------------------
[syntax]
stylesheet = "/highlight/theme.css"
script = "/highlight/highlight.js"

# Language for source blocks that declare none ("" keeps them plaintext).
default_language = ""

# ---------------------------------------------------------------------------
# Math, added to pages containing $$...$$ or \(...\)
# ---------------------------------------------------------------------------
[math]
script = "/math/mathjax.js"

# ---------------------------------------------------------------------------
# Galleries (lists made only of image paths)
# ---------------------------------------------------------------------------
[gallery]
# Folder prefix for galleries without a #+gallery: directive.
folder = "images"
lazy = true

# ---------------------------------------------------------------------------
# Build
# ---------------------------------------------------------------------------
[build]
# Extension of source files, without the dot.
source_extension = "org"

# Output directory, relative to the content root unless absolute.
output_dir = "dist"

# Maximum parallel page builds.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Plugins, registered in the order listed
# ---------------------------------------------------------------------------
# [[plugins]]
# name = "reading-time"
# path = "plugins/libreading_time.so"
# [plugins.settings]
# words_per_minute = 220
"##
}
