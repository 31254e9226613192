//! Plugin registry and loader.
//!
//! Native plugin modules are discovered from `[[plugins]]` in the site config,
//! type-checked and registered in one load phase before any page is built.
//! Loading one plugin walks fixed steps, each with its own failure:
//!
//! | Step | Failure |
//! |------|---------|
//! | open the module | [`PluginError::Load`] |
//! | look up the kind marker, init and do exports | [`PluginError::Symbol`] |
//! | check the kind marker | [`PluginError::Type`] |
//! | init with the raw settings | [`PluginError::Config`] |
//! | compare do's signature with the kind's contract | [`PluginError::Signature`] |
//!
//! A failure aborts the whole load: the [`Registry`] is only built once every
//! declared plugin has loaded, and is read-only from then on.
//!
//! Plugins come in three [`Kind`]s. Content providers hand back a page
//! transform that joins the enrichment pipeline; tools run once on operator
//! request; head fragments contribute markup to a named slot of `<head>`.

pub mod abi;
pub mod config;
pub mod loader;
pub mod provider;
pub mod registry;
pub mod sdk;

pub use config::{Config, ConfigAccessError, SerdeConfig};
pub use loader::{NativeModule, PluginModule, StaticModule};
pub use provider::{PluginTransform, Provider};
pub use registry::{Registry, RegistryBuilder};

use crate::config::SiteConfig;
use crate::types::Location;
use serde::{Deserialize, Serialize};
use std::ffi::CStr;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin `{plugin}`: cannot open {}: {reason}", .path.display())]
    Load {
        plugin: String,
        path: PathBuf,
        reason: String,
    },
    #[error("plugin `{plugin}`: missing export `{symbol}`")]
    Symbol {
        plugin: String,
        symbol: &'static str,
    },
    #[error("plugin `{plugin}`: bad kind marker: {reason}")]
    Type { plugin: String, reason: String },
    #[error("plugin `{plugin}`: settings rejected: {message}")]
    Config { plugin: String, message: String },
    #[error("plugin `{plugin}`: do signature mismatch: expected `{expected}`, found `{found}`")]
    Signature {
        plugin: String,
        expected: String,
        found: String,
    },
    #[error("plugin `{plugin}` is a {actual}, not a {expected}")]
    WrongKind {
        plugin: String,
        expected: Kind,
        actual: Kind,
    },
    #[error("plugin `{plugin}` failed: {message}")]
    Call { plugin: String, message: String },
    #[error("tool `{plugin}` failed: {message}")]
    Tool { plugin: String, message: String },
    #[error("no tool named `{0}` is registered")]
    UnknownTool(String),
    #[error("plugin `{0}` is registered twice")]
    Duplicate(String),
}

impl PluginError {
    /// Name of the plugin the error is attributed to.
    pub fn plugin(&self) -> &str {
        match self {
            Self::Load { plugin, .. }
            | Self::Symbol { plugin, .. }
            | Self::Type { plugin, .. }
            | Self::Config { plugin, .. }
            | Self::Signature { plugin, .. }
            | Self::WrongKind { plugin, .. }
            | Self::Call { plugin, .. }
            | Self::Tool { plugin, .. } => plugin,
            Self::UnknownTool(plugin) | Self::Duplicate(plugin) => plugin,
        }
    }

    /// The step that failed.
    pub fn step(&self) -> &'static str {
        match self {
            Self::Load { .. } => "open",
            Self::Symbol { .. } => "lookup",
            Self::Type { .. } => "kind",
            Self::Config { .. } => "init",
            Self::Signature { .. } => "signature",
            Self::Duplicate(_) => "register",
            Self::WrongKind { .. } | Self::Call { .. } | Self::Tool { .. } | Self::UnknownTool(_) => {
                "call"
            }
        }
    }
}

/// What a plugin contributes, fixing the call signature of its `do` export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    ContentProvider,
    Tool,
    HeadFragment,
}

impl Kind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            abi::KIND_CONTENT_PROVIDER => Some(Self::ContentProvider),
            abi::KIND_TOOL => Some(Self::Tool),
            abi::KIND_HEAD_FRAGMENT => Some(Self::HeadFragment),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            Self::ContentProvider => abi::KIND_CONTENT_PROVIDER,
            Self::Tool => abi::KIND_TOOL,
            Self::HeadFragment => abi::KIND_HEAD_FRAGMENT,
        }
    }

    /// The exact `do` signature a module of this kind must declare.
    pub fn signature(self) -> &'static CStr {
        match self {
            Self::ContentProvider => abi::CONTENT_PROVIDER_SIGNATURE,
            Self::Tool => abi::TOOL_SIGNATURE,
            Self::HeadFragment => abi::HEAD_FRAGMENT_SIGNATURE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContentProvider => "content-provider",
            Self::Tool => "tool",
            Self::HeadFragment => "head-fragment",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in `<head>` a head fragment is inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadSlot {
    /// Right after the charset and viewport meta tags.
    Start,
    /// After every other head element.
    #[default]
    End,
}

impl HeadSlot {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "end" => Some(Self::End),
            _ => None,
        }
    }
}

/// Markup produced by one head-fragment plugin for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadInsert {
    pub plugin: String,
    pub slot: HeadSlot,
    pub markup: String,
}

/// Read-only view of the build handed to plugin calls as JSON.
///
/// Plugins must not keep it past the call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildContext {
    pub site_title: String,
    pub site_url: String,
    pub language: String,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Every page location of the build, sorted.
    pub pages: Vec<Location>,
}

impl BuildContext {
    pub fn new(config: &SiteConfig, source_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            site_title: config.website.title.clone(),
            site_url: config.website.url.clone(),
            language: config.website.language.clone(),
            source_dir,
            output_dir,
            pages: Vec::new(),
        }
    }

    pub fn with_pages(mut self, mut pages: Vec<Location>) -> Self {
        pages.sort();
        self.pages = pages;
        self
    }
}
