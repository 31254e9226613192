//! # Nocturne
//!
//! A static site generator for Org-flavoured notes. Each source file becomes
//! one HTML page; native plugins can reshape pages, add markup to `<head>`,
//! or run one-shot tools over the whole build.
//!
//! # Architecture: One Page, Three Stages
//!
//! ```text
//! 1. Parse     notes/rust.org  →  Page          (line-by-line state machine)
//! 2. Enrich    Page            →  Page          (built-ins, then plugin transforms)
//! 3. Export    Page            →  rust.html     (single pass, section/writing FSM)
//! ```
//!
//! Pages never share mutable state. The site config and the plugin registry
//! are built once, frozen, and borrowed by every page build, so a directory
//! build is a plain `par_iter` over sources.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | Content model: `Page`, `Content`, `Location`, `Toggle` |
//! | [`naming`] | Source path → location, location → output path, anchor slugs |
//! | [`parse`] | Markup parser: text → `Page` |
//! | [`enrich`] | Enrichment pipeline and its seven built-in transforms |
//! | [`plugin`] | Native plugin ABI, loader, registry and plugin-author SDK |
//! | [`export`] | HTML exporter: `Page` → document string |
//! | [`config`] | `nocturne.toml` loading, merging over stock defaults, validation |
//! | [`scan`] | Source discovery under the content root |
//! | [`generate`] | Page and directory builds, tool runs |
//! | [`output`] | CLI output formatting |
//!
//! # Plugins
//!
//! A plugin is a shared library exporting three symbols (see [`plugin::abi`]).
//! Loading checks each one in turn (open, symbol lookup, kind marker, init,
//! call signature) and fails with the plugin's name and the failing step.
//! All plugins load before the first page is parsed; one failure aborts the
//! build. Plugin authors write a trait impl and one macro call:
//!
//! ```ignore
//! use nocturne::plugin::{sdk::{ContentPlugin, PageTransform}, BuildContext, SerdeConfig};
//!
//! #[derive(Default, serde::Serialize, serde::Deserialize)]
//! struct Settings { marker: String }
//!
//! struct Marker;
//!
//! impl ContentPlugin for Marker {
//!     type Config = SerdeConfig<Settings>;
//!     fn transform(config: &Self::Config, _: &BuildContext) -> Result<PageTransform, String> {
//!         let marker = config.inner().marker.clone();
//!         Ok(Box::new(move |page| {
//!             page.title.push_str(&marker);
//!             Ok(())
//!         }))
//!     }
//! }
//!
//! nocturne::export_content_provider!(Marker);
//! ```
//!
//! # Design Decisions
//!
//! ## Maud For The Frame, Strings For Boundaries
//!
//! Document frame and per-item fragments are [Maud](https://maud.lambda.xyz/)
//! templates, auto-escaped and balanced. Section and writing wrappers span
//! several items, so they are plain string constants emitted by a small state
//! machine ([`export::DivState`]) that is tested on its own.
//!
//! ## JSON Across The Plugin Boundary
//!
//! Rust has no stable ABI, so nothing but `#[repr(C)]` structs and byte
//! buffers crosses into plugin code. Settings, build context and pages travel
//! as JSON; buffers are released by the side that allocated them.

pub mod config;
pub mod enrich;
pub mod export;
pub mod generate;
pub mod naming;
pub mod output;
pub mod parse;
pub mod plugin;
pub mod scan;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
