//! Shared test utilities for the nocturne test suite.
//!
//! Provides a small content tree on disk, page builders, and a set of
//! in-process plugins that go through the same loader checks as shared
//! libraries.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_site();
//! let page = page_with(vec![Content::heading(2, "Intro"), Content::paragraph("Hi")]);
//!
//! let module = plugins::content_module::<plugins::Shouter>("shouter");
//! ```

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use crate::types::{Content, Location, Page};

// =========================================================================
// Fixture setup
// =========================================================================

/// Write a small content tree into a temp directory and return it.
///
/// ```text
/// index.org
/// notes/rust.org
/// notes/draft.txt        (ignored: wrong extension)
/// .hidden/secret.org     (ignored: hidden directory)
/// ```
pub fn setup_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write_file(
        tmp.path(),
        "index.org",
        "* Home\n\nWelcome to the *notes*.\n\n** Recent\n\n- [[notes/rust.html][Rust]]\n",
    );
    write_file(
        tmp.path(),
        "notes/rust.org",
        "* Rust\n#+toc: on\n\n** Ownership\n\nEvery value has one owner.[fn:: Mostly.]\n\n#+begin_src\n    let x = 1;\n#+end_src\n\n** Borrowing\n\n#+begin_quote\nShared or mutable, never both.\n#+end_quote\n",
    );
    write_file(tmp.path(), "notes/draft.txt", "not a page");
    write_file(tmp.path(), ".hidden/secret.org", "* Secret\n");
    tmp
}

pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

// =========================================================================
// Page builders
// =========================================================================

pub fn page_with(contents: Vec<Content>) -> Page {
    let mut page = Page::new(Location::new("test"));
    page.title = "Test".to_string();
    page.contents = contents;
    page
}

pub fn quote(text: &str) -> Content {
    Content::Paragraph {
        text: text.to_string(),
        flags: crate::types::ParagraphFlags {
            quote: true,
            ..Default::default()
        },
    }
}

/// Count non-overlapping occurrences of `needle` in `haystack`.
pub fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

// =========================================================================
// In-process plugins
// =========================================================================

pub mod plugins {
    use crate::plugin::abi::{
        INIT_SYMBOL, KIND_SYMBOL, KindMarker, MAGIC, RawConfig, RawOutcome, RawStr,
    };
    use crate::plugin::sdk::{
        self, ContentPlugin, HeadPlugin, PageTransform, ToolPlugin,
    };
    use crate::plugin::{BuildContext, PluginModule, SerdeConfig};
    use crate::types::Content;
    use serde::{Deserialize, Serialize};
    use std::ffi::c_void;

    pub static BAD_MAGIC: KindMarker = KindMarker {
        magic: *b"NOTURNE!",
        kind: 1,
    };
    pub static UNKNOWN_KIND: KindMarker = KindMarker {
        magic: MAGIC,
        kind: 9,
    };
    pub static TOOL_MARKER: KindMarker = KindMarker::new(crate::plugin::abi::KIND_TOOL);

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct NoSettings {}

    /// Upper-cases every paragraph, then appends `suffix`.
    pub struct Shouter;

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct ShouterSettings {
        pub suffix: String,
    }

    impl ContentPlugin for Shouter {
        type Config = SerdeConfig<ShouterSettings>;

        fn transform(config: &Self::Config, _ctx: &BuildContext) -> Result<PageTransform, String> {
            let suffix = config.inner().suffix.clone();
            Ok(Box::new(move |page| {
                for content in &mut page.contents {
                    if let Content::Paragraph { text, .. } = content {
                        *text = format!("{}{}", text.to_uppercase(), suffix);
                    }
                }
                Ok(())
            }))
        }
    }

    /// Appends `~` to every paragraph.
    pub struct Suffixer;

    impl ContentPlugin for Suffixer {
        type Config = SerdeConfig<NoSettings>;

        fn transform(_: &Self::Config, _: &BuildContext) -> Result<PageTransform, String> {
            Ok(Box::new(|page| {
                for content in &mut page.contents {
                    if let Content::Paragraph { text, .. } = content {
                        text.push('~');
                    }
                }
                Ok(())
            }))
        }
    }

    /// Fails on pages whose title is `boom`.
    pub struct Picky;

    impl ContentPlugin for Picky {
        type Config = SerdeConfig<NoSettings>;

        fn transform(_: &Self::Config, _: &BuildContext) -> Result<PageTransform, String> {
            Ok(Box::new(|page| {
                if page.title == "boom" {
                    Err("refusing this page".to_string())
                } else {
                    Ok(())
                }
            }))
        }
    }

    /// Writes `greeting.txt` into the output directory.
    pub struct Greeter;

    impl ToolPlugin for Greeter {
        type Config = SerdeConfig<NoSettings>;

        fn run(_: &Self::Config, ctx: &BuildContext, dry_run: bool) -> Result<(), String> {
            if dry_run {
                return Ok(());
            }
            std::fs::write(ctx.output_dir.join("greeting.txt"), "hello")
                .map_err(|e| e.to_string())
        }
    }

    pub struct Failing;

    impl ToolPlugin for Failing {
        type Config = SerdeConfig<NoSettings>;

        fn run(_: &Self::Config, _: &BuildContext, _: bool) -> Result<(), String> {
            Err("nothing to do".to_string())
        }
    }

    /// Emits a meta tag carrying the site title.
    pub struct SiteMeta;

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct SiteMetaSettings {
        pub location: String,
    }

    impl HeadPlugin for SiteMeta {
        type Config = SerdeConfig<SiteMetaSettings>;

        fn fragment(_: &Self::Config, ctx: &BuildContext) -> String {
            format!(r#"<meta name="site" content="{}">"#, ctx.site_title)
        }
    }

    /// Emits a meta tag carrying the build's output directory.
    pub struct OutputMeta;

    impl HeadPlugin for OutputMeta {
        type Config = SerdeConfig<SiteMetaSettings>;

        fn fragment(_: &Self::Config, ctx: &BuildContext) -> String {
            format!(r#"<meta name="output" content="{}">"#, ctx.output_dir.display())
        }
    }

    pub fn content_module<P: ContentPlugin>(label: &str) -> Box<dyn PluginModule> {
        Box::new(sdk::linked_content_provider::<P>(label))
    }

    pub fn tool_module<P: ToolPlugin>(label: &str) -> Box<dyn PluginModule> {
        Box::new(sdk::linked_tool::<P>(label))
    }

    pub fn head_module<P: HeadPlugin>(label: &str) -> Box<dyn PluginModule> {
        Box::new(sdk::linked_head_fragment::<P>(label))
    }

    pub fn failing_tool_module() -> Box<dyn PluginModule> {
        tool_module::<Failing>("failing")
    }

    /// Wraps a module, replacing or hiding one export.
    struct Patched {
        inner: Box<dyn PluginModule>,
        name: &'static str,
        address: Option<usize>,
    }

    impl PluginModule for Patched {
        fn symbol(&self, name: &str) -> Option<*const c_void> {
            if name == self.name {
                self.address.map(|a| a as *const c_void)
            } else {
                self.inner.symbol(name)
            }
        }

        fn describe(&self) -> String {
            format!("patched:{}", self.inner.describe())
        }
    }

    pub fn module_without(inner: Box<dyn PluginModule>, name: &'static str) -> Box<dyn PluginModule> {
        Box::new(Patched {
            inner,
            name,
            address: None,
        })
    }

    pub fn module_with_marker(
        inner: Box<dyn PluginModule>,
        marker: &'static KindMarker,
    ) -> Box<dyn PluginModule> {
        Box::new(Patched {
            inner,
            name: KIND_SYMBOL,
            address: Some(marker as *const KindMarker as usize),
        })
    }

    unsafe extern "C" fn incomplete_init(_: RawStr, _: *mut RawConfig) -> RawOutcome {
        RawOutcome::ok(String::new())
    }

    /// Init reports success but never fills in the config vtable.
    pub fn broken_config_module() -> Box<dyn PluginModule> {
        let init: crate::plugin::abi::InitFn = incomplete_init;
        Box::new(Patched {
            inner: content_module::<Shouter>("broken"),
            name: INIT_SYMBOL,
            address: Some(init as usize),
        })
    }
}
