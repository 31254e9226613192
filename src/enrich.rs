//! Enrichment pipeline: ordered transforms applied to a parsed page.
//!
//! Every transform mutates the page in place and sees the cumulative effect of
//! the ones before it. Built-ins run first, in a fixed order:
//!
//! | # | Transform | Effect |
//! |---|-----------|--------|
//! | 1 | `comments` | drops `COMMENT` headings and their sections |
//! | 2 | `headings` | unique anchors, levels shifted so the shallowest is 1 |
//! | 3 | `footnotes` | `[fn:: text]` → `[fn:N]`, bodies collected in order |
//! | 4 | `math` | math script added to pages using `$$` or `\(` |
//! | 5 | `source-trim` | common leading whitespace removed from source blocks |
//! | 6 | `syntax` | default language, highlighter assets |
//! | 7 | `gallery` | image-only lists flagged as galleries |
//!
//! Content-provider plugin transforms follow in registration order. A
//! transform may splice content anywhere, index 0 included.
//!
//! Transforms run exactly once per page per build; none is required to be
//! idempotent.

use crate::config::SiteConfig;
use crate::naming::AnchorSet;
use crate::parse::is_image_path;
use crate::types::{Content, Gallery, Page};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, instrument, trace};

static FOOTNOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[fn::\s*([^\]]*?)\s*\]").expect("footnote pattern is valid"));

#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("transform `{transform}` failed: {message}")]
    Transform { transform: String, message: String },
}

/// One step of the pipeline.
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, page: &mut Page) -> Result<(), EnrichError>;
}

/// Ordered list of transforms.
#[derive(Default)]
pub struct Pipeline<'a> {
    transforms: Vec<Box<dyn Transform + 'a>>,
}

impl<'a> Pipeline<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The seven built-ins, configured from the site config.
    pub fn builtin(config: &SiteConfig) -> Self {
        let mut pipeline = Self::new();
        pipeline.push(ResolveComments);
        pipeline.push(HeadingAnchors);
        pipeline.push(NumberFootnotes);
        pipeline.push(MarkMath {
            script: config.math.script.clone(),
        });
        pipeline.push(TrimSourceIndent);
        pipeline.push(TagSyntax {
            default_language: config.syntax.default_language.clone(),
            stylesheet: config.syntax.stylesheet.clone(),
            script: config.syntax.script.clone(),
        });
        pipeline.push(FlagGalleries {
            folder: config.gallery.folder.clone(),
        });
        pipeline
    }

    /// Built-ins followed by `plugins`, order preserved.
    pub fn with_plugins<T>(config: &SiteConfig, plugins: impl IntoIterator<Item = T>) -> Self
    where
        T: Transform + 'a,
    {
        let mut pipeline = Self::builtin(config);
        for plugin in plugins {
            pipeline.push(plugin);
        }
        pipeline
    }

    pub fn push(&mut self, transform: impl Transform + 'a) {
        self.transforms.push(Box::new(transform));
    }

    pub fn names(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Apply every transform in order. Stops at the first failure.
    #[instrument(level = "debug", skip_all, fields(location = %page.location))]
    pub fn run(&self, page: &mut Page) -> Result<(), EnrichError> {
        for transform in &self.transforms {
            transform.apply(page)?;
            trace!(transform = transform.name(), items = page.contents.len(), "applied");
        }
        Ok(())
    }
}

// =========================================================================
// Built-ins
// =========================================================================

/// Drops every heading whose text starts with `COMMENT`, together with the
/// items under it up to the next heading of the same or a higher rank.
pub struct ResolveComments;

impl Transform for ResolveComments {
    fn name(&self) -> &str {
        "comments"
    }

    fn apply(&self, page: &mut Page) -> Result<(), EnrichError> {
        let mut skipping: Option<usize> = None;
        let before = page.contents.len();
        page.contents.retain(|content| {
            if let Content::Heading { level, text, .. } = content {
                if skipping.is_some_and(|depth| *level > depth) {
                    return false;
                }
                skipping = None;
                if is_comment_heading(text) {
                    skipping = Some(*level);
                    return false;
                }
                return true;
            }
            skipping.is_none()
        });
        if page.contents.len() != before {
            debug!(
                location = %page.location,
                removed = before - page.contents.len(),
                "dropped commented sections"
            );
        }
        Ok(())
    }
}

fn is_comment_heading(text: &str) -> bool {
    text == "COMMENT" || text.starts_with("COMMENT ")
}

/// Assigns page-unique anchors and shifts levels so the shallowest heading
/// on the page renders at level 1.
pub struct HeadingAnchors;

impl Transform for HeadingAnchors {
    fn name(&self) -> &str {
        "headings"
    }

    fn apply(&self, page: &mut Page) -> Result<(), EnrichError> {
        let min_level = page
            .contents
            .iter()
            .filter_map(|c| match c {
                Content::Heading { level, .. } => Some(*level),
                _ => None,
            })
            .min()
            .unwrap_or(1);
        let mut anchors = AnchorSet::new();
        for content in &mut page.contents {
            if let Content::Heading {
                level,
                text,
                anchor,
                adjusted_level,
            } = content
            {
                *anchor = anchors.unique(text);
                *adjusted_level = *level - min_level + 1;
            }
        }
        Ok(())
    }
}

/// Replaces inline `[fn:: text]` with numbered `[fn:N]` references.
pub struct NumberFootnotes;

impl Transform for NumberFootnotes {
    fn name(&self) -> &str {
        "footnotes"
    }

    fn apply(&self, page: &mut Page) -> Result<(), EnrichError> {
        let Page {
            contents,
            footnotes,
            ..
        } = page;
        let mut number = |text: &mut String| {
            if !text.contains("[fn::") {
                return;
            }
            let replaced = FOOTNOTE
                .replace_all(text.as_str(), |caps: &regex::Captures| {
                    footnotes.push(caps[1].to_string());
                    format!("[fn:{}]", footnotes.len())
                })
                .into_owned();
            *text = replaced;
        };
        for content in contents.iter_mut() {
            for_each_text(content, &mut number);
        }
        Ok(())
    }
}

/// Adds the math script once to pages that contain display or inline math.
pub struct MarkMath {
    pub script: String,
}

impl Transform for MarkMath {
    fn name(&self) -> &str {
        "math"
    }

    fn apply(&self, page: &mut Page) -> Result<(), EnrichError> {
        if self.script.is_empty() {
            return Ok(());
        }
        let mut found = false;
        for content in &mut page.contents {
            for_each_text(content, &mut |text: &mut String| {
                found |= text.contains("$$") || text.contains("\\(");
            });
        }
        if found {
            page.push_script_once(self.script.clone());
        }
        Ok(())
    }
}

/// Removes the indentation shared by every non-blank line of a source block.
pub struct TrimSourceIndent;

impl Transform for TrimSourceIndent {
    fn name(&self) -> &str {
        "source-trim"
    }

    fn apply(&self, page: &mut Page) -> Result<(), EnrichError> {
        for content in &mut page.contents {
            if let Content::SourceCode { code, .. } = content {
                *code = trim_common_indent(code);
            }
        }
        Ok(())
    }
}

pub fn trim_common_indent(code: &str) -> String {
    let indent = code
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    code.lines()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                &line[indent..]
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fills in the default language and links the highlighter assets.
pub struct TagSyntax {
    pub default_language: String,
    pub stylesheet: String,
    pub script: String,
}

impl Transform for TagSyntax {
    fn name(&self) -> &str {
        "syntax"
    }

    fn apply(&self, page: &mut Page) -> Result<(), EnrichError> {
        if !page.has_source_code() {
            return Ok(());
        }
        if !self.default_language.is_empty() {
            for content in &mut page.contents {
                if let Content::SourceCode { lang, .. } = content
                    && lang.is_empty()
                {
                    *lang = self.default_language.clone();
                }
            }
        }
        if !self.stylesheet.is_empty() {
            page.push_stylesheet_once(self.stylesheet.clone());
        }
        if !self.script.is_empty() {
            page.push_script_once(self.script.clone());
        }
        Ok(())
    }
}

/// Flags lists made only of image paths as galleries.
pub struct FlagGalleries {
    /// Folder used when the list carries no `#+gallery:` hint.
    pub folder: String,
}

impl Transform for FlagGalleries {
    fn name(&self) -> &str {
        "gallery"
    }

    fn apply(&self, page: &mut Page) -> Result<(), EnrichError> {
        for content in &mut page.contents {
            if let Content::List {
                items,
                folder_hint,
                gallery,
                ..
            } = content
                && !items.is_empty()
                && items.iter().all(|item| is_image_path(item))
            {
                *gallery = Some(Gallery {
                    folder: folder_hint.clone().unwrap_or_else(|| self.folder.clone()),
                });
            }
        }
        Ok(())
    }
}

/// Visit every inline-text field of an item.
fn for_each_text(content: &mut Content, visit: &mut impl FnMut(&mut String)) {
    match content {
        Content::Paragraph { text, .. } | Content::AttentionBlock { text, .. } => visit(text),
        Content::List { items, .. } => items.iter_mut().for_each(|item| visit(item)),
        Content::Table { rows, .. } => rows
            .iter_mut()
            .flat_map(|row| row.iter_mut())
            .for_each(|cell| visit(cell)),
        _ => {}
    }
}
