//! Content model shared by every stage of a page build.
//!
//! A [`Page`] is produced by the parser, mutated in place by each enrichment
//! transform, and consumed by the exporter. Its body is a flat, ordered
//! sequence of [`Content`] items; section nesting is never stored, the
//! exporter reconstructs it from heading levels.
//!
//! Pages are serialized to JSON when they are handed to a plugin transform, so
//! every type here derives `Serialize`/`Deserialize`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Content the parser or exporter could not classify.
///
/// Never fatal: the caller logs it and falls back to a default rendering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    #[error("link has an empty target: {0}")]
    EmptyLinkTarget(String),
    #[error("block `{0}` is never closed")]
    UnterminatedBlock(String),
    #[error("heading level {0} is outside 1..=6")]
    HeadingLevel(usize),
    #[error("embed `{0}` has no identifier")]
    EmptyEmbed(&'static str),
}

/// Identifier of one page: its source path relative to the content root,
/// without extension, using `/` separators (`notes/rust/lifetimes`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A per-page feature switch that falls back to a site-wide default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    #[default]
    Default,
    On,
    Off,
}

impl Toggle {
    /// Parse a directive value such as `on`, `off`, `t`, `nil`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "on" | "t" | "true" | "yes" => Some(Self::On),
            "off" | "nil" | "false" | "no" => Some(Self::Off),
            "default" | "" => Some(Self::Default),
            _ => None,
        }
    }

    pub fn resolve(self, default: bool) -> bool {
        match self {
            Self::Default => default,
            Self::On => true,
            Self::Off => false,
        }
    }
}

/// Styling flags a paragraph may carry. Several can be set at once; the
/// exporter picks exactly one via [`ParagraphFlags::style`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParagraphFlags {
    pub quote: bool,
    pub center: bool,
    pub dropcap: bool,
    pub verse: bool,
}

/// The single style a paragraph is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParagraphStyle {
    Quote,
    Center,
    DropCap,
    Plain,
}

impl ParagraphFlags {
    /// Priority: quote > center > dropcap > plain.
    pub fn style(&self) -> ParagraphStyle {
        if self.quote {
            ParagraphStyle::Quote
        } else if self.center {
            ParagraphStyle::Center
        } else if self.dropcap {
            ParagraphStyle::DropCap
        } else {
            ParagraphStyle::Plain
        }
    }

    /// Quote and verse paragraphs are grouped into a writing block.
    pub fn is_writing(&self) -> bool {
        self.quote || self.verse
    }
}

/// Marks a list as an image gallery rendered as flex tiles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gallery {
    /// Prefix joined in front of every item (`photos/2024` → `photos/2024/a.jpg`).
    pub folder: String,
}

/// One block-level unit of a page. Exactly one payload per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    Heading {
        level: usize,
        text: String,
        #[serde(default)]
        anchor: String,
        #[serde(default)]
        adjusted_level: usize,
    },
    Paragraph {
        text: String,
        #[serde(default)]
        flags: ParagraphFlags,
    },
    List {
        items: Vec<String>,
        #[serde(default)]
        numbered: bool,
        /// Folder given by a `#+gallery:` directive, consumed by gallery flagging.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        folder_hint: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gallery: Option<Gallery>,
    },
    Table {
        rows: Vec<Vec<String>>,
        #[serde(default)]
        headers: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    SourceCode {
        lang: String,
        code: String,
    },
    RawMarkup {
        html: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(default)]
        unsafe_passthrough: bool,
    },
    Image {
        src: String,
        caption: String,
    },
    Link {
        url: String,
        text: String,
    },
    Youtube {
        id: String,
    },
    SpotifyTrack {
        id: String,
    },
    SpotifyPlaylist {
        id: String,
    },
    HorizontalRule,
    /// `open == true` starts a `<details>` block, `false` ends it.
    Details {
        summary: String,
        open: bool,
    },
    AttentionBlock {
        title: String,
        text: String,
    },
}

impl Content {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::Paragraph {
            text: text.into(),
            flags: ParagraphFlags::default(),
        }
    }

    pub fn heading(level: usize, text: impl Into<String>) -> Self {
        Self::Heading {
            level,
            text: text.into(),
            anchor: String::new(),
            adjusted_level: level,
        }
    }

    pub fn list(items: Vec<String>) -> Self {
        Self::List {
            items,
            numbered: false,
            folder_hint: None,
            gallery: None,
        }
    }

    /// Short name of the variant, used in logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Heading { .. } => "heading",
            Self::Paragraph { .. } => "paragraph",
            Self::List { .. } => "list",
            Self::Table { .. } => "table",
            Self::SourceCode { .. } => "source_code",
            Self::RawMarkup { .. } => "raw_markup",
            Self::Image { .. } => "image",
            Self::Link { .. } => "link",
            Self::Youtube { .. } => "youtube",
            Self::SpotifyTrack { .. } => "spotify_track",
            Self::SpotifyPlaylist { .. } => "spotify_playlist",
            Self::HorizontalRule => "horizontal_rule",
            Self::Details { .. } => "details",
            Self::AttentionBlock { .. } => "attention_block",
        }
    }

    pub fn is_heading(&self) -> bool {
        matches!(self, Self::Heading { .. })
    }

    pub fn is_paragraph(&self) -> bool {
        matches!(self, Self::Paragraph { .. })
    }
}

/// In-memory model of one rendered document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Page {
    pub title: String,
    pub location: Location,
    pub contents: Vec<Content>,
    /// Footnote bodies, numbered from 1 in document order.
    pub footnotes: Vec<String>,
    /// Table of contents spliced in front of the body.
    pub toc: Toggle,
    /// End-marker appended to the last paragraph.
    pub tomb: Toggle,
    pub preview: Option<String>,
    /// Site-level head elements containing any of these are dropped.
    pub exclude_head: Vec<String>,
    /// Page-specific head elements, never filtered.
    pub html_head: Vec<String>,
    pub stylesheets: Vec<String>,
    pub scripts: Vec<String>,
}

impl Page {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            ..Self::default()
        }
    }

    /// Whether a site-level head element survives this page's exclusions.
    pub fn keeps_head(&self, element: &str) -> bool {
        !self
            .exclude_head
            .iter()
            .filter(|needle| !needle.is_empty())
            .any(|needle| element.contains(needle.as_str()))
    }

    pub fn has_source_code(&self) -> bool {
        self.contents
            .iter()
            .any(|c| matches!(c, Content::SourceCode { .. }))
    }

    pub fn push_script_once(&mut self, tag: String) {
        if !self.scripts.contains(&tag) {
            self.scripts.push(tag);
        }
    }

    pub fn push_stylesheet_once(&mut self, tag: String) {
        if !self.stylesheets.contains(&tag) {
            self.stylesheets.push(tag);
        }
    }
}
