//! Naming conventions shared by every stage.
//!
//! - Source files map to a [`Location`]: the path relative to the content root,
//!   extension dropped, `/`-separated (`content/notes/rust.org` → `notes/rust`).
//! - Locations map to output files (`notes/rust` → `dist/notes/rust.html`).
//! - Heading text maps to an anchor slug (`"Why Rust?"` → `why-rust`), made
//!   unique within a page by [`AnchorSet`].

use crate::types::Location;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Compute the page location of `path` relative to `root`.
///
/// Paths outside `root` keep their own components, so a single file built
/// with `nocturne file` still gets a sensible location.
pub fn location_for(path: &Path, root: &Path) -> Location {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let stemmed = relative.with_extension("");
    let parts: Vec<String> = stemmed
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Location::new(parts.join("/"))
}

/// Output file for a page location.
///
/// Dots inside the last component are kept: `notes/v1.2` → `notes/v1.2.html`.
pub fn output_path(location: &Location, output_dir: &Path) -> PathBuf {
    let mut path = output_dir.to_path_buf();
    let mut parts = location.as_str().split('/').filter(|p| !p.is_empty()).peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_some() {
            path.push(part);
        } else {
            path.push(format!("{part}.html"));
        }
    }
    path
}

/// Turn heading text into an anchor slug.
///
/// - `"Getting Started"` → `getting-started`
/// - `"*Bold* move"` → `bold-move`
/// - `"???"` → `section`
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}

/// Anchor of the generated table of contents heading.
pub const TOC_ANCHOR: &str = "table-of-contents";

/// Hands out page-unique anchors: repeats get `-2`, `-3`, ...
///
/// Every issued id is remembered, so a suffixed id never collides with a
/// heading whose own slug already ends in a number. [`TOC_ANCHOR`] is taken
/// from the start.
#[derive(Debug)]
pub struct AnchorSet {
    issued: HashSet<String>,
}

impl Default for AnchorSet {
    fn default() -> Self {
        Self {
            issued: HashSet::from([TOC_ANCHOR.to_string()]),
        }
    }
}

impl AnchorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique(&mut self, text: &str) -> String {
        let base = slugify(text);
        let mut candidate = base.clone();
        let mut n = 1;
        while self.issued.contains(&candidate) {
            n += 1;
            candidate = format!("{base}-{n}");
        }
        self.issued.insert(candidate.clone());
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_strips_root_and_extension() {
        let loc = location_for(
            Path::new("content/notes/rust.org"),
            Path::new("content"),
        );
        assert_eq!(loc.as_str(), "notes/rust");
    }

    #[test]
    fn location_outside_root_keeps_path() {
        let loc = location_for(Path::new("elsewhere/page.org"), Path::new("content"));
        assert_eq!(loc.as_str(), "elsewhere/page");
    }

    #[test]
    fn location_of_root_file() {
        let loc = location_for(Path::new("/site/index.org"), Path::new("/site"));
        assert_eq!(loc.as_str(), "index");
    }

    #[test]
    fn output_path_appends_html() {
        let path = output_path(&Location::new("notes/rust"), Path::new("dist"));
        assert_eq!(path, Path::new("dist").join("notes").join("rust.html"));
    }

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("Getting Started"), "getting-started");
        assert_eq!(slugify("Why Rust?"), "why-rust");
        assert_eq!(slugify("  *Bold* move "), "bold-move");
    }

    #[test]
    fn slugify_empty_falls_back() {
        assert_eq!(slugify("???"), "section");
        assert_eq!(slugify(""), "section");
    }

    #[test]
    fn slugify_keeps_unicode_letters() {
        assert_eq!(slugify("Café Ünïcode"), "café-ünïcode");
    }

    #[test]
    fn anchors_are_deduplicated() {
        let mut set = AnchorSet::new();
        assert_eq!(set.unique("Notes"), "notes");
        assert_eq!(set.unique("Notes"), "notes-2");
        assert_eq!(set.unique("notes!"), "notes-3");
        assert_eq!(set.unique("Other"), "other");
    }

    #[test]
    fn anchors_skip_ids_already_issued() {
        let mut set = AnchorSet::new();
        let ids: Vec<String> = ["Intro", "Intro", "Intro 2", "Intro"]
            .iter()
            .map(|text| set.unique(text))
            .collect();
        assert_eq!(ids, vec!["intro", "intro-2", "intro-2-2", "intro-3"]);
    }

    #[test]
    fn toc_anchor_is_reserved() {
        let mut set = AnchorSet::new();
        assert_eq!(set.unique("Table of Contents"), "table-of-contents-2");
    }

    #[test]
    fn output_path_keeps_dots_in_name() {
        let loc = location_for(Path::new("/site/notes/v1.2.org"), Path::new("/site"));
        assert_eq!(loc.as_str(), "notes/v1.2");
        let path = output_path(&loc, Path::new("/dist"));
        assert_eq!(path, Path::new("/dist/notes/v1.2.html"));
        assert_ne!(path, output_path(&Location::new("notes/v1"), Path::new("/dist")));
    }
}
