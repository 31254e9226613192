//! Markup parser: Org-flavoured source text → [`Page`].
//!
//! A single forward pass over the lines. The state is an accumulating text
//! buffer, a list accumulator with an `in_list` flag, a table accumulator and
//! an optional verbatim block (`#+begin_src`, `#+begin_export`).
//!
//! ## Line rules, in precedence order
//!
//! 1. A blank line flushes the buffer. If the whole buffer is a bare link
//!    (`[[url][text]]`) it becomes a standalone [`Content::Image`],
//!    [`Content::Youtube`], [`Content::SpotifyTrack`],
//!    [`Content::SpotifyPlaylist`] or [`Content::Link`]; otherwise, when not
//!    inside a list, it becomes a paragraph.
//! 2. A list line (`- `, `+ `, `1. `, `1) `) enters list mode. On the first
//!    such line any pending buffer is flushed as a paragraph.
//! 3. Any other line after list lines flushes the items as one list.
//! 4. A heading line (`*` run + space) is emitted immediately. A level-1
//!    heading on the very first line becomes the page title instead.
//!
//! A heading line always wins over the list it interrupts: the list and any
//! pending paragraph are flushed first, then the heading is emitted, so
//! document order is preserved.
//!
//! Comment lines (`# ...`) are skipped entirely. Directives (`#+key: value`)
//! and block markers (`#+begin_quote` ...) are handled in the same pass.
//!
//! The parser is total: anything it cannot classify degrades to paragraph
//! text, it never fails.

use crate::types::{Content, ContentError, Location, Page, ParagraphFlags, Toggle};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, instrument, warn};

static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\[([^\[\]]+)\](?:\[([^\[\]]*)\])?\]$").expect("link pattern is valid")
});

const IMAGE_SUFFIXES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp"];
const YOUTUBE_PREFIXES: &[&str] = &["https://youtu.be/", "https://www.youtube.com/watch?v="];
const SPOTIFY_TRACK_PREFIX: &str = "https://open.spotify.com/track/";
const SPOTIFY_PLAYLIST_PREFIX: &str = "https://open.spotify.com/playlist/";
const ATTENTION_LABELS: &[&str] = &["NOTE", "TIP", "IMPORTANT", "WARNING", "CAUTION"];
const BYTE_ORDER_MARK: char = '\u{feff}';

/// Parse a whole source text.
pub fn parse(location: Location, source: &str) -> Page {
    parse_lines(location, source.lines())
}

/// Parse an ordered sequence of lines.
#[instrument(level = "debug", skip_all, fields(%location))]
pub fn parse_lines<I, S>(location: Location, lines: I) -> Page
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = Parser::new(location);
    for (index, line) in lines.into_iter().enumerate() {
        parser.line(index, line.as_ref());
    }
    parser.finish()
}

#[derive(Debug)]
enum VerbatimKind {
    Source { lang: String },
    Export { unsafe_passthrough: bool },
}

#[derive(Debug)]
struct Verbatim {
    kind: VerbatimKind,
    /// Block name as written after `#+begin_`, matched by `#+end_<name>`.
    name: String,
    lines: Vec<String>,
}

struct Parser {
    page: Page,
    buffer: String,
    in_list: bool,
    list: Vec<String>,
    list_numbered: bool,
    table: Vec<Vec<String>>,
    table_headers: bool,
    verbatim: Option<Verbatim>,
    /// Flags of the enclosing quote/center/verse blocks.
    flags: ParagraphFlags,
    pending_caption: Option<String>,
    pending_gallery: Option<String>,
    pending_dropcap: bool,
}

impl Parser {
    fn new(location: Location) -> Self {
        Self {
            page: Page::new(location),
            buffer: String::new(),
            in_list: false,
            list: Vec::new(),
            list_numbered: false,
            table: Vec::new(),
            table_headers: false,
            verbatim: None,
            flags: ParagraphFlags::default(),
            pending_caption: None,
            pending_gallery: None,
            pending_dropcap: false,
        }
    }

    fn line(&mut self, index: usize, raw: &str) {
        let raw = raw.trim_end_matches('\r');
        let raw = if index == 0 {
            raw.strip_prefix(BYTE_ORDER_MARK).unwrap_or(raw)
        } else {
            raw
        };

        if self.verbatim.is_some() {
            self.verbatim_line(raw);
            return;
        }

        let line = raw.trim();
        if is_comment(line) {
            return;
        }

        if line.is_empty() {
            self.flush_table();
            self.flush_buffer();
            self.flush_list();
            return;
        }

        if let Some(directive) = line.strip_prefix("#+") {
            self.flush_all();
            self.directive(directive);
            return;
        }

        if let Some((level, text)) = heading(line) {
            if index == 0 && level == 1 {
                self.page.title = text.to_string();
                return;
            }
            self.flush_all();
            self.page.contents.push(Content::heading(level, text));
            return;
        }

        if is_horizontal_rule(line) {
            self.flush_all();
            self.page.contents.push(Content::HorizontalRule);
            return;
        }

        if line.starts_with('|') {
            self.flush_buffer_as_paragraph();
            self.flush_list();
            self.table_line(line);
            return;
        }
        self.flush_table();

        if let Some((item, numbered)) = list_item(line) {
            if !self.in_list {
                self.flush_buffer_as_paragraph();
                self.in_list = true;
                self.list_numbered = numbered;
            }
            self.list.push(item.to_string());
            return;
        }

        if self.in_list {
            self.flush_list();
        }

        if !self.buffer.is_empty() {
            self.buffer.push(' ');
        }
        self.buffer.push_str(line);
    }

    fn finish(mut self) -> Page {
        if let Some(block) = self.verbatim.take() {
            warn!(
                location = %self.page.location,
                error = %ContentError::UnterminatedBlock(block.name.clone()),
                "closing block at end of input"
            );
            self.close_verbatim(block);
        }
        self.flush_all();
        self.page
    }

    // ------------------------------------------------------------------
    // Flushing
    // ------------------------------------------------------------------

    fn flush_all(&mut self) {
        self.flush_table();
        self.flush_buffer();
        self.flush_list();
    }

    /// Rule 1: standalone link if the whole buffer is one, else a paragraph.
    fn flush_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.buffer);
        match standalone_link(text.trim()) {
            Some(Ok(mut content)) => {
                if let Content::Image { caption, .. } = &mut content
                    && caption.is_empty()
                    && let Some(pending) = self.pending_caption.take()
                {
                    *caption = pending;
                }
                self.page.contents.push(content);
            }
            Some(Err(err)) => {
                warn!(location = %self.page.location, error = %err, "keeping link as text");
                self.push_paragraph(&text);
            }
            None if !self.in_list => self.push_paragraph(&text),
            None => {}
        }
    }

    fn flush_buffer_as_paragraph(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.buffer);
        self.push_paragraph(&text);
    }

    fn flush_list(&mut self) {
        if !self.in_list {
            return;
        }
        self.in_list = false;
        let items = std::mem::take(&mut self.list);
        self.page.contents.push(Content::List {
            items,
            numbered: self.list_numbered,
            folder_hint: self.pending_gallery.take(),
            gallery: None,
        });
    }

    fn flush_table(&mut self) {
        if self.table.is_empty() {
            return;
        }
        let rows = std::mem::take(&mut self.table);
        self.page.contents.push(Content::Table {
            rows,
            headers: std::mem::take(&mut self.table_headers),
            caption: self.pending_caption.take(),
        });
    }

    fn push_paragraph(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if let Some((title, body)) = attention(text) {
            self.page.contents.push(Content::AttentionBlock {
                title: title.to_string(),
                text: body.to_string(),
            });
            return;
        }
        let mut flags = self.flags;
        flags.dropcap |= std::mem::take(&mut self.pending_dropcap);
        self.page.contents.push(Content::Paragraph {
            text: text.to_string(),
            flags,
        });
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    fn table_line(&mut self, line: &str) {
        if line.starts_with("|-") {
            if self.table.len() == 1 {
                self.table_headers = true;
            }
            return;
        }
        let inner = line.trim_start_matches('|');
        let inner = inner.strip_suffix('|').unwrap_or(inner);
        self.table
            .push(inner.split('|').map(|cell| cell.trim().to_string()).collect());
    }

    // ------------------------------------------------------------------
    // Directives and blocks
    // ------------------------------------------------------------------

    fn directive(&mut self, directive: &str) {
        let (key, value) = match directive.split_once(':') {
            Some((key, value)) if !key.contains(char::is_whitespace) => (key, value.trim()),
            _ => match directive.split_once(char::is_whitespace) {
                Some((key, rest)) => (key, rest.trim()),
                None => (directive, ""),
            },
        };
        let key = key.to_ascii_lowercase();

        match key.as_str() {
            "begin_src" => self.open_verbatim(
                "src",
                VerbatimKind::Source {
                    lang: value.split_whitespace().next().unwrap_or("").to_string(),
                },
            ),
            "begin_export" => self.open_verbatim(
                "export",
                VerbatimKind::Export {
                    unsafe_passthrough: value.split_whitespace().any(|t| t == "unsafe"),
                },
            ),
            "begin_quote" => self.flags.quote = true,
            "end_quote" => self.flags.quote = false,
            "begin_center" => self.flags.center = true,
            "end_center" => self.flags.center = false,
            "begin_verse" => self.flags.verse = true,
            "end_verse" => self.flags.verse = false,
            "begin_details" => self.page.contents.push(Content::Details {
                summary: value.to_string(),
                open: true,
            }),
            "end_details" => self.page.contents.push(Content::Details {
                summary: String::new(),
                open: false,
            }),
            "title" => self.page.title = value.to_string(),
            "caption" => self.pending_caption = Some(value.to_string()),
            "gallery" => self.pending_gallery = Some(value.to_string()),
            "dropcap" => self.pending_dropcap = true,
            "preview" => self.page.preview = Some(value.to_string()),
            "toc" | "tomb" => match Toggle::parse(value) {
                Some(toggle) if key == "toc" => self.page.toc = toggle,
                Some(toggle) => self.page.tomb = toggle,
                None => debug!(%key, %value, "ignoring unrecognised toggle value"),
            },
            "exclude_head" | "exclude_html_head" => self.page.exclude_head.push(value.to_string()),
            "head" | "html_head" => self.page.html_head.push(value.to_string()),
            "stylesheet" => self.page.push_stylesheet_once(value.to_string()),
            "script" => self.page.push_script_once(value.to_string()),
            _ => debug!(%key, "ignoring unknown directive"),
        }
    }

    fn open_verbatim(&mut self, name: &str, kind: VerbatimKind) {
        self.verbatim = Some(Verbatim {
            kind,
            name: name.to_string(),
            lines: Vec::new(),
        });
    }

    fn verbatim_line(&mut self, raw: &str) {
        let Some(block) = self.verbatim.as_mut() else {
            return;
        };
        let end = format!("#+end_{}", block.name);
        if raw.trim().eq_ignore_ascii_case(&end) {
            if let Some(block) = self.verbatim.take() {
                self.close_verbatim(block);
            }
            return;
        }
        block.lines.push(raw.to_string());
    }

    fn close_verbatim(&mut self, block: Verbatim) {
        let body = block.lines.join("\n");
        let content = match block.kind {
            VerbatimKind::Source { lang } => Content::SourceCode { lang, code: body },
            VerbatimKind::Export { unsafe_passthrough } => Content::RawMarkup {
                html: body,
                caption: self.pending_caption.take(),
                unsafe_passthrough,
            },
        };
        self.page.contents.push(content);
    }
}

// ----------------------------------------------------------------------
// Line classification
// ----------------------------------------------------------------------

fn is_comment(line: &str) -> bool {
    line == "#" || line.starts_with("# ")
}

/// `** Text` → `(2, "Text")`. The marker run must be followed by a space.
fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|&c| c == '*').count();
    if level == 0 {
        return None;
    }
    let rest = &line[level..];
    let text = rest.strip_prefix(' ')?;
    Some((level, text.trim()))
}

fn is_horizontal_rule(line: &str) -> bool {
    line.len() >= 5 && line.chars().all(|c| c == '-')
}

/// `- item` / `+ item` → `("item", false)`, `3. item` / `3) item` → `("item", true)`.
fn list_item(line: &str) -> Option<(&str, bool)> {
    if let Some(item) = line.strip_prefix("- ").or_else(|| line.strip_prefix("+ ")) {
        return Some((item.trim(), false));
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    rest.strip_prefix(". ")
        .or_else(|| rest.strip_prefix(") "))
        .map(|item| (item.trim(), true))
}

fn attention(text: &str) -> Option<(&str, &str)> {
    let (label, body) = text.split_once(':')?;
    if !ATTENTION_LABELS.contains(&label) {
        return None;
    }
    Some((label, body.trim()))
}

/// Classify a buffer that is exactly one `[[url][text]]` link.
///
/// `None` means the buffer is not a bare link at all.
pub fn standalone_link(text: &str) -> Option<Result<Content, ContentError>> {
    let captures = LINK.captures(text)?;
    let url = captures.get(1).map_or("", |m| m.as_str()).trim();
    let title = captures.get(2).map_or("", |m| m.as_str()).trim();
    Some(classify_link(url, title))
}

/// Decide what a standalone link points to, by URL shape.
pub fn classify_link(url: &str, text: &str) -> Result<Content, ContentError> {
    if url.is_empty() {
        return Err(ContentError::EmptyLinkTarget(text.to_string()));
    }
    if is_image_path(url) {
        return Ok(Content::Image {
            src: url.to_string(),
            caption: text.to_string(),
        });
    }
    if let Some(id) = YOUTUBE_PREFIXES.iter().find_map(|p| url.strip_prefix(p)) {
        return embed(id, "youtube", |id| Content::Youtube { id }, url, text);
    }
    if let Some(id) = url.strip_prefix(SPOTIFY_TRACK_PREFIX) {
        return embed(id, "spotify track", |id| Content::SpotifyTrack { id }, url, text);
    }
    if let Some(id) = url.strip_prefix(SPOTIFY_PLAYLIST_PREFIX) {
        return embed(
            id,
            "spotify playlist",
            |id| Content::SpotifyPlaylist { id },
            url,
            text,
        );
    }
    Ok(Content::Link {
        url: url.to_string(),
        text: text.to_string(),
    })
}

/// Whether a link target or list item names an image file.
pub fn is_image_path(path: &str) -> bool {
    let lower = path.trim().to_ascii_lowercase();
    IMAGE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Embeds without an id degrade to a plain link.
fn embed(
    id: &str,
    name: &'static str,
    build: impl FnOnce(String) -> Content,
    url: &str,
    text: &str,
) -> Result<Content, ContentError> {
    if id.is_empty() {
        warn!(error = %ContentError::EmptyEmbed(name), %url, "rendering as a plain link");
        return Ok(Content::Link {
            url: url.to_string(),
            text: text.to_string(),
        });
    }
    Ok(build(id.to_string()))
}
