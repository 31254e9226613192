//! HTML exporter: an enriched [`Page`] to one HTML document.
//!
//! The body is rendered in a single left-to-right pass. Each item gets its
//! fragment from [`content::render`]; [`state::DivState`] decides which
//! section and writing wrappers open or close around it.
//!
//! ## Document frame
//!
//! ```text
//! <head>
//!   charset, viewport, title
//!   head-fragment plugins (start slot)
//!   site styles, meta tags, page stylesheets, scripts, site extra_head
//!   page html_head                      (never filtered)
//!   head-fragment plugins (end slot)
//! </head>
//! <body class="article">
//!   header: site title, page title, author, navigation
//!   [table of contents]
//!   sections...
//!   footnotes
//! </body>
//! ```
//!
//! Site-level head elements and plugin fragments are dropped when they
//! contain one of the page's `#+exclude_head:` needles.

mod content;
mod inline;
mod state;

pub use content::map_source_code_lang;
pub use inline::render as render_inline;
pub use state::{DivState, Flavor};

use crate::config::SiteConfig;
use crate::naming::TOC_ANCHOR;
use crate::plugin::{HeadInsert, HeadSlot};
use crate::types::{Content, Page};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use tracing::{debug, instrument};

/// Appended to the last paragraph of pages with the end marker on.
pub const TOMB: &str = " ◼";

pub const TOC_TITLE: &str = "Table of Contents";

/// Renders pages for one build. Cheap to share between threads.
#[derive(Debug, Clone, Copy)]
pub struct Exporter<'a> {
    config: &'a SiteConfig,
    inserts: &'a [HeadInsert],
}

impl<'a> Exporter<'a> {
    pub fn new(config: &'a SiteConfig, inserts: &'a [HeadInsert]) -> Self {
        Self { config, inserts }
    }

    /// Render `page` to a complete HTML document.
    #[instrument(level = "debug", skip_all, fields(location = %page.location))]
    pub fn export(&self, mut page: Page) -> String {
        if page.tomb.resolve(self.config.website.tomb) {
            add_tomb(&mut page);
        }
        if page.toc.resolve(self.config.website.toc) {
            let body = std::mem::take(&mut page.contents);
            page.contents = table_of_contents(&body);
            page.contents.extend(body);
        }

        let fragments: Vec<(Flavor, String)> = page
            .contents
            .iter()
            .map(|item| (Flavor::of(item), content::render(item, self.config)))
            .collect();
        let body = state::assemble(
            fragments
                .iter()
                .map(|(flavor, fragment)| (*flavor, fragment.as_str())),
        );
        debug!(items = page.contents.len(), bytes = body.len(), "rendered body");

        html! {
            (DOCTYPE)
            html lang=(self.config.website.language) {
                head {
                    meta charset="UTF-8";
                    meta name="viewport" content="width=device-width, initial-scale=1.0";
                    title { (self.document_title(&page)) }
                    (self.head_elements(&page))
                }
                body.article {
                    (self.header(&page))
                    (PreEscaped(body))
                    (footnotes(&page.footnotes))
                }
            }
        }
        .into_string()
    }

    fn document_title(&self, page: &Page) -> String {
        let site = &self.config.website.title;
        if page.title.is_empty() {
            site.clone()
        } else if site.is_empty() {
            page.title.clone()
        } else {
            format!("{} | {site}", page.title)
        }
    }

    fn inserts_for(&self, slot: HeadSlot) -> impl Iterator<Item = &str> {
        self.inserts
            .iter()
            .filter(move |insert| insert.slot == slot)
            .map(|insert| insert.markup.as_str())
    }

    /// Every site-level head element, in order, before exclusions.
    fn site_head(&self, page: &Page) -> Vec<String> {
        let website = &self.config.website;
        let mut elements: Vec<String> = website
            .styles
            .iter()
            .map(|href| stylesheet_link(href))
            .collect();

        let preview = page
            .preview
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&website.preview);
        if !preview.is_empty() {
            elements.push(html! { meta name="description" content=(preview); }.into_string());
            elements.push(html! { meta property="og:description" content=(preview); }.into_string());
        }
        elements.push(html! { meta property="og:title" content=(self.document_title(page)); }.into_string());
        if !website.url.is_empty() {
            let url = format!(
                "{}/{}.html",
                website.url.trim_end_matches('/'),
                page.location
            );
            elements.push(html! { meta property="og:url" content=(url); }.into_string());
        }

        elements.extend(page.stylesheets.iter().map(|href| stylesheet_link(href)));
        elements.extend(
            page.scripts
                .iter()
                .map(|src| html! { script src=(src) defer {} }.into_string()),
        );
        elements.extend(website.extra_head.iter().cloned());
        elements
    }

    fn head_elements(&self, page: &Page) -> Markup {
        let start = self.inserts_for(HeadSlot::Start).filter(|e| page.keeps_head(e));
        let site = self.site_head(page);
        let end = self.inserts_for(HeadSlot::End).filter(|e| page.keeps_head(e));
        html! {
            @for element in start { (PreEscaped(element)) }
            @for element in site.iter().filter(|e| page.keeps_head(e)) { (PreEscaped(element)) }
            @for element in &page.html_head { (PreEscaped(element)) }
            @for element in end { (PreEscaped(element)) }
        }
    }

    fn header(&self, page: &Page) -> Markup {
        let website = &self.config.website;
        let author = &self.config.author;
        let links: Vec<_> = self
            .config
            .navigation
            .iter()
            .filter(|link| link.hide != page.location.as_str())
            .collect();
        html! {
            div.header {
                a.site-title href="/" { (website.title) }
                h1 class="section-1" { (PreEscaped(inline::render(&page.title))) }
                div.menu {
                    @if !author.name.is_empty() {
                        span #author .author { (author.name) }
                        br;
                    }
                    @if !author.email.is_empty() {
                        span #email .email {
                            a href={ "mailto:" (author.email) } { (author.email) }
                        }
                        br;
                    }
                    span #revdate {
                        @for (i, link) in links.iter().enumerate() {
                            @if i > 0 { " | " }
                            a href=(link.link) { (link.title) }
                        }
                    }
                }
            }
        }
    }
}

/// Render `page` with no head-fragment plugins.
pub fn export(page: Page, config: &SiteConfig) -> String {
    Exporter::new(config, &[]).export(page)
}

fn stylesheet_link(href: &str) -> String {
    html! { link rel="stylesheet" type="text/css" href=(href); }.into_string()
}

fn add_tomb(page: &mut Page) {
    let last = page
        .contents
        .iter_mut()
        .rev()
        .find_map(|content| match content {
            Content::Paragraph { text, .. } => Some(text),
            _ => None,
        });
    if let Some(text) = last {
        text.push_str(TOMB);
    }
}

/// Heading, anchor list and rule placed before the first item.
fn table_of_contents(contents: &[Content]) -> Vec<Content> {
    let items: Vec<String> = contents
        .iter()
        .filter_map(|content| match content {
            Content::Heading { text, anchor, .. } if !anchor.is_empty() => {
                Some(format!("[[#{anchor}][{text}]]"))
            }
            _ => None,
        })
        .collect();
    vec![
        Content::Heading {
            level: 2,
            text: TOC_TITLE.to_string(),
            anchor: TOC_ANCHOR.to_string(),
            adjusted_level: 1,
        },
        Content::list(items),
        Content::HorizontalRule,
    ]
}

fn footnotes(notes: &[String]) -> Markup {
    html! {
        @if !notes.is_empty() {
            div #footnotes {
                hr;
                @for (i, note) in notes.iter().enumerate() {
                    @let n = i + 1;
                    div.footnote id={ "fn-" (n) } {
                        sup { a href={ "#fnref-" (n) } { (n) } }
                        " "
                        (PreEscaped(inline::render(note)))
                    }
                }
            }
        }
    }
}
