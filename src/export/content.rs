//! Per-kind HTML fragments.
//!
//! Every function here is total: malformed payloads still render something
//! sensible. Headings and details markers are intentionally unbalanced; the
//! closing tags come from [`super::state`] or a later `Details` item.

use super::inline;
use crate::config::SiteConfig;
use crate::types::{Content, ContentError, Gallery, ParagraphFlags, ParagraphStyle};
use maud::{Markup, PreEscaped, html};
use tracing::warn;

/// Source languages renamed for the highlighter.
const LANGUAGE_OVERRIDES: &[(&str, &str)] = &[("", "plaintext"), ("sh", "bash")];

/// Map a source block language to the name the highlighter expects.
///
/// ```
/// use nocturne::export::map_source_code_lang;
/// assert_eq!(map_source_code_lang(""), "plaintext");
/// assert_eq!(map_source_code_lang("sh"), "bash");
/// assert_eq!(map_source_code_lang("rust"), "rust");
/// ```
pub fn map_source_code_lang(lang: &str) -> &str {
    LANGUAGE_OVERRIDES
        .iter()
        .find(|(from, _)| *from == lang)
        .map_or(lang, |(_, to)| to)
}

/// Render one content item.
pub fn render(content: &Content, config: &SiteConfig) -> String {
    match content {
        Content::Heading {
            level,
            text,
            anchor,
            adjusted_level,
        } => heading(*level, *adjusted_level, text, anchor),
        Content::Paragraph { text, flags } => paragraph(text, flags).into_string(),
        Content::List {
            items,
            numbered,
            gallery,
            ..
        } => match gallery {
            Some(gallery) => gallery_tiles(items, gallery, config.gallery.lazy).into_string(),
            None => list(items, *numbered).into_string(),
        },
        Content::Table {
            rows,
            headers,
            caption,
        } => table(rows, *headers, caption.as_deref()).into_string(),
        Content::SourceCode { lang, code } => source_code(lang, code).into_string(),
        Content::RawMarkup {
            html,
            caption,
            unsafe_passthrough,
        } => {
            if *unsafe_passthrough {
                html.clone()
            } else {
                raw_markup(html, caption.as_deref()).into_string()
            }
        }
        Content::Image { src, caption } => image(src, caption, config.gallery.lazy).into_string(),
        Content::Link { url, text } => html! {
            div.paragraph {
                p { a href=(url) { (if text.is_empty() { url } else { text }) } }
            }
        }
        .into_string(),
        Content::Youtube { id } => embed(
            "youtube",
            &format!("https://www.youtube.com/embed/{id}"),
            "315",
        )
        .into_string(),
        Content::SpotifyTrack { id } => embed(
            "spotify",
            &format!("https://open.spotify.com/embed/track/{id}"),
            "152",
        )
        .into_string(),
        Content::SpotifyPlaylist { id } => embed(
            "spotify",
            &format!("https://open.spotify.com/embed/playlist/{id}"),
            "380",
        )
        .into_string(),
        Content::HorizontalRule => "<hr>".to_string(),
        Content::Details { summary, open } => {
            if *open {
                format!(
                    "<details>\n<summary>{}</summary>\n<hr>",
                    inline::render(summary)
                )
            } else {
                "</details>".to_string()
            }
        }
        Content::AttentionBlock { title, text } => attention(title, text).into_string(),
    }
}

/// Opens `<div class="sectN">` and its section body. Closed by the state machine.
fn heading(level: usize, adjusted_level: usize, text: &str, anchor: &str) -> String {
    let tag = if (1..=6).contains(&level) {
        level
    } else {
        warn!(error = %ContentError::HeadingLevel(level), text, "clamping heading level");
        level.clamp(1, 6)
    };
    let anchor = if anchor.is_empty() {
        String::new()
    } else {
        format!(" id=\"{}\"", inline::escape(anchor))
    };
    format!(
        "\n<div class=\"sect{}\">\n<h{tag}{anchor}>{}</h{tag}>\n<div class=\"sectionbody\">",
        adjusted_level.max(1),
        inline::render(text),
    )
}

fn paragraph_class(flags: &ParagraphFlags) -> &'static str {
    match flags.style() {
        ParagraphStyle::Quote => "paragraph quote",
        ParagraphStyle::Center => "paragraph center",
        ParagraphStyle::DropCap => "paragraph dropcap",
        ParagraphStyle::Plain => "paragraph",
    }
}

fn paragraph(text: &str, flags: &ParagraphFlags) -> Markup {
    html! {
        div class=(paragraph_class(flags)) {
            p { (PreEscaped(inline::render(text))) }
        }
    }
}

fn list(items: &[String], numbered: bool) -> Markup {
    let body = html! {
        @for item in items {
            li { p { (PreEscaped(inline::render(item))) } }
        }
    };
    if numbered {
        html! { div.olist { ol { (body) } } }
    } else {
        html! { div.ulist { ul { (body) } } }
    }
}

fn tile_source(folder: &str, item: &str) -> String {
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        item.to_string()
    } else {
        format!("{folder}/{}", item.trim_start_matches('/'))
    }
}

fn gallery_tiles(items: &[String], gallery: &Gallery, lazy: bool) -> Markup {
    html! {
        center {
            div.gallery {
                @for item in items {
                    img.item
                        height="33%"
                        width="33%"
                        src=(tile_source(&gallery.folder, item))
                        loading=[lazy.then_some("lazy")];
                }
            }
        }
    }
}

fn table(rows: &[Vec<String>], headers: bool, caption: Option<&str>) -> Markup {
    html! {
        div.tableblock {
            @if let Some(caption) = caption {
                div.title { (PreEscaped(inline::render(caption))) }
            }
            table {
                @for (i, row) in rows.iter().enumerate() {
                    tr {
                        @for cell in row {
                            @if i == 0 && headers {
                                th { (PreEscaped(inline::render(cell))) }
                            } @else {
                                td { (PreEscaped(inline::render(cell))) }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn source_code(lang: &str, code: &str) -> Markup {
    let lang = map_source_code_lang(lang);
    // `,#` protects `#` lines from the block parser.
    let code = code.replace(",#", "#");
    html! {
        div.listingblock {
            div.content {
                pre.highlight {
                    code class={ "language-" (lang) } data-lang=(lang) { (code) }
                }
            }
        }
    }
}

fn raw_markup(markup: &str, caption: Option<&str>) -> Markup {
    html! {
        div.mediablock {
            div.content { (PreEscaped(markup)) }
            @if let Some(caption) = caption {
                div.title { (PreEscaped(inline::render(caption))) }
            }
        }
    }
}

fn image(src: &str, caption: &str, lazy: bool) -> Markup {
    html! {
        div.imageblock {
            div.content {
                img src=(src) alt=(caption) loading=[lazy.then_some("lazy")];
            }
            @if !caption.is_empty() {
                div.title { (PreEscaped(inline::render(caption))) }
            }
        }
    }
}

fn embed(class: &str, src: &str, height: &str) -> Markup {
    html! {
        div class={ "embed " (class) } {
            iframe
                src=(src)
                width="100%"
                height=(height)
                frameborder="0"
                allowfullscreen
                loading="lazy" {}
        }
    }
}

fn attention(title: &str, text: &str) -> Markup {
    html! {
        div class={ "admonitionblock " (title.to_ascii_lowercase()) } {
            table {
                tr {
                    td.icon { div.title { (title) } }
                    td.content { (PreEscaped(inline::render(text))) }
                }
            }
        }
    }
}
