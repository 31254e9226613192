//! Text-level markup inside a block.
//!
//! Rewrites run in a fixed order:
//!
//! 1. footnote references `[fn:N]`
//! 2. links `[[url][text]]` (image urls become `<img>`)
//! 3. code `=x=` and `~x~`
//! 4. bold `*x*`, italic `/x/`, strikethrough `+x+`, underline `_x_`
//! 5. superscript `^{x}`, subscript `_{x}`
//!
//! Steps 1-3 produce finished markup that later steps never look into, so a
//! url like `https://a.org/x/y` is not mistaken for italics. Everything else
//! is HTML-escaped before the span rewrites run.

use crate::parse::is_image_path;
use maud::html;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static FOOTNOTE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[fn:(\d+)\]").expect("footnote reference pattern is valid"));

static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\[\]]+)\](?:\[([^\[\]]*)\])?\]").expect("link pattern is valid")
});

static CODE_EQUALS: LazyLock<Regex> = LazyLock::new(|| paired("="));
static CODE_TILDE: LazyLock<Regex> = LazyLock::new(|| paired("~"));
static BOLD: LazyLock<Regex> = LazyLock::new(|| paired("*"));
static ITALIC: LazyLock<Regex> = LazyLock::new(|| paired("/"));
static STRIKE: LazyLock<Regex> = LazyLock::new(|| paired("+"));
static UNDERLINE: LazyLock<Regex> = LazyLock::new(|| paired("_"));

static SUPERSCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\^\{(?P<body>[^{}]*)\}").expect("superscript pattern is valid"));
static SUBSCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_\{(?P<body>[^{}]*)\}").expect("subscript pattern is valid"));

/// A span delimited by `marker` on both sides, opening after a boundary and
/// closing before one. The body neither starts nor ends with whitespace.
fn paired(marker: &str) -> Regex {
    let m = regex::escape(marker);
    let pattern = format!(
        r#"(?P<l>^|[\s(\[{{"';>]){m}(?P<body>[^\s{m}{{]|[^\s{m}{{].*?[^\s{m}]){m}(?P<r>$|[\s)\].,;:!?"'<&}}-])"#
    );
    Regex::new(&pattern).expect("span pattern is valid")
}

enum Piece {
    Markup(String),
    Text(String),
}

/// Render inline markup of `text` to HTML.
pub fn render(text: &str) -> String {
    let mut pieces = vec![Piece::Text(text.to_string())];
    pieces = protect_all(pieces, &FOOTNOTE_REF, |caps| {
        let n = &caps[1];
        format!(r##"<sup class="footnote"><a id="fnref-{n}" href="#fn-{n}">{n}</a></sup>"##)
    });
    pieces = protect_all(pieces, &LINK, |caps| {
        let url = &caps[1];
        let text = caps.get(2).map(|m| m.as_str()).filter(|t| !t.is_empty());
        if is_image_path(url) {
            html! { img src=(url) alt=(text.unwrap_or_default()); }.into_string()
        } else {
            html! { a href=(url) { (text.unwrap_or(url)) } }.into_string()
        }
    });
    for code in [&*CODE_EQUALS, &*CODE_TILDE] {
        pieces = protect_all(pieces, code, |caps| {
            html! { code { (&caps["body"]) } }.into_string()
        });
    }

    pieces
        .into_iter()
        .map(|piece| match piece {
            Piece::Markup(markup) => markup,
            Piece::Text(text) => spans(&escape(&text)),
        })
        .collect()
}

pub fn escape(text: &str) -> String {
    html! { (text) }.into_string()
}

fn spans(escaped: &str) -> String {
    let mut out = escaped.to_string();
    for (pattern, tag) in [
        (&*BOLD, "strong"),
        (&*ITALIC, "em"),
        (&*STRIKE, "s"),
        (&*UNDERLINE, "u"),
        (&*SUPERSCRIPT, "sup"),
        (&*SUBSCRIPT, "sub"),
    ] {
        out = rewrite(out, pattern, tag);
    }
    out
}

fn group<'t>(caps: &Captures<'t>, name: &str) -> &'t str {
    caps.name(name).map_or("", |m| m.as_str())
}

/// Replace every span until none is left. Boundaries are consumed by a
/// match, so adjacent spans need another round.
fn rewrite(text: String, pattern: &Regex, tag: &str) -> String {
    let mut current = text;
    loop {
        let next = match pattern.replace_all(&current, |caps: &Captures| {
            format!(
                "{}<{tag}>{}</{tag}>{}",
                group(caps, "l"),
                group(caps, "body"),
                group(caps, "r")
            )
        }) {
            std::borrow::Cow::Borrowed(_) => None,
            std::borrow::Cow::Owned(replaced) => Some(replaced),
        };
        match next {
            Some(replaced) => current = replaced,
            None => return current,
        }
    }
}

/// Split text pieces around matches of `pattern`, turning each match into
/// finished markup. Boundary groups `l`/`r` stay text.
fn protect(
    pieces: Vec<Piece>,
    pattern: &Regex,
    to_markup: &impl Fn(&Captures) -> String,
) -> (Vec<Piece>, bool) {
    let mut out = Vec::with_capacity(pieces.len());
    let mut changed = false;
    for piece in pieces {
        let Piece::Text(text) = piece else {
            out.push(piece);
            continue;
        };
        let mut last = 0;
        for caps in pattern.captures_iter(&text) {
            let Some(whole) = caps.get(0) else { continue };
            let start = caps.name("l").map_or(whole.start(), |m| m.end());
            let end = caps.name("r").map_or(whole.end(), |m| m.start());
            if start > last {
                out.push(Piece::Text(text[last..start].to_string()));
            }
            out.push(Piece::Markup(to_markup(&caps)));
            last = end;
            changed = true;
        }
        if last < text.len() {
            out.push(Piece::Text(text[last..].to_string()));
        }
    }
    (out, changed)
}

fn protect_all(
    mut pieces: Vec<Piece>,
    pattern: &Regex,
    to_markup: impl Fn(&Captures) -> String,
) -> Vec<Piece> {
    loop {
        let (next, changed) = protect(pieces, pattern, &to_markup);
        pieces = next;
        if !changed {
            return pieces;
        }
    }
}
