//! Section and writing-block boundaries.
//!
//! The content stream is flat, so the wrapper divs around it are opened and
//! closed by a small state machine with two independent flags:
//!
//! - `in_section`: a heading opened `<div class="sectN">…<div class="sectionbody">`
//!   and the pair has not been closed yet.
//! - `in_writing`: a run of quote/verse paragraphs is wrapped in
//!   `<div class="writing">`.
//!
//! [`DivState::transition`] returns the markup to emit *before* the next item;
//! [`DivState::flush`] returns what closes the document.

use crate::types::Content;

pub const SECTION_CLOSE: &str = "</div>\n</div>";
pub const WRITING_OPEN: &str = "<div class=\"writing\">";
pub const WRITING_CLOSE: &str = "</div>";

/// How an item relates to the wrapper divs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Opens a new section.
    Heading,
    /// Grouped into a writing block.
    Writing,
    /// Everything else.
    Plain,
}

impl Flavor {
    pub fn of(content: &Content) -> Self {
        match content {
            Content::Heading { .. } => Self::Heading,
            Content::Paragraph { flags, .. } if flags.is_writing() => Self::Writing,
            _ => Self::Plain,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DivState {
    pub in_section: bool,
    pub in_writing: bool,
}

impl DivState {
    /// Boundary markup preceding an item of `next` flavor, and the state after it.
    ///
    /// A heading's own fragment opens its section pair; this only closes the
    /// previous one.
    pub fn transition(self, next: Flavor) -> (String, DivState) {
        let mut markup = String::new();
        let mut state = self;

        if state.in_writing && next != Flavor::Writing {
            markup.push_str(WRITING_CLOSE);
            state.in_writing = false;
        }
        match next {
            Flavor::Heading => {
                if state.in_section {
                    markup.push_str(SECTION_CLOSE);
                }
                state.in_section = true;
            }
            Flavor::Writing if !state.in_writing => {
                markup.push_str(WRITING_OPEN);
                state.in_writing = true;
            }
            _ => {}
        }
        (markup, state)
    }

    /// Markup closing whatever is still open at end of document.
    ///
    /// The writing block sits inside the section body, so it closes first.
    pub fn flush(self) -> String {
        let mut markup = String::new();
        if self.in_writing {
            markup.push_str(WRITING_CLOSE);
        }
        if self.in_section {
            markup.push_str(SECTION_CLOSE);
        }
        markup
    }
}

/// Wrap each rendered fragment with its boundary markup.
pub fn assemble<'a>(items: impl IntoIterator<Item = (Flavor, &'a str)>) -> String {
    let mut out = String::new();
    let mut state = DivState::default();
    for (flavor, fragment) in items {
        let (boundary, next) = state.transition(flavor);
        out.push_str(&boundary);
        out.push_str(fragment);
        state = next;
    }
    out.push_str(&state.flush());
    out
}
