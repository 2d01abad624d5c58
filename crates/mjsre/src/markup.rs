use std::{cell::Cell, sync::LazyLock};

use lol_html::{RewriteStrSettings, element, html_content::ContentType, rewrite_str};
use regex::{NoExpand, Regex};

use crate::error::Error;

/// The kind of markup a [`MarkupNode`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Svg,
    Html,
    Mathml,
}

/// The in-memory form of one rendered output.
///
/// It wraps the markup of a single root element and supports exactly the mutations needed to
/// attach speech text. Each mutation rewrites only the targeted element; everything else is
/// kept byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupNode {
    kind: NodeKind,
    markup: String,
}

impl MarkupNode {
    pub fn new(kind: NodeKind, markup: impl Into<String>) -> Self {
        MarkupNode {
            kind,
            markup: markup.into(),
        }
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The serialized node.
    #[inline]
    pub fn outer_html(&self) -> &str {
        &self.markup
    }

    #[inline]
    pub fn into_markup(self) -> String {
        self.markup
    }

    /// Replace the text of the first `<title>` element.
    ///
    /// If there is none, an empty `<title>` is inserted as the first child of the root first.
    pub fn set_title_text(&mut self, text: &str) -> Result<(), Error> {
        if !self.rewrite_first_title(text)? {
            self.prepend_to_root("<title></title>")?;
            self.rewrite_first_title(text)?;
        }
        Ok(())
    }

    /// Set an attribute on the root element. Returns `false` if there is no element at all.
    pub fn set_root_attribute(&mut self, name: &str, value: &str) -> Result<bool, Error> {
        self.set_nth_element_attribute(0, name, value)
    }

    /// Set an attribute on the first child element of the root. Returns `false` if the root has
    /// no child element.
    pub fn set_first_child_attribute(&mut self, name: &str, value: &str) -> Result<bool, Error> {
        // The node holds a single root element, so the second start tag in document order is
        // its first child.
        self.set_nth_element_attribute(1, name, value)
    }

    fn set_nth_element_attribute(
        &mut self,
        index: usize,
        name: &str,
        value: &str,
    ) -> Result<bool, Error> {
        let seen = Cell::new(0usize);
        let found = Cell::new(false);
        let rewritten = rewrite_str(
            &self.markup,
            RewriteStrSettings {
                element_content_handlers: vec![element!("*", |el| {
                    let position = seen.get();
                    seen.set(position + 1);
                    if position == index {
                        el.set_attribute(name, value)?;
                        found.set(true);
                    }
                    Ok(())
                })],
                ..RewriteStrSettings::default()
            },
        )
        .map_err(|err| Error::Markup(err.to_string()))?;
        if found.get() {
            self.markup = rewritten;
        }
        Ok(found.get())
    }

    fn rewrite_first_title(&mut self, text: &str) -> Result<bool, Error> {
        let found = Cell::new(false);
        let rewritten = rewrite_str(
            &self.markup,
            RewriteStrSettings {
                element_content_handlers: vec![element!("title", |el| {
                    if !found.get() {
                        el.set_inner_content(text, ContentType::Text);
                        found.set(true);
                    }
                    Ok(())
                })],
                ..RewriteStrSettings::default()
            },
        )
        .map_err(|err| Error::Markup(err.to_string()))?;
        if found.get() {
            self.markup = rewritten;
        }
        Ok(found.get())
    }

    fn prepend_to_root(&mut self, html: &str) -> Result<(), Error> {
        let seen = Cell::new(false);
        self.markup = rewrite_str(
            &self.markup,
            RewriteStrSettings {
                element_content_handlers: vec![element!("*", |el| {
                    if !seen.replace(true) {
                        el.prepend(html, ContentType::Html);
                    }
                    Ok(())
                })],
                ..RewriteStrSettings::default()
            },
        )
        .map_err(|err| Error::Markup(err.to_string()))?;
        Ok(())
    }
}

static TAG_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"><([^/])").expect("valid regex"));
static CLOSING_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</[a-z]*>").expect("valid regex"));
static BARE_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(<(?:use|image)(?:\s[^>]*?)?\s)(href=)").expect("valid regex")
});
static ALTTEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"alttext=(?:"[^"]*"|'[^']*')"#).expect("valid regex"));

/// Normalize a serialized SVG node.
///
/// In order:
/// 1. a line break goes between a tag and a following opening tag, and between a closing tag
///    and a following closing tag;
/// 2. bare `href=` attributes of `<use>` and `<image>` elements get the `xlink:` prefix back,
///    which the DOM serialization of the typesetting engine drops. The rewritten element is
///    preceded by a space.
pub fn svg_fixups(svg: &str) -> String {
    let svg = TAG_BOUNDARY.replace_all(svg, ">\n<${1}");
    let svg = break_closing_tags(&svg);
    BARE_HREF
        .replace_all(&svg, " ${1}xlink:${2}")
        .into_owned()
}

fn break_closing_tags(svg: &str) -> String {
    let mut output = String::with_capacity(svg.len() + svg.len() / 16);
    let mut last = 0;
    for tag in CLOSING_TAG.find_iter(svg) {
        output.push_str(&svg[last..tag.end()]);
        if svg[tag.end()..].starts_with("</") {
            output.push('\n');
        }
        last = tag.end();
    }
    output.push_str(&svg[last..]);
    output
}

/// Overwrite the first `alttext` attribute in `mathml` with `speech`.
///
/// Markup without an `alttext` attribute is returned unchanged.
pub fn replace_alttext(mathml: &str, speech: &str) -> String {
    let mut replacement = String::from("alttext=\"");
    escape_double_quoted_attribute(&mut replacement, speech);
    replacement.push('"');
    ALTTEXT
        .replacen(mathml, 1, NoExpand(&replacement))
        .into_owned()
}

/// Escapes `&` and `"` for an attribute value enclosed in double quotes.
fn escape_double_quoted_attribute(output: &mut String, input: &str) {
    for ch in input.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            _ => output.push(ch),
        }
    }
}
