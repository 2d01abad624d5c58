use serde::Serialize;
use serde_json::Value;

use crate::{
    markup::MarkupNode,
    request::{OutputFormat, Visibility},
};

/// The result of a request: what the typesetting engine rendered, plus speech text and the
/// semantic tree.
///
/// Typesetting engines return this type too; the fields past the rendered outputs are filled
/// in afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub svg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mml: Option<String>,
    /// The stylesheet needed by HTML output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,

    #[serde(skip)]
    pub svg_node: Option<MarkupNode>,
    #[serde(skip)]
    pub html_node: Option<MarkupNode>,
    #[serde(skip)]
    pub mml_node: Option<MarkupNode>,

    /// Dimensions and style of SVG output, as reported by the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,

    #[serde(rename = "speakText", skip_serializing_if = "Option::is_none")]
    pub speech: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stree_json: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stree_xml: Option<String>,
}

impl Output {
    /// The serialized output for `format`.
    pub fn get(&self, format: OutputFormat) -> Option<&str> {
        match format {
            OutputFormat::Svg => self.svg.as_deref(),
            OutputFormat::Html => self.html.as_deref(),
            OutputFormat::Mml => self.mml.as_deref(),
        }
    }

    /// Drop every rendered output that is not in `visibility`.
    pub fn retain_visible(&mut self, visibility: Visibility) {
        fn retain<T>(field: &mut Option<T>, visible: bool) {
            if !visible {
                *field = None;
            }
        }
        retain(&mut self.svg, visibility.svg);
        retain(&mut self.html, visibility.html);
        retain(&mut self.mml, visibility.mml);
        retain(&mut self.css, visibility.css);
        retain(&mut self.svg_node, visibility.svg_node);
        retain(&mut self.html_node, visibility.html_node);
        retain(&mut self.mml_node, visibility.mml_node);
    }

    /// Whether the engine produced at least one node to splice speech text into.
    pub(crate) fn has_node(&self) -> bool {
        self.svg_node.is_some() || self.html_node.is_some() || self.mml_node.is_some()
    }
}
