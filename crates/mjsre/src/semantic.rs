use quick_xml::{Reader, Writer, events::Event};
use serde_json::Value;

use crate::{engine::SpeechEngine, error::Error};

/// The semantic tree of an expression in both of its forms.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticTree {
    pub json: Value,
    /// Compact or pretty-printed, depending on how the tree was derived.
    pub xml: String,
}

impl SemanticTree {
    pub async fn derive<S: SpeechEngine + ?Sized>(
        engine: &S,
        mathml: &str,
        minify: bool,
    ) -> Result<Self, Error> {
        let json = engine.to_json(mathml).await?;
        let xml = engine.to_semantic_xml(mathml).await?;
        let xml = if minify { xml } else { pretty_print_xml(&xml)? };
        Ok(SemanticTree { json, xml })
    }
}

/// Pretty-print XML with one element per line and two spaces of indentation.
///
/// Text content stays on the line of its element. Whitespace-only text between elements is
/// dropped.
pub fn pretty_print_xml(xml: &str) -> Result<String, Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(event) => writer
                .write_event(event)
                .map_err(|err| Error::Semantic(err.to_string()))?,
            Err(err) => {
                return Err(Error::Semantic(format!(
                    "at position {}: {err}",
                    reader.error_position()
                )));
            }
        }
    }
    String::from_utf8(writer.into_inner()).map_err(|err| Error::Semantic(err.to_string()))
}
