use std::str::FromStr;

use serde::Serialize;
use strum_macros::{EnumString, IntoStaticStr};

use crate::options::{Options, SreFlags};

/// The markup language of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, EnumString, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum InputFormat {
    /// Display-style TeX.
    #[default]
    #[strum(serialize = "TeX")]
    #[serde(rename = "TeX")]
    Tex,
    /// In-line TeX, like `$...$` in LaTeX.
    #[strum(serialize = "inline-TeX")]
    #[serde(rename = "inline-TeX")]
    InlineTex,
    #[strum(serialize = "AsciiMath")]
    AsciiMath,
    #[strum(serialize = "MathML")]
    MathML,
}

impl InputFormat {
    #[inline]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// The rendered outputs a caller can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    #[strum(to_string = "svg")]
    Svg,
    #[strum(to_string = "html", serialize = "commonhtml", serialize = "chtml")]
    Html,
    #[strum(to_string = "mml", serialize = "mathml")]
    Mml,
}

impl OutputFormat {
    #[inline]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// How the speech engine's enrichment is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Enrich {
    /// Render the source as given.
    #[default]
    Off,
    /// Replace the source with enriched MathML, whose `alttext` carries the speech text, and
    /// render that instead. Speech text is not spliced into the rendered output a second time.
    On,
    /// Like [`Enrich::On`], but speech text is derived again from the re-rendered MathML and
    /// spliced into the output as well.
    Rerender,
}

impl Enrich {
    #[inline]
    pub fn is_enabled(self) -> bool {
        !matches!(self, Enrich::Off)
    }
}

impl FromStr for Enrich {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "on" | "true" | "yes" => Ok(Enrich::On),
            "off" | "false" | "no" => Ok(Enrich::Off),
            "rerender" => Ok(Enrich::Rerender),
            _ => Err(format!(
                "unknown enrichment mode \"{s}\" (expected on, off or rerender)"
            )),
        }
    }
}

/// The outputs the caller asked for.
///
/// The render pass produces more than this (MathML and the node form of every output is always
/// needed internally); whatever is not in this set is stripped before the output is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Visibility {
    pub svg: bool,
    pub html: bool,
    pub mml: bool,
    pub css: bool,
    pub svg_node: bool,
    pub html_node: bool,
    pub mml_node: bool,
}

impl Visibility {
    /// A visibility set containing only the string output for `format`.
    pub fn only(format: OutputFormat) -> Self {
        let mut visibility = Self::default();
        visibility.set(format, true);
        visibility
    }

    pub fn contains(&self, format: OutputFormat) -> bool {
        match format {
            OutputFormat::Svg => self.svg,
            OutputFormat::Html => self.html,
            OutputFormat::Mml => self.mml,
        }
    }

    pub fn set(&mut self, format: OutputFormat, visible: bool) {
        match format {
            OutputFormat::Svg => self.svg = visible,
            OutputFormat::Html => self.html = visible,
            OutputFormat::Mml => self.mml = visible,
        }
    }
}

/// Parameters handed through to the typesetting engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub font: String,
    /// Ex-size in pixels.
    pub ex: f64,
    /// Width of the container in ex, used for line-breaking.
    pub width: f64,
    pub linebreaks: bool,
    pub extensions: Vec<String>,
    pub font_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechOptions {
    pub speak_text: bool,
    pub domain: String,
    pub style: String,
    pub depth: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SemanticOptions {
    pub enabled: bool,
    pub minify: bool,
}

/// A canonical request.
///
/// Build one with [`Options::normalize`]; every alias has been resolved and every default
/// applied at that point.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub math: String,
    pub format: InputFormat,
    pub outputs: Visibility,
    pub render: RenderOptions,
    pub speech: SpeechOptions,
    pub semantic: SemanticOptions,
    pub enrich: Enrich,
    pub sre: SreFlags,
}

impl Request {
    /// Shorthand for a request with default options.
    pub fn new(math: impl Into<String>, format: InputFormat) -> Self {
        let mut request = Options::default().normalize();
        request.math = math.into();
        request.format = format;
        request
    }

    /// The request for rendering already enriched MathML.
    ///
    /// The speech text travels inside the markup now, so it is only spliced again when the
    /// enrichment mode asks for it.
    pub(crate) fn with_enriched_source(&self, mathml: String) -> Self {
        let mut request = self.clone();
        request.math = mathml;
        request.format = InputFormat::MathML;
        request.speech.speak_text = self.speech.speak_text && self.enrich == Enrich::Rerender;
        request
    }
}

impl Default for Request {
    fn default() -> Self {
        Options::default().normalize()
    }
}

impl From<Options> for Request {
    #[inline]
    fn from(options: Options) -> Self {
        options.normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_aliases() {
        assert_eq!("SVG".parse::<OutputFormat>(), Ok(OutputFormat::Svg));
        assert_eq!("CommonHTML".parse::<OutputFormat>(), Ok(OutputFormat::Html));
        assert_eq!("chtml".parse::<OutputFormat>(), Ok(OutputFormat::Html));
        assert_eq!("html".parse::<OutputFormat>(), Ok(OutputFormat::Html));
        assert_eq!("MathML".parse::<OutputFormat>(), Ok(OutputFormat::Mml));
        assert_eq!("mml".parse::<OutputFormat>(), Ok(OutputFormat::Mml));
        assert!("png".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Html.as_str(), "html");
        assert_eq!(OutputFormat::Mml.as_str(), "mml");
    }

    #[test]
    fn input_format_names() {
        assert_eq!("TeX".parse::<InputFormat>(), Ok(InputFormat::Tex));
        assert_eq!("inline-tex".parse::<InputFormat>(), Ok(InputFormat::InlineTex));
        assert_eq!("mathml".parse::<InputFormat>(), Ok(InputFormat::MathML));
        assert_eq!(InputFormat::InlineTex.as_str(), "inline-TeX");
        assert_eq!(InputFormat::AsciiMath.as_str(), "AsciiMath");
    }

    #[test]
    fn enrich_modes() {
        assert_eq!("on".parse::<Enrich>(), Ok(Enrich::On));
        assert_eq!("Rerender".parse::<Enrich>(), Ok(Enrich::Rerender));
        assert_eq!("false".parse::<Enrich>(), Ok(Enrich::Off));
        assert!("sometimes".parse::<Enrich>().is_err());
        assert!(!Enrich::Off.is_enabled());
        assert!(Enrich::Rerender.is_enabled());
    }

    #[test]
    fn enriched_source_disables_speech_unless_rerendering() {
        let mut request = Request::new(r"\frac12", InputFormat::Tex);
        request.enrich = Enrich::On;
        let enriched = request.with_enriched_source("<math/>".to_string());
        assert_eq!(enriched.math, "<math/>");
        assert_eq!(enriched.format, InputFormat::MathML);
        assert!(!enriched.speech.speak_text);

        request.enrich = Enrich::Rerender;
        let enriched = request.with_enriched_source("<math/>".to_string());
        assert!(enriched.speech.speak_text);
    }

    #[test]
    fn visibility_only() {
        let visibility = Visibility::only(OutputFormat::Svg);
        assert!(visibility.contains(OutputFormat::Svg));
        assert!(!visibility.contains(OutputFormat::Mml));
        assert!(!visibility.svg_node);
    }
}
