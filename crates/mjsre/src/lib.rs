//! Typeset math and add speech text and semantic trees to the rendered output.
//!
//! This crate sequences two engines: a typesetting engine that turns TeX, AsciiMath or MathML
//! into SVG, HTML and MathML, and a speech engine that derives spoken text, semantic trees and
//! enriched MathML from MathML. The speech text is spliced back into the rendered output: as the
//! `<title>` of an SVG, as the `aria-label` of HTML output and as the `alttext` of MathML.
//!
//! # Usage
//!
//! The main struct of this library is [`Mjsre`], which owns one [`TypesetEngine`] and one
//! [`SpeechEngine`]. Requests are built from the lenient [`Options`] bag, which accepts the
//! deprecated option names as well:
//!
//! ```rust,no_run
//! use mjsre::{Mjsre, NativeTypesetter, Options};
//! # async fn run<S: mjsre::SpeechEngine>(speech: S) -> Result<(), mjsre::Error> {
//! let mjsre = Mjsre::new(NativeTypesetter::default(), speech);
//! let request = Options {
//!     math: Some("x".to_string()),
//!     mml: Some(true),
//!     ..Default::default()
//! }
//! .normalize();
//! let output = mjsre.typeset(request).await?;
//! println!("{}", output.speech.unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
//! Only the outputs that were asked for are returned, even though MathML (and the node form of
//! every requested output) is always produced internally.
mod engine;
mod error;
mod markup;
mod native;
mod options;
mod output;
mod pipeline;
mod process;
mod render;
mod request;
mod semantic;
mod speech;

pub use self::engine::{
    EngineConfig, EngineErrors, Serialized, SpeechEngine, SpeechError, StatefulSpeechEngine,
    TypesetEngine,
};
pub use self::error::Error;
pub use self::markup::{MarkupNode, NodeKind, replace_alttext, svg_fixups};
pub use self::native::NativeTypesetter;
pub use self::options::{EnrichOption, Extensions, Options, SreFlags};
pub use self::output::Output;
pub use self::pipeline::{EnrichState, Enriched, Mjsre, postprocess, preprocess};
pub use self::process::{CommandSpeech, CommandTypesetter, ProcessError};
pub use self::render::RenderJob;
pub use self::request::{
    Enrich, InputFormat, OutputFormat, RenderOptions, Request, SemanticOptions, SpeechOptions,
    Visibility,
};
pub use self::semantic::{SemanticTree, pretty_print_xml};
pub use self::speech::SpeechConfig;
