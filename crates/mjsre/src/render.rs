use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    engine::TypesetEngine,
    error::Error,
    output::Output,
    request::{InputFormat, OutputFormat, Request, Visibility},
};

/// What the typesetting engine is asked to render.
///
/// Unlike a [`Request`], this includes the outputs needed internally: MathML is always
/// rendered (speech and semantic trees are derived from it), and so is the node form of every
/// requested string output (speech text is spliced into nodes).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJob {
    pub math: String,
    pub format: InputFormat,
    pub svg: bool,
    pub html: bool,
    pub mml: bool,
    pub css: bool,
    pub svg_node: bool,
    pub html_node: bool,
    pub mml_node: bool,
    pub speak_text: bool,
    pub ex: f64,
    pub width: f64,
    pub linebreaks: bool,
    pub font: String,
    #[serde(rename = "fontURL")]
    pub font_url: String,
    pub extensions: Vec<String>,
}

impl RenderJob {
    /// The job for the final render pass of `request`, and the outputs the caller asked for.
    pub fn for_request(request: &Request) -> (Self, Visibility) {
        let visibility = request.outputs;
        let job = RenderJob {
            math: request.math.clone(),
            format: request.format,
            svg: visibility.svg,
            html: visibility.html,
            mml: true,
            css: visibility.css,
            svg_node: visibility.svg_node || visibility.svg,
            html_node: visibility.html_node || visibility.html,
            mml_node: true,
            speak_text: request.speech.speak_text,
            ex: request.render.ex,
            width: request.render.width,
            linebreaks: request.render.linebreaks,
            font: request.render.font.clone(),
            font_url: request.render.font_url.clone(),
            extensions: request.render.extensions.clone(),
        };
        (job, visibility)
    }

    /// A job converting `math` to MathML and nothing else.
    pub fn mathml_only(math: &str, format: InputFormat) -> Self {
        let mut request = Request::new(math, format);
        request.outputs = Visibility::only(OutputFormat::Mml);
        RenderJob {
            mml_node: false,
            speak_text: false,
            ..RenderJob::for_request(&request).0
        }
    }
}

/// Run one render pass.
///
/// Engine failures are final for the request; nothing is retried.
pub(crate) async fn invoke<T: TypesetEngine + ?Sized>(
    engine: &T,
    job: &RenderJob,
) -> Result<Output, Error> {
    let started_at = Instant::now();
    match engine.typeset(job).await {
        Ok(output) => {
            debug!(
                op = "render::invoke",
                result = "ok",
                format = job.format.as_str(),
                svg = job.svg,
                html = job.html,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "render pass finished"
            );
            Ok(output)
        }
        Err(errors) => {
            warn!(
                op = "render::invoke",
                result = "error",
                format = job.format.as_str(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                error = %errors,
                "typesetting engine reported errors"
            );
            Err(Error::Engine(errors))
        }
    }
}
