use std::time::Instant;

use tracing::{debug, info};

use crate::{
    engine::{EngineConfig, SpeechEngine, TypesetEngine},
    error::Error,
    markup::{replace_alttext, svg_fixups},
    output::Output,
    render::{RenderJob, invoke},
    request::{InputFormat, Request, Visibility},
    semantic::SemanticTree,
    speech::SpeechConfig,
};

/// Typesets math and attaches speech text and semantic trees to the output.
///
/// Each request runs its stages one after another: the optional enrichment pass, the render
/// pass, then splicing. Requests share nothing but the two engines.
#[derive(Debug)]
pub struct Mjsre<T, S> {
    typesetter: T,
    speech: S,
}

impl<T: TypesetEngine, S: SpeechEngine> Mjsre<T, S> {
    pub fn new(typesetter: T, speech: S) -> Self {
        Mjsre { typesetter, speech }
    }

    /// Hand the process-wide configuration to the typesetting engine.
    pub async fn start(&self, config: &EngineConfig) -> Result<(), Error> {
        self.typesetter.start(config).await?;
        Ok(())
    }

    #[inline]
    pub fn typesetter(&self) -> &T {
        &self.typesetter
    }

    #[inline]
    pub fn speech_engine(&self) -> &S {
        &self.speech
    }

    /// Typeset `request`, resolving to the output or to the first error.
    pub async fn typeset(&self, request: Request) -> Result<Output, Error> {
        self.run(request).await.0
    }

    /// Typeset `request` and hand the outcome to `callback`, together with the request that
    /// was finally rendered (after enrichment, that is the enriched MathML).
    pub async fn typeset_with<F>(&self, request: Request, callback: F)
    where
        F: FnOnce(Result<Output, Error>, &Request),
    {
        let (result, request) = self.run(request).await;
        callback(result, &request);
    }

    async fn run(&self, request: Request) -> (Result<Output, Error>, Request) {
        let started_at = Instant::now();
        let (request, speech) = if request.enrich.is_enabled() {
            match preprocess(&self.typesetter, &self.speech, &request).await {
                Ok(Enriched { request, speech }) => (request, speech),
                Err(err) => return (Err(err), request),
            }
        } else {
            (request, None)
        };

        let (job, visibility) = RenderJob::for_request(&request);
        let result = match invoke(&self.typesetter, &job).await {
            Ok(output) => postprocess(&self.speech, &request, visibility, output).await,
            Err(err) => Err(err),
        };
        let result = result.map(|mut output| {
            if output.speech.is_none() {
                output.speech = speech;
            }
            output
        });
        info!(
            op = "pipeline::typeset",
            result = if result.is_ok() { "ok" } else { "error" },
            format = request.format.as_str(),
            enrich = ?request.enrich,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "request finished"
        );
        (result, request)
    }
}

/// The stages of the enrichment pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichState {
    /// The source is not MathML yet and has to be converted first.
    NeedsConversion,
    /// The source is MathML and can be enriched.
    Enrich,
}

impl EnrichState {
    pub fn initial(format: InputFormat) -> Self {
        match format {
            InputFormat::MathML => EnrichState::Enrich,
            _ => EnrichState::NeedsConversion,
        }
    }
}

/// The outcome of the enrichment pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Enriched {
    /// The request to render instead: enriched MathML as the source.
    pub request: Request,
    /// Speech text of the source, computed before the final render pass. `None` unless the
    /// request asks for speech.
    pub speech: Option<String>,
}

/// Replace the source of `request` by MathML enriched by the speech engine.
///
/// Non-MathML sources are converted to MathML first. If the request asks for speech, the
/// speech text goes into the `alttext` of the enriched MathML, replacing whatever the speech
/// engine put there.
pub async fn preprocess<T, S>(
    typesetter: &T,
    speech: &S,
    request: &Request,
) -> Result<Enriched, Error>
where
    T: TypesetEngine + ?Sized,
    S: SpeechEngine + ?Sized,
{
    let config = SpeechConfig::from_request(request);
    let mut state = EnrichState::initial(request.format);
    let mut mathml = request.math.clone();
    let mut speech_text = None;
    loop {
        debug!(op = "pipeline::preprocess", state = ?state, "enrichment step");
        match state {
            EnrichState::NeedsConversion => {
                let job = RenderJob::mathml_only(&request.math, request.format);
                let output = invoke(typesetter, &job).await?;
                mathml = output.mml.ok_or(Error::MissingMathml)?;
                if request.speech.speak_text {
                    speech_text = Some(speech.to_speech(&mathml, &config).await?);
                }
                state = EnrichState::Enrich;
            }
            EnrichState::Enrich => {
                let speech_text = match speech_text {
                    None if request.speech.speak_text => {
                        Some(speech.to_speech(&mathml, &config).await?)
                    }
                    known => known,
                };
                let mut enriched = speech.to_enriched(&mathml, &config).await?;
                if let Some(text) = &speech_text {
                    enriched = replace_alttext(&enriched, text);
                }
                return Ok(Enriched {
                    request: request.with_enriched_source(enriched),
                    speech: speech_text,
                });
            }
        }
    }
}

/// Attach speech text and the semantic tree to a rendered `output`.
///
/// `visibility` is the set of outputs the caller asked for; everything else the render pass
/// produced is dropped from the returned output.
pub async fn postprocess<S: SpeechEngine + ?Sized>(
    speech: &S,
    request: &Request,
    visibility: Visibility,
    mut output: Output,
) -> Result<Output, Error> {
    let mathml = output.mml.clone().ok_or(Error::MissingMathml)?;
    if !output.has_node() {
        return Err(Error::NoNodeOutput);
    }

    if request.semantic.enabled {
        let tree = SemanticTree::derive(speech, &mathml, request.semantic.minify).await?;
        output.stree_json = Some(tree.json);
        output.stree_xml = Some(tree.xml);
    }

    if request.speech.speak_text {
        let config = SpeechConfig::from_request(request);
        let text = speech.to_speech(&mathml, &config).await?;
        splice(&mut output, &text, visibility)?;
        output.speech = Some(text);
    }

    output.retain_visible(visibility);
    Ok(output)
}

/// Put `speech` into every node and re-serialize the visible string outputs.
fn splice(output: &mut Output, speech: &str, visibility: Visibility) -> Result<(), Error> {
    if let Some(node) = output.svg_node.as_mut() {
        node.set_title_text(speech)?;
        if visibility.svg {
            output.svg = Some(svg_fixups(node.outer_html()));
        }
    }
    if let Some(node) = output.html_node.as_mut() {
        if !node.set_first_child_attribute("aria-label", speech)? {
            return Err(Error::Markup(
                "HTML output has no element to label".to_string(),
            ));
        }
        if visibility.html {
            output.html = Some(node.outer_html().to_string());
        }
    }
    if let Some(node) = output.mml_node.as_mut() {
        if !node.set_root_attribute("alttext", speech)? {
            return Err(Error::Markup("MathML output has no root element".to_string()));
        }
        if visibility.mml {
            output.mml = Some(node.outer_html().to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_enrichment_state() {
        assert_eq!(
            EnrichState::initial(InputFormat::MathML),
            EnrichState::Enrich
        );
        for format in [
            InputFormat::Tex,
            InputFormat::InlineTex,
            InputFormat::AsciiMath,
        ] {
            assert_eq!(EnrichState::initial(format), EnrichState::NeedsConversion);
        }
    }
}
