use std::{fmt, sync::Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{output::Output, render::RenderJob, speech::SpeechConfig};

/// The error list reported by a typesetting engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineErrors(pub Vec<String>);

impl EngineErrors {
    pub fn single(message: impl Into<String>) -> Self {
        EngineErrors(vec![message.into()])
    }
}

impl fmt::Display for EngineErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("unknown engine error");
        }
        f.write_str(&self.0.join("; "))
    }
}

impl std::error::Error for EngineErrors {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SpeechError(pub String);

/// Process-wide configuration of the typesetting engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Font used for SVG output.
    pub font: String,
    /// For TeX or AsciiMath source and MathML output, keep the source in a `<semantics>` tag.
    pub semantics: bool,
    /// For TeX source and MathML output, add TeX-specific classes.
    pub tex_hints: bool,
    pub extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            font: "TeX".to_string(),
            semantics: false,
            tex_hints: true,
            extensions: Vec::new(),
        }
    }
}

/// A math typesetting engine.
///
/// One call renders one expression into every output the [`RenderJob`] asks for. Engines must
/// fill in the node form of an output whenever the job asks for it, because speech text is
/// spliced into nodes, not into strings.
#[async_trait]
pub trait TypesetEngine: Send + Sync {
    /// Apply the process-wide configuration. Called once before the first request.
    async fn start(&self, _config: &EngineConfig) -> Result<(), EngineErrors> {
        Ok(())
    }

    async fn typeset(&self, job: &RenderJob) -> Result<Output, EngineErrors>;
}

#[async_trait]
impl<T: TypesetEngine + ?Sized> TypesetEngine for Box<T> {
    async fn start(&self, config: &EngineConfig) -> Result<(), EngineErrors> {
        (**self).start(config).await
    }

    async fn typeset(&self, job: &RenderJob) -> Result<Output, EngineErrors> {
        (**self).typeset(job).await
    }
}

/// A speech engine that derives speech text and semantic trees from MathML.
///
/// Every call receives its configuration explicitly. Engines that compute in-process can do
/// the work inline; engines backed by I/O await it.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn to_speech(
        &self,
        mathml: &str,
        config: &SpeechConfig,
    ) -> Result<String, SpeechError>;

    /// The semantic tree as JSON.
    async fn to_json(&self, mathml: &str) -> Result<Value, SpeechError>;

    /// The semantic tree as compact XML.
    async fn to_semantic_xml(&self, mathml: &str) -> Result<String, SpeechError>;

    /// MathML annotated with semantic information and speech.
    async fn to_enriched(
        &self,
        mathml: &str,
        config: &SpeechConfig,
    ) -> Result<String, SpeechError>;
}

#[async_trait]
impl<S: SpeechEngine + ?Sized> SpeechEngine for Box<S> {
    async fn to_speech(
        &self,
        mathml: &str,
        config: &SpeechConfig,
    ) -> Result<String, SpeechError> {
        (**self).to_speech(mathml, config).await
    }

    async fn to_json(&self, mathml: &str) -> Result<Value, SpeechError> {
        (**self).to_json(mathml).await
    }

    async fn to_semantic_xml(&self, mathml: &str) -> Result<String, SpeechError> {
        (**self).to_semantic_xml(mathml).await
    }

    async fn to_enriched(
        &self,
        mathml: &str,
        config: &SpeechConfig,
    ) -> Result<String, SpeechError> {
        (**self).to_enriched(mathml, config).await
    }
}

/// A speech engine that keeps its configuration as global state: it is set up once, and every
/// later call uses whatever configuration was set last.
pub trait StatefulSpeechEngine: Send {
    fn setup(&mut self, config: &SpeechConfig) -> Result<(), SpeechError>;
    fn to_speech(&mut self, mathml: &str) -> Result<String, SpeechError>;
    fn to_json(&mut self, mathml: &str) -> Result<Value, SpeechError>;
    fn to_semantic_xml(&mut self, mathml: &str) -> Result<String, SpeechError>;
    fn to_enriched(&mut self, mathml: &str) -> Result<String, SpeechError>;
}

/// Turns a [`StatefulSpeechEngine`] into a [`SpeechEngine`].
///
/// Setting up the engine and calling it happen under one lock, so concurrent requests with
/// different configurations cannot interleave between the two.
#[derive(Debug, Default)]
pub struct Serialized<E>(Mutex<E>);

impl<E> Serialized<E> {
    pub fn new(engine: E) -> Self {
        Serialized(Mutex::new(engine))
    }

    pub fn into_inner(self) -> E {
        self.0.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_engine<R>(
        &self,
        call: impl FnOnce(&mut E) -> Result<R, SpeechError>,
    ) -> Result<R, SpeechError> {
        let mut engine = self
            .0
            .lock()
            .map_err(|_| SpeechError("speech engine lock poisoned".to_string()))?;
        call(&mut *engine)
    }
}

// The lock is never held across an await point.
#[async_trait]
impl<E: StatefulSpeechEngine> SpeechEngine for Serialized<E> {
    async fn to_speech(
        &self,
        mathml: &str,
        config: &SpeechConfig,
    ) -> Result<String, SpeechError> {
        self.with_engine(|engine| {
            engine.setup(config)?;
            engine.to_speech(mathml)
        })
    }

    async fn to_json(&self, mathml: &str) -> Result<Value, SpeechError> {
        self.with_engine(|engine| engine.to_json(mathml))
    }

    async fn to_semantic_xml(&self, mathml: &str) -> Result<String, SpeechError> {
        self.with_engine(|engine| engine.to_semantic_xml(mathml))
    }

    async fn to_enriched(
        &self,
        mathml: &str,
        config: &SpeechConfig,
    ) -> Result<String, SpeechError> {
        self.with_engine(|engine| {
            engine.setup(config)?;
            engine.to_enriched(mathml)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::request::Request;

    /// Answers with whatever domain was configured last.
    #[derive(Default)]
    struct GlobalDomain {
        domain: String,
        calls: usize,
    }

    impl StatefulSpeechEngine for GlobalDomain {
        fn setup(&mut self, config: &SpeechConfig) -> Result<(), SpeechError> {
            self.domain = config.domain.clone();
            Ok(())
        }

        fn to_speech(&mut self, mathml: &str) -> Result<String, SpeechError> {
            self.calls += 1;
            thread::yield_now();
            Ok(format!("{}:{}", self.domain, mathml))
        }

        fn to_json(&mut self, _mathml: &str) -> Result<Value, SpeechError> {
            Ok(Value::Null)
        }

        fn to_semantic_xml(&mut self, _mathml: &str) -> Result<String, SpeechError> {
            Ok(String::new())
        }

        fn to_enriched(&mut self, mathml: &str) -> Result<String, SpeechError> {
            Ok(format!("<math alttext=\"{}\">{mathml}</math>", self.domain))
        }
    }

    fn config(domain: &str) -> SpeechConfig {
        let mut config = SpeechConfig::from_request(&Request::default());
        config.domain = domain.to_string();
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn serialized_engine_uses_each_calls_config() {
        let engine = Arc::new(Serialized::new(GlobalDomain::default()));
        let handles: Vec<_> = ["mathspeak", "clearspeak"]
            .into_iter()
            .map(|domain| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let config = config(domain);
                    for _ in 0..200 {
                        let speech = engine.to_speech("x", &config).await.unwrap();
                        assert_eq!(speech, format!("{domain}:x"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        let engine = Arc::into_inner(engine).unwrap().into_inner();
        assert_eq!(engine.calls, 400);
    }

    #[tokio::test]
    async fn serialized_enrichment_sets_up_first() {
        let engine = Serialized::new(GlobalDomain::default());
        let enriched = engine
            .to_enriched("<mi>x</mi>", &config("clearspeak"))
            .await
            .unwrap();
        assert_eq!(enriched, "<math alttext=\"clearspeak\"><mi>x</mi></math>");
    }

    #[test]
    fn engine_errors_display() {
        assert_eq!(EngineErrors::default().to_string(), "unknown engine error");
        assert_eq!(
            EngineErrors(vec!["a".into(), "b".into()]).to_string(),
            "a; b"
        );
    }
}
