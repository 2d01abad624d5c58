mod common;

use common::FakeSpeech;
use mjsre::{
    Enrich, InputFormat, Mjsre, NativeTypesetter, OutputFormat, Request, Serialized,
    StatefulSpeechEngine, SpeechConfig, SpeechError, Visibility,
};
use serde_json::{Value, json};

fn mml_request(math: &str) -> Request {
    let mut request = Request::new(math, InputFormat::Tex);
    request.outputs = Visibility::only(OutputFormat::Mml);
    request
}

#[tokio::test]
async fn native_mathml_gets_alttext() {
    let mjsre = Mjsre::new(NativeTypesetter::default(), FakeSpeech::default());
    let output = mjsre.typeset(mml_request("x")).await.unwrap();
    let mml = output.mml.unwrap();
    assert!(mml.starts_with("<math"));
    assert!(mml.contains(r#"alttext="italic x""#));
    assert_eq!(output.speech.as_deref(), Some("italic x"));
}

#[tokio::test]
async fn native_enrichment_round_trip() {
    let mjsre = Mjsre::new(NativeTypesetter::default(), FakeSpeech::default());
    let mut request = mml_request("x");
    request.enrich = Enrich::Rerender;
    let output = mjsre.typeset(request).await.unwrap();
    let mml = output.mml.unwrap();
    assert!(mml.contains(r#"data-semantic-type="identifier""#));
    assert_eq!(mml.matches("alttext=").count(), 1);
}

#[tokio::test]
async fn native_svg_is_an_engine_error() {
    let mjsre = Mjsre::new(NativeTypesetter::default(), FakeSpeech::default());
    let mut request = mml_request("x");
    request.outputs.svg = true;
    let err = mjsre.typeset(request).await.unwrap_err();
    assert_eq!(
        err.messages(),
        ["SVG output is not supported by the native typesetter"]
    );
}

/// A speech engine that keeps its configuration between calls.
#[derive(Default)]
struct Stateful {
    domain: String,
}

impl StatefulSpeechEngine for Stateful {
    fn setup(&mut self, config: &SpeechConfig) -> Result<(), SpeechError> {
        self.domain = config.domain.clone();
        Ok(())
    }

    fn to_speech(&mut self, _mathml: &str) -> Result<String, SpeechError> {
        Ok(format!("spoken with {}", self.domain))
    }

    fn to_json(&mut self, _mathml: &str) -> Result<Value, SpeechError> {
        Ok(json!({"stree": {}}))
    }

    fn to_semantic_xml(&mut self, _mathml: &str) -> Result<String, SpeechError> {
        Ok("<stree/>".to_string())
    }

    fn to_enriched(&mut self, mathml: &str) -> Result<String, SpeechError> {
        Ok(mathml.to_string())
    }
}

#[tokio::test]
async fn stateful_engines_are_configured_per_call() {
    let mjsre = Mjsre::new(
        NativeTypesetter::default(),
        Serialized::new(Stateful::default()),
    );
    let mut first = mml_request("x");
    first.speech.domain = "clearspeak".into();
    let mut second = mml_request("y");
    second.speech.domain = "mathspeak".into();
    let (a, b) = tokio::join!(mjsre.typeset(first), mjsre.typeset(second));
    assert_eq!(a.unwrap().speech.as_deref(), Some("spoken with clearspeak"));
    assert_eq!(b.unwrap().speech.as_deref(), Some("spoken with mathspeak"));
}
