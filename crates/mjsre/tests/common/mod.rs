#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use mjsre::{
    EngineErrors, InputFormat, MarkupNode, NodeKind, Output, RenderJob, SpeechConfig,
    SpeechEngine, SpeechError, TypesetEngine,
};
use serde_json::{Value, json};

/// Renders every expression as if it were a single identifier, the way MathJax lays out `x`.
#[derive(Default)]
pub struct FakeTypesetter {
    pub jobs: Mutex<Vec<RenderJob>>,
    pub fail_with: Option<Vec<String>>,
    pub without_mathml: bool,
    pub without_nodes: bool,
}

impl FakeTypesetter {
    pub fn failing(errors: &[&str]) -> Self {
        FakeTypesetter {
            fail_with: Some(errors.iter().map(|e| e.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn jobs(&self) -> Vec<RenderJob> {
        self.jobs.lock().unwrap().clone()
    }
}

pub fn svg_for(id: &str) -> String {
    format!(
        r##"<svg xmlns:xlink="http://www.w3.org/1999/xlink" width="1.33ex" role="img" aria-labelledby="MathJax-SVG-1-Title"><title id="MathJax-SVG-1-Title">{id}</title><defs aria-hidden="true"><path id="E1-MJMATHI-78" d="M52 289Q59 331"></path></defs><g aria-hidden="true"><use href="#E1-MJMATHI-78" x="0" y="0"></use></g></svg>"##
    )
}

pub fn html_for(id: &str) -> String {
    format!(
        r#"<span class="mjx-chtml"><span class="mjx-math"><span class="mjx-mi">{id}</span></span></span>"#
    )
}

pub fn mathml_for(id: &str) -> String {
    format!(r#"<math xmlns="http://www.w3.org/1998/Math/MathML"><mi>{id}</mi></math>"#)
}

#[async_trait]
impl TypesetEngine for FakeTypesetter {
    async fn typeset(&self, job: &RenderJob) -> Result<Output, EngineErrors> {
        self.jobs.lock().unwrap().push(job.clone());
        if let Some(errors) = &self.fail_with {
            return Err(EngineErrors(errors.clone()));
        }

        let (id, mml) = if job.format == InputFormat::MathML {
            let id = identifiers(&job.math).join("");
            (id, job.math.clone())
        } else {
            let id = job.math.trim().to_string();
            let mml = mathml_for(&id);
            (id, mml)
        };
        let svg = svg_for(&id);
        let html = html_for(&id);

        let node = |wanted: bool, kind: NodeKind, markup: &str| {
            (wanted && !self.without_nodes).then(|| MarkupNode::new(kind, markup))
        };
        Ok(Output {
            svg_node: node(job.svg_node, NodeKind::Svg, &svg),
            html_node: node(job.html_node, NodeKind::Html, &html),
            mml_node: node(job.mml_node, NodeKind::Mathml, &mml),
            svg: job.svg.then_some(svg),
            html: job.html.then_some(html),
            mml: (job.mml && !self.without_mathml).then_some(mml),
            css: job.css.then(|| ".mjx-chtml {display: inline-block}".to_string()),
            width: job.svg.then(|| "1.33ex".to_string()),
            ..Default::default()
        })
    }
}

/// Speaks every `<mi>` as "italic <letter>" and builds a one-node semantic tree.
#[derive(Default)]
pub struct FakeSpeech {
    pub configs: Mutex<Vec<SpeechConfig>>,
    pub enriched_calls: Mutex<Vec<String>>,
}

impl FakeSpeech {
    pub fn configs(&self) -> Vec<SpeechConfig> {
        self.configs.lock().unwrap().clone()
    }
}

/// Contents of all `<mi>` elements.
pub fn identifiers(mathml: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = mathml;
    while let Some(start) = rest.find("<mi") {
        rest = &rest[start..];
        let Some(open_end) = rest.find('>') else {
            break;
        };
        let Some(close) = rest.find("</mi>") else {
            break;
        };
        found.push(rest[open_end + 1..close].to_string());
        rest = &rest[close + 5..];
    }
    found
}

#[async_trait]
impl SpeechEngine for FakeSpeech {
    async fn to_speech(
        &self,
        mathml: &str,
        config: &SpeechConfig,
    ) -> Result<String, SpeechError> {
        self.configs.lock().unwrap().push(config.clone());
        let ids = identifiers(mathml);
        if ids.is_empty() {
            return Err(SpeechError("nothing to speak".to_string()));
        }
        Ok(ids
            .iter()
            .map(|id| format!("italic {id}"))
            .collect::<Vec<_>>()
            .join(" "))
    }

    async fn to_json(&self, mathml: &str) -> Result<Value, SpeechError> {
        let id = identifiers(mathml).join("");
        Ok(json!({"stree": {"type": "identifier", "role": "latinletter", "content": id}}))
    }

    async fn to_semantic_xml(&self, mathml: &str) -> Result<String, SpeechError> {
        let id = identifiers(mathml).join("");
        Ok(format!(
            r#"<stree><identifier role="latinletter">{id}</identifier></stree>"#
        ))
    }

    async fn to_enriched(
        &self,
        mathml: &str,
        config: &SpeechConfig,
    ) -> Result<String, SpeechError> {
        self.configs.lock().unwrap().push(config.clone());
        self.enriched_calls.lock().unwrap().push(mathml.to_string());
        Ok(mathml.replacen(
            "<math",
            r#"<math alttext="stale" data-semantic-type="identifier""#,
            1,
        ))
    }
}
