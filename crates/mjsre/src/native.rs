use std::{fmt, sync::RwLock};

use async_trait::async_trait;
use math_core::{LatexToMathML, MathCoreConfig, MathDisplay};
use tracing::debug;

use crate::{
    engine::{EngineConfig, EngineErrors, TypesetEngine},
    markup::{MarkupNode, NodeKind},
    output::Output,
    render::RenderJob,
    request::InputFormat,
};

/// A typesetting engine that converts TeX to MathML in-process.
///
/// It renders MathML only. MathML sources pass through unchanged, so enriched MathML can be
/// rendered as well. Asking it for SVG, HTML or AsciiMath input is an engine error.
///
/// [`EngineConfig::semantics`] turns on the `<semantics>` wrapper with the TeX source as
/// annotation.
pub struct NativeTypesetter {
    config: MathCoreConfig,
    converter: RwLock<LatexToMathML>,
}

impl NativeTypesetter {
    /// Create a typesetter from a `math-core` configuration.
    ///
    /// Fails if one of the configured macros cannot be parsed.
    pub fn new(config: MathCoreConfig) -> Result<Self, EngineErrors> {
        let converter = build_converter(copy_config(&config))?;
        Ok(NativeTypesetter {
            config,
            converter: RwLock::new(converter),
        })
    }

    fn convert(&self, job: &RenderJob) -> Result<String, EngineErrors> {
        let display = match job.format {
            InputFormat::Tex => MathDisplay::Block,
            InputFormat::InlineTex => MathDisplay::Inline,
            InputFormat::MathML => return Ok(job.math.trim().to_string()),
            InputFormat::AsciiMath => {
                return Err(EngineErrors::single(
                    "AsciiMath input is not supported by the native typesetter",
                ));
            }
        };
        self.converter
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .convert_with_local_counter(&job.math, display)
            .map_err(|err| EngineErrors::single(format!("TeX parse error: {err}")))
    }
}

/// `MathCoreConfig` is not `Clone`.
fn copy_config(config: &MathCoreConfig) -> MathCoreConfig {
    MathCoreConfig {
        pretty_print: config.pretty_print,
        macros: config.macros.clone(),
        xml_namespace: config.xml_namespace,
        ignore_unknown_commands: config.ignore_unknown_commands,
        annotation: config.annotation,
        ..Default::default()
    }
}

fn build_converter(config: MathCoreConfig) -> Result<LatexToMathML, EngineErrors> {
    LatexToMathML::new(config).map_err(|(err, index, definition)| {
        EngineErrors::single(format!(
            "invalid definition of macro #{index} (\"{definition}\"): {err}"
        ))
    })
}

impl Default for NativeTypesetter {
    fn default() -> Self {
        NativeTypesetter {
            config: MathCoreConfig::default(),
            converter: RwLock::new(LatexToMathML::default()),
        }
    }
}

impl fmt::Debug for NativeTypesetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeTypesetter").finish_non_exhaustive()
    }
}

#[async_trait]
impl TypesetEngine for NativeTypesetter {
    async fn start(&self, config: &EngineConfig) -> Result<(), EngineErrors> {
        let mut math_core = copy_config(&self.config);
        math_core.annotation |= config.semantics;
        let converter = build_converter(math_core)?;
        *self
            .converter
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = converter;
        debug!(
            op = "native::start",
            annotation = self.config.annotation || config.semantics,
            "converter configured"
        );
        Ok(())
    }

    async fn typeset(&self, job: &RenderJob) -> Result<Output, EngineErrors> {
        let mut unsupported = Vec::new();
        if job.svg || job.svg_node {
            unsupported.push("SVG output is not supported by the native typesetter".to_string());
        }
        if job.html || job.html_node || job.css {
            unsupported.push("HTML output is not supported by the native typesetter".to_string());
        }
        if !unsupported.is_empty() {
            return Err(EngineErrors(unsupported));
        }

        let mathml = self.convert(job)?;
        Ok(Output {
            mml_node: job
                .mml_node
                .then(|| MarkupNode::new(NodeKind::Mathml, mathml.as_str())),
            mml: job.mml.then_some(mathml),
            ..Default::default()
        })
    }
}
