//! Engines that run as external programs.
//!
//! Both bridges start one process per call, write a JSON request to its stdin and read a JSON
//! reply from its stdout.
//!
//! Typesetter request: `{"config": EngineConfig, "job": RenderJob}`. Reply: either
//! `{"errors": [..]}` or any of `svg`, `html`, `mml`, `css`, `width`, `height`, `style`.
//!
//! Speech request: `{"op": "speech" | "json" | "semantic" | "enriched", "mathml": .., "config":
//! SpeechConfig}`. Reply: `{"result": ..}` or `{"error": ".."}`.
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
    process::Stdio,
    sync::RwLock,
    time::Instant,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, warn};

use crate::{
    engine::{EngineConfig, EngineErrors, SpeechEngine, SpeechError, TypesetEngine},
    markup::{MarkupNode, NodeKind},
    output::Output,
    render::RenderJob,
    speech::SpeechConfig,
};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("engine command is empty")]
    EmptyCommand,
    #[error("engine program unavailable: {0}")]
    NotFound(io::Error),
    #[error("failed to talk to engine program: {0}")]
    Io(io::Error),
    #[error("engine program failed (exit {exit_code:?}): {stderr}")]
    Exit {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("malformed engine reply: {0}")]
    Reply(#[from] serde_json::Error),
}

impl From<ProcessError> for EngineErrors {
    fn from(err: ProcessError) -> Self {
        EngineErrors::single(err.to_string())
    }
}

impl From<ProcessError> for SpeechError {
    fn from(err: ProcessError) -> Self {
        SpeechError(err.to_string())
    }
}

/// Program and arguments of an engine command.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Program {
    path: PathBuf,
    args: Vec<String>,
}

impl Program {
    fn from_argv<I, A>(argv: I) -> Result<Self, ProcessError>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let path = argv.next().ok_or(ProcessError::EmptyCommand)?;
        if path.is_empty() {
            return Err(ProcessError::EmptyCommand);
        }
        Ok(Program {
            path: PathBuf::from(path),
            args: argv.collect(),
        })
    }

    fn spawn_error(&self, err: io::Error) -> ProcessError {
        warn!(
            op = "process::spawn",
            program = %self.path.display(),
            error = %err,
            "failed to spawn engine program"
        );
        if err.kind() == ErrorKind::NotFound {
            ProcessError::NotFound(err)
        } else {
            ProcessError::Io(err)
        }
    }

    /// Run the program with `payload` on stdin and return its stdout.
    async fn run(&self, payload: &[u8]) -> Result<Vec<u8>, ProcessError> {
        let started_at = Instant::now();
        let mut child = Command::new(&self.path)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| self.spawn_error(err))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(payload).await.map_err(ProcessError::Io)?;
            stdin.shutdown().await.map_err(ProcessError::Io)?;
        }
        let output = child.wait_with_output().await.map_err(ProcessError::Io)?;
        self.check_exit(output.status, &output.stderr, started_at)?;
        Ok(output.stdout)
    }

    fn check_exit(
        &self,
        status: std::process::ExitStatus,
        stderr: &[u8],
        started_at: Instant,
    ) -> Result<(), ProcessError> {
        if status.success() {
            debug!(
                op = "process::exit",
                program = %self.path.display(),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "engine program finished"
            );
            return Ok(());
        }
        let exit_code = status.code();
        let stderr = String::from_utf8_lossy(stderr).trim().to_string();
        warn!(
            op = "process::exit",
            program = %self.path.display(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            exit_code = exit_code.map(i64::from).unwrap_or(-1),
            stderr = %stderr,
            "engine program failed"
        );
        Err(ProcessError::Exit { exit_code, stderr })
    }
}

#[derive(Serialize)]
struct TypesetRequest<'a> {
    config: &'a EngineConfig,
    job: &'a RenderJob,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TypesetReply {
    errors: Option<Vec<String>>,
    svg: Option<String>,
    html: Option<String>,
    mml: Option<String>,
    css: Option<String>,
    width: Option<String>,
    height: Option<String>,
    style: Option<String>,
}

impl TypesetReply {
    /// Build the output, including the node forms the job asked for.
    fn into_output(self, job: &RenderJob) -> Result<Output, EngineErrors> {
        if let Some(errors) = self.errors.filter(|errors| !errors.is_empty()) {
            return Err(EngineErrors(errors));
        }
        let node = |wanted: bool, kind: NodeKind, markup: &Option<String>| {
            markup
                .as_deref()
                .filter(|_| wanted)
                .map(|markup| MarkupNode::new(kind, markup))
        };
        Ok(Output {
            svg_node: node(job.svg_node, NodeKind::Svg, &self.svg),
            html_node: node(job.html_node, NodeKind::Html, &self.html),
            mml_node: node(job.mml_node, NodeKind::Mathml, &self.mml),
            svg: self.svg.filter(|_| job.svg),
            html: self.html.filter(|_| job.html),
            mml: self.mml.filter(|_| job.mml),
            css: self.css.filter(|_| job.css),
            width: self.width,
            height: self.height,
            style: self.style,
            ..Default::default()
        })
    }
}

/// A typesetting engine running as an external program.
#[derive(Debug)]
pub struct CommandTypesetter {
    program: Program,
    config: RwLock<EngineConfig>,
}

impl CommandTypesetter {
    /// `argv` is the program followed by its arguments.
    pub fn new<I, A>(argv: I) -> Result<Self, ProcessError>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Ok(CommandTypesetter {
            program: Program::from_argv(argv)?,
            config: RwLock::new(EngineConfig::default()),
        })
    }

    async fn call(&self, job: &RenderJob) -> Result<TypesetReply, ProcessError> {
        let payload = {
            let config = self
                .config
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            serde_json::to_vec(&TypesetRequest {
                config: &config,
                job,
            })?
        };
        let stdout = self.program.run(&payload).await?;
        Ok(serde_json::from_slice(&stdout)?)
    }
}

#[async_trait]
impl TypesetEngine for CommandTypesetter {
    async fn start(&self, config: &EngineConfig) -> Result<(), EngineErrors> {
        let mut current = self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = config.clone();
        Ok(())
    }

    async fn typeset(&self, job: &RenderJob) -> Result<Output, EngineErrors> {
        self.call(job).await?.into_output(job)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum SpeechOp {
    Speech,
    Json,
    Semantic,
    Enriched,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    op: SpeechOp,
    mathml: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<&'a SpeechConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpeechReply {
    Result { result: Value },
    Error { error: String },
}

/// A speech engine running as an external program.
#[derive(Debug, Clone)]
pub struct CommandSpeech {
    program: Program,
}

impl CommandSpeech {
    /// `argv` is the program followed by its arguments.
    pub fn new<I, A>(argv: I) -> Result<Self, ProcessError>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Ok(CommandSpeech {
            program: Program::from_argv(argv)?,
        })
    }

    async fn call(
        &self,
        op: SpeechOp,
        mathml: &str,
        config: Option<&SpeechConfig>,
    ) -> Result<Value, SpeechError> {
        let payload = serde_json::to_vec(&SpeechRequest { op, mathml, config })
            .map_err(ProcessError::from)?;
        let stdout = self.program.run(&payload).await?;

        match serde_json::from_slice(&stdout).map_err(ProcessError::from)? {
            SpeechReply::Result { result } => Ok(result),
            SpeechReply::Error { error } => {
                warn!(op = "process::speech", ?op, error = %error, "speech engine reported an error");
                Err(SpeechError(error))
            }
        }
    }

    async fn call_string(
        &self,
        op: SpeechOp,
        mathml: &str,
        config: Option<&SpeechConfig>,
    ) -> Result<String, SpeechError> {
        match self.call(op, mathml, config).await? {
            Value::String(text) => Ok(text),
            other => Err(SpeechError(format!(
                "expected a string from the speech engine, got {other}"
            ))),
        }
    }
}

#[async_trait]
impl SpeechEngine for CommandSpeech {
    async fn to_speech(
        &self,
        mathml: &str,
        config: &SpeechConfig,
    ) -> Result<String, SpeechError> {
        self.call_string(SpeechOp::Speech, mathml, Some(config)).await
    }

    async fn to_json(&self, mathml: &str) -> Result<Value, SpeechError> {
        self.call(SpeechOp::Json, mathml, None).await
    }

    async fn to_semantic_xml(&self, mathml: &str) -> Result<String, SpeechError> {
        self.call_string(SpeechOp::Semantic, mathml, None).await
    }

    async fn to_enriched(
        &self,
        mathml: &str,
        config: &SpeechConfig,
    ) -> Result<String, SpeechError> {
        self.call_string(SpeechOp::Enriched, mathml, Some(config)).await
    }
}
