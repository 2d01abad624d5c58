use std::{io::Read, path::PathBuf};

use async_trait::async_trait;
use clap::Parser;
use serde_json::Value;
use tracing::{debug, level_filters::LevelFilter};

use mjsre::{
    CommandSpeech, CommandTypesetter, EngineConfig, EnrichOption, Error, Extensions, Mjsre,
    NativeTypesetter, Options, Output, OutputFormat, SpeechConfig, SpeechEngine, SpeechError,
    TypesetEngine,
};

mod config_file;
mod telemetry;

use config_file::{Config, ConfigError, load_config_file};

/// Typesets a math expression and adds speech text to the output
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Typesets a math expression and adds speech text to the output",
    long_about = None
)]
struct Args {
    /// The math to typeset; read from stdin if omitted
    #[arg(value_name = "INPUT")]
    input: Option<String>,

    /// Include speech text (the default)
    #[arg(long, overrides_with = "no_speech")]
    speech: bool,

    /// Leave out speech text
    #[arg(long, overrides_with = "speech")]
    no_speech: bool,

    /// Speech engine flags as key value pairs
    #[arg(long, num_args = 2, value_names = ["KEY", "VALUE"])]
    sre: Vec<String>,

    /// Ruleset to use for speech text (mathspeak, clearspeak or chromevox)
    #[arg(long, value_name = "RULESET")]
    speechrules: Option<String>,

    /// Style to use for speech text (default, brief or sbrief)
    #[arg(long, value_name = "STYLE")]
    speechstyle: Option<String>,

    /// Depth of speech text (deep or shallow)
    #[arg(long, value_name = "DEPTH")]
    speechdepth: Option<String>,

    /// Print the semantic tree after the output
    #[arg(long)]
    semantic: bool,

    /// Print the semantic tree without indentation
    #[arg(long, requires = "semantic")]
    minstree: bool,

    /// Enrich the MathML before typesetting ("on" or "rerender")
    #[arg(
        long,
        value_name = "MODE",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "on"
    )]
    enrich: Option<String>,

    /// Perform automatic line-breaking
    #[arg(long)]
    linebreaks: bool,

    /// Input format (TeX, AsciiMath or MathML)
    #[arg(long, default_value = "TeX", value_name = "FORMAT")]
    format: String,

    /// Web font to use
    #[arg(long, default_value = "TeX")]
    font: String,

    /// Process TeX input as in-line TeX
    #[arg(long)]
    inline: bool,

    /// For TeX or AsciiMath input and MathML output, add the input in a <semantics> tag
    #[arg(long)]
    semantics: bool,

    /// For TeX input and MathML output, don't add TeX-specific classes
    #[arg(long)]
    notexhints: bool,

    /// Output format (SVG, CommonHTML or MML)
    #[arg(long, default_value = "svg", value_name = "FORMAT")]
    output: OutputFormat,

    /// Ex-size in pixels
    #[arg(long)]
    ex: Option<f64>,

    /// Width of the equation container in ex, for line-breaking
    #[arg(long)]
    width: Option<f64>,

    /// Extra extensions, e.g. 'Safe,TeX/noUndefined'
    #[arg(long, value_name = "LIST")]
    extensions: Option<String>,

    /// The URL to use for web fonts
    #[arg(long, alias = "fontURL", value_name = "URL")]
    font_url: Option<String>,

    /// With HTML output, print the required CSS rather than the HTML itself
    #[arg(long)]
    css: bool,

    /// Configuration file [default: mjsre.toml, if present]
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Args {
    fn input_format(&self) -> String {
        if self.inline && self.format.eq_ignore_ascii_case("TeX") {
            "inline-TeX".to_string()
        } else {
            self.format.clone()
        }
    }

    fn font(&self) -> String {
        if self.font == "STIX" {
            "STIX-Web".to_string()
        } else {
            self.font.clone()
        }
    }

    fn extensions(&self) -> Vec<String> {
        self.extensions
            .clone()
            .map(|joined| Extensions::Joined(joined).into_list())
            .unwrap_or_default()
    }

    fn options(&self, math: String) -> Options {
        Options {
            math: Some(math),
            format: Some(self.input_format()),
            svg: Some(self.output == OutputFormat::Svg),
            html: Some(self.output == OutputFormat::Html),
            mml: Some(self.output == OutputFormat::Mml),
            css: Some(self.css),
            font: Some(self.font()),
            ex: self.ex,
            width: self.width,
            linebreaks: Some(self.linebreaks),
            extensions: self.extensions.clone().map(Extensions::Joined),
            font_url: self.font_url.clone(),
            speak_text: Some(self.speech || !self.no_speech),
            speak_ruleset: self.speechrules.clone(),
            speak_style: self.speechstyle.clone(),
            speak_depth: self.speechdepth.clone(),
            semantic: Some(self.semantic),
            min_s_tree: Some(self.minstree),
            enrich: self.enrich.clone().map(EnrichOption::Mode),
            sre: (!self.sre.is_empty())
                .then(|| self.sre.iter().cloned().map(Value::String).collect()),
            ..Default::default()
        }
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            font: self.font(),
            semantics: self.semantics,
            tex_hints: !self.notexhints,
            extensions: self.extensions(),
        }
    }
}

/// Stands in for the speech engine when none is configured.
struct NoSpeech;

impl NoSpeech {
    fn unavailable<T>() -> Result<T, SpeechError> {
        Err(SpeechError(
            "no speech engine configured; set `command` in the [speech] table of the \
             configuration file, or pass --no-speech"
                .to_string(),
        ))
    }
}

#[async_trait]
impl SpeechEngine for NoSpeech {
    async fn to_speech(
        &self,
        _mathml: &str,
        _config: &SpeechConfig,
    ) -> Result<String, SpeechError> {
        Self::unavailable()
    }

    async fn to_json(&self, _mathml: &str) -> Result<Value, SpeechError> {
        Self::unavailable()
    }

    async fn to_semantic_xml(&self, _mathml: &str) -> Result<String, SpeechError> {
        Self::unavailable()
    }

    async fn to_enriched(
        &self,
        _mathml: &str,
        _config: &SpeechConfig,
    ) -> Result<String, SpeechError> {
        Self::unavailable()
    }
}

type Engines = (Box<dyn TypesetEngine>, Box<dyn SpeechEngine>);

fn engines(config: &mut Config) -> Result<Engines, String> {
    let typesetter: Box<dyn TypesetEngine> = if config.typesetter.is_configured() {
        let argv = config.typesetter.command.iter().cloned();
        Box::new(CommandTypesetter::new(argv).map_err(|e| e.to_string())?)
    } else {
        let native = std::mem::take(&mut config.native);
        Box::new(NativeTypesetter::new(native).map_err(|e| e.to_string())?)
    };
    let speech: Box<dyn SpeechEngine> = if config.speech.is_configured() {
        let argv = config.speech.command.iter().cloned();
        Box::new(CommandSpeech::new(argv).map_err(|e| e.to_string())?)
    } else {
        Box::new(NoSpeech)
    };
    Ok((typesetter, speech))
}

/// The text printed for a successful conversion.
fn render_output(args: &Args, output: &Output) -> String {
    let mut text = if args.css {
        output.css.clone().unwrap_or_default()
    } else {
        output.get(args.output).unwrap_or_default().to_string()
    };
    if args.semantic
        && let Some(xml) = &output.stree_xml
    {
        text.push('\n');
        text.push_str(xml);
    }
    text
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let mut config =
        load_config_file(args.config.as_deref()).unwrap_or_else(|e| exit_config_error(e));
    let level = config
        .log
        .level_filter()
        .unwrap_or_else(|e| exit_config_error(e));
    if let Err(e) = telemetry::init(level, config.log.format) {
        eprintln!("{}", e);
    }
    debug!(op = "cli::config", level = %LevelFilter::current(), "configuration loaded");

    let (typesetter, speech) = engines(&mut config).unwrap_or_else(|e| exit_engine_error(&e));
    let mjsre = Mjsre::new(typesetter, speech);
    if let Err(e) = mjsre.start(&args.engine_config()).await {
        exit_conversion_error(e);
    }

    let math = match &args.input {
        Some(input) => input.clone(),
        None => read_stdin(),
    };
    match mjsre.typeset(args.options(math).normalize()).await {
        Ok(output) => println!("{}", render_output(&args, &output)),
        Err(e) => exit_conversion_error(e),
    }
}

fn read_stdin() -> String {
    let mut buffer = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut buffer) {
        exit_io_error(e);
    }
    buffer
}

fn exit_conversion_error(e: Error) -> ! {
    match e {
        // Engine errors are part of the regular output.
        Error::Engine(errors) => {
            for message in errors.0 {
                println!("{}", message);
            }
        }
        e => eprintln!("Conversion error: {}", e),
    }
    std::process::exit(2);
}

fn exit_engine_error(e: &str) -> ! {
    eprintln!("Engine error: {}", e);
    std::process::exit(1);
}

fn exit_config_error(e: ConfigError) -> ! {
    eprintln!("Config error: {}", e);
    std::process::exit(1);
}

fn exit_io_error(e: std::io::Error) -> ! {
    eprintln!("IO Error: {}", e);
    std::process::exit(1);
}
