use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use crate::request::{
    Enrich, InputFormat, RenderOptions, Request, SemanticOptions, SpeechOptions, Visibility,
};

pub const DEFAULT_DOMAIN: &str = "mathspeak";
pub const DEFAULT_STYLE: &str = "default";
pub const DEFAULT_FONT: &str = "TeX";
pub const DEFAULT_EX: f64 = 6.0;
pub const DEFAULT_WIDTH: f64 = 100.0;
pub const DEFAULT_FONT_URL: &str = "https://cdnjs.cloudflare.com/ajax/libs/mathjax/2.7.2/fonts/HTML-CSS";

/// The raw, lenient option bag.
///
/// Every field is optional. Besides the canonical names, the deprecated aliases are accepted;
/// when both an alias and the canonical key are given, the canonical key wins. Unknown keys are
/// ignored, so option objects written for newer versions still deserialize.
///
/// ```rust
/// use mjsre::Options;
///
/// let options: Options = serde_json::from_str(
///     r#"{"math": "x", "speechrules": "chromevox", "sre": ["semantics", "true"]}"#,
/// )
/// .unwrap();
/// let request = options.normalize();
/// assert_eq!(request.speech.domain, "default");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub math: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Defaults to `true` when none of `svg`, `html` and `mml` is given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub svg: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mml: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub svg_node: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_node: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mml_node: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ex: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linebreaks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
    #[serde(rename = "fontURL", skip_serializing_if = "Option::is_none")]
    pub font_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speak_text: Option<bool>,
    /// Deprecated alias of `speakText`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speak_ruleset: Option<String>,
    /// Deprecated alias of `speakRuleset`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speechrules: Option<String>,
    /// Deprecated alias of `speakRuleset`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ruleset: Option<String>,
    /// Deprecated alias of `speakRuleset`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speak_style: Option<String>,
    /// Deprecated alias of `speakStyle`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speechstyle: Option<String>,
    /// Deprecated alias of `speakStyle`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speak_depth: Option<String>,
    /// Deprecated alias of `speakDepth`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic: Option<bool>,
    /// Deprecated alias of `semantic`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stree: Option<bool>,
    #[serde(rename = "minSTree", skip_serializing_if = "Option::is_none")]
    pub min_s_tree: Option<bool>,
    /// Deprecated alias of `minSTree`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minify: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrich: Option<EnrichOption>,

    /// Speech engine flags as alternating key/value pairs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sre: Option<Vec<Value>>,
}

/// Extensions are given either as a comma separated string or as a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Extensions {
    List(Vec<String>),
    Joined(String),
}

impl Extensions {
    /// The extension names, trimmed, without empty entries and duplicates.
    pub fn into_list(self) -> Vec<String> {
        let raw = match self {
            Extensions::List(list) => list,
            Extensions::Joined(joined) => joined.split(',').map(str::to_string).collect(),
        };
        let mut list: Vec<String> = Vec::with_capacity(raw.len());
        for ext in raw {
            let ext = ext.trim();
            if !ext.is_empty() && !list.iter().any(|seen| seen == ext) {
                list.push(ext.to_string());
            }
        }
        list
    }
}

/// The enrichment flag: a boolean, or the string `"rerender"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnrichOption {
    Flag(bool),
    Mode(String),
}

impl From<Enrich> for EnrichOption {
    fn from(enrich: Enrich) -> Self {
        match enrich {
            Enrich::Off => EnrichOption::Flag(false),
            Enrich::On => EnrichOption::Flag(true),
            Enrich::Rerender => EnrichOption::Mode("rerender".to_string()),
        }
    }
}

impl EnrichOption {
    fn resolve(&self) -> Enrich {
        match self {
            EnrichOption::Flag(true) => Enrich::On,
            EnrichOption::Flag(false) => Enrich::Off,
            EnrichOption::Mode(mode) => mode.parse().unwrap_or_else(|err| {
                warn!(op = "options::normalize", %err, "ignoring enrichment mode");
                Enrich::Off
            }),
        }
    }
}

impl Options {
    /// Resolve aliases and apply defaults, producing a canonical [`Request`].
    ///
    /// Normalization never fails: values that cannot be interpreted fall back to their defaults.
    pub fn normalize(self) -> Request {
        let format = self
            .format
            .as_deref()
            .and_then(|name| {
                name.parse::<InputFormat>()
                    .inspect_err(|_| {
                        warn!(op = "options::normalize", format = name, "unknown input format");
                    })
                    .ok()
            })
            .unwrap_or_default();

        // SVG unless any of the string outputs was mentioned.
        let no_output = self.svg.is_none() && self.html.is_none() && self.mml.is_none();
        let outputs = Visibility {
            svg: self.svg.unwrap_or(no_output),
            html: self.html.unwrap_or(false),
            mml: self.mml.unwrap_or(false),
            css: self.css.unwrap_or(false),
            svg_node: self.svg_node.unwrap_or(false),
            html_node: self.html_node.unwrap_or(false),
            mml_node: self.mml_node.unwrap_or(false),
        };

        let render = RenderOptions {
            font: self.font.unwrap_or_else(|| DEFAULT_FONT.to_string()),
            ex: self.ex.unwrap_or(DEFAULT_EX),
            width: self.width.unwrap_or(DEFAULT_WIDTH),
            linebreaks: self.linebreaks.unwrap_or(false),
            extensions: self.extensions.map(Extensions::into_list).unwrap_or_default(),
            font_url: self.font_url.unwrap_or_else(|| DEFAULT_FONT_URL.to_string()),
        };

        let domain = self
            .speak_ruleset
            .or(self.speechrules)
            .or(self.ruleset)
            .or(self.domain)
            .map_or_else(|| DEFAULT_DOMAIN.to_string(), canonical_domain);
        let speech = SpeechOptions {
            speak_text: self.speak_text.or(self.speech).unwrap_or(true),
            domain,
            style: self
                .speak_style
                .or(self.speechstyle)
                .or(self.style)
                .unwrap_or_else(|| DEFAULT_STYLE.to_string()),
            depth: self.speak_depth.or(self.depth),
        };

        let semantic = SemanticOptions {
            enabled: self.semantic.or(self.stree).unwrap_or(false),
            minify: self.min_s_tree.or(self.minify).unwrap_or(false),
        };

        let request = Request {
            math: self.math.or(self.source).unwrap_or_default(),
            format,
            outputs,
            render,
            speech,
            semantic,
            enrich: self.enrich.as_ref().map_or(Enrich::Off, EnrichOption::resolve),
            sre: self.sre.map(SreFlags::from_pairs).unwrap_or_default(),
        };
        debug!(
            op = "options::normalize",
            format = request.format.as_str(),
            speak_text = request.speech.speak_text,
            semantic = request.semantic.enabled,
            enrich = ?request.enrich,
            "normalized request"
        );
        request
    }
}

impl From<Request> for Options {
    /// Writes canonical keys only, so normalizing the result yields `request` again.
    fn from(request: Request) -> Self {
        Options {
            math: Some(request.math),
            format: Some(request.format.as_str().to_string()),
            svg: Some(request.outputs.svg),
            html: Some(request.outputs.html),
            mml: Some(request.outputs.mml),
            css: Some(request.outputs.css),
            svg_node: Some(request.outputs.svg_node),
            html_node: Some(request.outputs.html_node),
            mml_node: Some(request.outputs.mml_node),
            font: Some(request.render.font),
            ex: Some(request.render.ex),
            width: Some(request.render.width),
            linebreaks: Some(request.render.linebreaks),
            extensions: Some(Extensions::List(request.render.extensions)),
            font_url: Some(request.render.font_url),
            speak_text: Some(request.speech.speak_text),
            speak_ruleset: Some(request.speech.domain),
            speak_style: Some(request.speech.style),
            speak_depth: request.speech.depth,
            semantic: Some(request.semantic.enabled),
            min_s_tree: Some(request.semantic.minify),
            enrich: Some(request.enrich.into()),
            sre: Some(request.sre.to_pairs()),
            ..Default::default()
        }
    }
}

/// The old `chromevox` rule set lives on as the `default` domain.
fn canonical_domain(name: String) -> String {
    if name.eq_ignore_ascii_case("chromevox") {
        "default".to_string()
    } else {
        name
    }
}

/// Free-form speech engine flags as a nested mapping.
///
/// Built from alternating key/value pairs. Dotted keys nest (`a.b` becomes `{"a": {"b": ..}}`),
/// and string values that look like booleans or numbers are stored as such. Later pairs
/// override earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SreFlags(Map<String, Value>);

impl SreFlags {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let mut flags = Map::new();
        let mut pairs = pairs.into_iter().map(Into::into);
        while let Some(key) = pairs.next() {
            let key = match key {
                Value::String(key) => key,
                other => other.to_string(),
            };
            let Some(value) = pairs.next() else {
                warn!(op = "options::sre", key = %key, "dropping flag without a value");
                break;
            };
            insert_dotted(&mut flags, &key, parse_flag_value(value));
        }
        SreFlags(flags)
    }

    /// The inverse of [`SreFlags::from_pairs`], with dotted keys for nested entries.
    pub fn to_pairs(&self) -> Vec<Value> {
        let mut pairs = Vec::new();
        flatten_into(&mut pairs, "", &self.0);
        pairs
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    #[inline]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

fn parse_flag_value(value: Value) -> Value {
    let text = match value {
        Value::String(text) => text,
        Value::Object(map) => {
            return Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, parse_flag_value(value)))
                    .collect(),
            );
        }
        other => return other,
    };
    match text.as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(int) = text.parse::<i64>() {
                Value::Number(int.into())
            } else if let Some(number) = text.parse::<f64>().ok().and_then(Number::from_f64) {
                Value::Number(number)
            } else {
                Value::String(text)
            }
        }
    }
}

fn insert_dotted(map: &mut Map<String, Value>, key: &str, value: Value) {
    match key.split_once('.') {
        Some((head, rest)) if !head.is_empty() && !rest.is_empty() => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                insert_dotted(child, rest, value);
            }
        }
        _ => {
            map.insert(key.to_string(), value);
        }
    }
}

fn flatten_into(pairs: &mut Vec<Value>, prefix: &str, map: &Map<String, Value>) {
    for (key, value) in map {
        let key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(child) if !child.is_empty() => flatten_into(pairs, &key, child),
            _ => {
                pairs.push(Value::String(key));
                pairs.push(value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::request::OutputFormat;

    #[test]
    fn defaults() {
        let request = Options::default().normalize();
        assert_eq!(request.math, "");
        assert_eq!(request.format, InputFormat::Tex);
        assert_eq!(request.outputs, Visibility::only(OutputFormat::Svg));
        assert_eq!(request.render.font, "TeX");
        assert_eq!(request.render.ex, 6.0);
        assert_eq!(request.render.width, 100.0);
        assert!(request.render.extensions.is_empty());
        assert_eq!(request.render.font_url, DEFAULT_FONT_URL);
        assert!(request.speech.speak_text);
        assert_eq!(request.speech.domain, "mathspeak");
        assert_eq!(request.speech.style, "default");
        assert_eq!(request.speech.depth, None);
        assert!(!request.semantic.enabled);
        assert!(!request.semantic.minify);
        assert_eq!(request.enrich, Enrich::Off);
        assert!(request.sre.is_empty());
    }

    #[test]
    fn svg_unless_an_output_is_named() {
        let outputs = |value| {
            serde_json::from_value::<Options>(value)
                .unwrap()
                .normalize()
                .outputs
        };
        assert!(outputs(json!({"css": true})).svg);
        assert_eq!(outputs(json!({"mml": true})), Visibility::only(OutputFormat::Mml));
        assert_eq!(outputs(json!({"html": false})), Visibility::default());

        let mut request = Request::default();
        request.outputs = Visibility::default();
        let again = Options::from(request).normalize();
        assert_eq!(again.outputs, Visibility::default());
    }

    #[test]
    fn deprecated_aliases() {
        let options: Options = serde_json::from_value(json!({
            "source": "x^2",
            "speech": false,
            "speechrules": "ChromeVox",
            "speechstyle": "brief",
            "depth": "shallow",
            "stree": true,
            "minify": true,
        }))
        .unwrap();
        let request = options.normalize();
        assert_eq!(request.math, "x^2");
        assert!(!request.speech.speak_text);
        assert_eq!(request.speech.domain, "default");
        assert_eq!(request.speech.style, "brief");
        assert_eq!(request.speech.depth.as_deref(), Some("shallow"));
        assert!(request.semantic.enabled);
        assert!(request.semantic.minify);
    }

    #[test]
    fn canonical_key_wins_over_alias() {
        let options: Options = serde_json::from_value(json!({
            "speakRuleset": "clearspeak",
            "ruleset": "chromevox",
            "speakText": true,
            "speech": false,
            "math": "y",
            "source": "x",
        }))
        .unwrap();
        let request = options.normalize();
        assert_eq!(request.speech.domain, "clearspeak");
        assert!(request.speech.speak_text);
        assert_eq!(request.math, "y");
    }

    #[test]
    fn unknown_keys_and_values_are_ignored() {
        let options: Options = serde_json::from_value(json!({
            "math": "x",
            "format": "Markdown",
            "somethingNew": {"nested": 1},
            "enrich": "sometimes",
        }))
        .unwrap();
        let request = options.normalize();
        assert_eq!(request.format, InputFormat::Tex);
        assert_eq!(request.enrich, Enrich::Off);
    }

    #[test]
    fn enrich_flag_variants() {
        for (value, expected) in [
            (json!(true), Enrich::On),
            (json!(false), Enrich::Off),
            (json!("rerender"), Enrich::Rerender),
        ] {
            let options: Options = serde_json::from_value(json!({ "enrich": value })).unwrap();
            assert_eq!(options.normalize().enrich, expected);
        }
    }

    #[test]
    fn extensions_are_split_and_deduplicated() {
        let options: Options =
            serde_json::from_value(json!({"extensions": "Safe, TeX/noUndefined,,Safe"})).unwrap();
        assert_eq!(
            options.normalize().render.extensions,
            ["Safe", "TeX/noUndefined"]
        );
        let options: Options =
            serde_json::from_value(json!({"extensions": ["TeX/AMSmath", " TeX/AMSmath "]}))
                .unwrap();
        assert_eq!(options.normalize().render.extensions, ["TeX/AMSmath"]);
    }

    #[test]
    fn sre_pairs() {
        let flags = SreFlags::from_pairs([
            "semantics",
            "true",
            "speech",
            "shallow",
            "walker.depth",
            "2",
            "walker.ratio",
            "0.5",
            "walker.name",
            "table",
            "speech",
            "deep",
        ]);
        assert_eq!(
            Value::Object(flags.as_map().clone()),
            json!({
                "semantics": true,
                "speech": "deep",
                "walker": {"depth": 2, "ratio": 0.5, "name": "table"},
            })
        );
    }

    #[test]
    fn sre_dangling_key_is_dropped() {
        let flags = SreFlags::from_pairs(["domain", "clearspeak", "style"]);
        assert_eq!(Value::Object(flags.as_map().clone()), json!({"domain": "clearspeak"}));
    }

    #[test]
    fn sre_typed_json_values() {
        let options: Options =
            serde_json::from_value(json!({"sre": ["semantics", false, "walker.depth", 3]})).unwrap();
        let request = options.normalize();
        assert_eq!(request.sre.get("semantics"), Some(&json!(false)));
        assert_eq!(request.sre.get("walker"), Some(&json!({"depth": 3})));
    }

    #[test]
    fn normalization_is_idempotent() {
        let options: Options = serde_json::from_value(json!({
            "math": "\\frac{1}{2}",
            "format": "inline-TeX",
            "svg": true,
            "mml": true,
            "speechrules": "chromevox",
            "speakStyle": "sbrief",
            "stree": true,
            "extensions": "Safe,Safe",
            "fontURL": "https://example.org/fonts",
            "enrich": "rerender",
            "sre": [
                "speech", "deep",
                "walker.depth", "2",
                "locale", "en",
                "clearspeak", {"enabled": "true", "level": "2", "rules": {"frac": "over"}},
            ],
        }))
        .unwrap();
        let once = options.normalize();
        assert_eq!(
            once.sre.get("clearspeak"),
            Some(&json!({"enabled": true, "level": 2, "rules": {"frac": "over"}}))
        );
        let twice = Options::from(once.clone()).normalize();
        assert_eq!(once, twice);
        assert_eq!(Options::from(twice.clone()).normalize(), twice);
    }

    #[test]
    fn canonical_options_survive_serde() {
        let request = Options {
            math: Some("x".to_string()),
            html: Some(true),
            enrich: Some(EnrichOption::Flag(true)),
            ..Default::default()
        }
        .normalize();
        let json = serde_json::to_string(&Options::from(request.clone())).unwrap();
        let parsed: Options = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.normalize(), request);
    }
}
