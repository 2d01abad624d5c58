use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::request::Request;

/// Speech depth used when neither the request nor the engine flags set one.
pub const DEFAULT_DEPTH: &str = "deep";

/// Configuration for one speech engine call.
///
/// Engines receive this on every call instead of being configured globally, so two requests
/// with different speech settings never observe each other's configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechConfig {
    pub semantics: bool,
    pub domain: String,
    pub style: String,
    /// Speech depth, e.g. `deep` or `shallow`.
    pub speech: String,
    /// Further engine flags, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SpeechConfig {
    /// Engine defaults first, then the request's speech options, then its explicit flags.
    pub fn from_request(request: &Request) -> Self {
        let mut config = SpeechConfig {
            semantics: true,
            domain: request.speech.domain.clone(),
            style: request.speech.style.clone(),
            speech: request
                .speech
                .depth
                .clone()
                .unwrap_or_else(|| DEFAULT_DEPTH.to_string()),
            extra: Map::new(),
        };
        for (key, value) in request.sre.iter() {
            config.apply(key, value);
        }
        config
    }

    fn apply(&mut self, key: &str, value: &Value) {
        let target = match key {
            "domain" => &mut self.domain,
            "style" => &mut self.style,
            "speech" => &mut self.speech,
            "semantics" => {
                match value.as_bool() {
                    Some(flag) => self.semantics = flag,
                    None => warn!(op = "speech::config", %value, "semantics flag is not a boolean"),
                }
                return;
            }
            _ => {
                self.extra.insert(key.to_string(), value.clone());
                return;
            }
        };
        *target = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
    }
}
