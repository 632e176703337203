//! Per-provider quirk flags (spec §4.C table) and the kwargs transform that
//! applies them to a wire-ready JSON body.

use serde_json::{Map, Value};

use super::{is_reasoning_model, ModelKwargs};

#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderQuirks {
    pub strip_sampling_for_reasoning_models: bool,
    pub no_temperature_with_top_p: bool,
    pub require_max_tokens: bool,
    pub stream_removal: bool,
    pub system_prompt_split: bool,
}

impl ProviderQuirks {
    pub fn openai() -> Self {
        Self {
            strip_sampling_for_reasoning_models: true,
            ..Default::default()
        }
    }

    pub fn anthropic() -> Self {
        Self {
            no_temperature_with_top_p: true,
            require_max_tokens: true,
            stream_removal: true,
            system_prompt_split: true,
            ..Default::default()
        }
    }

    pub fn google() -> Self {
        Self {
            system_prompt_split: true,
            ..Default::default()
        }
    }

    pub fn ollama() -> Self {
        Self::default()
    }

    /// Mutates `body` (a JSON object already populated with sampling keys)
    /// per the active quirks. `model` decides the reasoning-model check;
    /// `default_max_tokens` is inserted only when `require_max_tokens` is
    /// set and the field is absent.
    pub fn apply(&self, body: &mut Map<String, Value>, model: &str, kwargs: &ModelKwargs, default_max_tokens: u32) {
        if self.strip_sampling_for_reasoning_models && is_reasoning_model(model) {
            for key in ["temperature", "top_p", "frequency_penalty", "presence_penalty"] {
                body.remove(key);
            }
        }

        if self.no_temperature_with_top_p && kwargs.temperature.is_some() && kwargs.top_p.is_some() {
            body.remove("top_p");
        }

        if self.require_max_tokens && !body.contains_key("max_tokens") {
            body.insert("max_tokens".to_string(), Value::from(default_max_tokens));
        }

        if self.stream_removal {
            body.remove("stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_sampling_params_for_reasoning_models() {
        let quirks = ProviderQuirks::openai();
        let mut body = Map::new();
        body.insert("temperature".into(), Value::from(0.7));
        body.insert("top_p".into(), Value::from(0.9));
        let kwargs = ModelKwargs::default();
        quirks.apply(&mut body, "o1-preview", &kwargs, 4096);
        assert!(!body.contains_key("temperature"));
        assert!(!body.contains_key("top_p"));
    }

    #[test]
    fn anthropic_quirks_insert_max_tokens_and_drop_stream_field() {
        let quirks = ProviderQuirks::anthropic();
        let mut body = Map::new();
        body.insert("stream".into(), Value::from(true));
        let kwargs = ModelKwargs::default();
        quirks.apply(&mut body, "claude-3-5-sonnet", &kwargs, 4096);
        assert_eq!(body.get("max_tokens"), Some(&Value::from(4096)));
        assert!(!body.contains_key("stream"));
    }

    #[test]
    fn anthropic_drops_top_p_when_temperature_also_set() {
        let quirks = ProviderQuirks::anthropic();
        let mut body = Map::new();
        body.insert("temperature".into(), Value::from(0.5));
        body.insert("top_p".into(), Value::from(0.9));
        let kwargs = ModelKwargs {
            temperature: Some(0.5),
            top_p: Some(0.9),
            ..Default::default()
        };
        quirks.apply(&mut body, "claude-3-5-sonnet", &kwargs, 4096);
        assert!(body.contains_key("temperature"));
        assert!(!body.contains_key("top_p"));
    }
}
