//! Generation parameters shared by every generator in a run
//!
//! The configuration keys are consumed verbatim by the backends:
//! `max_length`, `temperature`, `do_sample`, `no_repeat_ngram_size` and
//! `eos_token_id_list`. The last one is a textual list literal such as
//! `"[2, 13]"` and is parsed with [`GenerationConfig::eos_token_ids`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating generation parameters
#[derive(Debug, Error, PartialEq)]
pub enum GenerationConfigError {
    #[error("max_length must be positive")]
    ZeroMaxLength,

    #[error("temperature must be a non-negative number, got {0}")]
    InvalidTemperature(f32),

    #[error("eos_token_id_list is not a list of integers: {0}")]
    InvalidTokenList(String),
}

/// Read-only generation configuration.
///
/// Built once per run and shared behind an `Arc`; nothing mutates it after
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum number of new tokens
    pub max_length: u32,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,
    /// Whether sampling is enabled
    #[serde(default)]
    pub do_sample: bool,
    /// Repetition-avoidance window (0 disables it)
    #[serde(default)]
    pub no_repeat_ngram_size: u32,
    /// Extra stop tokens, as a list literal
    #[serde(default = "default_eos_token_id_list")]
    pub eos_token_id_list: String,
}

fn default_eos_token_id_list() -> String {
    "[]".to_string()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: 256,
            temperature: 0.0,
            do_sample: false,
            no_repeat_ngram_size: 0,
            eos_token_id_list: default_eos_token_id_list(),
        }
    }
}

impl GenerationConfig {
    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_sampling(mut self, do_sample: bool) -> Self {
        self.do_sample = do_sample;
        self
    }

    pub fn with_no_repeat_ngram_size(mut self, size: u32) -> Self {
        self.no_repeat_ngram_size = size;
        self
    }

    pub fn with_eos_token_id_list(mut self, literal: impl Into<String>) -> Self {
        self.eos_token_id_list = literal.into();
        self
    }

    /// Check the documented value ranges
    pub fn validate(&self) -> Result<(), GenerationConfigError> {
        if self.max_length == 0 {
            return Err(GenerationConfigError::ZeroMaxLength);
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(GenerationConfigError::InvalidTemperature(self.temperature));
        }
        self.eos_token_ids()?;
        Ok(())
    }

    /// Parse `eos_token_id_list` into token ids.
    ///
    /// An empty or whitespace-only literal is treated as an empty list.
    pub fn eos_token_ids(&self) -> Result<Vec<i64>, GenerationConfigError> {
        let literal = self.eos_token_id_list.trim();
        if literal.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str::<Vec<i64>>(literal)
            .map_err(|_| GenerationConfigError::InvalidTokenList(literal.to_string()))
    }

    /// The parameters as a JSON map, keyed exactly like the configuration file
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "max_length": self.max_length,
            "temperature": self.temperature,
            "do_sample": self.do_sample,
            "no_repeat_ngram_size": self.no_repeat_ngram_size,
            "eos_token_id_list": self.eos_token_id_list,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_eos_token_list_literal() {
        let cfg = GenerationConfig::default().with_eos_token_id_list("[2, 13, 50256]");
        assert_eq!(cfg.eos_token_ids().unwrap(), vec![2, 13, 50256]);
    }

    #[test]
    fn empty_literal_is_empty_list() {
        let cfg = GenerationConfig::default().with_eos_token_id_list("  ");
        assert!(cfg.eos_token_ids().unwrap().is_empty());
    }

    #[test]
    fn rejects_non_integer_token_list() {
        let cfg = GenerationConfig::default().with_eos_token_id_list("['</s>']");
        assert!(matches!(
            cfg.validate(),
            Err(GenerationConfigError::InvalidTokenList(_))
        ));
    }

    #[test]
    fn rejects_zero_max_length_and_negative_temperature() {
        assert_eq!(
            GenerationConfig::default().with_max_length(0).validate(),
            Err(GenerationConfigError::ZeroMaxLength)
        );
        assert_eq!(
            GenerationConfig::default().with_temperature(-0.5).validate(),
            Err(GenerationConfigError::InvalidTemperature(-0.5))
        );
    }

    #[test]
    fn deserializes_configuration_keys() {
        let yaml = "max_length: 128\ntemperature: 0.2\ndo_sample: true\nno_repeat_ngram_size: 3\neos_token_id_list: \"[1]\"\n";
        let cfg: GenerationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.max_length, 128);
        assert!(cfg.do_sample);
        assert_eq!(cfg.no_repeat_ngram_size, 3);
        assert_eq!(cfg.eos_token_ids().unwrap(), vec![1]);
    }
}
