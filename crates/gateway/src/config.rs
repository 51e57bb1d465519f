use crate::chat::{DEFAULT_CHAT_MODEL, DEFAULT_CHAT_TEMPERATURE, GEMINI_ENDPOINT};
use common::EnvLookup;
use inference::InferenceConfig;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 5175;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub endpoint: String,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub temp_dir: PathBuf,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub chat: ChatConfig,
    pub inference: InferenceConfig,
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(&EnvLookup::process())
    }

    pub fn from_lookup(lookup: &EnvLookup) -> anyhow::Result<Self> {
        let config = Self {
            port: lookup.parse_or("PORT", DEFAULT_PORT),
            temp_dir: lookup.string_or("TEMP_DIR", "temp_uploads").into(),
            static_dir: lookup.string_or("STATIC_DIR", "../frontend/dist").into(),
            max_upload_bytes: lookup.parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            chat: ChatConfig {
                api_key: lookup.get("GOOGLE_API_KEY"),
                model: lookup.string_or("CHAT_MODEL", DEFAULT_CHAT_MODEL),
                temperature: lookup.parse_or("CHAT_TEMPERATURE", DEFAULT_CHAT_TEMPERATURE),
                endpoint: lookup.string_or("GEMINI_ENDPOINT", GEMINI_ENDPOINT),
            },
            inference: InferenceConfig::from_lookup(lookup)?,
        };

        if config.max_upload_bytes == 0 {
            anyhow::bail!("MAX_UPLOAD_BYTES must be at least 1");
        }
        if !(0.0..=2.0).contains(&config.chat.temperature) {
            anyhow::bail!(
                "CHAT_TEMPERATURE must be in [0, 2], got {}",
                config.chat.temperature
            );
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config =
            GatewayConfig::from_lookup(&EnvLookup::from_pairs(Vec::<(String, String)>::new()))
                .unwrap();

        assert_eq!(config.port, 5175);
        assert_eq!(config.temp_dir, PathBuf::from("temp_uploads"));
        assert_eq!(config.static_dir, PathBuf::from("../frontend/dist"));
        assert_eq!(config.max_upload_bytes, 33_554_432);
        assert_eq!(config.chat.model, "gemini-2.5-flash");
        assert_eq!(config.chat.temperature, 0.7);
        assert!(config.chat.api_key.is_none());
        assert_eq!(config.inference.output_dir, PathBuf::from("predicted_results"));
    }

    #[test]
    fn test_overrides_reach_both_layers() {
        let lookup = EnvLookup::from_pairs([
            ("PORT", "8080"),
            ("GOOGLE_API_KEY", "test-key"),
            ("CHAT_TEMPERATURE", "0.2"),
            ("WEIGHTS_DIR", "/srv/weights"),
        ]);
        let config = GatewayConfig::from_lookup(&lookup).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.chat.api_key.as_deref(), Some("test-key"));
        assert_eq!(config.chat.temperature, 0.2);
        assert_eq!(config.inference.weights_dir, PathBuf::from("/srv/weights"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for (key, value) in [
            ("MAX_UPLOAD_BYTES", "0"),
            ("CHAT_TEMPERATURE", "3.5"),
            ("IOU_THRESHOLD", "2"),
        ] {
            let lookup = EnvLookup::from_pairs([(key, value)]);
            assert!(
                GatewayConfig::from_lookup(&lookup).is_err(),
                "{key}={value} should be rejected"
            );
        }
    }
}
