//! Provider selection.

use std::sync::Arc;

use vx_domain::config::Config;
use vx_domain::error::{Error, Result};

use crate::anthropic::AnthropicProvider;
use crate::placeholder::PlaceholderProvider;
use crate::traits::ModelProvider;

/// Build the configured provider variant.
pub fn create_provider(config: &Config) -> Result<Arc<dyn ModelProvider>> {
    match config.llm.provider.as_str() {
        "anthropic" => {
            let provider = AnthropicProvider::from_config(config)?;
            Ok(Arc::new(provider))
        }
        "placeholder" => Ok(Arc::new(PlaceholderProvider::new(
            config.speech.partial_delay_ms,
        ))),
        other => Err(Error::Config(format!("unknown llm.provider {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_always_constructible() {
        let mut config = Config::default();
        config.llm.provider = "placeholder".into();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "placeholder");
    }

    #[test]
    fn unknown_variant_is_a_config_error() {
        let mut config = Config::default();
        config.llm.provider = "smoke-signals".into();
        assert!(matches!(
            create_provider(&config),
            Err(Error::Config(_))
        ));
    }
}
