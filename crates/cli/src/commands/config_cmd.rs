//! `defibot config`: inspect the effective configuration.

use defibot_config::AppConfig;

/// Prints the loaded config. API keys are redacted by the config's
/// `Debug` impls, so this never goes through `Serialize`.
pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", render(&config));
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

fn render(config: &AppConfig) -> String {
    format!("{config:#?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn render_redacts_keys() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("sk-very-secret".into());
        config.apis.search_api_key = Some("ts-very-secret".into());

        let out = render(&config);
        assert!(!out.contains("sk-very-secret"));
        assert!(!out.contains("ts-very-secret"));
        assert!(out.contains(&config.llm.model));
    }
}
