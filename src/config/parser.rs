use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes the SHA-256 digest of the scrape-relevant configuration sections
///
/// Only the sections that affect which pages get admitted and what their
/// records contain (crawling, path scoping, content) participate. Changing
/// output-only settings therefore keeps existing sessions resume-compatible.
pub fn config_digest(config: &Config) -> String {
    let mut hasher = Sha256::new();

    // serde_json emits struct fields in declaration order, so this is stable
    // for a given crate version.
    for chunk in [
        serde_json::to_string(&config.crawling),
        serde_json::to_string(&config.path_scoping),
        serde_json::to_string(&config.content),
    ]
    .into_iter()
    .flatten()
    {
        hasher.update(chunk.as_bytes());
    }

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_empty_config_uses_defaults() {
        let file = create_temp_config("");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawling.max_depth, 3);
        assert_eq!(config.crawling.max_pages, 100);
        assert!(config.crawling.respect_robots);
        assert!(config.path_scoping.enabled);
        assert_eq!(config.content.min_content_length, 50);
        assert_eq!(config.cache.session_timeout_hours, 24);
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[crawling]
max_depth = 2
max_pages = 25
user_agent = "TestBinder/1.0"

[path_scoping]
allow_parent_levels = 0
allow_siblings = true

[markdown]
multi_file = true

[chunking]
default_max_size = "5MB"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawling.max_depth, 2);
        assert_eq!(config.crawling.max_pages, 25);
        assert_eq!(config.crawling.user_agent, "TestBinder/1.0");
        assert_eq!(config.path_scoping.allow_parent_levels, 0);
        assert!(config.path_scoping.allow_siblings);
        assert!(config.markdown.multi_file);
        assert_eq!(config.chunking.default_max_size, "5MB");
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/sitebinder.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_rejects_unknown_keys() {
        let file = create_temp_config("[crawling]\nmax_dpeth = 3\n");
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_config_digest_stable() {
        let config = Config::default();
        let d1 = config_digest(&config);
        let d2 = config_digest(&config);

        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
    }

    #[test]
    fn test_config_digest_tracks_scrape_settings() {
        let base = Config::default();
        let mut changed = Config::default();
        changed.crawling.max_depth = 7;

        assert_ne!(config_digest(&base), config_digest(&changed));
    }

    #[test]
    fn test_config_digest_ignores_output_settings() {
        let base = Config::default();
        let mut changed = Config::default();
        changed.markdown.multi_file = true;
        changed.pdf.page_size = "Letter".to_string();

        assert_eq!(config_digest(&base), config_digest(&changed));
    }
}
