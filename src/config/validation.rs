use crate::config::types::{CacheConfig, Config, CrawlingConfig, HumanBehaviorConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawling(&config.crawling)?;
    validate_human_behavior(&config.human_behavior)?;
    validate_cache(&config.cache)?;
    validate_pdf(&config.pdf)?;
    validate_chunk_size(&config.chunking.default_max_size)?;
    Ok(())
}

fn validate_crawling(config: &CrawlingConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.request_delay < 0.0 {
        return Err(ConfigError::Validation(format!(
            "request_delay must be >= 0, got {}",
            config.request_delay
        )));
    }

    Ok(())
}

fn validate_human_behavior(config: &HumanBehaviorConfig) -> Result<(), ConfigError> {
    for (name, range) in [
        ("base_reading_time", config.base_reading_time),
        ("navigation_decision", config.navigation_decision),
        ("session_break_duration", config.session_break_duration),
    ] {
        if range[0] < 0.0 || range[1] < range[0] {
            return Err(ConfigError::Validation(format!(
                "{} must be a non-negative [min, max] range, got [{}, {}]",
                name, range[0], range[1]
            )));
        }
    }

    if config.variance_percent > 100 {
        return Err(ConfigError::Validation(format!(
            "variance_percent must be <= 100, got {}",
            config.variance_percent
        )));
    }

    if config.session_break_after == 0 {
        return Err(ConfigError::Validation(
            "session_break_after must be >= 1".to_string(),
        ));
    }

    if config.maximum_delay < config.minimum_delay {
        return Err(ConfigError::Validation(format!(
            "maximum_delay ({}) must be >= minimum_delay ({})",
            config.maximum_delay, config.minimum_delay
        )));
    }

    Ok(())
}

fn validate_cache(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "cache directory cannot be empty".to_string(),
        ));
    }

    if !(1..=9).contains(&config.compression_level) {
        return Err(ConfigError::Validation(format!(
            "compression_level must be between 1 and 9, got {}",
            config.compression_level
        )));
    }

    if config.save_frequency == 0 {
        return Err(ConfigError::Validation(
            "save_frequency must be >= 1".to_string(),
        ));
    }

    if config.session_timeout_hours == 0 {
        return Err(ConfigError::Validation(
            "session_timeout_hours must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_pdf(config: &crate::config::types::PdfConfig) -> Result<(), ConfigError> {
    const PAGE_SIZES: &[&str] = &["A3", "A4", "A5", "Letter", "Legal"];

    if !PAGE_SIZES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(&config.page_size))
    {
        return Err(ConfigError::Validation(format!(
            "page_size must be one of {:?}, got '{}'",
            PAGE_SIZES, config.page_size
        )));
    }

    if config.orientation != "portrait" && config.orientation != "landscape" {
        return Err(ConfigError::Validation(format!(
            "orientation must be 'portrait' or 'landscape', got '{}'",
            config.orientation
        )));
    }

    Ok(())
}

fn validate_chunk_size(size: &str) -> Result<(), ConfigError> {
    crate::assemble::parse_size(size).map_err(|e| ConfigError::Validation(e))?;
    Ok(())
}
