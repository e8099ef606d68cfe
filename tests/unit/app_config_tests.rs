/*!
 * Tests for application configuration functionality
 */

use anyhow::Result;
use std::fs;
use std::time::Duration;

use vidscribe::app_config::{Config, LogLevel, TranslationProvider};
use vidscribe::jobs::ControllerSettings;

use crate::common;

/// Test default configuration values
#[test]
fn test_defaultConfig_withNoParameters_shouldHaveDocumentedDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language, "en");
    assert_eq!(config.target_language, "es");
    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    assert_eq!(config.translation.concurrent_requests, 4);
    assert_eq!(config.translation.batch_size, 1);
    assert_eq!(config.translation.common.retry_count, 3);
    assert_eq!(config.jobs.max_concurrent_jobs, 5);
    assert_eq!(config.jobs.admission_timeout_secs, None);
    assert_eq!(config.log_level, LogLevel::Info);
}

#[test]
fn test_configFile_withPartialJson_shouldLoadAndValidate() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");
    fs::write(
        &path,
        r#"{
            "source_language": "fr",
            "target_language": "de",
            "translation": { "batch_size": 4 },
            "jobs": { "max_concurrent_jobs": 2, "admission_timeout_secs": 30 },
            "log_level": "debug"
        }"#,
    )?;

    let config: Config = serde_json::from_str(&fs::read_to_string(&path)?)?;
    config.validate()?;

    assert_eq!(config.translation.batch_size, 4);
    assert_eq!(config.translation.concurrent_requests, 4);
    assert_eq!(config.media.allowed_formats, vec!["mp4", "avi", "mov", "mkv", "webm"]);
    assert_eq!(config.log_level, LogLevel::Debug);
    Ok(())
}

#[test]
fn test_controllerSettings_fromConfig_shouldMapJobAndTranslationFields() {
    let mut config = Config::default();
    config.jobs.max_concurrent_jobs = 2;
    config.jobs.admission_timeout_secs = Some(30);
    config.jobs.retention_secs = 120;
    config.translation.concurrent_requests = 8;
    config.translation.batch_size = 3;

    let settings = ControllerSettings::from_config(&config);

    assert_eq!(settings.max_concurrent_jobs, 2);
    assert_eq!(settings.concurrency_limit, 8);
    assert_eq!(settings.batch_size, 3);
    assert_eq!(settings.context_max_tokens, config.translation.context_max_tokens);
    assert_eq!(settings.admission_timeout, Some(Duration::from_secs(30)));
    assert_eq!(settings.retention, Duration::from_secs(120));
}

#[test]
fn test_validate_withZeroCounts_shouldFail() {
    let mut config = Config::default();
    config.translation.batch_size = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.jobs.max_concurrent_jobs = 0;
    assert!(config.validate().is_err());
}
