// tests/keywords_config.rs
use std::{env, fs};

use channel_digest::config::{KeywordConfig, ENV_KEYWORDS_PATH};

#[test]
fn explicit_path_parses_and_normalizes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keywords.toml");
    fs::write(
        &path,
        r#"
topic = "  education technology  "
keywords = [" EdTech ", "", "school", "School"]
promo_keywords = ["PROMO CODE"]
"#,
    )
    .unwrap();

    let config = KeywordConfig::load_from(&path).unwrap();
    assert_eq!(config.topic, "education technology");
    assert_eq!(config.keywords, vec!["edtech".to_string(), "school".to_string()]);
    assert!(config.is_promotional("Use this promo code today"));
    // Missing sections fall back to the compiled defaults.
    assert!(!config.filler_phrases.is_empty());
}

#[test]
fn malformed_toml_reports_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keywords.toml");
    fs::write(&path, "keywords = [unclosed").unwrap();

    let err = KeywordConfig::load_from(&path).unwrap_err();
    assert!(format!("{err:#}").contains("keywords.toml"));
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_file_then_compiled_defaults() {
    // Isolate CWD so the test never reads the real repo config/.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();

    env::remove_var(ENV_KEYWORDS_PATH);

    // 1) Nothing on disk: compiled defaults.
    let compiled = KeywordConfig::load_default().unwrap();
    assert_eq!(compiled.topic, "education technology");
    assert!(compiled.keywords.contains(&"edtech".to_string()));

    // 2) Fallback file in ./config/ wins over the compiled defaults.
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(
        cfg_dir.join("keywords.toml"),
        r#"
topic = "marine biology"
keywords = ["plankton"]
"#,
    )
    .unwrap();
    let from_file = KeywordConfig::load_default().unwrap();
    assert_eq!(from_file.topic, "marine biology");
    assert_eq!(from_file.keywords, vec!["plankton".to_string()]);

    // 3) The env var beats both.
    let override_path = tmp.path().join("override.toml");
    fs::write(&override_path, r#"topic = "astronomy""#).unwrap();
    env::set_var(ENV_KEYWORDS_PATH, override_path.display().to_string());
    let from_env = KeywordConfig::load_default().unwrap();
    assert_eq!(from_env.topic, "astronomy");

    // 4) A set-but-dangling env var is a hard error, not a silent fallback.
    env::set_var(ENV_KEYWORDS_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(KeywordConfig::load_default().is_err());

    env::remove_var(ENV_KEYWORDS_PATH);
    env::set_current_dir(&old).unwrap();
}
