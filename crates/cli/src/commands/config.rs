use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use atelier_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Each entry: dotted key, primary env override, legacy env alias.
const FIELDS: &[(&str, &str, Option<&str>)] = &[
    ("database.url", "ATELIER_DATABASE_URL", None),
    ("database.max_connections", "ATELIER_DATABASE_MAX_CONNECTIONS", None),
    ("database.timeout_secs", "ATELIER_DATABASE_TIMEOUT_SECS", None),
    ("logging.level", "ATELIER_LOGGING_LEVEL", Some("ATELIER_LOG_LEVEL")),
    ("logging.format", "ATELIER_LOGGING_FORMAT", Some("ATELIER_LOG_FORMAT")),
    ("ledger.currency", "ATELIER_LEDGER_CURRENCY", None),
    ("ledger.pending_limit", "ATELIER_LEDGER_PENDING_LIMIT", None),
];

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key_path, env_key, alias) in FIELDS {
        lines.push(render_line(
            key_path,
            &effective_value(&config, key_path),
            field_source(
                key_path,
                &[Some(*env_key), *alias],
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        ));
    }

    lines.join("\n")
}

fn effective_value(config: &AppConfig, key_path: &str) -> String {
    match key_path {
        "database.url" => config.database.url.clone(),
        "database.max_connections" => config.database.max_connections.to_string(),
        "database.timeout_secs" => config.database.timeout_secs.to_string(),
        "logging.level" => config.logging.level.clone(),
        "logging.format" => config.logging.format.as_str().to_string(),
        "ledger.currency" => config.ledger.currency.clone(),
        "ledger.pending_limit" => config.ledger.pending_limit.to_string(),
        _ => "<unknown>".to_string(),
    }
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("atelier.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/atelier.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[Option<&str>],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for env_key in env_keys.iter().flatten() {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use super::{contains_path, field_source};

    #[test]
    fn nested_keys_are_found_in_config_document() {
        let doc: toml::Value = "[ledger]\ncurrency = \"EUR\"\n".parse().expect("valid toml");

        assert!(contains_path(&doc, "ledger.currency"));
        assert!(!contains_path(&doc, "ledger.pending_limit"));
        assert!(!contains_path(&doc, "database.url"));
    }

    #[test]
    fn file_source_is_reported_when_env_is_absent() {
        let doc: toml::Value = "[ledger]\npending_limit = 20\n".parse().expect("valid toml");

        let source = field_source(
            "ledger.pending_limit",
            &[Some("ATELIER_TEST_UNSET_PENDING_LIMIT")],
            Some(&doc),
            Some(std::path::Path::new("atelier.toml")),
        );
        assert_eq!(source, "file (atelier.toml)");

        let source = field_source("ledger.currency", &[None], Some(&doc), None);
        assert_eq!(source, "default");
    }
}
