//! Configuration validation.
//!
//! Checks a config file for syntax errors, unknown or misspelled fields and
//! type errors, then runs semantic checks on the resulting config.

use std::{
    collections::HashMap,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use {secrecy::ExposeSecret, serde_json::Value};

use crate::{
    env_subst::substitute_env,
    loader::{apply_env_overrides, find_config_file},
    schema::{FontbotConfig, ThrottleConfig},
};

/// Telegram's documented limit for a single text message.
const TELEGRAM_MAX_TEXT_LEN: usize = 4096;
/// Bulk sends above this rate per second start getting 429s.
const TELEGRAM_MAX_PER_SECOND: f64 = 30.0;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// "syntax", "unknown-field", "type-error", "value" or "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "queue.capacity"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    /// Dynamic keys, e.g. metric labels.
    Map,
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Map, Struct};

    Struct(HashMap::from([
        (
            "telegram",
            Struct(HashMap::from([("token", Leaf), ("admin_id", Leaf)])),
        ),
        (
            "store",
            Struct(HashMap::from([("path", Leaf), ("activity_cap", Leaf)])),
        ),
        (
            "queue",
            Struct(HashMap::from([
                ("drain_interval_ms", Leaf),
                ("capacity", Leaf),
                ("max_text_len", Leaf),
            ])),
        ),
        (
            "broadcast",
            Struct(HashMap::from([
                ("error_cap", Leaf),
                ("error_max_len", Leaf),
                (
                    "throttle",
                    Struct(HashMap::from([
                        ("kind", Leaf),
                        ("delay_ms", Leaf),
                        ("max_per_window", Leaf),
                        ("window_ms", Leaf),
                    ])),
                ),
            ])),
        ),
        ("fonts", Struct(HashMap::from([("dir", Leaf)]))),
        (
            "metrics",
            Struct(HashMap::from([
                ("enabled", Leaf),
                ("listen", Leaf),
                ("labels", Map),
            ])),
        ),
    ]))
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

/// Validate the config file at `path`, or the discovered one when `None`.
///
/// `FONTBOT_*` environment overrides are applied before the semantic checks,
/// so a token supplied through the environment satisfies them.
#[must_use]
pub fn validate(path: Option<&Path>, config_dir: Option<&Path>) -> ValidationResult {
    let config_path = path
        .map(Path::to_path_buf)
        .or_else(|| find_config_file(config_dir));

    let Some(actual_path) = config_path else {
        let mut result = validate_config(&apply_env_overrides(FontbotConfig::default()));
        result.diagnostics.insert(
            0,
            Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            ),
        );
        return result;
    };

    let mut result = match std::fs::read_to_string(&actual_path) {
        Ok(content) => validate_str(&substitute_env(&content), format_of(&actual_path)),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("failed to read config file: {e}"),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(actual_path);
    result
}

fn format_of(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("toml")
}

/// Validate config text in the given format ("toml", "yaml", "yml", "json").
#[must_use]
pub fn validate_str(raw: &str, format: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let value = match parse_value(raw, format) {
        Ok(v) => v,
        Err(message) => {
            diagnostics.push(Diagnostic::new(Severity::Error, "syntax", "", message));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<FontbotConfig>(value) {
        Ok(config) => {
            let config = apply_env_overrides(config);
            diagnostics.extend(validate_config(&config).diagnostics);
        },
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn parse_value(raw: &str, format: &str) -> Result<Value, String> {
    match format {
        "toml" => toml::from_str::<toml::Value>(raw)
            .map_err(|e| format!("TOML syntax error: {e}"))
            .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
        "yaml" | "yml" => {
            let v = serde_yaml::from_str::<serde_yaml::Value>(raw)
                .map_err(|e| format!("YAML syntax error: {e}"))?;
            if v.is_null() {
                return Ok(Value::Object(serde_json::Map::new()));
            }
            serde_json::to_value(v).map_err(|e| e.to_string())
        },
        "json" => serde_json::from_str(raw).map_err(|e| format!("JSON syntax error: {e}")),
        other => Err(format!("unsupported config format: .{other}")),
    }
}

fn check_unknown_fields(
    value: &Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };

    let known: Vec<&str> = fields.keys().copied().collect();
    for (key, child) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child, child_schema, &path, diagnostics);
            continue;
        }
        let message = match suggest(key, &known, 3) {
            Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
            None => "unknown field".to_string(),
        };
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "unknown-field",
            path,
            message,
        ));
    }
}

/// Semantic checks on an already parsed config.
#[must_use]
pub fn validate_config(config: &FontbotConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();
    let mut push = |severity, path: &str, message: String| {
        diagnostics.push(Diagnostic::new(severity, "value", path, message));
    };

    match &config.telegram.token {
        None => push(
            Severity::Error,
            "telegram.token",
            "no bot token configured (set telegram.token or FONTBOT_TELEGRAM_TOKEN)".into(),
        ),
        Some(token) if !looks_like_bot_token(token.expose_secret()) => push(
            Severity::Warning,
            "telegram.token",
            "token does not look like <bot id>:<secret>".into(),
        ),
        Some(_) => {},
    }
    if config.telegram.admin_id.is_none() {
        push(
            Severity::Warning,
            "telegram.admin_id",
            "no admin configured; broadcast reports will have nowhere to go".into(),
        );
    }

    if config.store.activity_cap == 0 {
        push(
            Severity::Warning,
            "store.activity_cap",
            "activity history is disabled".into(),
        );
    }

    if config.queue.capacity == 0 {
        push(
            Severity::Error,
            "queue.capacity",
            "must be at least 1".into(),
        );
    }
    if config.queue.drain_interval_ms == 0 {
        push(
            Severity::Error,
            "queue.drain_interval_ms",
            "must be greater than zero".into(),
        );
    }
    if config.queue.max_text_len == 0 {
        push(
            Severity::Error,
            "queue.max_text_len",
            "must be at least 1".into(),
        );
    } else if config.queue.max_text_len > TELEGRAM_MAX_TEXT_LEN {
        push(
            Severity::Warning,
            "queue.max_text_len",
            format!("Telegram rejects texts over {TELEGRAM_MAX_TEXT_LEN} characters"),
        );
    }

    if config.broadcast.error_max_len == 0 {
        push(
            Severity::Warning,
            "broadcast.error_max_len",
            "error details will be empty".into(),
        );
    }
    check_throttle(&config.broadcast.throttle, &mut push);

    if let Some(dir) = &config.fonts.dir
        && !dir.is_dir()
    {
        push(
            Severity::Warning,
            "fonts.dir",
            format!("{} is not a directory", dir.display()),
        );
    }

    if config.metrics.enabled && config.metrics.listen.parse::<SocketAddr>().is_err() {
        push(
            Severity::Error,
            "metrics.listen",
            format!("\"{}\" is not a socket address", config.metrics.listen),
        );
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_throttle(throttle: &ThrottleConfig, push: &mut impl FnMut(Severity, &str, String)) {
    let path = "broadcast.throttle";
    match *throttle {
        ThrottleConfig::Fixed { delay_ms } => {
            if delay_ms == 0 {
                push(Severity::Warning, path, "zero delay disables pacing".into());
            } else if 1000.0 / delay_ms as f64 > TELEGRAM_MAX_PER_SECOND {
                push(
                    Severity::Warning,
                    path,
                    format!("{delay_ms}ms between sends exceeds Telegram's bulk rate"),
                );
            }
        },
        ThrottleConfig::Window {
            max_per_window,
            window_ms,
        } => {
            if max_per_window == 0 || window_ms == 0 {
                push(
                    Severity::Error,
                    path,
                    "max_per_window and window_ms must be greater than zero".into(),
                );
            } else if max_per_window as f64 * 1000.0 / window_ms as f64 > TELEGRAM_MAX_PER_SECOND
            {
                push(
                    Severity::Warning,
                    path,
                    format!("{max_per_window} sends per {window_ms}ms exceeds Telegram's bulk rate"),
                );
            }
        },
        ThrottleConfig::None => push(Severity::Info, path, "sends are not paced".into()),
    }
}

fn looks_like_bot_token(token: &str) -> bool {
    token
        .split_once(':')
        .is_some_and(|(id, secret)| {
            !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) && !secret.is_empty()
        })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, tempfile::TempDir};

    const VALID: &str = r#"
[telegram]
token = "123456:ABC-def"
admin_id = 42
"#;

    fn find<'a>(result: &'a ValidationResult, path: &str) -> Option<&'a Diagnostic> {
        result.diagnostics.iter().find(|d| d.path == path)
    }

    #[rstest]
    #[case("server", "sever", 1)]
    #[case("capacity", "capacty", 1)]
    #[case("", "abc", 3)]
    #[case("abc", "", 3)]
    #[case("cat", "car", 1)]
    fn levenshtein_distance(#[case] a: &str, #[case] b: &str, #[case] expected: usize) {
        assert_eq!(levenshtein(a, b), expected);
    }

    #[test]
    fn minimal_config_is_clean() {
        let result = validate_str(VALID, "toml");
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(result.count(Severity::Warning), 0);
    }

    #[test]
    fn misspelled_nested_key_gets_a_suggestion() {
        let result = validate_str(&format!("{VALID}\n[queue]\ncapacty = 5\n"), "toml");
        let d = find(&result, "queue.capacty").unwrap();
        assert_eq!(d.category, "unknown-field");
        assert!(d.message.contains("capacity"));
    }

    #[test]
    fn zero_capacity_is_an_error() {
        let result = validate_str(&format!("{VALID}\n[queue]\ncapacity = 0\n"), "toml");
        assert!(result.has_errors());
        assert_eq!(
            find(&result, "queue.capacity").unwrap().severity,
            Severity::Error
        );
    }

    #[test]
    fn wrong_type_is_reported() {
        let result = validate_str(&format!("{VALID}\n[queue]\ncapacity = \"many\"\n"), "toml");
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "type-error")
        );
    }

    #[test]
    fn syntax_error_stops_validation() {
        let result = validate_str("[queue\ncapacity = 1", "toml");
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn aggressive_throttle_warns() {
        let yaml = "telegram:\n  token: \"1:x\"\n  admin_id: 1\nbroadcast:\n  throttle:\n    kind: window\n    max_per_window: 100\n    window_ms: 1000\n";
        let result = validate_str(yaml, "yaml");
        assert!(!result.has_errors());
        assert_eq!(
            find(&result, "broadcast.throttle").unwrap().severity,
            Severity::Warning
        );
    }

    #[test]
    fn malformed_token_warns() {
        let mut config = FontbotConfig::default();
        config.telegram.token = Some(secrecy::Secret::new("not a token".into()));
        config.telegram.admin_id = Some(1);
        let result = validate_config(&config);
        assert_eq!(
            find(&result, "telegram.token").unwrap().severity,
            Severity::Warning
        );
    }

    #[test]
    fn validate_reads_the_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fontbot.json");
        std::fs::write(&path, r#"{"telegram": {"token": "1:x", "admin_id": 1}, "fontz": {}}"#)
            .unwrap();

        let result = validate(Some(&path), None);
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
        let d = find(&result, "fontz").unwrap();
        assert!(d.message.contains("fonts"));
    }
}
