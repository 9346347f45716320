use crate::error::{Result, WardenError};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Back-off strategy selector for restart delays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Configuration for a single supervised watcher process
///
/// One entry per watcher in the ecosystem file. Loaded once at startup,
/// validated in full before anything is spawned, never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct WatcherSpec {
    /// Watcher name (unique identifier across the file)
    pub name: String,

    /// Path to the script or executable to run
    pub script: PathBuf,

    /// Runtime used to execute the script (e.g. "python3"); the script
    /// itself is executed when absent
    #[serde(default)]
    pub interpreter: Option<String>,

    /// Command-line arguments appended after the script
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the watcher
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Extra environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Restart on file changes. Parsed for schema compatibility; the
    /// capability is not implemented and the flag must stay false.
    #[serde(default)]
    pub watch: bool,

    /// Whether to automatically restart on exit
    #[serde(default = "default_autorestart")]
    pub autorestart: bool,

    /// Restart attempt ceiling before the watcher is marked failed
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Minimum continuous uptime before a run counts as stable
    #[serde(default = "default_min_uptime", deserialize_with = "de_duration")]
    pub min_uptime: Duration,

    /// Initial delay before the first restart attempt
    #[serde(default = "default_restart_delay", deserialize_with = "de_duration")]
    pub restart_delay: Duration,

    /// Back-off strategy applied between restart attempts
    #[serde(default = "default_backoff")]
    pub backoff: BackoffKind,

    /// Upper bound for exponential back-off delays
    #[serde(default = "default_max_backoff", deserialize_with = "de_duration")]
    pub max_backoff: Duration,

    /// Destination file for the watcher's stdout
    pub out_file: PathBuf,

    /// Destination file for the watcher's stderr
    pub error_file: PathBuf,

    /// Timestamp format for log lines (ecosystem tokens, e.g.
    /// "YYYY-MM-DD HH:mm:ss Z"); lines are written unstamped when absent
    #[serde(default)]
    pub log_date_format: Option<String>,

    /// Signal sent on graceful stop (default: SIGTERM)
    #[serde(default = "default_stop_signal")]
    pub stop_signal: String,

    /// Timeout before SIGKILL escalation on stop
    #[serde(default = "default_stop_timeout", deserialize_with = "de_duration")]
    pub stop_timeout: Duration,
}

// Default value functions for serde
fn default_autorestart() -> bool {
    true
}

fn default_max_restarts() -> u32 {
    10
}

fn default_min_uptime() -> Duration {
    Duration::from_secs(10)
}

fn default_restart_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff() -> BackoffKind {
    BackoffKind::Exponential
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(60)
}

fn default_stop_signal() -> String {
    "SIGTERM".to_string()
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Parse a duration string from the ecosystem format
///
/// Accepts `ms`, `s`, `m` and `h` suffixes ("10s", "500ms", "1m"); a bare
/// integer means milliseconds, matching the original tool's convention.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(WardenError::InvalidDuration(
            s.to_string(),
            "empty string".to_string(),
        ));
    }

    let split = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    let value: u64 = digits.parse().map_err(|_| {
        WardenError::InvalidDuration(s.to_string(), "expected a leading integer".to_string())
    })?;

    match unit {
        "" | "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        other => Err(WardenError::InvalidDuration(
            s.to_string(),
            format!("unknown unit '{}'", other),
        )),
    }
}

/// Deserialize a duration from either a string ("10s") or a bare integer
/// number of milliseconds
fn de_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
        Raw::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
    }
}

impl WatcherSpec {
    /// Load watcher specs from an ecosystem file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<Vec<WatcherSpec>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| WardenError::Config(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let specs = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(WardenError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        // Expand environment variables in all specs
        let expanded: Vec<WatcherSpec> = specs
            .into_iter()
            .map(|mut spec| {
                spec.expand_env_vars();
                spec
            })
            .collect();

        // Validate each spec, then cross-spec uniqueness
        for spec in &expanded {
            spec.validate()?;
        }

        let mut seen = std::collections::HashSet::new();
        for spec in &expanded {
            if !seen.insert(spec.name.as_str()) {
                return Err(WardenError::ConfigValidation(format!(
                    "Duplicate watcher name: {}",
                    spec.name
                )));
            }
        }

        Ok(expanded)
    }

    /// Parse a TOML ecosystem file
    fn parse_toml(contents: &str) -> Result<Vec<WatcherSpec>> {
        #[derive(Deserialize)]
        struct EcosystemFile {
            #[serde(default)]
            watchers: Vec<WatcherSpec>,
            #[serde(flatten)]
            single: Option<WatcherSpec>,
        }

        let file: EcosystemFile = toml::from_str(contents)
            .map_err(|e| WardenError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?;

        // Support both a single watcher and a [[watchers]] array
        if let Some(single) = file.single {
            Ok(vec![single])
        } else if !file.watchers.is_empty() {
            Ok(file.watchers)
        } else {
            Err(WardenError::InvalidConfig(
                "No watcher configuration found in file".to_string(),
            ))
        }
    }

    /// Parse a JSON ecosystem file
    fn parse_json(contents: &str) -> Result<Vec<WatcherSpec>> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum EcosystemFile {
            Single(WatcherSpec),
            Multiple { watchers: Vec<WatcherSpec> },
        }

        let file: EcosystemFile = serde_json::from_str(contents)
            .map_err(|e| WardenError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?;

        match file {
            EcosystemFile::Single(spec) => Ok(vec![spec]),
            EcosystemFile::Multiple { watchers } => {
                if watchers.is_empty() {
                    Err(WardenError::InvalidConfig(
                        "No watcher configuration found in file".to_string(),
                    ))
                } else {
                    Ok(watchers)
                }
            }
        }
    }

    /// Validate the spec
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(WardenError::MissingConfigField("name".to_string()));
        }

        if self.script.as_os_str().is_empty() {
            return Err(WardenError::MissingConfigField("script".to_string()));
        }

        if self.out_file.as_os_str().is_empty() {
            return Err(WardenError::MissingConfigField("out_file".to_string()));
        }

        if self.error_file.as_os_str().is_empty() {
            return Err(WardenError::MissingConfigField("error_file".to_string()));
        }

        if self.max_restarts == 0 {
            return Err(WardenError::ConfigValidation(
                "max_restarts must be at least 1".to_string(),
            ));
        }

        let valid_signals = [
            "SIGTERM", "SIGINT", "SIGQUIT", "SIGKILL", "SIGHUP", "SIGUSR1", "SIGUSR2",
        ];
        if !valid_signals.contains(&self.stop_signal.as_str()) {
            return Err(WardenError::ConfigValidation(format!(
                "Invalid stop_signal: {}. Must be one of: {}",
                self.stop_signal,
                valid_signals.join(", ")
            )));
        }

        if let Some(ref fmt) = self.log_date_format {
            crate::logs::format::compile_date_format(fmt)?;
        }

        if let Some(ref cwd) = self.cwd {
            if !cwd.exists() {
                return Err(WardenError::ConfigValidation(format!(
                    "Working directory does not exist: {}",
                    cwd.display()
                )));
            }
            if !cwd.is_dir() {
                return Err(WardenError::ConfigValidation(format!(
                    "Working directory is not a directory: {}",
                    cwd.display()
                )));
            }
        }

        Ok(())
    }

    /// Expand environment variables in spec fields
    fn expand_env_vars(&mut self) {
        self.script = Self::expand_env_in_path(&self.script);
        self.out_file = Self::expand_env_in_path(&self.out_file);
        self.error_file = Self::expand_env_in_path(&self.error_file);

        if let Some(ref cwd) = self.cwd {
            self.cwd = Some(Self::expand_env_in_path(cwd));
        }

        self.args = self
            .args
            .iter()
            .map(|arg| Self::expand_env_in_string(arg))
            .collect();

        self.env = self
            .env
            .iter()
            .map(|(k, v)| (k.clone(), Self::expand_env_in_string(v)))
            .collect();
    }

    /// Expand $VAR and ${VAR} references in a string
    fn expand_env_in_string(s: &str) -> String {
        let mut result = s.to_string();

        for (key, value) in std::env::vars() {
            result = result.replace(&format!("${{{}}}", key), &value);
            result = result.replace(&format!("${}", key), &value);
        }

        result
    }

    fn expand_env_in_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        PathBuf::from(Self::expand_env_in_string(&path_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_spec(name: &str) -> WatcherSpec {
        WatcherSpec {
            name: name.to_string(),
            script: PathBuf::from("/bin/echo"),
            interpreter: None,
            args: vec![],
            cwd: None,
            env: HashMap::new(),
            watch: false,
            autorestart: default_autorestart(),
            max_restarts: default_max_restarts(),
            min_uptime: default_min_uptime(),
            restart_delay: default_restart_delay(),
            backoff: default_backoff(),
            max_backoff: default_max_backoff(),
            out_file: PathBuf::from("/tmp/out.log"),
            error_file: PathBuf::from("/tmp/err.log"),
            log_date_format: None,
            stop_signal: default_stop_signal(),
            stop_timeout: default_stop_timeout(),
        }
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        // Bare integers are milliseconds
        assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn test_spec_defaults() {
        let spec = minimal_spec("defaults");
        assert!(spec.autorestart);
        assert_eq!(spec.max_restarts, 10);
        assert_eq!(spec.min_uptime, Duration::from_secs(10));
        assert_eq!(spec.restart_delay, Duration::from_secs(1));
        assert_eq!(spec.backoff, BackoffKind::Exponential);
        assert_eq!(spec.stop_signal, "SIGTERM");
        assert!(!spec.watch);
    }

    #[test]
    fn test_validate_valid_spec() {
        assert!(minimal_spec("ok").validate().is_ok());
    }

    #[test]
    fn test_validate_empty_name() {
        let spec = minimal_spec("");
        assert!(matches!(
            spec.validate(),
            Err(WardenError::MissingConfigField(_))
        ));
    }

    #[test]
    fn test_validate_zero_max_restarts() {
        let mut spec = minimal_spec("zero");
        spec.max_restarts = 0;
        assert!(matches!(
            spec.validate(),
            Err(WardenError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_validate_invalid_signal() {
        let mut spec = minimal_spec("sig");
        spec.stop_signal = "INVALID".to_string();
        assert!(matches!(
            spec.validate(),
            Err(WardenError::ConfigValidation(_))
        ));
    }

    #[test]
    fn test_validate_bad_date_format() {
        let mut spec = minimal_spec("fmt");
        spec.log_date_format = Some("YYYY-QQ".to_string());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("WARDEN_TEST_DIR", "/tmp");
        std::env::set_var("WARDEN_TEST_VAL", "value");

        let mut spec = minimal_spec("env");
        spec.script = PathBuf::from("$WARDEN_TEST_DIR/watcher.py");
        spec.out_file = PathBuf::from("${WARDEN_TEST_DIR}/out.log");
        spec.args = vec!["--flag=${WARDEN_TEST_VAL}".to_string()];
        spec.env
            .insert("KEY".to_string(), "$WARDEN_TEST_VAL".to_string());

        spec.expand_env_vars();

        assert_eq!(spec.script, PathBuf::from("/tmp/watcher.py"));
        assert_eq!(spec.out_file, PathBuf::from("/tmp/out.log"));
        assert_eq!(spec.args[0], "--flag=value");
        assert_eq!(spec.env.get("KEY"), Some(&"value".to_string()));
    }

    #[test]
    fn test_parse_toml_watchers() {
        let toml_content = r#"
            [[watchers]]
            name = "gmail-watcher"
            script = "watchers/gmail_watcher.py"
            interpreter = "python3"
            max_restarts = 10
            min_uptime = "10s"
            out_file = "logs/gmail-out.log"
            error_file = "logs/gmail-error.log"
            log_date_format = "YYYY-MM-DD HH:mm:ss Z"

            [[watchers]]
            name = "whatsapp-watcher"
            script = "watchers/whatsapp_watcher.py"
            interpreter = "python3"
            out_file = "logs/whatsapp-out.log"
            error_file = "logs/whatsapp-error.log"
        "#;

        let specs = WatcherSpec::parse_toml(toml_content).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "gmail-watcher");
        assert_eq!(specs[0].interpreter.as_deref(), Some("python3"));
        assert_eq!(specs[0].min_uptime, Duration::from_secs(10));
        assert_eq!(specs[1].name, "whatsapp-watcher");
    }

    #[test]
    fn test_parse_toml_single() {
        let toml_content = r#"
            name = "solo"
            script = "/bin/sleep"
            args = ["60"]
            out_file = "/tmp/solo-out.log"
            error_file = "/tmp/solo-err.log"
        "#;

        let specs = WatcherSpec::parse_toml(toml_content).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "solo");
    }

    #[test]
    fn test_parse_json_watchers() {
        let json_content = r#"
            {
                "watchers": [
                    {
                        "name": "linkedin-watcher",
                        "script": "watchers/linkedin_watcher.py",
                        "interpreter": "python3",
                        "autorestart": true,
                        "max_restarts": 10,
                        "min_uptime": "10s",
                        "out_file": "logs/linkedin-out.log",
                        "error_file": "logs/linkedin-error.log"
                    }
                ]
            }
        "#;

        let specs = WatcherSpec::parse_json(json_content).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "linkedin-watcher");
        assert!(specs[0].autorestart);
    }

    #[test]
    fn test_duration_as_bare_millis() {
        let toml_content = r#"
            name = "bare"
            script = "/bin/true"
            min_uptime = 2500
            out_file = "/tmp/o.log"
            error_file = "/tmp/e.log"
        "#;

        let specs = WatcherSpec::parse_toml(toml_content).unwrap();
        assert_eq!(specs[0].min_uptime, Duration::from_millis(2500));
    }
}
