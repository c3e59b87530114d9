//! Configuration loaded from `perch.toml`.
//!
//! Missing values use defaults tuned for the vendor's nightly window.
//! Credentials can be supplied through the `PERCH_USERNAMES` and
//! `PERCH_PASSWORDS` environment variables (comma-separated, index-aligned
//! with the configured users), which take precedence over the file so
//! secrets stay out of committed configs.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::classify::{Classifier, Rule};
use crate::engine::AttemptPolicy;
use crate::vendor::TransportOptions;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    /// Extra classifier phrase families, consulted after the built-ins.
    #[serde(default)]
    pub classifier_rules: Vec<Rule>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_unknown")]
    pub max_unknown: u32,
    #[serde(default = "default_busy_wait_secs")]
    pub busy_wait_secs: u64,
    #[serde(default = "default_short_wait_ms")]
    pub short_wait_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    /// Max simultaneous in-flight seats across all users and tasks.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
    /// When the `run` command logs everyone in.
    #[serde(default = "default_login_time")]
    pub login_time: String,
    /// When the `run` command starts submitting.
    #[serde(default = "default_open_time")]
    pub open_time: String,
    /// Hard deadline for the retry loop.
    #[serde(default = "default_end_time")]
    pub end_time: String,
    /// Solve the slide challenge before each submission. Off by default;
    /// the vendor currently accepts an empty captcha field.
    #[serde(default)]
    pub enable_challenge: bool,
    #[serde(default = "default_challenge_cache_secs")]
    pub challenge_cache_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub insecure_tls: bool,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_max_unknown() -> u32 {
    2
}
fn default_busy_wait_secs() -> u64 {
    60
}
fn default_short_wait_ms() -> u64 {
    300
}
fn default_jitter_ms() -> u64 {
    400
}
fn default_max_concurrency() -> usize {
    4
}
// The vendor runs on Beijing time.
fn default_utc_offset_hours() -> i32 {
    8
}
fn default_login_time() -> String {
    "21:50:00".to_string()
}
fn default_open_time() -> String {
    "22:00:00".to_string()
}
fn default_end_time() -> String {
    "22:10:00".to_string()
}
fn default_challenge_cache_secs() -> u64 {
    180
}
fn default_timeout_secs() -> u64 {
    15
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_unknown: default_max_unknown(),
            busy_wait_secs: default_busy_wait_secs(),
            short_wait_ms: default_short_wait_ms(),
            jitter_ms: default_jitter_ms(),
            max_concurrency: default_max_concurrency(),
            utc_offset_hours: default_utc_offset_hours(),
            login_time: default_login_time(),
            open_time: default_open_time(),
            end_time: default_end_time(),
            enable_challenge: false,
            challenge_cache_secs: default_challenge_cache_secs(),
            timeout_secs: default_timeout_secs(),
            insecure_tls: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_office_base")]
    pub office: String,
    #[serde(default = "default_passport_base")]
    pub passport: String,
    #[serde(default = "default_captcha_base")]
    pub captcha: String,
}

fn default_office_base() -> String {
    "https://office.chaoxing.com".to_string()
}
fn default_passport_base() -> String {
    "https://passport2.chaoxing.com".to_string()
}
fn default_captcha_base() -> String {
    "https://captcha.chaoxing.com".to_string()
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            office: default_office_base(),
            passport: default_passport_base(),
            captcha: default_captcha_base(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub room_id: String,
    /// Candidate seats in preference order; padded and unpadded forms of
    /// the same seat are collapsed before dispatch.
    pub seats: Vec<String>,
    /// Reservation slot start, "HH:MM".
    pub start: String,
    /// Reservation slot end, "HH:MM".
    pub end: String,
    /// Active weekdays by full English name; empty means every day.
    #[serde(default)]
    pub days: Vec<String>,
    /// Reserve tomorrow's slot instead of today's.
    #[serde(default)]
    pub next_day: bool,
}

impl TaskConfig {
    pub fn runs_on(&self, weekday: &str) -> bool {
        self.days.is_empty() || self.days.iter().any(|d| d.eq_ignore_ascii_case(weekday))
    }
}

impl Config {
    /// Load from a TOML file and apply environment credential overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("cannot parse config file {}", path.display()))?;
        config.apply_credentials(
            std::env::var("PERCH_USERNAMES").ok().as_deref(),
            std::env::var("PERCH_PASSWORDS").ok().as_deref(),
        );
        Ok(config)
    }

    /// Override configured credentials from comma-separated lists, matched
    /// to users by index. Blank entries keep the file's value.
    fn apply_credentials(&mut self, usernames: Option<&str>, passwords: Option<&str>) {
        let split = |s: Option<&str>| -> Vec<String> {
            s.map(|v| v.split(',').map(|p| p.trim().to_string()).collect())
                .unwrap_or_default()
        };
        let usernames = split(usernames);
        let passwords = split(passwords);
        for (index, user) in self.users.iter_mut().enumerate() {
            if let Some(name) = usernames.get(index)
                && !name.is_empty()
            {
                user.username = name.clone();
            }
            if let Some(pass) = passwords.get(index)
                && !pass.is_empty()
            {
                user.password = pass.clone();
            }
        }
    }

    pub fn policy(&self) -> AttemptPolicy {
        AttemptPolicy {
            max_attempts: self.engine.max_attempts,
            max_unknown: self.engine.max_unknown,
            busy_wait: Duration::from_secs(self.engine.busy_wait_secs),
            short_wait: Duration::from_millis(self.engine.short_wait_ms),
            jitter: Duration::from_millis(self.engine.jitter_ms),
        }
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            office_base: self.endpoints.office.clone(),
            passport_base: self.endpoints.passport.clone(),
            captcha_base: self.endpoints.captcha.clone(),
            timeout_secs: self.engine.timeout_secs,
            insecure_tls: self.engine.insecure_tls,
        }
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::default().with_extra_rules(self.classifier_rules.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Outcome;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.engine.max_attempts, 3);
        assert_eq!(config.engine.busy_wait_secs, 60);
        assert_eq!(config.engine.utc_offset_hours, 8);
        assert_eq!(config.engine.open_time, "22:00:00");
        assert!(!config.engine.enable_challenge);
        assert!(config.users.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            [engine]
            max_attempts = 5
            busy_wait_secs = 120

            [[users]]
            username = "13800000000"
            password = "hunter2"

            [[users.tasks]]
            room_id = "1024"
            seats = ["045", "45"]
            start = "08:00"
            end = "22:00"
            days = ["Monday", "Friday"]
            next_day = true
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.max_attempts, 5);
        assert_eq!(config.engine.busy_wait_secs, 120);
        // Untouched fields keep their defaults.
        assert_eq!(config.engine.max_unknown, 2);
        assert_eq!(config.endpoints.office, "https://office.chaoxing.com");

        let task = &config.users[0].tasks[0];
        assert_eq!(task.room_id, "1024");
        assert_eq!(task.seats, vec!["045", "45"]);
        assert!(task.next_day);
        assert!(task.runs_on("monday"));
        assert!(!task.runs_on("Tuesday"));
    }

    #[test]
    fn empty_days_means_every_day() {
        let task = TaskConfig {
            room_id: "1".into(),
            seats: vec!["1".into()],
            start: "08:00".into(),
            end: "22:00".into(),
            days: Vec::new(),
            next_day: false,
        };
        assert!(task.runs_on("Wednesday"));
    }

    #[test]
    fn classifier_rules_deserialize_from_toml() {
        let toml_str = r#"
            [[classifier_rules]]
            phrases = ["maintenance window"]
            outcome = "retryable_busy"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let classifier = config.classifier();
        assert_eq!(
            classifier.classify(false, "in maintenance window"),
            Outcome::RetryableBusy
        );
    }

    #[test]
    fn env_style_credential_overrides_by_index() {
        let mut config: Config = toml::from_str(
            r#"
            [[users]]
            username = "file-user-a"
            password = "file-pass-a"

            [[users]]
            username = "file-user-b"
            password = "file-pass-b"
        "#,
        )
        .unwrap();

        config.apply_credentials(Some("env-a,env-b"), Some("pa,pb"));
        assert_eq!(config.users[0].username, "env-a");
        assert_eq!(config.users[0].password, "pa");
        assert_eq!(config.users[1].username, "env-b");
        assert_eq!(config.users[1].password, "pb");
    }

    #[test]
    fn blank_override_entries_keep_file_values() {
        let mut config: Config = toml::from_str(
            r#"
            [[users]]
            username = "file-user"
            password = "file-pass"
        "#,
        )
        .unwrap();

        config.apply_credentials(Some(""), None);
        assert_eq!(config.users[0].username, "file-user");
        assert_eq!(config.users[0].password, "file-pass");
    }

    #[test]
    fn policy_mapping_converts_units() {
        let config: Config = toml::from_str(
            r#"
            [engine]
            busy_wait_secs = 90
            short_wait_ms = 250
        "#,
        )
        .unwrap();
        let policy = config.policy();
        assert_eq!(policy.busy_wait, Duration::from_secs(90));
        assert_eq!(policy.short_wait, Duration::from_millis(250));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read config file"));
    }

    #[test]
    fn load_reads_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perch.toml");
        std::fs::write(&path, "[engine]\nmax_attempts = 7\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.engine.max_attempts, 7);
    }
}
