use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (turnstile.toml + TURNSTILE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TurnstileConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Static recurring-task definitions, loaded once at startup.
    #[serde(default)]
    pub recurring: Vec<RecurringTaskConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// When a recurring task fires.
///
/// Cron expressions are accepted in config for forward compatibility but
/// produce no run times yet; parsing them is out of scope for this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Repeat every N seconds.
    Interval { every_secs: u64 },

    /// Every day at HH:MM UTC.
    Daily { hour: u8, minute: u8 },

    /// On a specific weekday (0 = Monday … 6 = Sunday) at HH:MM UTC.
    Weekly { day: u8, hour: u8, minute: u8 },

    /// Cron expression — accepted, not yet interpreted.
    Cron { expression: String },
}

/// One configured recurring job: when to fire plus the opaque enqueue payload
/// (job class, arguments, queue, priority) forwarded to the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringTaskConfig {
    /// Unique task name; also the dedup key for the armed-timer map.
    pub key: String,
    pub schedule: Schedule,
    /// Job class name the worker-side dispatcher resolves.
    pub class: String,
    /// Arbitrary JSON arguments, passed through untouched.
    #[serde(default)]
    pub args: serde_json::Value,
    pub queue: Option<String>,
    pub priority: Option<i32>,
}

impl TurnstileConfig {
    /// Load config from a TOML file with TURNSTILE_* env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TurnstileConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TURNSTILE_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.turnstile/turnstile.db")
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.turnstile/turnstile.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let config: TurnstileConfig = Figment::from(Toml::string("")).extract().unwrap();
        assert!(config.recurring.is_empty());
        assert!(config.database.path.ends_with("turnstile.db"));
    }

    #[test]
    fn parses_recurring_tasks() {
        let toml = r#"
            [database]
            path = "/tmp/queue.db"

            [[recurring]]
            key = "hourly_cleanup"
            class = "CleanupJob"
            queue = "maintenance"
            priority = 10
            schedule = { kind = "interval", every_secs = 3600 }

            [[recurring]]
            key = "nightly_report"
            class = "ReportJob"
            args = { scope = "all" }
            schedule = { kind = "daily", hour = 2, minute = 30 }
        "#;

        let config: TurnstileConfig = Figment::from(Toml::string(toml)).extract().unwrap();
        assert_eq!(config.database.path, "/tmp/queue.db");
        assert_eq!(config.recurring.len(), 2);

        let cleanup = &config.recurring[0];
        assert_eq!(cleanup.key, "hourly_cleanup");
        assert_eq!(cleanup.queue.as_deref(), Some("maintenance"));
        assert!(matches!(
            cleanup.schedule,
            Schedule::Interval { every_secs: 3600 }
        ));

        let report = &config.recurring[1];
        assert!(matches!(report.schedule, Schedule::Daily { hour: 2, minute: 30 }));
        assert_eq!(report.args["scope"], "all");
        assert_eq!(report.priority, None);
    }

    #[test]
    fn env_var_overrides_toml_value() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "turnstile.toml",
                r#"
                    [database]
                    path = "/var/lib/turnstile/from-file.db"

                    [[recurring]]
                    key = "hourly_cleanup"
                    class = "CleanupJob"
                    schedule = { kind = "interval", every_secs = 3600 }
                "#,
            )?;
            jail.set_env("TURNSTILE_DATABASE_PATH", "/var/lib/turnstile/from-env.db");

            let config =
                TurnstileConfig::load(Some("turnstile.toml")).expect("config should load");
            // The env layer wins over the file; the file's task list still loads.
            assert_eq!(config.database.path, "/var/lib/turnstile/from-env.db");
            assert_eq!(config.recurring.len(), 1);
            assert_eq!(config.recurring[0].key, "hourly_cleanup");
            Ok(())
        });
    }
}
