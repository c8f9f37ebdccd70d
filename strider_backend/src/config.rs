use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::error::ConfigError;

/// A community the agent may post into or comment in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub name: String,
    /// Relative draw weight for the comment scanner.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// High-value destinations are scanned across hot/rising/new and filtered by score
    /// instead of by keyword.
    #[serde(default)]
    pub high_value: bool,
    #[serde(default = "default_true")]
    pub post_target: bool,
    #[serde(default = "default_true")]
    pub comment_target: bool,
    /// Tag (flair) names tried first, in order, when the destination wants one.
    #[serde(default)]
    pub preferred_tags: Vec<String>,
}

impl DestinationConfig {
    fn new(name: &str, weight: u32, high_value: bool, preferred_tags: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            weight,
            high_value,
            post_target: true,
            comment_target: true,
            preferred_tags: preferred_tags.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn default_weight() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    // Persona identity
    #[serde(default = "default_persona_name")]
    pub persona_name: String,
    #[serde(default = "default_persona_description")]
    pub persona_description: String,
    #[serde(default = "default_challenge_length_days")]
    pub challenge_length_days: u32,

    // LLM configuration (OpenAI-compatible chat completions)
    #[serde(default = "default_llm_url")]
    pub llm_api_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_llm_temperature")]
    pub llm_temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub llm_max_tokens: u32,
    #[serde(default = "default_comment_max_chars")]
    pub comment_max_chars: usize,

    // Schedule window, evaluated in `timezone`
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_window_open_hour")]
    pub window_open_hour: u32,
    #[serde(default = "default_window_close_hour")]
    pub window_close_hour: u32,

    // Loop intervals
    #[serde(default = "default_liveness_interval_mins")]
    pub liveness_interval_mins: u64,
    #[serde(default = "default_post_check_interval_mins")]
    pub post_check_interval_mins: u64,
    #[serde(default = "default_comment_check_interval_mins")]
    pub comment_check_interval_mins: u64,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_error_pause_secs")]
    pub error_pause_secs: u64,

    // Quotas
    #[serde(default = "default_max_posts_per_day")]
    pub max_posts_per_day: u32,
    #[serde(default = "default_min_post_spacing_mins")]
    pub min_post_spacing_mins: u64,
    #[serde(default = "default_min_comments_per_day")]
    pub min_comments_per_day: u32,
    #[serde(default = "default_max_comments_per_day")]
    pub max_comments_per_day: u32,
    #[serde(default = "default_comment_interval_secs")]
    pub comment_interval_secs: u64,

    /// Posting-only when false; posting plus discovery/commenting when true.
    #[serde(default)]
    pub enable_comments: bool,

    // Persona evolution
    #[serde(default = "default_distance_delta_min")]
    pub distance_delta_min: u32,
    #[serde(default = "default_distance_delta_max")]
    pub distance_delta_max: u32,

    // History and transcripts
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_history_log_path")]
    pub history_log_path: String,
    #[serde(default = "default_post_log_path")]
    pub post_log_path: String,
    #[serde(default = "default_comment_log_path")]
    pub comment_log_path: String,
    #[serde(default)]
    pub persona_checkpoint_path: Option<String>,

    // Discovery
    #[serde(default = "default_destinations")]
    pub destinations: Vec<DestinationConfig>,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_high_value_score_threshold")]
    pub high_value_score_threshold: i64,
    #[serde(default = "default_high_value_listing_limit")]
    pub high_value_listing_limit: usize,
    #[serde(default = "default_keyword_listing_limit")]
    pub keyword_listing_limit: usize,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_persona_name() -> String {
    "Patrick".to_string()
}

fn default_persona_description() -> String {
    "a positive, slightly humorous, energetic running coach".to_string()
}

fn default_challenge_length_days() -> u32 {
    100
}

fn default_llm_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4".to_string()
}

fn default_llm_temperature() -> f32 {
    0.8
}

fn default_llm_max_tokens() -> u32 {
    800
}

fn default_comment_max_chars() -> usize {
    300
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_window_open_hour() -> u32 {
    7
}

fn default_window_close_hour() -> u32 {
    22
}

fn default_liveness_interval_mins() -> u64 {
    30
}

fn default_post_check_interval_mins() -> u64 {
    60
}

fn default_comment_check_interval_mins() -> u64 {
    5
}

fn default_tick_secs() -> u64 {
    60
}

fn default_error_pause_secs() -> u64 {
    10
}

fn default_max_posts_per_day() -> u32 {
    1
}

fn default_min_post_spacing_mins() -> u64 {
    60
}

fn default_min_comments_per_day() -> u32 {
    20
}

fn default_max_comments_per_day() -> u32 {
    30
}

fn default_comment_interval_secs() -> u64 {
    600
}

fn default_distance_delta_min() -> u32 {
    4
}

fn default_distance_delta_max() -> u32 {
    10
}

fn default_history_window() -> usize {
    10
}

fn default_history_log_path() -> String {
    "post_history.txt".to_string()
}

fn default_post_log_path() -> String {
    "post_log.txt".to_string()
}

fn default_comment_log_path() -> String {
    "comment_log.txt".to_string()
}

fn default_destinations() -> Vec<DestinationConfig> {
    vec![
        DestinationConfig::new("running", 4, true, &["Training", "Discussion"]),
        DestinationConfig::new("C25K", 3, false, &["Progress", "Motivation"]),
        DestinationConfig::new("getdisciplined", 2, false, &["[Discussion]", "Discussion"]),
        DestinationConfig::new("selfimprovement", 2, true, &["Motivation"]),
    ]
}

fn default_keywords() -> Vec<String> {
    [
        "run",
        "marathon",
        "training",
        "motivation",
        "discipline",
        "habit",
        "consistency",
        "c25k",
        "5k",
        "couch",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_high_value_score_threshold() -> i64 {
    10
}

fn default_high_value_listing_limit() -> usize {
    10
}

fn default_keyword_listing_limit() -> usize {
    25
}

fn default_http_timeout_secs() -> u64 {
    60
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            persona_name: default_persona_name(),
            persona_description: default_persona_description(),
            challenge_length_days: default_challenge_length_days(),
            llm_api_url: default_llm_url(),
            llm_model: default_llm_model(),
            llm_temperature: default_llm_temperature(),
            llm_max_tokens: default_llm_max_tokens(),
            comment_max_chars: default_comment_max_chars(),
            timezone: default_timezone(),
            window_open_hour: default_window_open_hour(),
            window_close_hour: default_window_close_hour(),
            liveness_interval_mins: default_liveness_interval_mins(),
            post_check_interval_mins: default_post_check_interval_mins(),
            comment_check_interval_mins: default_comment_check_interval_mins(),
            tick_secs: default_tick_secs(),
            error_pause_secs: default_error_pause_secs(),
            max_posts_per_day: default_max_posts_per_day(),
            min_post_spacing_mins: default_min_post_spacing_mins(),
            min_comments_per_day: default_min_comments_per_day(),
            max_comments_per_day: default_max_comments_per_day(),
            comment_interval_secs: default_comment_interval_secs(),
            enable_comments: false,
            distance_delta_min: default_distance_delta_min(),
            distance_delta_max: default_distance_delta_max(),
            history_window: default_history_window(),
            history_log_path: default_history_log_path(),
            post_log_path: default_post_log_path(),
            comment_log_path: default_comment_log_path(),
            persona_checkpoint_path: None,
            destinations: default_destinations(),
            keywords: default_keywords(),
            high_value_score_threshold: default_high_value_score_threshold(),
            high_value_listing_limit: default_high_value_listing_limit(),
            keyword_listing_limit: default_keyword_listing_limit(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl AgentConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// `$STRIDER_CONFIG`, or strider_config.toml next to the executable
    pub fn config_path() -> PathBuf {
        match env::var("STRIDER_CONFIG") {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => Self::get_base_dir().join("strider_config.toml"),
        }
    }

    /// Load config from file, falling back to defaults, then apply env overrides.
    pub fn load() -> Self {
        let path = Self::config_path();

        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<AgentConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::warn!("No config file at {:?}, using defaults + env vars", path);
                Self::default()
            }
        };

        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("LLM_API_URL") {
            self.llm_api_url = url;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm_model = model;
        }

        if let Ok(tz) = env::var("STRIDER_TIMEZONE") {
            if !tz.trim().is_empty() {
                self.timezone = tz;
            }
        }

        if let Ok(enabled) = env::var("STRIDER_ENABLE_COMMENTS") {
            self.enable_comments = enabled.eq_ignore_ascii_case("1")
                || enabled.eq_ignore_ascii_case("true")
                || enabled.eq_ignore_ascii_case("yes");
        }

        if let Ok(path) = env::var("STRIDER_PERSONA_CHECKPOINT") {
            if !path.trim().is_empty() {
                self.persona_checkpoint_path = Some(path);
            }
        }

        if let Ok(name) = env::var("STRIDER_PERSONA_NAME") {
            if !name.trim().is_empty() {
                self.persona_name = name;
            }
        }
    }

    pub fn parse_timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::invalid("timezone", e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parse_timezone()?;

        if self.window_close_hour > 24 {
            return Err(ConfigError::invalid(
                "window_close_hour",
                format!("{} is past the end of the day", self.window_close_hour),
            ));
        }
        if self.window_open_hour >= self.window_close_hour {
            return Err(ConfigError::invalid(
                "window_open_hour",
                format!(
                    "window [{}, {}) is empty",
                    self.window_open_hour, self.window_close_hour
                ),
            ));
        }
        if self.distance_delta_min > self.distance_delta_max {
            return Err(ConfigError::invalid(
                "distance_delta_min",
                format!(
                    "{} exceeds distance_delta_max {}",
                    self.distance_delta_min, self.distance_delta_max
                ),
            ));
        }
        if self.min_comments_per_day > self.max_comments_per_day {
            return Err(ConfigError::invalid(
                "min_comments_per_day",
                format!(
                    "{} exceeds max_comments_per_day {}",
                    self.min_comments_per_day, self.max_comments_per_day
                ),
            ));
        }
        if self.history_window == 0 {
            return Err(ConfigError::invalid("history_window", "must be at least 1"));
        }
        if !self.destinations.iter().any(|d| d.post_target) {
            return Err(ConfigError::invalid(
                "destinations",
                "no destination is a post target",
            ));
        }
        Ok(())
    }
}

/// Secrets supplied through the process environment only.
#[derive(Clone)]
pub struct Credentials {
    pub llm_api_key: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub user_agent: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingEnv(key))
        };

        Ok(Self {
            llm_api_key: require("OPENAI_API_KEY")?,
            client_id: require("REDDIT_CLIENT_ID")?,
            client_secret: require("REDDIT_CLIENT_SECRET")?,
            refresh_token: require("REDDIT_REFRESH_TOKEN")?,
            user_agent: require("REDDIT_USER_AGENT")?,
        })
    }
}
