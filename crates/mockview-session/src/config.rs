//! Interview configuration loaded from TOML and environment.
//!
//! | Key | Env | Default |
//! |-----|-----|---------|
//! | livekit_url | MOCKVIEW__LIVEKIT_URL | ws://127.0.0.1:7880 |
//! | token_endpoint | MOCKVIEW__TOKEN_ENDPOINT | http://127.0.0.1:8000/livekit/token |
//! | request_timeout_secs | MOCKVIEW__REQUEST_TIMEOUT_SECS | 10 |
//! | room_prefix | MOCKVIEW__ROOM_PREFIX | interview |
//! | identity_prefix | MOCKVIEW__IDENTITY_PREFIX | user |
//! | stages.intro_secs | MOCKVIEW__STAGES__INTRO_SECS | 60 |
//! | stages.experience_secs | MOCKVIEW__STAGES__EXPERIENCE_SECS | 180 |
//! | clock.tick_interval_ms | MOCKVIEW__CLOCK__TICK_INTERVAL_MS | 1000 |

use crate::error::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_LIVEKIT_URL: &str = "ws://127.0.0.1:7880";
const DEFAULT_TOKEN_ENDPOINT: &str = "http://127.0.0.1:8000/livekit/token";

/// Fixed duration of each timed stage, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDurations {
    pub intro_secs: u32,
    pub experience_secs: u32,
}

impl Default for StageDurations {
    fn default() -> Self {
        Self {
            intro_secs: 60,
            experience_secs: 180,
        }
    }
}

/// Countdown granularity. One second unless a rehearsal wants it faster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    pub tick_interval_ms: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
        }
    }
}

impl ClockConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Configuration for one interview orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewConfig {
    /// Real-time server the connection is established against.
    pub livekit_url: String,
    /// Token-issuance endpoint; receives `{ room, identity }` and answers `{ token }`.
    pub token_endpoint: String,
    /// Upper bound on the credential request.
    pub request_timeout_secs: u64,
    /// Room ids are `{room_prefix}-{8 hex}`.
    pub room_prefix: String,
    /// Participant ids are `{identity_prefix}-{8 hex}`.
    pub identity_prefix: String,
    #[serde(default)]
    pub stages: StageDurations,
    #[serde(default)]
    pub clock: ClockConfig,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            livekit_url: DEFAULT_LIVEKIT_URL.to_string(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            request_timeout_secs: 10,
            room_prefix: "interview".to_string(),
            identity_prefix: "user".to_string(),
            stages: StageDurations::default(),
            clock: ClockConfig::default(),
        }
    }
}

impl InterviewConfig {
    /// Load config from file and environment.
    /// Precedence: env `MOCKVIEW_CONFIG` path > `config/interview.toml` > defaults,
    /// then `MOCKVIEW__*` environment overrides on top.
    pub fn load() -> SessionResult<Self> {
        let config_path = std::env::var("MOCKVIEW_CONFIG")
            .unwrap_or_else(|_| "config/interview.toml".to_string());
        let defaults = InterviewConfig::default();
        let builder = config::Config::builder()
            .set_default("livekit_url", defaults.livekit_url)?
            .set_default("token_endpoint", defaults.token_endpoint)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs as i64)?
            .set_default("room_prefix", defaults.room_prefix)?
            .set_default("identity_prefix", defaults.identity_prefix)?
            .set_default("stages.intro_secs", defaults.stages.intro_secs as i64)?
            .set_default("stages.experience_secs", defaults.stages.experience_secs as i64)?
            .set_default("clock.tick_interval_ms", defaults.clock.tick_interval_ms as i64)?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("MOCKVIEW").separator("__"))
            .build()?;

        let loaded: InterviewConfig = built.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings the clock and connector cannot work with.
    pub fn validate(&self) -> SessionResult<()> {
        if self.stages.intro_secs == 0 || self.stages.experience_secs == 0 {
            return Err(SessionError::Config(format!(
                "stage durations must be positive (intro {}s, experience {}s)",
                self.stages.intro_secs, self.stages.experience_secs
            )));
        }
        if self.clock.tick_interval_ms == 0 {
            return Err(SessionError::Config(
                "clock.tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(SessionError::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
