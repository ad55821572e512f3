//! Configuration management
//!
//! All settings load from `DOJO_*` environment variables on top of
//! validated defaults. Award amounts and caps live in one place
//! (`AwardConfig`) - historical code paths carried their own copies of
//! these constants with drifting values, so `validate()` flags incoherent
//! combinations instead of silently unifying them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

use crate::moderation::fingerprint::FingerprintLimits;
use crate::moderation::tier::TierThresholds;

/// Top-level configuration for the XP ledger service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Award amounts and per-period caps
    pub awards: AwardConfig,
    /// Video moderation configuration
    pub moderation: ModerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Connection pool size
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Enable request/response span logging
    pub log_requests: bool,
}

/// Centralized XP award amounts and caps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwardConfig {
    /// XP per completed habit
    pub habit_xp: i64,
    /// Daily habit XP cap for free-tier students
    pub habit_daily_cap_free: i64,
    /// Daily habit XP cap for premium students
    pub habit_daily_cap_premium: i64,
    /// XP for a correct daily-quiz answer
    pub quiz_correct_xp: i64,
    /// XP for an incorrect daily-quiz answer
    pub quiz_incorrect_xp: i64,
    /// XP per family challenge
    pub family_challenge_xp: i64,
    /// Distinct family challenges rewarded per student per day
    pub family_daily_limit: i64,
    /// XP per trust self-report challenge
    pub trust_challenge_xp: i64,
    /// XP per gauntlet submission
    pub gauntlet_xp: i64,
}

impl Default for AwardConfig {
    fn default() -> Self {
        Self {
            habit_xp: 3,
            habit_daily_cap_free: 9,
            habit_daily_cap_premium: 21,
            quiz_correct_xp: 5,
            quiz_incorrect_xp: 1,
            family_challenge_xp: 5,
            family_daily_limit: 3,
            trust_challenge_xp: 5,
            gauntlet_xp: 10,
        }
    }
}

/// Configuration for the trust-tier moderation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Probability that a green-flagged auto-approval candidate is routed
    /// to manual review instead
    pub spot_check_rate: f64,
    /// Consecutive approvals required for the verified tier
    pub verified_streak: i32,
    /// Consecutive approvals required for the trusted tier
    pub trusted_streak: i32,
    /// Lookback window for duplicate-content detection, in days
    pub dedup_window_days: i64,
    /// Submissions within the rate window that trip the rate flag
    pub rate_threshold: i64,
    /// Trailing window for the rate heuristic, in minutes
    pub rate_window_minutes: i64,
    /// Minimum plausible video duration, in seconds
    pub min_duration_seconds: f64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            spot_check_rate: 0.1,
            verified_streak: 10,
            trusted_streak: 25,
            dedup_window_days: 30,
            rate_threshold: 5,
            rate_window_minutes: 60,
            min_duration_seconds: 3.0,
        }
    }
}

impl ModerationConfig {
    /// Convert to TierThresholds for use by the moderation engine
    pub fn to_thresholds(&self) -> TierThresholds {
        TierThresholds {
            verified_streak: self.verified_streak,
            trusted_streak: self.trusted_streak,
        }
    }

    /// Convert to FingerprintLimits for the content fingerprint checker
    pub fn to_limits(&self) -> FingerprintLimits {
        FingerprintLimits {
            dedup_window_days: self.dedup_window_days,
            rate_threshold: self.rate_threshold,
            rate_window_minutes: self.rate_window_minutes,
            min_duration_seconds: self.min_duration_seconds,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8420,
            },
            database: DatabaseConfig {
                postgres_url: "postgresql://localhost:5432/dojo_ledger".to_string(),
                max_connections: 10,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                log_requests: false,
            },
            awards: AwardConfig::default(),
            moderation: ModerationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Server configuration
        if let Ok(host) = env::var("DOJO_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = env::var("DOJO_PORT") {
            config.server.port = port.parse().context("Invalid DOJO_PORT value")?;
        }

        // Database configuration
        if let Ok(url) = env::var("DOJO_POSTGRES_URL") {
            config.database.postgres_url = url;
        }

        if let Ok(max) = env::var("DOJO_DB_MAX_CONNECTIONS") {
            config.database.max_connections =
                max.parse().context("Invalid DOJO_DB_MAX_CONNECTIONS value")?;
        }

        // Logging configuration
        if let Ok(level) = env::var("DOJO_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(log_requests) = env::var("DOJO_LOG_REQUESTS") {
            config.logging.log_requests = log_requests
                .parse()
                .context("Invalid DOJO_LOG_REQUESTS value")?;
        }

        // Award configuration
        if let Ok(xp) = env::var("DOJO_HABIT_XP") {
            config.awards.habit_xp = xp.parse().context("Invalid DOJO_HABIT_XP value")?;
        }

        if let Ok(cap) = env::var("DOJO_HABIT_DAILY_CAP_FREE") {
            config.awards.habit_daily_cap_free =
                cap.parse().context("Invalid DOJO_HABIT_DAILY_CAP_FREE value")?;
        }

        if let Ok(cap) = env::var("DOJO_HABIT_DAILY_CAP_PREMIUM") {
            config.awards.habit_daily_cap_premium = cap
                .parse()
                .context("Invalid DOJO_HABIT_DAILY_CAP_PREMIUM value")?;
        }

        if let Ok(xp) = env::var("DOJO_QUIZ_CORRECT_XP") {
            config.awards.quiz_correct_xp =
                xp.parse().context("Invalid DOJO_QUIZ_CORRECT_XP value")?;
        }

        if let Ok(xp) = env::var("DOJO_QUIZ_INCORRECT_XP") {
            config.awards.quiz_incorrect_xp =
                xp.parse().context("Invalid DOJO_QUIZ_INCORRECT_XP value")?;
        }

        if let Ok(xp) = env::var("DOJO_FAMILY_CHALLENGE_XP") {
            config.awards.family_challenge_xp =
                xp.parse().context("Invalid DOJO_FAMILY_CHALLENGE_XP value")?;
        }

        if let Ok(limit) = env::var("DOJO_FAMILY_DAILY_LIMIT") {
            config.awards.family_daily_limit =
                limit.parse().context("Invalid DOJO_FAMILY_DAILY_LIMIT value")?;
        }

        if let Ok(xp) = env::var("DOJO_TRUST_CHALLENGE_XP") {
            config.awards.trust_challenge_xp =
                xp.parse().context("Invalid DOJO_TRUST_CHALLENGE_XP value")?;
        }

        if let Ok(xp) = env::var("DOJO_GAUNTLET_XP") {
            config.awards.gauntlet_xp = xp.parse().context("Invalid DOJO_GAUNTLET_XP value")?;
        }

        // Moderation configuration
        if let Ok(rate) = env::var("DOJO_SPOT_CHECK_RATE") {
            config.moderation.spot_check_rate =
                rate.parse().context("Invalid DOJO_SPOT_CHECK_RATE value")?;
        }

        if let Ok(streak) = env::var("DOJO_VERIFIED_STREAK") {
            config.moderation.verified_streak =
                streak.parse().context("Invalid DOJO_VERIFIED_STREAK value")?;
        }

        if let Ok(streak) = env::var("DOJO_TRUSTED_STREAK") {
            config.moderation.trusted_streak =
                streak.parse().context("Invalid DOJO_TRUSTED_STREAK value")?;
        }

        if let Ok(days) = env::var("DOJO_DEDUP_WINDOW_DAYS") {
            config.moderation.dedup_window_days =
                days.parse().context("Invalid DOJO_DEDUP_WINDOW_DAYS value")?;
        }

        if let Ok(threshold) = env::var("DOJO_RATE_THRESHOLD") {
            config.moderation.rate_threshold =
                threshold.parse().context("Invalid DOJO_RATE_THRESHOLD value")?;
        }

        if let Ok(minutes) = env::var("DOJO_RATE_WINDOW_MINUTES") {
            config.moderation.rate_window_minutes = minutes
                .parse()
                .context("Invalid DOJO_RATE_WINDOW_MINUTES value")?;
        }

        if let Ok(secs) = env::var("DOJO_MIN_DURATION_SECONDS") {
            config.moderation.min_duration_seconds =
                secs.parse().context("Invalid DOJO_MIN_DURATION_SECONDS value")?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration coherence
    pub fn validate(&self) -> Result<()> {
        if self.database.postgres_url.is_empty() {
            return Err(anyhow::anyhow!(
                "DOJO_POSTGRES_URL must not be empty - the ledger cannot run without its store"
            ));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("DOJO_DB_MAX_CONNECTIONS must be at least 1"));
        }

        if !(0.0..=1.0).contains(&self.moderation.spot_check_rate) {
            return Err(anyhow::anyhow!(
                "DOJO_SPOT_CHECK_RATE must be within [0.0, 1.0], got {}",
                self.moderation.spot_check_rate
            ));
        }

        if self.moderation.verified_streak >= self.moderation.trusted_streak {
            return Err(anyhow::anyhow!(
                "DOJO_VERIFIED_STREAK ({}) must be below DOJO_TRUSTED_STREAK ({})",
                self.moderation.verified_streak,
                self.moderation.trusted_streak
            ));
        }

        let a = &self.awards;
        for (name, value) in [
            ("DOJO_HABIT_XP", a.habit_xp),
            ("DOJO_HABIT_DAILY_CAP_FREE", a.habit_daily_cap_free),
            ("DOJO_HABIT_DAILY_CAP_PREMIUM", a.habit_daily_cap_premium),
            ("DOJO_QUIZ_CORRECT_XP", a.quiz_correct_xp),
            ("DOJO_QUIZ_INCORRECT_XP", a.quiz_incorrect_xp),
            ("DOJO_FAMILY_CHALLENGE_XP", a.family_challenge_xp),
            ("DOJO_FAMILY_DAILY_LIMIT", a.family_daily_limit),
            ("DOJO_TRUST_CHALLENGE_XP", a.trust_challenge_xp),
            ("DOJO_GAUNTLET_XP", a.gauntlet_xp),
        ] {
            if value < 0 {
                return Err(anyhow::anyhow!("{} must not be negative, got {}", name, value));
            }
        }

        // Historical code paths disagreed on quiz amounts; surface suspect
        // combinations instead of silently accepting them.
        if a.quiz_incorrect_xp >= a.quiz_correct_xp {
            warn!(
                correct = a.quiz_correct_xp,
                incorrect = a.quiz_incorrect_xp,
                "Quiz incorrect-answer XP is not below correct-answer XP - check award configuration"
            );
        }

        if a.habit_daily_cap_premium < a.habit_daily_cap_free {
            warn!(
                free = a.habit_daily_cap_free,
                premium = a.habit_daily_cap_premium,
                "Premium habit cap is below the free cap - check award configuration"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_spot_check_rate_bounds() {
        let mut config = AppConfig::default();
        config.moderation.spot_check_rate = 1.5;
        assert!(config.validate().is_err());

        config.moderation.spot_check_rate = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_award_rejected() {
        let mut config = AppConfig::default();
        config.awards.habit_xp = -3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tier_threshold_ordering() {
        let mut config = AppConfig::default();
        config.moderation.verified_streak = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_postgres_url_rejected() {
        let mut config = AppConfig::default();
        config.database.postgres_url = String::new();
        assert!(config.validate().is_err());
    }
}
