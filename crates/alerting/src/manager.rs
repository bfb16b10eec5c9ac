//! Alert Manager Implementation

use crate::AlertCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Maximum evidence captures per hour for each subject (0 = unlimited)
    pub max_alerts_per_hour: usize,
    /// Pending audio cues before new cues are dropped
    pub audio_queue_depth: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            max_alerts_per_hour: 360,
            audio_queue_depth: 8,
        }
    }
}

/// State of an alert for one subject and category
#[derive(Debug, Clone)]
pub struct AlertState {
    /// Last time this alert was fired
    pub last_fired: Instant,
    /// Number of times fired
    pub fire_count: usize,
    /// Whether alert is acknowledged
    pub acknowledged: bool,
}

/// Captures counted against one subject's hourly budget
#[derive(Debug, Clone, Copy)]
struct HourlyBudget {
    count: usize,
    hour_start: Instant,
}

/// Alert ledger with per-subject hourly throttling
///
/// Episode detection and cooldown live with each subject; this ledger only
/// bounds how much evidence a single subject can write and tracks what an
/// operator has acknowledged.
pub struct AlertManager {
    /// Configuration
    config: AlertConfig,
    /// Alert states by subject and category
    states: HashMap<(String, AlertCategory), AlertState>,
    /// Captures in the current hour by subject
    budgets: HashMap<String, HourlyBudget>,
}

impl AlertManager {
    /// Create a new alert manager
    pub fn new(config: AlertConfig) -> Self {
        info!("Creating alert manager with config: {:?}", config);
        Self {
            config,
            states: HashMap::new(),
            budgets: HashMap::new(),
        }
    }

    /// Check whether another capture fits in the subject's hourly budget
    pub fn should_fire(&mut self, subject_id: &str, now: Instant) -> bool {
        if self.config.max_alerts_per_hour == 0 {
            return true;
        }
        let Some(budget) = self.budgets.get_mut(subject_id) else {
            return true;
        };

        // Reset hourly counter if needed
        if now.saturating_duration_since(budget.hour_start) > Duration::from_secs(3600) {
            budget.count = 0;
            budget.hour_start = now;
        }

        if budget.count >= self.config.max_alerts_per_hour {
            warn!("Alert throttled: max alerts per hour reached for {}", subject_id);
            return false;
        }

        true
    }

    /// Record that an alert was fired
    pub fn record_fire(&mut self, subject_id: &str, category: AlertCategory, now: Instant) {
        self.budgets
            .entry(subject_id.to_string())
            .or_insert(HourlyBudget {
                count: 0,
                hour_start: now,
            })
            .count += 1;

        let state = self
            .states
            .entry((subject_id.to_string(), category))
            .or_insert(AlertState {
                last_fired: now,
                fire_count: 0,
                acknowledged: false,
            });

        state.last_fired = now;
        state.fire_count += 1;
        state.acknowledged = false;

        info!(
            "Alert recorded: {} for {} (count: {})",
            category, subject_id, state.fire_count
        );
    }

    /// Acknowledge an alert
    pub fn acknowledge(&mut self, subject_id: &str, category: AlertCategory) -> bool {
        if let Some(state) = self.states.get_mut(&(subject_id.to_string(), category)) {
            state.acknowledged = true;
            info!("Alert acknowledged: {} for {}", category, subject_id);
            true
        } else {
            false
        }
    }

    /// Get pending (unacknowledged) alerts
    pub fn get_pending(&self) -> Vec<(&str, AlertCategory, &AlertState)> {
        self.states
            .iter()
            .filter(|(_, state)| !state.acknowledged)
            .map(|((subject, category), state)| (subject.as_str(), *category, state))
            .collect()
    }

    /// Drop ledger entries for a subject that disconnected
    pub fn forget_subject(&mut self, subject_id: &str) {
        let before = self.states.len();
        self.states.retain(|(subject, _), _| subject != subject_id);
        self.budgets.remove(subject_id);
        debug!(
            "Forgot {} alert states for {}",
            before - self.states.len(),
            subject_id
        );
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}
