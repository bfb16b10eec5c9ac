//! Consecutive-frame debounce with hysteresis and cooldown
//!
//! One machine per alert category per subject. A condition has to hold for
//! `consec_frames` measured frames before the category alerts; an alerting
//! episode survives up to `grace_frames` condition-free frames. Each episode
//! dispatches at most once, and not at all while the cooldown anchor is
//! within the configured window.

use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::CategoryConfig;

/// Debounce state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DebounceState {
    #[default]
    Normal,
    Accumulating,
    Alerting,
    Cooldown,
}

/// What a single update did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    /// Entered Alerting; the episode should be dispatched
    Onset,
    /// Entered Alerting inside the cooldown window; flag only
    SuppressedOnset,
    /// Alerting episode ended
    Cleared,
}

impl Transition {
    pub fn is_onset(&self) -> bool {
        matches!(self, Self::Onset | Self::SuppressedOnset)
    }
}

#[derive(Debug, Clone)]
pub struct DebounceMachine {
    config: CategoryConfig,
    cooldown: Duration,
    state: DebounceState,
    counter: u32,
    misses: u32,
    last_dispatched: Option<Instant>,
}

impl DebounceMachine {
    pub fn new(config: CategoryConfig, cooldown: Duration) -> Self {
        Self {
            config,
            cooldown,
            state: DebounceState::Normal,
            counter: 0,
            misses: 0,
            last_dispatched: None,
        }
    }

    /// Feed one frame
    ///
    /// `condition` is `None` when the metric could not be measured; such
    /// frames leave the counters untouched. `cooldown_anchor` is the dispatch
    /// instant the cooldown is measured from.
    pub fn update(
        &mut self,
        condition: Option<bool>,
        now: Instant,
        cooldown_anchor: Option<Instant>,
    ) -> Transition {
        let cooling = self.within_cooldown(cooldown_anchor, now);
        if self.state == DebounceState::Cooldown && !cooling {
            self.state = DebounceState::Normal;
        }

        match condition {
            None => Transition::None,
            Some(true) => {
                self.misses = 0;
                if self.state == DebounceState::Alerting {
                    return Transition::None;
                }

                self.counter = self.counter.saturating_add(1);
                if self.counter < self.config.consec_frames {
                    if self.state != DebounceState::Cooldown {
                        self.state = DebounceState::Accumulating;
                    }
                    return Transition::None;
                }

                self.state = DebounceState::Alerting;
                if cooling {
                    Transition::SuppressedOnset
                } else {
                    self.last_dispatched = Some(now);
                    Transition::Onset
                }
            }
            Some(false) => {
                if self.state != DebounceState::Alerting {
                    self.counter = 0;
                    if self.state == DebounceState::Accumulating {
                        self.state = DebounceState::Normal;
                    }
                    return Transition::None;
                }

                self.misses += 1;
                if self.misses <= self.config.grace_frames {
                    return Transition::None;
                }

                self.counter = 0;
                self.misses = 0;
                // The episode's own dispatch counts as an anchor too
                let anchor = cooldown_anchor.max(self.last_dispatched);
                self.state = if self.within_cooldown(anchor, now) {
                    DebounceState::Cooldown
                } else {
                    DebounceState::Normal
                };
                Transition::Cleared
            }
        }
    }

    /// Zero the counters (face lost); ends an active episode
    ///
    /// `last_dispatched` survives so cooldown still applies afterwards.
    pub fn reset(&mut self) -> Transition {
        let was_active = self.is_active();
        self.counter = 0;
        self.misses = 0;
        self.state = DebounceState::Normal;
        if was_active {
            Transition::Cleared
        } else {
            Transition::None
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == DebounceState::Alerting
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn last_dispatched(&self) -> Option<Instant> {
        self.last_dispatched
    }

    fn within_cooldown(&self, anchor: Option<Instant>, now: Instant) -> bool {
        anchor.is_some_and(|at| now.saturating_duration_since(at) < self.cooldown)
    }
}
