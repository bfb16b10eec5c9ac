//! Alert sound backends

use crate::{AlertCategory, AlertSound, SinkError};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// Sound backend for hosts without an audio device: logs the alert instead
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSound;

impl AlertSound for LogSound {
    fn play(&self, category: AlertCategory) -> Result<(), SinkError> {
        warn!("ALERT: {} detected (no audio device configured)", category);
        Ok(())
    }
}

/// Plays the cue by running an external player, e.g. `aplay alert_beep.wav`
#[derive(Debug, Clone)]
pub struct CommandSound {
    program: String,
    args: Vec<String>,
}

impl CommandSound {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a full argv (`["aplay", "-q", "alert_beep.wav"]`)
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl AlertSound for CommandSound {
    fn play(&self, category: AlertCategory) -> Result<(), SinkError> {
        debug!("Playing {} cue via {}", category, self.program);
        let status = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| SinkError::Sound(format!("{}: {}", self.program, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(SinkError::Sound(format!("{} exited with {}", self.program, status)))
        }
    }
}
