//! # Remote Commands
//!
//! Line-oriented text protocol used by the command spool, the `command`
//! subcommand and the bridge's batch endpoint:
//!
//! ```text
//! setChannel 5 1700
//! setChannels 1=1200 3=1800
//! setMode joystick
//! sendChannels
//! # comments and blank lines are ignored
//! ```
//!
//! Commands carry absolute values only, so replaying or reordering them
//! never accumulates.

use std::fmt;
use thiserror::Error;
use tracing::warn;

use super::state::{is_valid_channel_value, ControlMode, SharedState};
use crate::crsf::protocol::CRSF_NUM_CHANNELS;

/// One instruction for the control loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    SetChannel { channel: usize, value: u16 },
    SetChannels(Vec<(usize, u16)>),
    SetMode(ControlMode),
    SendChannels,
}

/// Why a command line was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),

    #[error("malformed command: {0}")]
    Malformed(String),

    #[error("channel {channel} value {value} out of range (channels 1-16, values 1000-2000)")]
    OutOfRange { channel: usize, value: u16 },

    #[error("{0}")]
    InvalidMode(String),
}

/// Result of parsing a multi-line batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBatch {
    pub commands: Vec<RemoteCommand>,
    /// Lines that were rejected
    pub skipped: usize,
}

fn check_channel(channel: usize, value: u16) -> Result<(usize, u16), CommandError> {
    if (1..=CRSF_NUM_CHANNELS).contains(&channel) && is_valid_channel_value(value) {
        Ok((channel, value))
    } else {
        Err(CommandError::OutOfRange { channel, value })
    }
}

fn parse_pair(token: &str) -> Option<(usize, u16)> {
    let (channel, value) = token.split_once('=')?;
    Some((channel.trim().parse().ok()?, value.trim().parse().ok()?))
}

/// Parses one line
///
/// Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<RemoteCommand>, CommandError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut tokens = line.split_whitespace();
    let Some(keyword) = tokens.next() else {
        return Ok(None);
    };

    let command = match keyword {
        "setChannel" => {
            let (Some(channel), Some(value)) = (tokens.next(), tokens.next()) else {
                return Err(CommandError::Malformed(line.to_string()));
            };
            let channel: usize = channel
                .parse()
                .map_err(|_| CommandError::Malformed(line.to_string()))?;
            let value: i64 = value
                .parse()
                .map_err(|_| CommandError::Malformed(line.to_string()))?;
            let value = u16::try_from(value).map_err(|_| CommandError::OutOfRange {
                channel,
                value: u16::MAX,
            })?;
            let (channel, value) = check_channel(channel, value)?;
            RemoteCommand::SetChannel { channel, value }
        }
        "setChannels" => {
            let mut pairs = Vec::new();
            for token in tokens {
                match parse_pair(token).map(|(ch, val)| check_channel(ch, val)) {
                    Some(Ok(pair)) => pairs.push(pair),
                    Some(Err(e)) => warn!("Skipping setChannels entry '{}': {}", token, e),
                    None => warn!("Skipping setChannels entry '{}'", token),
                }
            }
            RemoteCommand::SetChannels(pairs)
        }
        "setMode" => {
            let mode = tokens
                .next()
                .ok_or_else(|| CommandError::Malformed(line.to_string()))?
                .parse::<ControlMode>()
                .map_err(CommandError::InvalidMode)?;
            RemoteCommand::SetMode(mode)
        }
        "sendChannels" => RemoteCommand::SendChannels,
        other => return Err(CommandError::Unknown(other.to_string())),
    };

    Ok(Some(command))
}

/// Parses a batch of lines, skipping (and logging) bad ones
pub fn parse_batch<'a, I>(lines: I) -> CommandBatch
where
    I: IntoIterator<Item = &'a str>,
{
    let mut batch = CommandBatch::default();
    for line in lines {
        match parse_line(line) {
            Ok(Some(command)) => batch.commands.push(command),
            Ok(None) => {}
            Err(e) => {
                warn!("Skipping command line '{}': {}", line.trim(), e);
                batch.skipped += 1;
            }
        }
    }
    batch
}

impl RemoteCommand {
    /// Applies the command to the shared state
    ///
    /// Returns true when the command asks for an out-of-cadence transmit,
    /// which every accepted command does.
    pub fn apply(&self, state: &SharedState) -> bool {
        match self {
            RemoteCommand::SetChannel { channel, value } => {
                if !state.set_channel(*channel, *value) {
                    warn!("Rejected setChannel {} {}", channel, value);
                }
            }
            RemoteCommand::SetChannels(pairs) => {
                let applied = state.set_channels(pairs);
                if applied < pairs.len() {
                    warn!("setChannels applied {} of {} entries", applied, pairs.len());
                }
            }
            RemoteCommand::SetMode(mode) => state.set_mode(*mode),
            RemoteCommand::SendChannels => {}
        }
        true
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteCommand::SetChannel { channel, value } => {
                write!(f, "setChannel {} {}", channel, value)
            }
            RemoteCommand::SetChannels(pairs) => {
                write!(f, "setChannels")?;
                for (channel, value) in pairs {
                    write!(f, " {}={}", channel, value)?;
                }
                Ok(())
            }
            RemoteCommand::SetMode(mode) => write!(f, "setMode {}", mode),
            RemoteCommand::SendChannels => write!(f, "sendChannels"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::link::LinkMonitor;
    use std::time::Duration;

    fn state() -> SharedState {
        SharedState::new(LinkMonitor::new(Duration::from_millis(300), false), 1500, 3, 1000)
    }

    #[test]
    fn test_parse_set_channel() {
        assert_eq!(
            parse_line("setChannel 5 1700"),
            Ok(Some(RemoteCommand::SetChannel { channel: 5, value: 1700 }))
        );
    }

    #[test]
    fn test_set_channels_prefix_does_not_shadow() {
        assert_eq!(
            parse_line("setChannels 1=1200 3=1800"),
            Ok(Some(RemoteCommand::SetChannels(vec![(1, 1200), (3, 1800)])))
        );
    }

    #[test]
    fn test_set_channels_skips_bad_tokens() {
        assert_eq!(
            parse_line("setChannels 1=1200 junk 17=1500 2=abc 4=2500 5=1600"),
            Ok(Some(RemoteCommand::SetChannels(vec![(1, 1200), (5, 1600)])))
        );
    }

    #[test]
    fn test_parse_mode_and_send() {
        assert_eq!(
            parse_line("setMode joystick"),
            Ok(Some(RemoteCommand::SetMode(ControlMode::Joystick)))
        );
        assert_eq!(parse_line("  sendChannels  "), Ok(Some(RemoteCommand::SendChannels)));
        assert!(matches!(parse_line("setMode auto"), Err(CommandError::InvalidMode(_))));
    }

    #[test]
    fn test_comments_and_blanks_ignored() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   "), Ok(None));
        assert_eq!(parse_line("# setChannel 1 1000"), Ok(None));
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert_eq!(
            parse_line("setChannel 17 1500"),
            Err(CommandError::OutOfRange { channel: 17, value: 1500 })
        );
        assert_eq!(
            parse_line("setChannel 1 2001"),
            Err(CommandError::OutOfRange { channel: 1, value: 2001 })
        );
        assert!(matches!(
            parse_line("setChannel 1 -5"),
            Err(CommandError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_malformed_and_unknown() {
        assert!(matches!(parse_line("setChannel 5"), Err(CommandError::Malformed(_))));
        assert!(matches!(parse_line("setChannel x 1500"), Err(CommandError::Malformed(_))));
        assert_eq!(
            parse_line("arm now"),
            Err(CommandError::Unknown("arm".to_string()))
        );
    }

    #[test]
    fn test_batch_skips_malformed_lines_individually() {
        let text = "setChannel 1 1100\nbogus\n\n# note\nsetChannel 99 1500\nsendChannels\n";
        let batch = parse_batch(text.lines());
        assert_eq!(batch.skipped, 2);
        assert_eq!(
            batch.commands,
            vec![
                RemoteCommand::SetChannel { channel: 1, value: 1100 },
                RemoteCommand::SendChannels,
            ]
        );
    }

    #[test]
    fn test_apply_updates_state_and_requests_send() {
        let state = state();
        let batch = parse_batch(["setChannels 1=1200 3=1800", "setMode joystick"]);
        for command in &batch.commands {
            assert!(command.apply(&state));
        }
        assert_eq!(state.channels().get(1), Some(1200));
        assert_eq!(state.channels().get(3), Some(1800));
        assert_eq!(state.mode(), ControlMode::Joystick);
    }

    #[test]
    fn test_repeated_apply_is_idempotent() {
        let once = state();
        let many = state();
        let command = RemoteCommand::SetChannel { channel: 5, value: 1700 };

        command.apply(&once);
        for _ in 0..5 {
            command.apply(&many);
        }
        assert_eq!(once.channels(), many.channels());
    }

    #[test]
    fn test_display_parses_back() {
        let commands = [
            RemoteCommand::SetChannel { channel: 2, value: 1999 },
            RemoteCommand::SetChannels(vec![(1, 1000), (16, 2000)]),
            RemoteCommand::SetMode(ControlMode::Manual),
            RemoteCommand::SendChannels,
        ];
        for command in commands {
            assert_eq!(parse_line(&command.to_string()), Ok(Some(command)));
        }
    }
}
