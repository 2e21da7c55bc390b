//! Transport abstraction for talking to the sensor device.
//!
//! A [`Transport`] moves one command to the device and returns whatever text
//! came back. It knows nothing about retries or the reply grammar; that is
//! the job of [`crate::link::DeviceLink`]. Each transport does carry its own
//! polling policy and its own rule for what happens when that policy runs
//! out, because the serial and network devices behave differently.

use std::fmt;

use async_trait::async_trait;

use crate::backoff::Backoff;
use crate::error::Result;

/// Command sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ask for a data line.
    ReadData,
    /// Set the warning light for the given recommendation.
    Light {
        /// Whether opening the windows is recommended.
        open_windows: bool,
    },
}

impl Command {
    /// Light command for a recommendation.
    pub fn light(open_windows: bool) -> Self {
        Command::Light { open_windows }
    }

    /// Single-byte wire form: `d`, `0` when windows should open, `1` otherwise.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::ReadData => "d",
            Command::Light { open_windows: true } => "0",
            Command::Light { open_windows: false } => "1",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a link does when the polling budget runs out without a valid reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// Fail with [`crate::Error::DeviceNotResponding`].
    Fatal,
    /// Use the last reply received, valid or not.
    BestEffort,
}

/// One command/reply exchange with the device.
///
/// Implementations are not assumed to be thread-safe: a link owns its
/// transport and issues one exchange at a time through `&mut self`.
#[async_trait]
pub trait Transport: Send {
    /// Send `command` and return the trimmed reply, which may be empty.
    async fn exchange(&mut self, command: Command) -> Result<String>;

    /// Polling schedule for this transport.
    fn policy(&self) -> Backoff;

    /// Budget exhaustion rule for this transport.
    fn exhaustion(&self) -> Exhaustion;

    /// Human-readable endpoint for logs.
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn exchange(&mut self, command: Command) -> Result<String> {
        (**self).exchange(command).await
    }

    fn policy(&self) -> Backoff {
        (**self).policy()
    }

    fn exhaustion(&self) -> Exhaustion {
        (**self).exhaustion()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_form() {
        assert_eq!(Command::ReadData.as_str(), "d");
        assert_eq!(Command::light(true).as_str(), "0");
        assert_eq!(Command::light(false).as_str(), "1");
        assert_eq!(Command::light(true).to_string(), "0");
    }
}
