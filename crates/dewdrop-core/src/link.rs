//! Device protocol: command, poll, validate.
//!
//! [`DeviceLink`] sends a command and keeps polling its transport until the
//! reply fits what the command expects, the transport's budget runs out, or
//! the link is cancelled. What happens when the budget runs out is decided
//! by the transport's [`Exhaustion`] rule:
//!
//! | Rule | `read_sample` | `toggle_light` |
//! |------|---------------|----------------|
//! | [`Exhaustion::Fatal`] | `DeviceNotResponding` | `DeviceNotResponding` |
//! | [`Exhaustion::BestEffort`] | parse the last reply | `Ok(())` |
//!
//! Transport errors (I/O, connection refused, bad status) are returned as
//! soon as they happen.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dewdrop_types::{SensorSample, is_valid_data_line, is_valid_response};

use crate::backoff::pause;
use crate::error::{Error, Result};
use crate::transport::{Command, Exhaustion, Transport};

/// Outcome of one polling loop.
enum Poll {
    /// A reply accepted by the command.
    Accepted(String),
    /// The budget ran out; carries the last reply seen.
    Exhausted(String),
}

/// Protocol driver for one sensor device.
///
/// The transport is chosen once when the link is built. Exchanges go through
/// `&mut self`, so a link never has two commands outstanding.
pub struct DeviceLink {
    transport: Box<dyn Transport>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("transport", &self.transport.describe())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl DeviceLink {
    /// Create a link over `transport`.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::from_boxed(Box::new(transport))
    }

    /// Create a link over an already boxed transport.
    pub fn from_boxed(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort polling when `cancel` fires.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Endpoint description for logs.
    pub fn describe(&self) -> String {
        self.transport.describe()
    }

    /// Request one sample from the device.
    ///
    /// An acknowledgement or malformed reply triggers another poll.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceNotResponding`] when a fatal transport's budget runs out
    /// - [`Error::InvalidDataFormat`] / [`Error::InvalidLedState`] when a
    ///   best-effort transport's last reply does not parse
    /// - transport errors unchanged
    /// - [`Error::InvalidConfig`] if the transport's polling policy is invalid
    /// - [`Error::Cancelled`] if the link is cancelled
    pub async fn read_sample(&mut self) -> Result<SensorSample> {
        let line = match self.poll(Command::ReadData, is_valid_data_line).await? {
            Poll::Accepted(line) => line,
            Poll::Exhausted(last) => {
                warn!(
                    "{}: no data line within budget, using last reply {:?}",
                    self.transport.describe(),
                    last
                );
                last
            }
        };
        Ok(SensorSample::parse_line(&line)?)
    }

    /// Set the warning light for the given recommendation.
    ///
    /// Any acknowledgement or data line counts as success.
    pub async fn toggle_light(&mut self, open_windows: bool) -> Result<()> {
        let command = Command::light(open_windows);
        if let Poll::Exhausted(last) = self.poll(command, is_valid_response).await? {
            warn!(
                "{}: light command '{}' not acknowledged, last reply {:?}",
                self.transport.describe(),
                command,
                last
            );
        }
        Ok(())
    }

    async fn poll(&mut self, command: Command, accept: fn(&str) -> bool) -> Result<Poll> {
        let policy = self.transport.policy();
        policy.validate()?;
        let deadline = policy.start();
        let mut attempt = 0u32;

        debug!(
            "{}: sending '{}', budget {:?}",
            self.transport.describe(),
            command,
            policy.budget
        );

        loop {
            let reply = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                reply = self.transport.exchange(command) => reply?,
            };

            if accept(&reply) {
                debug!("{}: '{}' answered with {:?}", self.transport.describe(), command, reply);
                return Ok(Poll::Accepted(reply));
            }

            if deadline.expired() {
                return match self.transport.exhaustion() {
                    Exhaustion::Fatal => {
                        Err(Error::not_responding(command.as_str(), deadline.elapsed()))
                    }
                    Exhaustion::BestEffort => Ok(Poll::Exhausted(reply)),
                };
            }

            pause(policy.delay_for_attempt(attempt), &self.cancel).await?;
            attempt = attempt.saturating_add(1);
        }
    }
}
