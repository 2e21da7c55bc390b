//! Serial (USB) transport.
//!
//! The device is a byte stream at 115200 baud. Each exchange discards any
//! unread input, writes the single-byte command and reads up to the first
//! newline. A reply that times out or overruns [`MAX_LINE_LENGTH`] before the
//! newline is dropped and comes back empty, so the link simply polls again.
//!
//! Blocking port I/O runs on the blocking thread pool so the async runtime
//! is never stalled by a slow device.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::backoff::Backoff;
use crate::error::{Error, Result};
use crate::transport::{Command, Exhaustion, Transport};

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Per-read timeout on the port.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Longest reply accepted before the newline. A data line with a 20-digit id
/// is 35 bytes including its `\r`.
pub const MAX_LINE_LENGTH: usize = 64;

/// Blocking byte stream that can drop input it has not read yet.
pub trait SerialStream: Read + Write + Send + 'static {
    /// Discard everything received but not yet read.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl SerialStream for Box<dyn serialport::SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }
}

/// Serial transport over any blocking byte stream.
///
/// Budget exhaustion is [`Exhaustion::Fatal`]: a hardware device that stays
/// silent for the whole budget is considered gone.
pub struct SerialTransport<S = Box<dyn serialport::SerialPort>> {
    stream: Arc<Mutex<S>>,
    name: String,
    policy: Backoff,
}

impl SerialTransport {
    /// Open a serial port with the standard 8N1 settings.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(READ_TIMEOUT)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()?;

        Ok(Self::new(port, path))
    }
}

impl<S: SerialStream> SerialTransport<S> {
    /// Wrap an already-open stream.
    pub fn new(stream: S, name: impl Into<String>) -> Self {
        Self {
            stream: Arc::new(Mutex::new(stream)),
            name: name.into(),
            policy: Backoff::serial_poll(),
        }
    }

    /// Override the polling policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Backoff) -> Self {
        self.policy = policy;
        self
    }
}

impl<S> std::fmt::Debug for SerialTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

#[async_trait]
impl<S: SerialStream> Transport for SerialTransport<S> {
    async fn exchange(&mut self, command: Command) -> Result<String> {
        let stream = Arc::clone(&self.stream);
        let reply = tokio::task::spawn_blocking(move || {
            let mut stream = stream
                .lock()
                .map_err(|_| io::Error::other("serial stream lock poisoned"))?;
            write_and_read(&mut *stream, command)
        })
        .await
        .map_err(|e| Error::Io(io::Error::other(e)))??;

        trace!("{} <- {:?}", self.name, reply);
        Ok(reply)
    }

    fn policy(&self) -> Backoff {
        self.policy
    }

    fn exhaustion(&self) -> Exhaustion {
        Exhaustion::Fatal
    }

    fn describe(&self) -> String {
        format!("serial {}", self.name)
    }
}

fn write_and_read<S: SerialStream>(stream: &mut S, command: Command) -> io::Result<String> {
    stream.discard_input()?;
    stream.write_all(command.as_str().as_bytes())?;
    stream.flush()?;

    let mut line = Vec::with_capacity(MAX_LINE_LENGTH);
    let mut byte = [0u8; 1];
    while line.len() < MAX_LINE_LENGTH {
        match stream.read(&mut byte) {
            Ok(0) => break,
            Ok(_) if byte[0] == b'\n' => {
                return Ok(String::from_utf8_lossy(&line).trim().to_string());
            }
            Ok(_) => line.push(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
            Err(e) => return Err(e),
        }
    }

    if !line.is_empty() {
        trace!("dropping unterminated reply {:?}", String::from_utf8_lossy(&line));
    }
    Ok(String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use crate::link::DeviceLink;

    /// Fake board: every write queues the next scripted reply behind any
    /// input not read yet.
    #[derive(Default)]
    struct FakeBoard {
        written: Arc<Mutex<Vec<u8>>>,
        input: VecDeque<u8>,
        replies: VecDeque<Vec<u8>>,
        repeat: Option<Vec<u8>>,
        error: Option<io::Error>,
    }

    impl FakeBoard {
        fn replying(replies: &[&[u8]]) -> Self {
            Self {
                replies: replies.iter().map(|r| r.to_vec()).collect(),
                ..Self::default()
            }
        }

        fn transport(self) -> (SerialTransport<FakeBoard>, Arc<Mutex<Vec<u8>>>) {
            let written = Arc::clone(&self.written);
            (SerialTransport::new(self, "/dev/test"), written)
        }
    }

    impl Read for FakeBoard {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some(e) = self.error.take() {
                return Err(e);
            }
            let n = buf.len().min(self.input.len());
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
            for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl Write for FakeBoard {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            let reply = match &self.repeat {
                Some(line) => Some(line.clone()),
                None => self.replies.pop_front(),
            };
            if let Some(reply) = reply {
                self.input.extend(reply);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialStream for FakeBoard {
        fn discard_input(&mut self) -> io::Result<()> {
            self.input.clear();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_exchange_writes_command_and_trims_reply() {
        let (mut transport, written) = FakeBoard::replying(&[b"123,25.55,60.01,1\r\n"]).transport();

        let reply = transport.exchange(Command::ReadData).await.unwrap();
        assert_eq!(reply, "123,25.55,60.01,1");
        assert_eq!(written.lock().unwrap().as_slice(), b"d");
    }

    #[tokio::test]
    async fn test_timeout_is_empty_reply() {
        let (mut transport, written) = FakeBoard::default().transport();

        let reply = transport.exchange(Command::light(false)).await.unwrap();
        assert!(reply.is_empty());
        assert_eq!(written.lock().unwrap().as_slice(), b"1");
    }

    #[tokio::test]
    async fn test_io_error_propagates() {
        let board = FakeBoard {
            error: Some(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")),
            ..FakeBoard::default()
        };
        let (mut transport, _) = board.transport();

        let err = transport.exchange(Command::ReadData).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_transport_error());
    }

    #[tokio::test]
    async fn test_twenty_digit_id_is_read_whole() {
        let line = "12345678901234567890,21.50,48.20,0";
        let board = FakeBoard {
            repeat: Some(format!("{}\r\n", line).into_bytes()),
            ..FakeBoard::default()
        };
        let (mut transport, _) = board.transport();

        assert_eq!(transport.exchange(Command::ReadData).await.unwrap(), line);
        assert_eq!(transport.exchange(Command::ReadData).await.unwrap(), line);

        let mut link = DeviceLink::new(transport);
        let sample = link.read_sample().await.unwrap();
        assert_eq!(sample.device_id, 12_345_678_901_234_567_890);
        assert_eq!(sample.temperature, 21.5);
        assert_eq!(sample.humidity, 48.2);
        assert!(!sample.led_state);
    }

    #[tokio::test]
    async fn test_stale_input_is_discarded() {
        let mut board = FakeBoard::replying(&[b"42,20.00,50.00,0\r\n"]);
        board.input.extend(b"5678901234567890,21.50,48.20,0\r\n");
        let (mut transport, _) = board.transport();

        let reply = transport.exchange(Command::ReadData).await.unwrap();
        assert_eq!(reply, "42,20.00,50.00,0");
    }

    #[tokio::test]
    async fn test_unterminated_reply_is_dropped() {
        let long = [b'7'; MAX_LINE_LENGTH + 10];
        let (mut transport, _) =
            FakeBoard::replying(&[b"123,25.55,60.01,1", &long]).transport();

        assert!(transport.exchange(Command::ReadData).await.unwrap().is_empty());
        assert!(transport.exchange(Command::ReadData).await.unwrap().is_empty());
    }

    #[test]
    fn test_policy_is_fatal() {
        let (transport, _) = FakeBoard::default().transport();
        assert_eq!(transport.exhaustion(), Exhaustion::Fatal);
        assert_eq!(transport.policy(), Backoff::serial_poll());
        assert_eq!(transport.describe(), "serial /dev/test");
    }
}
