//! Trait abstraction for the wheel's serial link to enable testing

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, warn};

use crate::error::{Result, SimBridgeError};

/// Longest line kept while waiting for a terminator
pub const MAX_LINE_LENGTH: usize = 512;

/// Line-oriented serial link
#[async_trait]
pub trait SerialLink: Send {
    /// Wait up to `timeout` for one line (terminator stripped).
    ///
    /// Returns `Ok(None)` if no complete line arrived in time. A closed
    /// device is reported as `UnexpectedEof`.
    async fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>>;

    /// Write all data and flush.
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Opens serial links by port name
#[async_trait]
pub trait SerialOpener: Send {
    async fn open(&mut self, port: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>>;
}

/// [`SerialLink`] over any async byte stream.
///
/// Partial lines survive a timed out read and are completed by the next one.
pub struct LineLink<S> {
    stream: S,
    pending: BytesMut,
}

impl<S> LineLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            pending: BytesMut::with_capacity(MAX_LINE_LENGTH),
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line = self.pending.split_to(end + 1);
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

#[async_trait]
impl<S> SerialLink for LineLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut chunk = [0u8; 256];

        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }

            if self.pending.len() > MAX_LINE_LENGTH {
                warn!("Discarding {} bytes without line terminator", self.pending.len());
                self.pending.advance(self.pending.len());
            }

            match tokio::time::timeout_at(deadline, self.stream.read(&mut chunk)).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "serial device closed",
                    ))
                }
                Ok(Ok(n)) => self.pending.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(e),
            }
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }
}

/// Opens real serial ports with tokio-serial (8N1, no flow control)
#[derive(Debug, Default)]
pub struct TokioSerialOpener;

#[async_trait]
impl SerialOpener for TokioSerialOpener {
    async fn open(&mut self, port: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>> {
        debug!("Opening serial port {} at {} baud", port, baud_rate);
        let stream = tokio_serial::new(port, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| SimBridgeError::SerialPortNotFound(format!("{}: {}", port, e)))?;

        Ok(Box::new(LineLink::new(stream)))
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted result of one `read_line` call
    #[derive(Debug, Clone)]
    pub enum MockRead {
        Line(&'static str),
        Timeout,
        Error(io::ErrorKind),
    }

    /// Mock serial link for testing
    ///
    /// Reads follow the script; once it runs out every read times out.
    #[derive(Clone, Default)]
    pub struct MockSerialLink {
        pub reads: Arc<Mutex<VecDeque<MockRead>>>,
        pub written_data: Arc<Mutex<Vec<Vec<u8>>>>,
        pub write_error: Arc<Mutex<Option<io::ErrorKind>>>,
    }

    impl MockSerialLink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_reads(reads: impl IntoIterator<Item = MockRead>) -> Self {
            let link = Self::new();
            link.reads.lock().unwrap().extend(reads);
            link
        }

        pub fn push_read(&self, read: MockRead) {
            self.reads.lock().unwrap().push_back(read);
        }

        pub fn get_written_data(&self) -> Vec<Vec<u8>> {
            self.written_data.lock().unwrap().clone()
        }

        pub fn written_lines(&self) -> Vec<String> {
            self.get_written_data()
                .into_iter()
                .map(|data| String::from_utf8(data).unwrap())
                .collect()
        }

        pub fn set_write_error(&self, error: io::ErrorKind) {
            *self.write_error.lock().unwrap() = Some(error);
        }
    }

    #[async_trait]
    impl SerialLink for MockSerialLink {
        async fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
            let next = self.reads.lock().unwrap().pop_front();
            match next {
                Some(MockRead::Line(line)) => Ok(Some(line.to_string())),
                Some(MockRead::Error(kind)) => Err(io::Error::new(kind, "Mock read error")),
                Some(MockRead::Timeout) | None => {
                    tokio::time::sleep(timeout).await;
                    Ok(None)
                }
            }
        }

        async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            if let Some(error) = *self.write_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock write error"));
            }
            self.written_data.lock().unwrap().push(data.to_vec());
            Ok(())
        }
    }

    /// Mock opener handing out clones of one link
    #[derive(Clone, Default)]
    pub struct MockOpener {
        pub link: MockSerialLink,
        pub fail: Arc<Mutex<bool>>,
        pub opened: Arc<Mutex<Vec<String>>>,
    }

    impl MockOpener {
        pub fn new(link: MockSerialLink) -> Self {
            Self {
                link,
                ..Self::default()
            }
        }

        pub fn set_fail(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }

        pub fn open_count(&self) -> usize {
            self.opened.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SerialOpener for MockOpener {
        async fn open(&mut self, port: &str, _baud_rate: u32) -> Result<Box<dyn SerialLink>> {
            self.opened.lock().unwrap().push(port.to_string());
            if *self.fail.lock().unwrap() {
                return Err(SimBridgeError::SerialPortNotFound(port.to_string()));
            }
            Ok(Box::new(self.link.clone()))
        }
    }
}
