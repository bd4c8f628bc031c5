//! Trait abstraction for the byte-stream transport, so the control loop can
//! run against a real UART, an in-memory duplex pipe or a test mock.

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Trait for serial port I/O operations
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Read whatever is available, waiting at most `timeout`
    ///
    /// Returns `Ok(0)` when nothing arrived in time.
    async fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Write one complete frame and flush it
    async fn send_packet(&mut self, packet: &[u8]) -> io::Result<()> {
        self.write_all(packet).await?;
        self.flush().await
    }
}

/// Adapter implementing [`SerialPortIO`] for any tokio byte stream
#[derive(Debug)]
pub struct StreamPort<S> {
    stream: S,
}

impl<S> StreamPort<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S> SerialPortIO for StreamPort<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(&mut self.stream, data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        AsyncWriteExt::flush(&mut self.stream).await
    }

    async fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        match tokio::time::timeout(timeout, self.stream.read(buf)).await {
            Ok(result) => result,
            Err(_elapsed) => Ok(0),
        }
    }
}
