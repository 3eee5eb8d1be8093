// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Serial transport to the host.
//!
//! The serial device is opened twice: once for buffered request reads and
//! once for response writes. Both handles live for the whole process.

use std::fs::{File, OpenOptions};
use std::path::Path;

use nix::errno::Errno;
use nix::sys::termios::{cfmakeraw, tcgetattr, tcsetattr, SetArg};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::config::TransportConfig;
use crate::error::{BootError, GuestError, GuestResult};
use crate::types::Request;

/// The two directions of the host link.
pub struct Transport {
    inbound: BufReader<tokio::fs::File>,
    outbound: tokio::fs::File,
}

impl Transport {
    /// Open the configured serial device in both directions.
    pub fn open(config: &TransportConfig) -> Result<Self, BootError> {
        Self::open_split(&config.device, &config.device, config.raw_mode)
    }

    /// Open separate paths for requests and responses.
    ///
    /// Used with a pair of FIFOs when running the dispatcher outside a VM.
    /// With `raw_mode`, either side that is a TTY is switched to raw mode.
    pub fn open_split(inbound: &Path, outbound: &Path, raw_mode: bool) -> Result<Self, BootError> {
        let reader = OpenOptions::new()
            .read(true)
            .open(inbound)
            .map_err(|source| BootError::TransportOpen {
                path: inbound.to_path_buf(),
                source,
            })?;

        let writer = OpenOptions::new()
            .write(true)
            .open(outbound)
            .map_err(|source| BootError::TransportOpen {
                path: outbound.to_path_buf(),
                source,
            })?;

        // A cooked TTY echoes requests back and turns "\n" into "\r\n",
        // which breaks the length prefix.
        if raw_mode {
            make_raw(&reader, inbound)?;
            make_raw(&writer, outbound)?;
        }

        tracing::info!(
            inbound = %inbound.display(),
            outbound = %outbound.display(),
            raw_mode = raw_mode,
            "Transport open"
        );

        Ok(Self {
            inbound: BufReader::new(tokio::fs::File::from_std(reader)),
            outbound: tokio::fs::File::from_std(writer),
        })
    }

    /// Split into the request reader and the response writer.
    pub fn into_split(self) -> (BufReader<tokio::fs::File>, tokio::fs::File) {
        (self.inbound, self.outbound)
    }
}

/// Switch a TTY to raw mode: no echo, no newline translation.
/// Non-TTY files are left untouched.
fn make_raw(file: &File, path: &Path) -> Result<(), BootError> {
    let mut termios = match tcgetattr(file) {
        Ok(termios) => termios,
        Err(Errno::ENOTTY) => {
            tracing::debug!(path = %path.display(), "Not a TTY, raw mode skipped");
            return Ok(());
        }
        Err(e) => {
            return Err(BootError::TransportOpen {
                path: path.to_path_buf(),
                source: std::io::Error::from(e),
            })
        }
    };

    cfmakeraw(&mut termios);
    tcsetattr(file, SetArg::TCSANOW, &termios).map_err(|e| BootError::TransportOpen {
        path: path.to_path_buf(),
        source: std::io::Error::from(e),
    })?;

    Ok(())
}

/// Read one request line from the host.
///
/// # Errors
/// End of stream is `GuestError::TransportClosed`; the host is not
/// expected to close the link, so both that and read errors are fatal.
pub async fn read_request<R>(reader: &mut R) -> GuestResult<Request>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = reader
        .read_until(b'\n', &mut line)
        .await
        .map_err(|e| GuestError::Io {
            context: "reading request",
            source: e,
        })?;

    if n == 0 {
        return Err(GuestError::TransportClosed);
    }

    if line.last() != Some(&b'\n') {
        tracing::warn!(len = line.len(), "Request line not newline-terminated");
    }

    Ok(Request::new(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_request_keeps_newline() {
        let mut input: &[u8] = b"{\"fn\":\"add\"}\nsecond\n";
        let first = read_request(&mut input).await.unwrap();
        assert_eq!(first.as_bytes(), b"{\"fn\":\"add\"}\n");

        let second = read_request(&mut input).await.unwrap();
        assert_eq!(second.as_bytes(), b"second\n");
    }

    #[tokio::test]
    async fn test_read_request_eof_is_closed() {
        let mut input: &[u8] = b"";
        assert!(matches!(
            read_request(&mut input).await,
            Err(GuestError::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_request_long_line() {
        let mut data = vec![b'z'; 64 * 1024];
        data.push(b'\n');
        let mut input: &[u8] = &data;
        let request = read_request(&mut input).await.unwrap();
        assert_eq!(request.len(), 64 * 1024 + 1);
    }

    #[tokio::test]
    async fn test_partial_final_line() {
        let mut input: &[u8] = b"tail";
        let request = read_request(&mut input).await.unwrap();
        assert_eq!(request.as_bytes(), b"tail");
        assert!(matches!(
            read_request(&mut input).await,
            Err(GuestError::TransportClosed)
        ));
    }

    #[test]
    fn test_open_missing_device() {
        let config = TransportConfig {
            device: "/nonexistent/ttyS1".into(),
            raw_mode: true,
        };
        assert!(matches!(
            Transport::open(&config),
            Err(BootError::TransportOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_regular_files_with_raw_mode() {
        let dir = tempfile::TempDir::new().unwrap();
        let inbound = dir.path().join("in");
        let outbound = dir.path().join("out");
        std::fs::write(&inbound, b"ping\n").unwrap();
        std::fs::write(&outbound, b"").unwrap();

        let transport = Transport::open_split(&inbound, &outbound, true).unwrap();
        let (mut reader, _writer) = transport.into_split();
        let request = read_request(&mut reader).await.unwrap();
        assert_eq!(request.as_bytes(), b"ping\n");
    }
}
