// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Response framing for the outbound serial stream.
//!
//! A frame is a single length byte followed by exactly that many payload
//! bytes. The length is the number of payload bytes actually sent, so the
//! payload is capped at 255 bytes; longer responses are handled by an
//! [`OversizePolicy`].

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;
use crate::types::Response;

/// Largest payload a one-byte length prefix can describe.
pub const MAX_FRAME_PAYLOAD: usize = u8::MAX as usize;

/// What to do with a response longer than [`MAX_FRAME_PAYLOAD`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    /// Refuse the response; the dispatcher sends the empty error frame.
    #[default]
    Reject,
    /// Send the first 255 bytes.
    Truncate,
}

/// An encoded response ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Vec<u8>,
}

impl Frame {
    /// Encode a response, applying `policy` when it does not fit.
    pub fn encode(response: Response, policy: OversizePolicy) -> Result<Self, FrameError> {
        let mut payload = response.into_bytes();

        if payload.len() > MAX_FRAME_PAYLOAD {
            match policy {
                OversizePolicy::Reject => {
                    return Err(FrameError::PayloadTooLarge {
                        size: payload.len(),
                        max: MAX_FRAME_PAYLOAD,
                    });
                }
                OversizePolicy::Truncate => {
                    tracing::warn!(
                        size = payload.len(),
                        max = MAX_FRAME_PAYLOAD,
                        "Truncating oversized response"
                    );
                    payload.truncate(MAX_FRAME_PAYLOAD);
                }
            }
        }

        Ok(Self { payload })
    }

    /// The frame sent when a worker produced no usable response.
    pub fn empty() -> Self {
        Self {
            payload: Vec::new(),
        }
    }

    /// Value of the length prefix.
    pub fn len_byte(&self) -> u8 {
        // encode() guarantees the payload fits.
        self.payload.len() as u8
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Wire representation: length byte then payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + self.payload.len());
        bytes.push(self.len_byte());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Write the frame and flush so the host sees it immediately.
    pub async fn write_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await
    }
}
