//! Control frame structure and encoding/decoding

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum,
    command::{CommandId, FrameKind, Sender},
    error::{Error, Result},
};

/// Control protocol frame
///
/// # Frame Structure
///
/// ```text
/// ┌─────┬─────────┬────────┬─────────┬────────┬──────────┬────────┬──────────┬─────────┬─────────┬─────────┐
/// │ SOF │ Version │ Length │ Seq     │ CmdId  │ CmdType  │ Sender │ Reserved │ CRC16   │ CRC32   │ Payload │
/// │ 1 B │ 1 B     │ 2 B    │ 4 B     │ 2 B    │ 1 B      │ 1 B    │ 6 B      │ 2 B     │ 4 B     │ N B     │
/// └─────┴─────────┴────────┴─────────┴────────┴──────────┴────────┴──────────┴─────────┴─────────┴─────────┘
/// ```
///
/// All multi-byte values are little-endian. `Length` covers the whole frame.
/// CRC16 covers the 18 bytes before it, CRC32 covers the payload.
///
/// # Examples
///
/// ```
/// use lidarctl_core::{Frame, CommandId};
///
/// let frame = Frame::request(CommandId::Discovery, 1);
/// let encoded = frame.encode();
///
/// let decoded = Frame::decode(encoded).unwrap();
/// assert_eq!(frame.command, decoded.command);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command identifier
    pub command: CommandId,

    /// Request or acknowledgement
    pub kind: FrameKind,

    /// Who sent the frame
    pub sender: Sender,

    /// Sequence number (echoed by the device in its ACK)
    pub seq: u32,

    /// Command-specific data
    pub payload: Bytes,
}

impl Frame {
    /// Start-of-frame marker
    pub const SOF: u8 = 0xAA;

    /// Protocol version
    pub const VERSION: u8 = 0;

    /// Frame header size in bytes
    pub const HEADER_SIZE: usize = 24;

    /// Bytes covered by the header checksum
    const CRC16_SPAN: usize = 18;

    /// Maximum payload size
    pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - Self::HEADER_SIZE;

    /// Create a host request with empty payload
    pub fn request(command: CommandId, seq: u32) -> Self {
        Self::with_payload(command, FrameKind::Request, Sender::Host, seq, Bytes::new())
    }

    /// Create a frame with payload
    pub fn with_payload(
        command: CommandId,
        kind: FrameKind,
        sender: Sender,
        seq: u32,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            command,
            kind,
            sender,
            seq,
            payload: payload.into(),
        }
    }

    /// Get total frame size
    pub fn size(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len()
    }

    /// Check if this is an acknowledgement
    pub fn is_ack(&self) -> bool {
        self.kind == FrameKind::Ack
    }

    /// Encode frame to bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not fit the 16-bit length field.
    pub fn try_encode(&self) -> Result<BytesMut> {
        if self.payload.len() > Self::MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                size: self.payload.len(),
                max: Self::MAX_PAYLOAD_SIZE,
            });
        }

        Ok(self.encode())
    }

    /// Encode frame to bytes
    ///
    /// Callers building payloads larger than [`Frame::MAX_PAYLOAD_SIZE`] must
    /// use [`Frame::try_encode`].
    pub fn encode(&self) -> BytesMut {
        debug_assert!(
            self.payload.len() <= Self::MAX_PAYLOAD_SIZE,
            "payload of {} bytes does not fit the length field",
            self.payload.len()
        );

        let total_size = self.size();
        let mut buf = BytesMut::with_capacity(total_size);

        buf.put_u8(Self::SOF);
        buf.put_u8(Self::VERSION);
        buf.put_u16_le(total_size as u16);
        buf.put_u32_le(self.seq);
        buf.put_u16_le(self.command.into());
        buf.put_u8(self.kind as u8);
        buf.put_u8(self.sender as u8);
        buf.put_bytes(0, 6);

        let crc16 = checksum::crc16(&buf[..Self::CRC16_SPAN]);
        buf.put_u16_le(crc16);
        buf.put_u32_le(checksum::crc32(&self.payload));

        buf.put_slice(&self.payload);

        buf
    }

    /// Decode frame from bytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer is shorter than the header
    /// - The start-of-frame marker is wrong
    /// - The length field disagrees with the buffer
    /// - Either checksum fails
    /// - Command, kind or sender are invalid
    pub fn decode(mut buf: BytesMut) -> Result<Self> {
        if buf.len() < Self::HEADER_SIZE {
            return Err(Error::PacketTooShort {
                expected: Self::HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let crc16_calculated = checksum::crc16(&buf[..Self::CRC16_SPAN]);

        let sof = buf.get_u8();
        if sof != Self::SOF {
            return Err(Error::BadStartOfFrame(sof));
        }
        let _version = buf.get_u8();
        let length = buf.get_u16_le() as usize;
        let seq = buf.get_u32_le();
        let command_raw = buf.get_u16_le();
        let kind_raw = buf.get_u8();
        let sender_raw = buf.get_u8();
        buf.advance(6);
        let crc16_received = buf.get_u16_le();
        let crc32_received = buf.get_u32_le();

        if crc16_calculated != crc16_received {
            return Err(Error::HeaderChecksumMismatch {
                expected: crc16_calculated,
                received: crc16_received,
            });
        }

        let actual = Self::HEADER_SIZE + buf.len();
        if length != actual {
            return Err(Error::LengthMismatch {
                declared: length,
                actual,
            });
        }

        let payload = buf.freeze();

        let crc32_calculated = checksum::crc32(&payload);
        if crc32_calculated != crc32_received {
            return Err(Error::PayloadChecksumMismatch {
                expected: crc32_calculated,
                received: crc32_received,
            });
        }

        Ok(Self {
            command: CommandId::try_from(command_raw)?,
            kind: FrameKind::try_from(kind_raw)?,
            sender: Sender::try_from(sender_raw)?,
            seq,
            payload,
        })
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("command", &self.command)
            .field("kind", &self.kind)
            .field("sender", &self.sender)
            .field("seq", &self.seq)
            .field("payload", &hex::encode(&self.payload))
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame[{}]({:?}, seq={}, len={})",
            self.command,
            self.kind,
            self.seq,
            self.payload.len()
        )
    }
}
