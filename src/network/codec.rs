use bytes::Buf;
use bytes::BufMut;
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::Decoder;
use tokio_util::codec::Encoder;

use crate::AcknowledgeMessage;
use crate::CloseSecureChannelRequest;
use crate::Error;
use crate::ErrorMessage;
use crate::HelloMessage;
use crate::NetworkError;
use crate::OpenSecureChannelRequest;
use crate::OpenSecureChannelResponse;
use crate::SecureRequest;
use crate::SecureResponse;
use crate::SerializationError;

/// Type (3) + chunk (1) + total length (4).
pub const HEADER_LEN: usize = 8;

/// Only single-chunk messages are produced or accepted.
pub const FINAL_CHUNK: u8 = b'F';

pub const HEL: &[u8; 3] = b"HEL";
pub const ACK: &[u8; 3] = b"ACK";
pub const ERR: &[u8; 3] = b"ERR";
pub const OPN: &[u8; 3] = b"OPN";
pub const CLO: &[u8; 3] = b"CLO";
pub const MSG: &[u8; 3] = b"MSG";

/// One transport frame.
///
/// `OPN` and `MSG` carry different bodies per direction, so the decoder needs to
/// know which side of the connection it runs on.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Hello(HelloMessage),
    Acknowledge(AcknowledgeMessage),
    Error(ErrorMessage),
    OpenRequest(OpenSecureChannelRequest),
    OpenResponse(OpenSecureChannelResponse),
    Close(CloseSecureChannelRequest),
    Request(SecureRequest),
    Response(SecureResponse),
}

impl Frame {
    pub fn message_type(&self) -> &'static [u8; 3] {
        match self {
            Frame::Hello(_) => HEL,
            Frame::Acknowledge(_) => ACK,
            Frame::Error(_) => ERR,
            Frame::OpenRequest(_) | Frame::OpenResponse(_) => OPN,
            Frame::Close(_) => CLO,
            Frame::Request(_) | Frame::Response(_) => MSG,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Hello(_) => "HEL",
            Frame::Acknowledge(_) => "ACK",
            Frame::Error(_) => "ERR",
            Frame::OpenRequest(_) | Frame::OpenResponse(_) => "OPN",
            Frame::Close(_) => "CLO",
            Frame::Request(_) | Frame::Response(_) => "MSG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecRole {
    /// Decodes client-to-server frames, encodes anything.
    Server,
    /// Decodes server-to-client frames, encodes anything.
    Client,
}

/// Length-prefixed framing with bincode bodies.
#[derive(Debug, Clone)]
pub struct UaCodec {
    role: CodecRole,
    max_message_size: usize,
}

impl UaCodec {
    pub fn server(max_message_size: usize) -> Self {
        Self {
            role: CodecRole::Server,
            max_message_size,
        }
    }

    pub fn client(max_message_size: usize) -> Self {
        Self {
            role: CodecRole::Client,
            max_message_size,
        }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Applies the limit agreed in the HEL/ACK exchange.
    pub fn set_max_message_size(
        &mut self,
        max_message_size: usize,
    ) {
        self.max_message_size = max_message_size;
    }

    fn decode_body(
        &self,
        message_type: &[u8; 3],
        body: &[u8],
    ) -> Result<Frame, Error> {
        let frame = match (message_type, self.role) {
            (HEL, _) => Frame::Hello(deserialize(body)?),
            (ACK, _) => Frame::Acknowledge(deserialize(body)?),
            (ERR, _) => Frame::Error(deserialize(body)?),
            (CLO, _) => Frame::Close(deserialize(body)?),
            (OPN, CodecRole::Server) => Frame::OpenRequest(deserialize(body)?),
            (OPN, CodecRole::Client) => Frame::OpenResponse(deserialize(body)?),
            (MSG, CodecRole::Server) => Frame::Request(deserialize(body)?),
            (MSG, CodecRole::Client) => Frame::Response(deserialize(body)?),
            _ => {
                return Err(NetworkError::InvalidMessageType(
                    String::from_utf8_lossy(message_type).into_owned(),
                )
                .into())
            }
        };
        Ok(frame)
    }
}

fn is_known_type(message_type: &[u8; 3]) -> bool {
    [HEL, ACK, ERR, OPN, CLO, MSG].contains(&message_type)
}

fn deserialize<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    bincode::deserialize(body).map_err(|e| SerializationError::Bincode(e).into())
}

fn serialize<T: Serialize>(body: &T) -> Result<Vec<u8>, Error> {
    bincode::serialize(body).map_err(|e| SerializationError::Bincode(e).into())
}

impl Decoder for UaCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let message_type = [src[0], src[1], src[2]];
        if !is_known_type(&message_type) {
            return Err(NetworkError::InvalidMessageType(String::from_utf8_lossy(&message_type).into_owned()).into());
        }
        if src[3] != FINAL_CHUNK {
            return Err(NetworkError::InvalidChunkType(src[3]).into());
        }

        let len = u32::from_le_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len < HEADER_LEN {
            return Err(NetworkError::FrameTooShort(len).into());
        }
        if len > self.max_message_size {
            return Err(NetworkError::FrameTooLarge {
                size: len,
                max: self.max_message_size,
            }
            .into());
        }

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(len);
        frame.advance(HEADER_LEN);
        self.decode_body(&message_type, &frame).map(Some)
    }
}

impl Encoder<Frame> for UaCodec {
    type Error = Error;

    fn encode(
        &mut self,
        frame: Frame,
        dst: &mut BytesMut,
    ) -> Result<(), Self::Error> {
        let body = match &frame {
            Frame::Hello(m) => serialize(m)?,
            Frame::Acknowledge(m) => serialize(m)?,
            Frame::Error(m) => serialize(m)?,
            Frame::OpenRequest(m) => serialize(m)?,
            Frame::OpenResponse(m) => serialize(m)?,
            Frame::Close(m) => serialize(m)?,
            Frame::Request(m) => serialize(m)?,
            Frame::Response(m) => serialize(m)?,
        };

        let len = HEADER_LEN + body.len();
        if len > self.max_message_size {
            return Err(NetworkError::FrameTooLarge {
                size: len,
                max: self.max_message_size,
            }
            .into());
        }

        dst.reserve(len);
        dst.put_slice(frame.message_type());
        dst.put_u8(FINAL_CHUNK);
        dst.put_u32_le(len as u32);
        dst.put_slice(&body);
        Ok(())
    }
}
