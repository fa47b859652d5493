use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::constants::{
    HANDSHAKE_LEN, HANDSHAKE_TIMEOUT, MAX_MESSAGE_SIZE, RECEIVE_MSG_TIMEOUT, SEND_MSG_TIMEOUT,
};

use super::error::PeerError;
use super::message::{Handshake, Message};

/// Framed I/O over a peer's TCP stream.
///
/// Every read and write races a deadline; an expired deadline surfaces as
/// [`PeerError::Timeout`] and the caller must drop the stream, because a
/// cancelled half-read leaves the wire position undefined.
pub struct PeerTransport {
    stream: TcpStream,
    read_buf: BytesMut,
}

impl PeerTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(32 * 1024),
        }
    }

    pub async fn send_handshake(&mut self, handshake: &Handshake) -> Result<(), PeerError> {
        let data = handshake.encode();
        timeout(HANDSHAKE_TIMEOUT, self.stream.write_all(&data))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Ok(())
    }

    pub async fn receive_handshake(&mut self) -> Result<Handshake, PeerError> {
        while self.read_buf.len() < HANDSHAKE_LEN {
            let n = timeout(HANDSHAKE_TIMEOUT, self.stream.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| PeerError::Timeout)??;

            if n == 0 {
                return Err(PeerError::ConnectionClosed);
            }
        }

        let data = self.read_buf.split_to(HANDSHAKE_LEN);
        Handshake::decode(&data)
    }

    /// Splits the transport into the receiver's read half and the
    /// sender's write half, carrying over anything already buffered.
    pub fn split(self) -> (MessageReader, MessageWriter) {
        let (read_half, write_half) = self.stream.into_split();
        (
            MessageReader {
                half: read_half,
                read_buf: self.read_buf,
            },
            MessageWriter { half: write_half },
        )
    }
}

/// The receiving side of a split peer stream.
pub struct MessageReader {
    half: OwnedReadHalf,
    read_buf: BytesMut,
}

impl MessageReader {
    /// Reads one length-prefixed message.
    pub async fn receive_message(&mut self) -> Result<Message, PeerError> {
        while self.read_buf.len() < 4 {
            self.fill().await?;
        }

        let length = u32::from_be_bytes([
            self.read_buf[0],
            self.read_buf[1],
            self.read_buf[2],
            self.read_buf[3],
        ]) as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err(PeerError::InvalidMessage(format!(
                "message too large: {}",
                length
            )));
        }

        let total_len = 4 + length;
        while self.read_buf.len() < total_len {
            self.fill().await?;
        }

        let data = self.read_buf.split_to(total_len);
        Message::decode(data.freeze())
    }

    async fn fill(&mut self) -> Result<(), PeerError> {
        let n = timeout(RECEIVE_MSG_TIMEOUT, self.half.read_buf(&mut self.read_buf))
            .await
            .map_err(|_| PeerError::Timeout)??;

        if n == 0 {
            return Err(PeerError::ConnectionClosed);
        }

        Ok(())
    }
}

/// The sending side of a split peer stream.
pub struct MessageWriter {
    half: OwnedWriteHalf,
}

impl MessageWriter {
    pub async fn send_message(&mut self, message: &Message) -> Result<(), PeerError> {
        let data = message.encode();
        self.send_raw(&data).await
    }

    /// Writes an already-encoded batch of messages.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<(), PeerError> {
        timeout(SEND_MSG_TIMEOUT, self.half.write_all(data))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Ok(())
    }
}
