//! Framing disciplines for the two transports.
//!
//! Stream messages are self-delimiting by structure, so there is no
//! outer length prefix: [`MessageStream`] accumulates socket bytes and
//! re-attempts a strict decode until a whole value is present, treating
//! [`WireError::UnexpectedEof`] as "keep reading" and every other decode
//! failure as fatal for the session. Writes serialise a whole message
//! first and push it with a single `write_all` + `flush`, so one logical
//! message is one send.
//!
//! Datagram framing is one message per packet and lives with the codec
//! itself: [`crate::wire::decode_exact`] enforces the no-trailing-bytes
//! rule, and callers size their receive buffer with
//! [`UDP_DATAGRAM_SIZE`].

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::wire::{encode_to_vec, Decode, Encode, Reader, WireError};

/// Largest payload a UDP datagram can carry over IPv4.
pub const UDP_DATAGRAM_SIZE: usize = 65_507;

/// Sanity cap on a single buffered stream message; a well-formed peer
/// never comes close, so exceeding it means garbage on the wire.
const MAX_MESSAGE_SIZE: usize = 1_000_000;

const READ_CHUNK: usize = 4096;

/// Errors raised by the stream transport.
#[derive(Debug)]
pub enum TransportError {
    /// Socket-level failure.
    Io(std::io::Error),
    /// The peer sent bytes that do not decode as the expected message.
    Wire(WireError),
    /// The peer closed the connection (possibly mid-message).
    Closed,
    /// A buffered message grew past [`MAX_MESSAGE_SIZE`] without
    /// completing.
    MessageTooLarge(usize),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "socket error: {e}"),
            Self::Wire(e) => write!(f, "malformed message: {e}"),
            Self::Closed => write!(f, "connection closed by peer"),
            Self::MessageTooLarge(n) => {
                write!(f, "message exceeded {MAX_MESSAGE_SIZE} bytes ({n} buffered)")
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Wire(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<WireError> for TransportError {
    fn from(err: WireError) -> Self {
        Self::Wire(err)
    }
}

/// Reads self-delimiting protocol messages off a reliable byte stream.
pub struct MessageStream<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MessageStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Blocks until one complete message has arrived and decodes it.
    ///
    /// Bytes beyond the first message stay buffered for the next call.
    pub async fn recv<T: Decode>(&mut self) -> Result<T, TransportError> {
        loop {
            let mut r = Reader::new(&self.buf);
            match T::decode(&mut r) {
                Ok(value) => {
                    let consumed = r.consumed();
                    self.buf.drain(..consumed);
                    return Ok(value);
                }
                Err(WireError::UnexpectedEof { .. }) => {}
                Err(err) => return Err(err.into()),
            }

            if self.buf.len() > MAX_MESSAGE_SIZE {
                return Err(TransportError::MessageTooLarge(self.buf.len()));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Serialises `msg` and pushes it to the stream as one atomic send.
pub async fn send_message<T, W>(writer: &mut W, msg: &T) -> Result<(), TransportError>
where
    T: Encode,
    W: AsyncWrite + Unpin,
{
    let bytes = encode_to_vec(msg)?;
    send_bytes(writer, &bytes).await
}

/// Pushes pre-serialised message bytes to the stream. Used for the
/// turn-history replay, which is stored already encoded.
pub async fn send_bytes<W>(writer: &mut W, bytes: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ClientMessage, ServerMessage};
    use crate::types::Direction;

    #[tokio::test]
    async fn recv_reassembles_split_messages() {
        let (client, server) = tokio::io::duplex(64);
        let mut stream = MessageStream::new(server);

        let msg = ClientMessage::Join {
            name: "splitter".to_string(),
        };
        let bytes = encode_to_vec(&msg).unwrap();

        let writer = tokio::spawn(async move {
            let mut client = client;
            // One byte at a time to force reassembly.
            for b in bytes {
                client.write_all(&[b]).await.unwrap();
                client.flush().await.unwrap();
            }
            client
        });

        let got: ClientMessage = stream.recv().await.unwrap();
        assert_eq!(got, msg);
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn recv_splits_coalesced_messages() {
        let (mut client, server) = tokio::io::duplex(256);
        let mut stream = MessageStream::new(server);

        let first = ClientMessage::Move {
            direction: Direction::Down,
        };
        let second = ClientMessage::PlaceBomb;
        let mut bytes = encode_to_vec(&first).unwrap();
        bytes.extend(encode_to_vec(&second).unwrap());
        client.write_all(&bytes).await.unwrap();

        let got_first: ClientMessage = stream.recv().await.unwrap();
        let got_second: ClientMessage = stream.recv().await.unwrap();
        assert_eq!(got_first, first);
        assert_eq!(got_second, second);
    }

    #[tokio::test]
    async fn recv_fails_on_unknown_tag() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = MessageStream::new(server);

        client.write_all(&[0x99]).await.unwrap();

        let err = stream.recv::<ClientMessage>().await.unwrap_err();
        assert!(matches!(err, TransportError::Wire(_)));
    }

    #[tokio::test]
    async fn recv_reports_close_mid_message() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut stream = MessageStream::new(server);

        // A Join tag plus a length promising more bytes than ever arrive.
        client.write_all(&[0x00, 0x05, b'a']).await.unwrap();
        drop(client);

        let err = stream.recv::<ClientMessage>().await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn send_message_roundtrips_through_stream() {
        let (mut client, server) = tokio::io::duplex(256);
        let mut stream = MessageStream::new(server);

        let msg = ServerMessage::Hello {
            server_name: "loop".to_string(),
            players_count: 1,
            size_x: 8,
            size_y: 8,
            game_length: 10,
            explosion_radius: 2,
            bomb_timer: 4,
        };
        send_message(&mut client, &msg).await.unwrap();

        let got: ServerMessage = stream.recv().await.unwrap();
        assert_eq!(got, msg);
    }
}
