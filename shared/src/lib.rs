//! Wire protocol shared between the game server and client.
//!
//! Every message travels as two length-prefixed fields in a fixed order:
//! body length (8-byte little-endian), body bytes, username length, username
//! bytes. There is no message-kind tag: the server interprets each message
//! purely from its own phase state plus literal body comparisons, so the
//! framing is identical for chat text and game-control payloads.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single field's declared length, in bytes. A peer
/// announcing more than this is speaking a different protocol.
pub const MAX_FIELD_LENGTH: u64 = 2048;

/// Body text a client sends to leave the game.
pub const QUIT_COMMAND: &str = "quit";

/// One chat or game-control message: who sent it and what they said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub username: String,
    pub body: String,
}

impl Message {
    pub fn new(username: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            body: body.into(),
        }
    }
}

/// Writes one message to the stream using the length-prefixed framing.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_field(writer, &message.body).await?;
    write_field(writer, &message.username).await?;
    writer.flush().await
}

/// Reads one message from the stream.
///
/// Fails with `InvalidData` when a declared length exceeds
/// [`MAX_FIELD_LENGTH`] or a field is not valid UTF-8, and with
/// `UnexpectedEof` when the stream ends mid-message.
pub async fn read_message<R>(reader: &mut R) -> io::Result<Message>
where
    R: AsyncRead + Unpin,
{
    let body = read_field(reader).await?;
    let username = read_field(reader).await?;
    Ok(Message { username, body })
}

async fn write_field<W>(writer: &mut W, field: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = field.len() as u64;
    if len > MAX_FIELD_LENGTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("field of {} bytes exceeds the protocol maximum", len),
        ));
    }
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(field.as_bytes()).await
}

async fn read_field<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 8];
    reader.read_exact(&mut len_bytes).await?;

    // Validate the declared length before allocating anything.
    let len = u64::from_le_bytes(len_bytes);
    if len > MAX_FIELD_LENGTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("declared field length {} exceeds the protocol maximum", len),
        ));
    }

    let mut field = vec![0u8; len as usize];
    reader.read_exact(&mut field).await?;
    String::from_utf8(field)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "field is not valid UTF-8"))
}
