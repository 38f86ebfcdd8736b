// Message framing for the stdio transport.
//
// Two framings are accepted, detected per message from its first line:
// - header framing: `Content-Length: N\r\n\r\n{json}` (LSP style)
// - newline framing: one JSON document per line
// A response is always written with the framing of the request it answers.

use log::{debug, error, warn};
use nidhogg_core::Response;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const CONTENT_LENGTH: &str = "content-length:";
const CONTENT_TYPE: &str = "content-type:";

/// Largest header-framed body accepted.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    ContentLength,
    Newline,
}

/// One JSON-RPC payload read from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub body: String,
    pub framing: Framing,
}

#[derive(Debug, Error)]
pub enum ReadMessageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid Content-Length value: '{0}'")]
    InvalidContentLength(String),
    #[error("Header block without Content-Length")]
    MissingContentLength,
    #[error("Content-Length {0} exceeds the {max} byte limit", max = MAX_MESSAGE_BYTES)]
    MessageTooLarge(usize),
}

impl ReadMessageError {
    /// A bad header block. The stream is positioned at the next frame, so the
    /// session can answer with a parse error and keep reading.
    pub fn is_malformed_frame(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

fn is_header_line(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.starts_with(CONTENT_LENGTH) || lower.starts_with(CONTENT_TYPE)
}

fn parse_content_length(line: &str) -> Result<Option<usize>, ReadMessageError> {
    if !line.to_ascii_lowercase().starts_with(CONTENT_LENGTH) {
        return Ok(None);
    }
    let value = line[CONTENT_LENGTH.len()..].trim();
    value
        .parse::<usize>()
        .map(Some)
        .map_err(|_| ReadMessageError::InvalidContentLength(value.to_string()))
}

// Invalid UTF-8 is replaced rather than rejected; the JSON parse reports it.
async fn read_line_lossy<R>(reader: &mut R, buffer: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buffer.clear();
    if reader.read_until(b'\n', buffer).await? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(buffer).into_owned()))
}

/// Read the next message. `Ok(None)` means the peer closed the stream.
///
/// Errors for which [`ReadMessageError::is_malformed_frame`] holds leave the
/// reader at the start of the next frame.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<IncomingMessage>, ReadMessageError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buffer = Vec::new();

    // Skip blank lines between messages.
    let first = loop {
        let Some(line) = read_line_lossy(reader, &mut buffer).await? else {
            debug!("EOF while waiting for the next message");
            return Ok(None);
        };
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            break trimmed.to_string();
        }
    };

    if !is_header_line(&first) {
        return Ok(Some(IncomingMessage {
            body: first,
            framing: Framing::Newline,
        }));
    }

    // Consume the whole header block even when a header is bad.
    let mut header_error = None;
    let mut content_length = None;
    let mut header = first;
    loop {
        match parse_content_length(&header) {
            Ok(Some(len)) => content_length = Some(len),
            Ok(None) => {}
            Err(e) => {
                warn!("{}", e);
                header_error.get_or_insert(e);
            }
        }

        let Some(line) = read_line_lossy(reader, &mut buffer).await? else {
            return Err(ReadMessageError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "EOF reading headers",
            )));
        };
        header = line.trim().to_string();
        if header.is_empty() {
            break;
        }
    }

    if let Some(e) = header_error {
        return Err(e);
    }
    let length = content_length.ok_or(ReadMessageError::MissingContentLength)?;

    if length > MAX_MESSAGE_BYTES {
        warn!("Discarding oversized message body of {} bytes", length);
        let mut body = (&mut *reader).take(length as u64);
        tokio::io::copy(&mut body, &mut tokio::io::sink()).await?;
        return Err(ReadMessageError::MessageTooLarge(length));
    }

    debug!("Reading {} bytes of content", length);
    let mut body = Vec::with_capacity(length);
    (&mut *reader).take(length as u64).read_to_end(&mut body).await?;
    if body.len() < length {
        return Err(ReadMessageError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("EOF after {} of {} content bytes", body.len(), length),
        )));
    }

    Ok(Some(IncomingMessage {
        body: String::from_utf8_lossy(&body).into_owned(),
        framing: Framing::ContentLength,
    }))
}

/// Write one payload with the given framing and flush.
pub async fn write_message<W>(writer: &mut W, body: &str, framing: Framing) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match framing {
        Framing::ContentLength => {
            let header = format!("Content-Length: {}\r\n\r\n", body.len());
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(body.as_bytes()).await?;
        }
        Framing::Newline => {
            writer.write_all(body.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
    }
    writer.flush().await
}

/// Serialize and send a JSON-RPC response.
pub async fn send_response<W>(
    response: &Response,
    writer: &mut W,
    framing: Framing,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json_str = serde_json::to_string(response).map_err(|e| {
        error!("Failed to serialize response: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, format!("Serialization error: {}", e))
    })?;
    debug!("Sending response: {}", json_str);
    write_message(writer, &json_str, framing).await
}
