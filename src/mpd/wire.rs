//! The thin slice of the MPD line protocol this adapter needs: connect,
//! greet, send a single command line, and read back `key: value` pairs
//! terminated by `OK` or `ACK <message>`.
//!
//! Grounded on the teacher's own MPD line-protocol handling in
//! `mpd_client.rs` (`BufReader::lines()` plus an `OK`/`ACK` terminator
//! check), adapted from the server side to the client side.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Debug, thiserror::Error)]
pub enum MpdWireError {
    #[error("connection to mpd failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("mpd greeting was not well-formed: {0:?}")]
    BadGreeting(String),
    #[error("mpd rejected the command: {0}")]
    Ack(String),
    #[error("connection closed mid-response")]
    UnexpectedEof,
}

pub struct Connection {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Connection {
    pub async fn connect(addr: &str) -> Result<Connection, MpdWireError> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut greeting = String::new();
        reader.read_line(&mut greeting).await?;
        if !greeting.starts_with("OK MPD ") {
            return Err(MpdWireError::BadGreeting(greeting));
        }
        Ok(Connection { reader, writer })
    }

    pub async fn command(&mut self, line: &str) -> Result<Vec<(String, String)>, MpdWireError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.read_response().await
    }

    /// Read lines until `OK` (success) or `ACK ...` (failure), collecting
    /// `key: value` pairs along the way. Used both for ordinary commands
    /// and, from the idle workers, to read the subsystem names an `idle`
    /// command's response line contains.
    pub async fn read_response(&mut self) -> Result<Vec<(String, String)>, MpdWireError> {
        let mut pairs = Vec::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(MpdWireError::UnexpectedEof);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line == "OK" {
                return Ok(pairs);
            }
            if let Some(message) = line.strip_prefix("ACK ") {
                return Err(MpdWireError::Ack(message.to_string()));
            }
            if let Some((key, value)) = line.split_once(": ") {
                pairs.push((key.to_string(), value.to_string()));
            }
        }
    }
}
