//! The Apple pairing handshake (spec.md §4.F): derive the 128-bit
//! pairing code from a four-digit passcode and the remote's pairing
//! identifier, then complete the handshake over HTTP.
//!
//! `pairing.py`'s `generate_code` implements its own MD5-family round
//! schedule by hand, but its input is always exactly one 64-byte block:
//! the 16 ASCII bytes of the pairing id, the 8 bytes of the passcode
//! UTF-16LE-encoded, then standard MD5 padding (`0x80`, zero fill, and
//! the 64-bit little-endian bit-length). That is simply MD5 of the
//! 24-byte message `pair_id || passcode_utf16le` -- so this crate calls
//! the `md5` crate directly instead of transcribing ~150 lines of
//! bitwise round constants.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExt, params};

use crate::codec::{self, Value};
use crate::tags::Tag;

/// Persisted pairing records: `{ guid }`. Presence of a guid for a given
/// value authorizes future `/login` calls from that remote (spec.md §3).
pub struct PairingStore {
    db: Mutex<Connection>,
}

impl PairingStore {
    pub fn open(db: Connection) -> Result<PairingStore, rusqlite::Error> {
        db.execute_batch("CREATE TABLE IF NOT EXISTS pairing (guid TEXT PRIMARY KEY)")?;
        Ok(PairingStore { db: Mutex::new(db) })
    }

    pub fn add(&self, guid: u64) -> Result<(), rusqlite::Error> {
        let guid_hex = format!("{guid:016X}");
        self.db
            .lock()
            .unwrap()
            .execute("INSERT OR IGNORE INTO pairing (guid) VALUES (?1)", params![guid_hex])?;
        Ok(())
    }

    pub fn contains(&self, guid_hex: &str) -> Result<bool, rusqlite::Error> {
        let found: Option<String> = self
            .db
            .lock()
            .unwrap()
            .query_row("SELECT guid FROM pairing WHERE guid = ?1", params![guid_hex.to_uppercase()], |r| r.get(0))
            .optional()?;
        Ok(found.is_some())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("no remote known by id {0}")]
    UnknownRemote(String),
    #[error("http exchange with remote failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote's pairing response did not contain a guid")]
    MissingGuid,
}

/// Derive the pairing code MD5 over `pair_id || passcode_utf16le` the
/// same way `pairing.py`'s `generate_code` does, returned as uppercase
/// hex. `pair_id` is the remote's 16-character hex pairing identifier;
/// `passcode` is the four-digit code the user typed.
pub fn generate_code(passcode: &str, pair_id: &str) -> String {
    let mut message = Vec::with_capacity(24);
    message.extend_from_slice(pair_id.as_bytes());
    for c in passcode.chars() {
        message.extend_from_slice(&(c as u16).to_le_bytes());
    }
    let digest = md5::compute(&message);
    hex::encode_upper(digest.0)
}

/// A remote advertising `_touch-remote._tcp.local.`, discovered via
/// mDNS, that wants to pair with this server.
#[derive(Debug, Clone)]
pub struct RemoteDescriptor {
    pub pair_id: String,
    pub name: String,
    pub addr: SocketAddr,
}

impl std::fmt::Display for RemoteDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.addr)
    }
}

#[derive(Default)]
pub struct TouchRemoteListener {
    remotes: Mutex<HashMap<String, RemoteDescriptor>>,
}

impl TouchRemoteListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, remote: RemoteDescriptor) {
        self.remotes.lock().unwrap().insert(remote.pair_id.clone(), remote);
    }

    pub fn get(&self, pair_id: &str) -> Option<RemoteDescriptor> {
        self.remotes.lock().unwrap().get(pair_id).cloned()
    }

    pub fn remotes(&self) -> HashMap<String, String> {
        self.remotes
            .lock()
            .unwrap()
            .iter()
            .map(|(id, r)| (id.clone(), r.to_string()))
            .collect()
    }

    /// Complete the handshake with `remote`: compute the expected code
    /// from `passcode`, hit the remote's `/pair` endpoint, and pull the
    /// `cmpg` guid out of its DMAP response body.
    pub async fn pair(
        &self,
        remote: &RemoteDescriptor,
        passcode: &str,
        server_id: &str,
    ) -> Result<u64, PairingError> {
        let code = generate_code(passcode, &remote.pair_id);
        let url = format!(
            "http://{}/pair?pairingcode={}&servicename={}",
            remote.addr, code, server_id
        );
        let response = reqwest::get(&url).await?.error_for_status()?;
        let body = response.bytes().await?;
        extract_guid(&body).ok_or(PairingError::MissingGuid)
    }
}

fn extract_guid(body: &[u8]) -> Option<u64> {
    let nodes = codec::decode(body).ok()?;
    find_guid(&nodes)
}

fn find_guid(nodes: &[codec::Node]) -> Option<u64> {
    for node in nodes {
        if node.tag == Tag::new("cmpg") {
            if let Value::ULong(guid) = node.value {
                return Some(guid);
            }
        }
        if let Value::Container(children) = &node.value {
            if let Some(guid) = find_guid(children) {
                return Some(guid);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_answer() {
        assert_eq!(
            generate_code("3861", "D06F5B3577C7A001"),
            "0BD8D9D49E66BB17F8BD0367A4E42058"
        );
    }

    #[test]
    fn code_is_always_32_uppercase_hex_digits() {
        let code = generate_code("1234", "0000000000000001");
        assert_eq!(code.len(), 32);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn different_passcodes_produce_different_codes() {
        let a = generate_code("1234", "0000000000000001");
        let b = generate_code("4321", "0000000000000001");
        assert_ne!(a, b);
    }
}
