use std::sync::Arc;

use crate::artwork::ArtworkCache;
use crate::mpd::MpdAdapter;
use crate::pairing::{PairingStore, TouchRemoteListener};

#[derive(Clone)]
pub struct AppState {
    pub mpd: Arc<MpdAdapter>,
    pub remotes: Arc<TouchRemoteListener>,
    pub pairing: Arc<PairingStore>,
    pub artwork: Arc<ArtworkCache>,
    pub server_name: String,
    pub server_id: String,
}
