//! The HTTP front-end (spec.md §4.H): the DACP/DAAP route table plus the
//! supplemental `/web/...` admin dashboard.
//!
//! Grounded on the teacher's `mpd_client.rs` for how a connection's
//! lifecycle is wired up (`tower-http` tracing layer, graceful startup
//! logging), generalized from "one MPD client per TCP connection" to
//! "one `axum::Router` serving many HTTP clients".

pub mod dmap;
pub mod state;
pub mod web;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/server-info", get(dmap::server_info))
        .route("/login", get(dmap::login))
        .route("/update", get(dmap::update))
        .route("/databases", get(dmap::databases))
        .route("/databases/{id}/containers", get(dmap::containers))
        .route(
            "/databases/{id}/containers/{cid}/items",
            get(dmap::container_items),
        )
        .route(
            "/databases/{id}/containers/{cid}/edit",
            post(dmap::container_edit),
        )
        .route("/databases/{id}/edit", post(dmap::database_edit))
        .route("/databases/{id}/groups", get(dmap::groups))
        .route(
            "/databases/{id}/groups/{gid}/extra_data/artwork",
            get(dmap::group_artwork),
        )
        .route("/databases/{id}/browse/artists", get(dmap::browse_artists))
        .route("/ctrl-int", get(dmap::ctrl_int))
        .route("/ctrl-int/1/cue", post(dmap::cue))
        .route("/ctrl-int/1/getspeakers", get(dmap::get_speakers))
        .route("/ctrl-int/1/getproperty", get(dmap::get_property))
        .route("/ctrl-int/1/setproperty", post(dmap::set_property))
        .route(
            "/ctrl-int/1/playstatusupdate",
            get(dmap::play_status_update),
        )
        .route(
            "/ctrl-int/1/nowplayingartwork",
            get(dmap::now_playing_artwork),
        )
        .route("/ctrl-int/1/playspec", post(dmap::play_spec))
        .route("/ctrl-int/1/playpause", post(dmap::play_pause))
        .route("/ctrl-int/1/pause", post(dmap::pause))
        .route("/ctrl-int/1/nextitem", post(dmap::next_item))
        .route("/ctrl-int/1/previtem", post(dmap::prev_item))
        .route("/web/", get(web::dashboard))
        .route("/web/status.json", get(web::status_json))
        .route("/web/pair", get(web::pair_form).post(web::pair_submit))
        .route("/web/remotes", get(web::remotes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
