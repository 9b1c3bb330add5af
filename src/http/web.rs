//! The supplemental admin dashboard (SPEC_FULL.md §6): a JSON status
//! endpoint, an HTML status page, and the pairing form. Grounded on
//! `original_source/euphony/handlers/web.py`'s `StatusDashboardHandler`,
//! `CurrentStatusJsonHandler` and `PairingHandler`, rendered with
//! `askama` the way the pack's web-serving examples template HTML
//! instead of hand-concatenating strings.

use askama::Template;
use axum::Form;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;

use crate::http::state::AppState;
use crate::mpd::{PlayerState, RepeatState, ShuffleState};

#[derive(Serialize)]
struct StatusPayload {
    server_name: String,
    revision: u64,
    state: &'static str,
    repeat: &'static str,
    shuffle: &'static str,
    volume: u8,
    now_playing: Option<String>,
    library_items: usize,
    paired_remotes: usize,
}

fn build_payload(state: &AppState) -> StatusPayload {
    let snapshot = state.mpd.snapshot();
    let status = &snapshot.status;
    let now_playing = status
        .now_playing
        .as_ref()
        .and_then(|np| snapshot.items.find_by_id(np.item_id as u64))
        .map(|(_, item)| format!("{} - {}", item.artist, item.name));

    StatusPayload {
        server_name: state.server_name.clone(),
        revision: state.mpd.revision(),
        state: match status.state {
            PlayerState::Play => "playing",
            PlayerState::Pause => "paused",
            PlayerState::Stop => "stopped",
        },
        repeat: match status.repeat {
            RepeatState::Off => "off",
            RepeatState::Single => "single",
            RepeatState::All => "all",
        },
        shuffle: match status.shuffle {
            ShuffleState::On => "on",
            ShuffleState::Off => "off",
        },
        volume: status.volume,
        now_playing,
        library_items: snapshot.items.len(),
        paired_remotes: state.remotes.remotes().len(),
    }
}

pub async fn status_json(State(state): State<AppState>) -> Response {
    axum::Json(build_payload(&state)).into_response()
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    payload: StatusPayload,
}

pub async fn dashboard(State(state): State<AppState>) -> Response {
    let template = DashboardTemplate { payload: build_payload(&state) };
    match template.render() {
        Ok(body) => Html(body).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[derive(Template)]
#[template(path = "pair.html")]
struct PairFormTemplate {
    remotes: Vec<(String, String)>,
}

pub async fn pair_form(State(state): State<AppState>) -> Response {
    let remotes = state.remotes.remotes().into_iter().collect();
    let template = PairFormTemplate { remotes };
    match template.render() {
        Ok(body) => Html(body).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[derive(serde::Deserialize)]
pub struct PairSubmission {
    remote: String,
    passcode: String,
}

/// Completes the handshake for a remote the operator picked from the
/// pairing form, then records the resulting guid so future `/login`
/// calls from it succeed.
pub async fn pair_submit(
    State(state): State<AppState>,
    Form(form): Form<PairSubmission>,
) -> Result<Html<&'static str>, (StatusCode, String)> {
    let remote = state
        .remotes
        .get(&form.remote)
        .ok_or((StatusCode::NOT_FOUND, format!("no remote known by id {}", form.remote)))?;

    let guid = state
        .remotes
        .pair(&remote, &form.passcode, &state.server_id)
        .await
        .map_err(|err| (StatusCode::FORBIDDEN, err.to_string()))?;

    state
        .pairing
        .add(guid)
        .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    Ok(Html("paired"))
}

pub async fn remotes(State(state): State<AppState>) -> Response {
    axum::Json(state.remotes.remotes()).into_response()
}
