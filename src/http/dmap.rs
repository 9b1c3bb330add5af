//! DACP/DAAP route handlers: every one of them builds a [`Node`] tree
//! with [`build_tree`] and hands the encoded bytes back as
//! `application/x-dmap-tagged`, mirroring how `dacp/handlers.py` built
//! its responses node by node.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::codec::{self, NodeSpec, Value};
use crate::error::{EuphonyError, Result};
use crate::http::state::AppState;
use crate::mpd::{PlayerState, RepeatState, ShuffleState};
use crate::query;
use crate::sort::build_sort_headers;
use crate::tags::Tag;

/// A DMAP node tree, already encoded, with the media type every route
/// responds with.
pub struct Dmap(pub Vec<u8>);

impl IntoResponse for Dmap {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "application/x-dmap-tagged")], self.0).into_response()
    }
}

fn respond(spec: Vec<(Tag, NodeSpec)>) -> Result<Dmap> {
    let nodes = codec::build_tree(spec)?;
    Ok(Dmap(codec::encode(&nodes)))
}

fn t(s: &str) -> Tag {
    Tag::new(s)
}

fn list_items<F>(items: impl IntoIterator<Item = Vec<(Tag, NodeSpec)>>, count: F) -> Vec<(Tag, NodeSpec)>
where
    F: Fn() -> u32,
{
    let children: Vec<(Tag, NodeSpec)> = items
        .into_iter()
        .map(|fields| (t("mlit"), NodeSpec::List(fields)))
        .collect();
    let n = count();
    vec![
        (t("mstt"), Value::UInt(200).into()),
        (t("muty"), Value::UByte(0).into()),
        (t("mtco"), Value::UInt(n).into()),
        (t("mrco"), Value::UInt(children.len() as u32).into()),
        (t("mlcl"), NodeSpec::List(children)),
    ]
}

pub async fn server_info(State(state): State<AppState>) -> Result<Dmap> {
    respond(vec![(
        t("msrv"),
        NodeSpec::List(vec![
            (t("mstt"), Value::UInt(200).into()),
            (t("mpro"), Value::Version(3, 10, 0, 0).into()),
            (t("apro"), Value::Version(3, 10, 0, 0).into()),
            (t("aeSV"), Value::Version(3, 10, 0, 0).into()),
            (t("minm"), Value::String(state.server_name.clone()).into()),
            (t("mslr"), Value::UByte(0).into()),
            (t("msal"), Value::UByte(0).into()),
            (t("mstm"), Value::UInt(1800).into()),
            (t("msup"), Value::UByte(1).into()),
            (t("mspi"), Value::UByte(1).into()),
            (t("msex"), Value::UByte(1).into()),
            (t("msbr"), Value::UByte(1).into()),
            (t("msqy"), Value::UByte(1).into()),
            (t("msix"), Value::UByte(1).into()),
            (t("msrs"), Value::UByte(1).into()),
            (t("msdc"), Value::UByte(1).into()),
            (t("ated"), Value::UByte(0).into()),
        ]),
    )])
}

#[derive(serde::Deserialize)]
pub struct LoginQuery {
    #[serde(rename = "pairing-guid")]
    pairing_guid: Option<String>,
}

/// `GET /login?pairing-guid=<hex>`. A guid the pairing store has never
/// seen is a 503, matching the original's treatment of an unrecognized
/// remote as an upstream-unavailable condition rather than a plain 403.
pub async fn login(State(state): State<AppState>, Query(q): Query<LoginQuery>) -> Result<Dmap> {
    let guid = q.pairing_guid.unwrap_or_default();
    let guid = guid.trim_start_matches("0x").trim_start_matches("0X");
    if !state.pairing.contains(guid)? {
        return Err(EuphonyError::LoginFailed(guid.to_string()));
    }
    let session_id: u32 = rand::random();
    respond(vec![(
        t("mlog"),
        NodeSpec::List(vec![
            (t("mstt"), Value::UInt(200).into()),
            (t("mlid"), Value::UInt(session_id).into()),
        ]),
    )])
}

#[derive(serde::Deserialize)]
pub struct UpdateQuery {
    #[serde(rename = "revision-number")]
    revision_number: Option<u64>,
}

/// `GET /update?revision-number=`. Long-polls until the model has moved
/// to exactly `revision_number`, per spec.md §4.E/§8 scenario 7.
pub async fn update(State(state): State<AppState>, Query(q): Query<UpdateQuery>) -> Result<Dmap> {
    let target = q.revision_number.unwrap_or(1);
    let revision = state.mpd.wait_for_revision(target).await;
    respond(vec![(
        t("mupd"),
        NodeSpec::List(vec![
            (t("mstt"), Value::UInt(200).into()),
            (t("musr"), Value::UInt(revision as u32).into()),
        ]),
    )])
}

pub async fn databases(State(state): State<AppState>) -> Result<Dmap> {
    let snapshot = state.mpd.snapshot();
    let entry = vec![
        (t("miid"), Value::UInt(1).into()),
        (t("mper"), Value::ULong(1).into()),
        (t("minm"), Value::String(state.server_name.clone()).into()),
        (t("mimc"), Value::UInt(snapshot.items.len() as u32).into()),
        (t("mctc"), Value::UInt(snapshot.containers.len() as u32).into()),
    ];
    respond(vec![(
        t("avdb"),
        NodeSpec::List(list_items([entry], || 1)),
    )])
}

pub async fn containers(State(state): State<AppState>, Path(_id): Path<u32>) -> Result<Dmap> {
    let snapshot = state.mpd.snapshot();
    let rows: Vec<_> = snapshot
        .containers
        .iter()
        .map(|c| {
            vec![
                (t("miid"), Value::UInt(c.id).into()),
                (t("mper"), Value::ULong(c.id as u64).into()),
                (t("minm"), Value::String(c.name.clone()).into()),
                (t("mimc"), Value::UInt(c.item_count as u32).into()),
                (t("abpl"), Value::UByte(c.is_base as u8).into()),
            ]
        })
        .collect();
    let total = snapshot.containers.len() as u32;
    respond(vec![(t("aply"), NodeSpec::List(list_items(rows, || total)))])
}

#[derive(serde::Deserialize)]
pub struct ItemsQuery {
    query: Option<String>,
    meta: Option<String>,
}

pub async fn container_items(
    State(state): State<AppState>,
    Path((_id, cid)): Path<(u32, u32)>,
    Query(q): Query<ItemsQuery>,
) -> Result<Dmap> {
    let snapshot = state.mpd.snapshot();
    let (_, container) = snapshot
        .containers
        .find_by_id(cid as u64)
        .ok_or(EuphonyError::NotFound { kind: "container", id: cid as u64 })?;

    let meta: Vec<&str> = q
        .meta
        .as_deref()
        .map(|m| m.split(',').collect())
        .unwrap_or_else(|| vec!["dmap.itemid", "dmap.itemname"]);

    let mut positions: Vec<usize> = container
        .item_ids
        .iter()
        .filter_map(|id| snapshot.items.find_by_id(*id as u64).map(|(pos, _)| pos))
        .collect();

    if let Some(raw) = q.query.as_deref() {
        let ast = query::parse(raw)?;
        let matched = query::evaluate(&ast, &snapshot.items);
        positions.retain(|pos| matched.contains(pos));
    }

    let rows: Vec<_> = positions
        .iter()
        .map(|&pos| {
            let item = snapshot.items.get(pos).expect("position came from this collection");
            meta.iter()
                .filter_map(|name| {
                    let (tag, _) = crate::tags::lookup_property(name)?;
                    let value = item.get_property(name)?;
                    Some((tag, property_value_to_node(value)))
                })
                .collect::<Vec<_>>()
        })
        .collect();
    let total = container.item_ids.len() as u32;
    respond(vec![(t("apso"), NodeSpec::List(list_items(rows, || total)))])
}

fn property_value_to_node(value: crate::model::PropertyValue) -> NodeSpec {
    use crate::model::PropertyValue::*;
    match value {
        Str(s) => Value::String(s).into(),
        Int(n) => Value::Int(n as i32).into(),
        Bool(b) => Value::UByte(b as u8).into(),
    }
}

#[derive(serde::Deserialize)]
pub struct EditQuery {
    action: Option<String>,
    #[serde(rename = "edit-params")]
    edit_params: Option<String>,
}

/// `POST /databases/{id}/containers/{cid}/edit`. Only `add`/`remove`
/// against the current queue are meaningful without a real playlist
/// editor, so this maps straight onto the matching MPD commands.
pub async fn container_edit(
    State(state): State<AppState>,
    Path((_id, _cid)): Path<(u32, u32)>,
    Query(q): Query<EditQuery>,
) -> Result<StatusCode> {
    match q.action.as_deref() {
        Some("add") => {
            if let Some(uri) = q.edit_params {
                state.mpd.add_to_current(&uri).await.map_err(mpd_err)?;
            }
        }
        Some("remove") => {
            state.mpd.clear_current().await.map_err(mpd_err)?;
        }
        _ => {}
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn database_edit(
    State(state): State<AppState>,
    Path(_id): Path<u32>,
    Query(q): Query<EditQuery>,
) -> Result<StatusCode> {
    if q.action.as_deref() == Some("create-playlist") {
        if let Some(name) = q.edit_params {
            state.mpd.create_playlist(&name).await.map_err(mpd_err)?;
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn groups(State(state): State<AppState>, Path(_id): Path<u32>) -> Result<Dmap> {
    let snapshot = state.mpd.snapshot();
    let names: Vec<String> = snapshot.albums.iter().map(|a| a.name.clone()).collect();
    let headers = build_sort_headers(&names);

    let rows: Vec<_> = snapshot
        .albums
        .iter()
        .map(|album| {
            vec![
                (t("miid"), Value::UInt(album.id).into()),
                (t("mper"), Value::ULong(album.id as u64).into()),
                (t("minm"), Value::String(album.name.clone()).into()),
                (t("asar"), Value::String(album.artist_name.clone()).into()),
            ]
        })
        .collect();

    let header_nodes: Vec<(Tag, NodeSpec)> = headers
        .into_iter()
        .map(|(ch, index, count)| {
            (
                t("mlit"),
                NodeSpec::List(vec![
                    (t("mshc"), Value::UByte(ch as u8).into()),
                    (t("mshi"), Value::UInt(index as u32).into()),
                    (t("mshn"), Value::UInt(count as u32).into()),
                ]),
            )
        })
        .collect();

    let total = snapshot.albums.len() as u32;
    let mut spec = list_items(rows, || total);
    spec.push((t("mshl"), NodeSpec::List(header_nodes)));
    respond(vec![(t("agal"), NodeSpec::List(spec))])
}

#[derive(serde::Deserialize)]
pub struct ArtworkQuery {
    mw: Option<u32>,
    mh: Option<u32>,
}

pub async fn group_artwork(
    State(state): State<AppState>,
    Path((_id, gid)): Path<(u32, u32)>,
    Query(q): Query<ArtworkQuery>,
) -> Result<Response> {
    let snapshot = state.mpd.snapshot();
    let (_, album) = snapshot
        .albums
        .find_by_id(gid as u64)
        .ok_or(EuphonyError::NotFound { kind: "group", id: gid as u64 })?;
    let (artist, name) = (album.artist_name.clone(), album.name.clone());
    drop(snapshot);

    let width = q.mw.unwrap_or(300);
    let height = q.mh.unwrap_or(300);
    match state.artwork.get(&artist, &name, width, height).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response()),
        Err(_) => Err(EuphonyError::NotFound { kind: "group artwork", id: gid as u64 }),
    }
}

pub async fn browse_artists(State(state): State<AppState>, Path(_id): Path<u32>) -> Result<Dmap> {
    let snapshot = state.mpd.snapshot();
    let names: Vec<String> = snapshot.artists.iter().map(|a| a.name.clone()).collect();
    let headers = build_sort_headers(&names);

    let rows: Vec<_> = names.iter().map(|name| vec![(t("mlit"), Value::String(name.clone()).into())]).collect();
    let header_nodes: Vec<(Tag, NodeSpec)> = headers
        .into_iter()
        .map(|(ch, index, count)| {
            (
                t("mlit"),
                NodeSpec::List(vec![
                    (t("mshc"), Value::UByte(ch as u8).into()),
                    (t("mshi"), Value::UInt(index as u32).into()),
                    (t("mshn"), Value::UInt(count as u32).into()),
                ]),
            )
        })
        .collect();

    let total = names.len() as u32;
    let mut spec = list_items(rows, || total);
    spec.push((t("mshl"), NodeSpec::List(header_nodes)));
    respond(vec![(t("abro"), NodeSpec::List(vec![(t("abar"), NodeSpec::List(spec))]))])
}

pub async fn ctrl_int() -> Result<Dmap> {
    respond(vec![(
        t("caci"),
        NodeSpec::List(vec![
            (t("mstt"), Value::UInt(200).into()),
            (t("miid"), Value::UInt(1).into()),
            (t("cmik"), Value::UByte(1).into()),
            (t("cmsp"), Value::UByte(1).into()),
            (t("cmsv"), Value::UByte(1).into()),
            (t("cass"), Value::UByte(1).into()),
            (t("casu"), Value::UByte(1).into()),
            (t("ceSG"), Value::UByte(1).into()),
        ]),
    )])
}

#[derive(serde::Deserialize)]
pub struct CueQuery {
    command: Option<String>,
    #[serde(rename = "query")]
    raw_query: Option<String>,
}

/// `POST /ctrl-int/1/cue`: replace the play queue with the items a DACP
/// query selects and start playback, the way `dmap.py`'s `CueHandler`
/// does.
pub async fn cue(State(state): State<AppState>, Query(q): Query<CueQuery>) -> Result<StatusCode> {
    if q.command.as_deref() != Some("play") {
        return Ok(StatusCode::NO_CONTENT);
    }
    let snapshot = state.mpd.snapshot();
    let positions = match q.raw_query.as_deref() {
        Some(raw) => query::evaluate(&query::parse(raw)?, &snapshot.items),
        None => (0..snapshot.items.len()).collect(),
    };
    let paths: Vec<String> = positions
        .into_iter()
        .filter_map(|pos| snapshot.items.get(pos).map(|item| item.path.clone()))
        .collect();
    drop(snapshot);

    state.mpd.clear_current().await.map_err(mpd_err)?;
    for path in paths {
        state.mpd.add_to_current(&path).await.map_err(mpd_err)?;
    }
    state.mpd.play().await.map_err(mpd_err)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_speakers(State(state): State<AppState>) -> Result<Dmap> {
    let snapshot = state.mpd.snapshot();
    let speaker = vec![
        (t("msma"), Value::ULong(1).into()),
        (t("minm"), Value::String("This computer".to_string()).into()),
        (t("cmvo"), Value::UInt(snapshot.status.volume as u32).into()),
    ];
    respond(vec![(t("casp"), NodeSpec::List(list_items([speaker], || 1)))])
}

#[derive(serde::Deserialize)]
pub struct GetPropertyQuery {
    properties: Option<String>,
}

/// `GET /ctrl-int/1/getproperty?properties=`: answer each requested
/// `dacp.*`/`dmcp.*` property from the current player status.
pub async fn get_property(State(state): State<AppState>, Query(q): Query<GetPropertyQuery>) -> Result<Dmap> {
    let snapshot = state.mpd.snapshot();
    let status = &snapshot.status;
    let requested: Vec<&str> = q.properties.as_deref().map(|p| p.split(',').collect()).unwrap_or_default();

    let mut nodes = vec![(t("mstt"), Value::UInt(200).into())];
    for name in requested {
        let Some((tag, _)) = crate::tags::lookup_property(name) else { continue };
        let value = match name {
            "dmcp.volume" => Value::UInt(status.volume as u32),
            "dacp.playerstate" => Value::UByte(match status.state {
                PlayerState::Play => 1,
                PlayerState::Pause => 2,
                PlayerState::Stop => 0,
            }),
            "dacp.shufflestate" => Value::UByte(matches!(status.shuffle, ShuffleState::On) as u8),
            "dacp.repeatstate" => Value::UByte(match status.repeat {
                RepeatState::Off => 0,
                RepeatState::Single => 1,
                RepeatState::All => 2,
            }),
            "dacp.nowplayingartist" => {
                Value::String(now_playing_field(&snapshot, |i| i.artist.clone()).unwrap_or_default())
            }
            "dacp.nowplayingalbum" => {
                Value::String(now_playing_field(&snapshot, |i| i.album.clone()).unwrap_or_default())
            }
            "dacp.nowplayingtrack" => {
                Value::String(now_playing_field(&snapshot, |i| i.name.clone()).unwrap_or_default())
            }
            _ => continue,
        };
        nodes.push((tag, value.into()));
    }
    respond(vec![(t("cmgt"), NodeSpec::List(nodes))])
}

fn now_playing_field(
    snapshot: &crate::mpd::LibrarySnapshot,
    f: impl Fn(&crate::model::Item) -> String,
) -> Option<String> {
    let now_playing = snapshot.status.now_playing.as_ref()?;
    let (_, item) = snapshot.items.find_by_id(now_playing.item_id as u64)?;
    Some(f(item))
}

/// `POST /ctrl-int/1/setproperty?dacp.playerstate=...`: the route
/// tolerates unknown keys (spec.md §7) by simply skipping them and
/// always returning 204.
pub async fn set_property(State(state): State<AppState>, Query(q): Query<HashMap<String, String>>) -> StatusCode {
    for (key, value) in q {
        match key.as_str() {
            "dmcp.volume" => {
                if let Ok(v) = value.parse::<u8>() {
                    let _ = state.mpd.set_volume(v).await;
                }
            }
            "dacp.shufflestate" => {
                let on = value == "1";
                let _ = state.mpd.set_shuffle(if on { ShuffleState::On } else { ShuffleState::Off }).await;
            }
            "dacp.repeatstate" => {
                let state_value = match value.as_str() {
                    "1" => RepeatState::Single,
                    "2" => RepeatState::All,
                    _ => RepeatState::Off,
                };
                let _ = state.mpd.set_repeat(state_value).await;
            }
            "dacp.playingtime" => {
                if let Ok(ms) = value.parse::<u32>() {
                    let _ = state.mpd.seek_ms(ms).await;
                }
            }
            _ => {} // unrecognized keys are tolerated, not errors
        }
    }
    StatusCode::NO_CONTENT
}

#[derive(serde::Deserialize)]
pub struct PlayStatusQuery {
    #[serde(rename = "revision-number")]
    revision_number: Option<u64>,
}

/// `GET /ctrl-int/1/playstatusupdate?revision-number=`: long-polls the
/// same revision gate as `/update`, then reports full player status.
pub async fn play_status_update(State(state): State<AppState>, Query(q): Query<PlayStatusQuery>) -> Result<Dmap> {
    let target = q.revision_number.unwrap_or(1);
    state.mpd.wait_for_revision(target).await;
    let snapshot = state.mpd.snapshot();
    let status = &snapshot.status;

    let mut nodes = vec![
        (t("mstt"), Value::UInt(200).into()),
        (t("cmsr"), Value::UInt(state.mpd.revision() as u32).into()),
        (
            t("caps"),
            Value::UByte(match status.state {
                PlayerState::Stop => 2,
                PlayerState::Pause => 3,
                PlayerState::Play => 4,
            })
            .into(),
        ),
        (t("cash"), Value::UByte(matches!(status.shuffle, ShuffleState::On) as u8).into()),
        (
            t("carp"),
            Value::UByte(match status.repeat {
                RepeatState::Off => 0,
                RepeatState::Single => 1,
                RepeatState::All => 2,
            })
            .into(),
        ),
        (t("cavc"), Value::UByte(1).into()),
        (t("cmvo"), Value::UInt(status.volume as u32).into()),
    ];

    if let Some(now_playing) = &status.now_playing {
        nodes.push((
            t("canp"),
            Value::MultiUInt(vec![
                now_playing.container_id,
                now_playing.container_item_id,
                now_playing.item_id,
                0,
            ])
            .into(),
        ));
        nodes.push((t("cant"), Value::Int((now_playing.total_ms - now_playing.elapsed_ms) as i32).into()));
        nodes.push((t("cast"), Value::Int(now_playing.total_ms as i32).into()));
        if let Some((_, item)) = snapshot.items.find_by_id(now_playing.item_id as u64) {
            nodes.push((t("cann"), Value::String(item.name.clone()).into()));
            nodes.push((t("cana"), Value::String(item.artist.clone()).into()));
            nodes.push((t("canl"), Value::String(item.album.clone()).into()));
            nodes.push((t("cang"), Value::String(item.genre.clone()).into()));
        }
    }

    respond(vec![(t("cmst"), NodeSpec::List(nodes))])
}

/// `GET /ctrl-int/1/nowplayingartwork?mw=&mh=`: 204 when nothing is
/// playing or no provider has art for it, matching spec.md §7's
/// route-specific (not global) treatment of an artwork miss here.
pub async fn now_playing_artwork(
    State(state): State<AppState>,
    Query(q): Query<ArtworkQuery>,
) -> Result<Response> {
    let snapshot = state.mpd.snapshot();
    let Some(now_playing) = snapshot.status.now_playing.clone() else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    let Some((_, item)) = snapshot.items.find_by_id(now_playing.item_id as u64) else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };
    let (artist, album) = (item.artist.clone(), item.album.clone());
    drop(snapshot);

    let width = q.mw.unwrap_or(300);
    let height = q.mh.unwrap_or(300);
    match state.artwork.get(&artist, &album, width, height).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response()),
        Err(_) => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[derive(serde::Deserialize)]
pub struct PlaySpecQuery {
    #[serde(rename = "container-item-spec")]
    container_item_spec: Option<String>,
}

/// `POST /ctrl-int/1/playspec?container-item-spec='dmap.containeritemid:N'`:
/// jump playback to the queue position a spec singles out.
pub async fn play_spec(State(state): State<AppState>, Query(q): Query<PlaySpecQuery>) -> Result<StatusCode> {
    if let Some(raw) = q.container_item_spec {
        let ast = query::parse(&raw)?;
        let snapshot = state.mpd.snapshot();
        let matched = query::evaluate(&ast, &snapshot.items);
        if let Some(&pos) = matched.iter().next() {
            if let Some(item) = snapshot.items.get(pos) {
                let path = item.path.clone();
                drop(snapshot);
                state.mpd.clear_current().await.map_err(mpd_err)?;
                state.mpd.add_to_current(&path).await.map_err(mpd_err)?;
                state.mpd.play().await.map_err(mpd_err)?;
            }
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn play_pause(State(state): State<AppState>) -> Result<StatusCode> {
    state.mpd.toggle_play().await.map_err(mpd_err)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pause(State(state): State<AppState>) -> Result<StatusCode> {
    state.mpd.pause().await.map_err(mpd_err)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn next_item(State(state): State<AppState>) -> Result<StatusCode> {
    state.mpd.next().await.map_err(mpd_err)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn prev_item(State(state): State<AppState>) -> Result<StatusCode> {
    state.mpd.previous().await.map_err(mpd_err)?;
    Ok(StatusCode::NO_CONTENT)
}

fn mpd_err(err: crate::mpd::MpdAdapterError) -> EuphonyError {
    EuphonyError::MpdConnection(std::io::Error::other(err.to_string()))
}
