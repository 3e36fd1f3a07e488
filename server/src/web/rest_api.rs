use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::engine::identity::{CompactId, decode, encode};
use crate::engine::member_sets::ChannelBucket;
use crate::engine::query::{
    ChannelMemberListRequest, ChannelMemberListWindow, MemberEntry, MemberListRequest, MemberListWindow,
};

use super::app_state::AppState;

/// A member as `[userId, [roleId, ...]]`.
pub type MemberTuple = (Uuid, Vec<Uuid>);

fn member_tuple(entry: &MemberEntry) -> MemberTuple {
    (
        decode(entry.user_id),
        entry.role_ids.iter().copied().map(decode).collect(),
    )
}

fn member_tuples(entries: &[MemberEntry]) -> Vec<MemberTuple> {
    entries.iter().map(member_tuple).collect()
}

fn uuids(ids: &[CompactId]) -> Vec<Uuid> {
    ids.iter().copied().map(decode).collect()
}

// ── Community member list ───────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberListWindowParams {
    pub community_id: Uuid,
    pub offset: usize,
    pub limit: usize,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub role_id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberListWindowResponse {
    pub total_count: usize,
    pub result_count: usize,
    /// `[roleId, holderCount]` for every role of the community.
    pub roles: Vec<(Uuid, usize)>,
    pub online: Vec<MemberTuple>,
    pub offline: Vec<MemberTuple>,
}

impl From<MemberListWindow> for MemberListWindowResponse {
    fn from(window: MemberListWindow) -> Self {
        Self {
            total_count: window.total_count,
            result_count: window.result_count,
            roles: window
                .roles
                .iter()
                .map(|r| (decode(r.role_id), r.holders))
                .collect(),
            online: member_tuples(&window.online),
            offline: member_tuples(&window.offline),
        }
    }
}

/// POST /getMemberListWindow
pub async fn get_member_list_window(
    State(state): State<Arc<AppState>>,
    Json(params): Json<MemberListWindowParams>,
) -> impl IntoResponse {
    state.engine.wait_ready().await;
    let request = MemberListRequest {
        community_id: encode(params.community_id),
        offset: params.offset,
        limit: params.limit,
        search: params.search,
        role_id: params.role_id.map(encode),
    };
    match state.engine.member_list_window(&request) {
        Some(window) => Json(MemberListWindowResponse::from(window)).into_response(),
        None => {
            debug!(community_id = %params.community_id, "member list not found");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

// ── Channel member list ─────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMemberListWindowParams {
    pub community_id: Uuid,
    pub channel_id: Uuid,
    pub offset: usize,
    pub limit: usize,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub starts_with_search: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMemberListWindowResponse {
    pub count: usize,
    pub admin_count: usize,
    pub moderator_count: usize,
    pub writer_count: usize,
    pub reader_count: usize,
    pub offline_count: usize,
    pub admin: Vec<MemberTuple>,
    pub moderator: Vec<MemberTuple>,
    pub writer: Vec<MemberTuple>,
    pub reader: Vec<MemberTuple>,
    pub offline: Vec<MemberTuple>,
}

impl From<ChannelMemberListWindow> for ChannelMemberListWindowResponse {
    fn from(window: ChannelMemberListWindow) -> Self {
        let tuples = |bucket| member_tuples(window.bucket(bucket));
        Self {
            count: window.count,
            admin_count: window.bucket_count(ChannelBucket::Admin),
            moderator_count: window.bucket_count(ChannelBucket::Moderator),
            writer_count: window.bucket_count(ChannelBucket::Writer),
            reader_count: window.bucket_count(ChannelBucket::Reader),
            offline_count: window.bucket_count(ChannelBucket::Offline),
            admin: tuples(ChannelBucket::Admin),
            moderator: tuples(ChannelBucket::Moderator),
            writer: tuples(ChannelBucket::Writer),
            reader: tuples(ChannelBucket::Reader),
            offline: tuples(ChannelBucket::Offline),
        }
    }
}

/// POST /getChannelMemberListWindow
pub async fn get_channel_member_list_window(
    State(state): State<Arc<AppState>>,
    Json(params): Json<ChannelMemberListWindowParams>,
) -> impl IntoResponse {
    state.engine.wait_ready().await;
    let request = ChannelMemberListRequest {
        community_id: encode(params.community_id),
        channel_id: encode(params.channel_id),
        offset: params.offset,
        limit: params.limit,
        search: params.search,
        starts_with_search: params.starts_with_search,
    };
    match state.engine.channel_member_list_window(&request) {
        Some(window) => Json(ChannelMemberListWindowResponse::from(window)).into_response(),
        None => {
            debug!(
                community_id = %params.community_id,
                channel_id = %params.channel_id,
                "channel member list not found"
            );
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

// ── User roles ──────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCommunityRoleIdsParams {
    pub user_id: Uuid,
    pub community_id: Uuid,
}

/// POST /getUserCommunityRoleIds
pub async fn get_user_community_role_ids(
    State(state): State<Arc<AppState>>,
    Json(params): Json<UserCommunityRoleIdsParams>,
) -> Json<Vec<Uuid>> {
    state.engine.wait_ready().await;
    let role_ids = state
        .engine
        .user_community_role_ids(encode(params.user_id), encode(params.community_id));
    Json(uuids(&role_ids))
}

// ── Health ──────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ready: bool,
    pub last_tick: Option<DateTime<Utc>>,
}

/// GET /health. Answers before the ready gate opens.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.engine.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            ready,
            last_tick: state.engine.last_tick(),
        }),
    )
}
