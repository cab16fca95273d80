// 짧은 방 번호 → (실제 room_id, 방장 uid)
//
// GET {ROOM_INFO_URL}?room_ids={id}&req_biz=web
//   { "data": { "by_room_ids": { "<room_id>": { "room_id": 21452505, "uid": 434334701, ... } } } }

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config;
use crate::error::{BliveError, BliveResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: u64,
    pub uid:     u64,
}

#[async_trait]
pub trait RoomResolver: Send + Sync {
    async fn resolve(&self, short_room_id: u64) -> BliveResult<RoomInfo>;
}

pub struct HttpRoomResolver {
    client:   reqwest::Client,
    base_url: String,
}

impl HttpRoomResolver {
    pub fn new() -> Self {
        Self::with_base_url(config::ROOM_INFO_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client:   reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for HttpRoomResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomResolver for HttpRoomResolver {
    async fn resolve(&self, short_room_id: u64) -> BliveResult<RoomInfo> {
        let url = format!("{}?room_ids={}&req_biz=web", self.base_url, short_room_id);
        debug!("[resolver] GET {}", url);

        let body: Value = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| BliveError::Network(e.to_string()))?
            .json()
            .await
            .map_err(|e| BliveError::Network(e.to_string()))?;

        parse_room_info(&body).ok_or_else(|| {
            warn!("[resolver] room {} not found in response", short_room_id);
            BliveError::InvalidRoomId(short_room_id)
        })
    }
}

/// by_room_ids 의 첫 번째 값에서 room_id / uid. 하나라도 없으면 None
pub fn parse_room_info(body: &Value) -> Option<RoomInfo> {
    let room = body["data"]["by_room_ids"].as_object()?.values().next()?;
    Some(RoomInfo {
        room_id: room.get("room_id")?.as_u64()?,
        uid:     room.get("uid")?.as_u64()?,
    })
}

/// 이미 알고 있는 값을 그대로 돌려주는 resolver (테스트 / 오프라인)
pub struct StaticResolver(pub RoomInfo);

#[async_trait]
impl RoomResolver for StaticResolver {
    async fn resolve(&self, _short_room_id: u64) -> BliveResult<RoomInfo> {
        Ok(self.0)
    }
}
