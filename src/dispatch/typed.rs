// 내장 typed 이벤트: 이미 분류된 Push JSON 에서 필요한 필드만 뽑아낸 구조체
//
//   DANMU_MSG          → DanmuMsg
//   INTERACT_WORD      → EnterRoom   (msg_type == 1 일 때만)
//   SEND_GIFT          → SendGift
//   SUPER_CHAT_MESSAGE → SuperChat
//   USER_TOAST_MSG     → UserToast

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{BliveError, BliveResult};
use crate::protocol::message::danmu_face;
use crate::protocol::PushMessage;

pub const CMD_DANMU_MSG:   &str = "DANMU_MSG";
pub const CMD_ENTER_ROOM:  &str = "INTERACT_WORD";
pub const CMD_SEND_GIFT:   &str = "SEND_GIFT";
pub const CMD_SUPER_CHAT:  &str = "SUPER_CHAT_MESSAGE";
pub const CMD_USER_TOAST:  &str = "USER_TOAST_MSG";

/// INTERACT_WORD msg_type: 1 = 입장 (2 = 팔로우, 3 = 공유 ...)
const INTERACT_ENTER: u32 = 1;

// ----------------------------------------------------------------------------
// [공개 이벤트 타입]
// ----------------------------------------------------------------------------

/// 채팅(弹幕) 한 줄
#[derive(Debug, Clone, Serialize)]
pub struct DanmuMsg {
    pub text:        String,
    pub uid:         u64,
    pub uname:       String,
    /// 0 = 없음, 1 = 总督, 2 = 提督, 3 = 舰长
    pub guard_level: u32,
    pub face:        String,
    pub raw:         Value,
}

/// 입장 알림
#[derive(Debug, Clone, Serialize)]
pub struct EnterRoom {
    pub privilege_type: u32,
    pub uid:            u64,
    pub uname:          String,
    pub raw:            Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GiftInfo {
    pub id:    u64,
    pub name:  String,
    /// 단가 (금 과금 기준 1/1000 元)
    pub price: u64,
    pub num:   u32,
}

/// 선물. 盲盒이면 blind_gift 에 원래(보이는) 선물이 들어간다
#[derive(Debug, Clone, Serialize)]
pub struct SendGift {
    pub gift:        GiftInfo,
    pub blind_gift:  Option<GiftInfo>,
    /// "gold" | "silver"
    pub coin_type:   String,
    pub uid:         u64,
    pub uname:       String,
    pub guard_level: u32,
    pub face:        String,
    pub raw:         Value,
}

/// 유료 하이라이트 메시지 (醒目留言)
#[derive(Debug, Clone, Serialize)]
pub struct SuperChat {
    pub message:     String,
    pub id:          u64,
    /// 元
    pub price:       u64,
    pub uid:         u64,
    pub uname:       String,
    pub guard_level: u32,
    pub face:        String,
    pub raw:         Value,
}

/// 대항해(舰长/提督/总督) 구매 토스트
#[derive(Debug, Clone, Serialize)]
pub struct UserToast {
    pub role_name:   String,
    pub gift_id:     u64,
    pub guard_level: u32,
    pub price:       u64,
    pub num:         u32,
    /// "月" 등
    pub unit:        String,
    pub uid:         u64,
    pub username:    String,
    pub raw:         Value,
}

// ----------------------------------------------------------------------------
// [와이어 구조] data 필드 역직렬화용
// ----------------------------------------------------------------------------

/// 숫자가 문자열로 오는 경우가 있어 둘 다 허용
fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n.as_u64().ok_or_else(|| serde::de::Error::custom("expected unsigned integer")),
        Value::String(s) => s.parse().map_err(serde::de::Error::custom),
        Value::Null      => Ok(0),
        other => Err(serde::de::Error::custom(format!("expected integer, got {}", other))),
    }
}

fn lenient_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let v = lenient_u64(d)?;
    u32::try_from(v).map_err(serde::de::Error::custom)
}

#[derive(Deserialize)]
struct InteractWordData {
    #[serde(default, deserialize_with = "lenient_u64")]
    uid:            u64,
    #[serde(default)]
    uname:          String,
    #[serde(default, deserialize_with = "lenient_u32")]
    msg_type:       u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    privilege_type: u32,
}

#[derive(Deserialize)]
struct BlindGiftData {
    #[serde(default, deserialize_with = "lenient_u64")]
    original_gift_id:    u64,
    #[serde(default)]
    original_gift_name:  String,
    #[serde(default, deserialize_with = "lenient_u64")]
    original_gift_price: u64,
}

#[derive(Deserialize)]
struct SendGiftData {
    #[serde(rename = "giftId", default, deserialize_with = "lenient_u64")]
    gift_id:     u64,
    #[serde(rename = "giftName", default)]
    gift_name:   String,
    #[serde(default, deserialize_with = "lenient_u64")]
    price:       u64,
    #[serde(default, deserialize_with = "lenient_u32")]
    num:         u32,
    #[serde(default)]
    coin_type:   String,
    #[serde(default, deserialize_with = "lenient_u64")]
    uid:         u64,
    #[serde(default)]
    uname:       String,
    #[serde(default, deserialize_with = "lenient_u32")]
    guard_level: u32,
    #[serde(default)]
    face:        String,
    #[serde(default)]
    blind_gift:  Option<BlindGiftData>,
}

#[derive(Deserialize, Default)]
struct SuperChatUser {
    #[serde(default)]
    uname:       String,
    #[serde(default)]
    face:        String,
    #[serde(default, deserialize_with = "lenient_u32")]
    guard_level: u32,
}

#[derive(Deserialize)]
struct SuperChatData {
    #[serde(default)]
    message:   String,
    #[serde(default, deserialize_with = "lenient_u64")]
    id:        u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    price:     u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    uid:       u64,
    #[serde(default)]
    user_info: SuperChatUser,
}

#[derive(Deserialize)]
struct UserToastData {
    #[serde(default)]
    role_name:   String,
    #[serde(default, deserialize_with = "lenient_u64")]
    gift_id:     u64,
    #[serde(default, deserialize_with = "lenient_u32")]
    guard_level: u32,
    #[serde(default, deserialize_with = "lenient_u64")]
    price:       u64,
    #[serde(default, deserialize_with = "lenient_u32")]
    num:         u32,
    #[serde(default)]
    unit:        String,
    #[serde(default, deserialize_with = "lenient_u64")]
    uid:         u64,
    #[serde(default)]
    username:    String,
}

/// DANMU_MSG info[7]. 없으면 0, u32 범위를 넘으면 에러
fn guard_level(v: &Value) -> BliveResult<u32> {
    match v.as_u64() {
        None => Ok(0),
        Some(n) => u32::try_from(n)
            .map_err(|_| BliveError::InvalidPayload(format!("DANMU_MSG guard level out of range: {}", n))),
    }
}

fn data<'a, T: Deserialize<'a>>(msg: &'a PushMessage) -> BliveResult<T> {
    T::deserialize(&msg.body["data"])
        .map_err(|e| BliveError::InvalidPayload(format!("{} data: {}", msg.cmd, e)))
}

// ----------------------------------------------------------------------------
// [변환]
// ----------------------------------------------------------------------------

impl DanmuMsg {
    /// info 배열: [1] 본문, [2][0] uid, [2][1] 닉네임, [7] 대항해 등급
    pub fn from_push(msg: &PushMessage) -> BliveResult<Self> {
        let info = &msg.body["info"];
        let text = info[1]
            .as_str()
            .ok_or_else(|| BliveError::InvalidPayload("DANMU_MSG info[1] is not a string".into()))?;
        let uid = info[2][0]
            .as_u64()
            .ok_or_else(|| BliveError::InvalidPayload("DANMU_MSG info[2][0] is not a uid".into()))?;

        Ok(Self {
            text:        text.to_string(),
            uid,
            uname:       info[2][1].as_str().unwrap_or_default().to_string(),
            guard_level: guard_level(&info[7])?,
            face:        danmu_face(&msg.body)?,
            raw:         msg.body.clone(),
        })
    }
}

impl EnterRoom {
    /// 입장이 아닌 INTERACT_WORD (팔로우 등) 는 None
    pub fn from_push(msg: &PushMessage) -> BliveResult<Option<Self>> {
        let d: InteractWordData = data(msg)?;
        if d.msg_type != INTERACT_ENTER {
            return Ok(None);
        }
        Ok(Some(Self {
            privilege_type: d.privilege_type,
            uid:            d.uid,
            uname:          d.uname,
            raw:            msg.body.clone(),
        }))
    }
}

impl SendGift {
    pub fn from_push(msg: &PushMessage) -> BliveResult<Self> {
        let d: SendGiftData = data(msg)?;
        let blind_gift = d.blind_gift.map(|b| GiftInfo {
            id:    b.original_gift_id,
            name:  b.original_gift_name,
            price: b.original_gift_price,
            num:   d.num,
        });
        Ok(Self {
            gift: GiftInfo { id: d.gift_id, name: d.gift_name, price: d.price, num: d.num },
            blind_gift,
            coin_type:   d.coin_type,
            uid:         d.uid,
            uname:       d.uname,
            guard_level: d.guard_level,
            face:        d.face,
            raw:         msg.body.clone(),
        })
    }
}

impl SuperChat {
    pub fn from_push(msg: &PushMessage) -> BliveResult<Self> {
        let d: SuperChatData = data(msg)?;
        Ok(Self {
            message:     d.message,
            id:          d.id,
            price:       d.price,
            uid:         d.uid,
            uname:       d.user_info.uname,
            guard_level: d.user_info.guard_level,
            face:        d.user_info.face,
            raw:         msg.body.clone(),
        })
    }
}

impl UserToast {
    pub fn from_push(msg: &PushMessage) -> BliveResult<Self> {
        let d: UserToastData = data(msg)?;
        Ok(Self {
            role_name:   d.role_name,
            gift_id:     d.gift_id,
            guard_level: d.guard_level,
            price:       d.price,
            num:         d.num,
            unit:        d.unit,
            uid:         d.uid,
            username:    d.username,
            raw:         msg.body.clone(),
        })
    }
}
