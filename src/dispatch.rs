// Push 메시지 라우팅: cmd 필터 기반 구독자 + 내장 typed 이벤트

pub mod registry;
pub mod typed;

pub use registry::{CommandFilter, CommandHandler, DispatchReport, Dispatcher, MatchKind, RawHandler};
pub use typed::{DanmuMsg, EnterRoom, GiftInfo, SendGift, SuperChat, UserToast};
