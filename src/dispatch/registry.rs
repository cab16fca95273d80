// Dispatcher: cmd 기반 구독자 라우팅
//
// 두 계층:
//   typed: CommandFilter 를 가진 구독자 (Exact / Wildcard / Fallback)
//   raw  : 필터 없음, 매 메시지마다 호출 (cmd + 분류 결과 전달)
//
// 1회 dispatch:
//   1. typed 를 등록 순서대로 순회
//        Exact 일치  → 호출, fired && !ignore_hit 이면 claimed
//        Wildcard    → 호출 (claimed 에 영향 없음)
//        Fallback    → 보류
//   2. claimed == false 이면 보류된 Fallback 호출
//   3. raw 전부 호출
//
// 등록 목록은 append-only. dispatch 중에는 Arc 스냅샷을 떠서 lock 없이 호출하므로
// 핸들러 안에서 새 구독을 추가해도 교착되지 않는다 (다음 메시지부터 적용).

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::trace;

use crate::protocol::PushMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandFilter {
    Exact(HashSet<String>),
    Wildcard,
    /// 다른 typed 구독자가 claim 하지 않은 cmd 에만 반응
    Fallback,
}

impl CommandFilter {
    pub fn exact(cmd: impl Into<String>) -> Self {
        CommandFilter::Exact(HashSet::from([cmd.into()]))
    }

    pub fn any_of<I, S>(cmds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandFilter::Exact(cmds.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Wildcard,
    Fallback,
}

/// 반환값 = 실제로 처리했는지 (hit 신호)
pub type CommandHandler = Arc<dyn Fn(&PushMessage, MatchKind) -> bool + Send + Sync>;

pub type RawHandler = Arc<dyn Fn(&str, MatchKind, &PushMessage) + Send + Sync>;

struct Subscription {
    filter:     CommandFilter,
    ignore_hit: bool,
    handler:    CommandHandler,
}

/// dispatch 1회 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub claimed:        bool,
    /// raw 구독자에게 전달된 분류
    pub classification: MatchKind,
    /// 호출된 핸들러 수 (typed + raw)
    pub invoked:        usize,
}

pub struct Dispatcher {
    typed: RwLock<Vec<Arc<Subscription>>>,
    raw:   RwLock<Vec<RawHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            typed: RwLock::new(Vec::new()),
            raw:   RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, filter: CommandFilter, ignore_hit: bool, handler: F)
    where
        F: Fn(&PushMessage, MatchKind) -> bool + Send + Sync + 'static,
    {
        trace!("[dispatch] subscribe filter={:?} ignore_hit={}", filter, ignore_hit);
        self.typed.write().unwrap().push(Arc::new(Subscription {
            filter,
            ignore_hit,
            handler: Arc::new(handler),
        }));
    }

    pub fn subscribe_raw<F>(&self, handler: F)
    where
        F: Fn(&str, MatchKind, &PushMessage) + Send + Sync + 'static,
    {
        self.raw.write().unwrap().push(Arc::new(handler));
    }

    /// 등록된 구독자 수 (typed, raw)
    pub fn count(&self) -> (usize, usize) {
        (self.typed.read().unwrap().len(), self.raw.read().unwrap().len())
    }

    /// raw 계층 분류: claimed → Exact, wildcard 가 fired → Wildcard, 그 외 Fallback.
    /// ignore_hit Exact 구독자만 일치한 cmd 는 claim 되지 않았으므로 Fallback 으로 보인다
    /// (내장 typed 이벤트가 만들어진 DANMU_MSG 도 Classified { kind: Fallback }).
    pub fn dispatch(&self, msg: &PushMessage) -> DispatchReport {
        let typed: Vec<Arc<Subscription>> = self.typed.read().unwrap().clone();

        let mut claimed      = false;
        let mut wildcard_hit = false;
        let mut invoked      = 0;
        let mut fallbacks    = Vec::new();

        for sub in &typed {
            match &sub.filter {
                CommandFilter::Exact(cmds) if cmds.contains(&msg.cmd) => {
                    invoked += 1;
                    let fired = (sub.handler)(msg, MatchKind::Exact);
                    if fired && !sub.ignore_hit {
                        claimed = true;
                    }
                }
                CommandFilter::Exact(_) => {}
                CommandFilter::Wildcard => {
                    invoked += 1;
                    if (sub.handler)(msg, MatchKind::Wildcard) {
                        wildcard_hit = true;
                    }
                }
                CommandFilter::Fallback => fallbacks.push(sub),
            }
        }

        if !claimed {
            for sub in fallbacks {
                invoked += 1;
                (sub.handler)(msg, MatchKind::Fallback);
            }
        }

        let classification = if claimed {
            MatchKind::Exact
        } else if wildcard_hit {
            MatchKind::Wildcard
        } else {
            MatchKind::Fallback
        };

        let raw: Vec<RawHandler> = self.raw.read().unwrap().clone();
        for handler in &raw {
            invoked += 1;
            handler(&msg.cmd, classification, msg);
        }

        trace!("[dispatch] cmd={} claimed={} class={:?} invoked={}", msg.cmd, claimed, classification, invoked);
        DispatchReport { claimed, classification, invoked }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
