//! IdGenerator port - タスク ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock 由来の timestamp を使う単調増加 ULID

use std::sync::Mutex;
use std::time::SystemTime;

use ulid::{Generator, Ulid};

use crate::domain::TaskId;
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;
}

/// ULID generator driven by a `Clock`.
///
/// Ids minted within the same millisecond still increase strictly, so
/// `TaskId` order matches creation order. With a `FixedClock` every id
/// shares the same timestamp part.
pub struct UlidGenerator<C> {
    clock: C,
    monotonic: Mutex<Generator>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            monotonic: Mutex::new(Generator::new()),
        }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        let now = self.clock.now();
        let mut generator = self.monotonic.lock().unwrap_or_else(|e| e.into_inner());
        let ulid = generator
            .generate_from_datetime(SystemTime::from(now))
            // random 部分が同じミリ秒内で溢れた場合のみ
            .unwrap_or_else(|_| {
                Ulid::from_parts(now.timestamp_millis().max(0) as u64, rand::random())
            });
        TaskId::from(ulid)
    }
}
