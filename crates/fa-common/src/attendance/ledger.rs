//! 出退勤トグルの状態機械
//!
//! (人物, 暦日) ごとに NoEventToday → CheckedIn → CheckedOut → CheckedIn ... と遷移する。
//! 認識されるたびに必ず 1 件打刻する（入退室の物理モデル。重複排除はしない）。

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};
use tracing::{info, instrument};

use super::clock::{Clock, SystemClock};
use crate::directory::{AttendanceHistory, BackendError};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    CheckIn,
    CheckOut,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// 画面表示用（"Check-In" / "Check-Out"）
    pub fn label(&self) -> &'static str {
        match self {
            Direction::CheckIn => "Check-In",
            Direction::CheckOut => "Check-Out",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Direction::CheckIn => Direction::CheckOut,
            Direction::CheckOut => Direction::CheckIn,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Direction::from_str(value).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceState {
    NoEventToday,
    CheckedIn,
    CheckedOut,
}

impl AttendanceState {
    pub fn from_last_event(last: Option<Direction>) -> Self {
        match last {
            None => AttendanceState::NoEventToday,
            Some(Direction::CheckIn) => AttendanceState::CheckedIn,
            Some(Direction::CheckOut) => AttendanceState::CheckedOut,
        }
    }

    /// 次に打刻すべき向き
    pub fn next_direction(self) -> Direction {
        match self {
            AttendanceState::NoEventToday | AttendanceState::CheckedOut => Direction::CheckIn,
            AttendanceState::CheckedIn => Direction::CheckOut,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub identity_key: String,
    pub direction: Direction,
    pub recorded_at: DateTime<Utc>,
}

/// 設定オフセットでの暦日と、その UTC 範囲 [starts_at, ends_at)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceDay {
    pub date: NaiveDate,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl AttendanceDay {
    pub fn containing(instant: DateTime<Utc>, offset: FixedOffset) -> Self {
        let date = instant.with_timezone(&offset).date_naive();
        let local_midnight = date.and_time(NaiveTime::MIN);
        let starts_at = DateTime::<Utc>::from_naive_utc_and_offset(
            local_midnight - Duration::seconds(i64::from(offset.local_minus_utc())),
            Utc,
        );

        Self {
            date,
            starts_at,
            ends_at: starts_at + Duration::days(1),
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.starts_at && instant < self.ends_at
    }
}

pub struct AttendanceLedger<H, C = SystemClock> {
    history: Arc<H>,
    clock: C,
    offset: FixedOffset,
}

impl<H, C> AttendanceLedger<H, C>
where
    H: AttendanceHistory,
    C: Clock,
{
    pub fn new(history: Arc<H>, clock: C, offset: FixedOffset) -> Self {
        Self {
            history,
            clock,
            offset,
        }
    }

    pub fn today(&self) -> AttendanceDay {
        AttendanceDay::containing(self.clock.now(), self.offset)
    }

    /// 本日の打刻状況（打刻はしない）
    pub async fn state_today(&self, identity_key: &str) -> Result<AttendanceState, BackendError> {
        let last = self.history.last_event_today(identity_key, &self.today()).await?;
        Ok(AttendanceState::from_last_event(last))
    }

    /// 本日の最終打刻を反転させた向きで新しい打刻を追加し、その打刻を返す。
    ///
    /// 読み取りと追加は履歴側で 1 操作として行うので、同じ人物への同時打刻でも交互性が保たれる。
    #[instrument(skip(self))]
    pub async fn record_event(&self, identity_key: &str) -> Result<AttendanceEvent, BackendError> {
        let now = self.clock.now();
        let day = AttendanceDay::containing(now, self.offset);

        let event = self
            .history
            .record_toggled_event(identity_key, &day, now)
            .await?;

        info!(
            identity_key,
            direction = event.direction.as_str(),
            date = %day.date,
            "attendance recorded"
        );
        Ok(event)
    }
}
