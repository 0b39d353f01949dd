//! 外部の永続ストアとのインターフェース
//!
//! キャッシュ・照合エンジン本体は永続化を持たない。登録済み人物の読み込み、
//! 表示情報の参照、打刻履歴の読み書きはここで定義する trait を通して行う。
//!
//! 実装:
//! - `db::PgAttendanceRepository`: PostgreSQL（本番）
//! - `attendance::InMemoryAttendanceLog`: テスト / DB なし起動

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attendance::{AttendanceDay, AttendanceEvent, Direction};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend query failed: {0}")]
    Query(String),
}

/// 起動時にキャッシュへ載せる登録済み人物（埋め込みは未正規化のまま）
#[derive(Debug, Clone, PartialEq)]
pub struct EnrolledIdentity {
    pub identity_key: String,
    pub embedding: Vec<f32>,
    pub display_name: String,
    pub organization: Option<String>,
}

/// 照合結果を画面に出すための表示情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub identity_key: String,
    pub display_name: String,
    pub organization: Option<String>,
    pub is_vendor: bool,
}

/// 新規登録リクエスト（永続化前）
#[derive(Debug, Clone, PartialEq)]
pub struct NewIdentity {
    pub identity_key: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub organization: Option<String>,
    pub is_vendor: bool,
    pub embedding: Option<Vec<f32>>,
}

impl NewIdentity {
    /// "名 姓" 形式の表示名。姓が無い場合は名のみ。
    pub fn display_name(&self) -> String {
        display_name(&self.first_name, self.last_name.as_deref())
    }
}

pub fn display_name(first_name: &str, last_name: Option<&str>) -> String {
    format!("{} {}", first_name.trim(), last_name.unwrap_or("").trim())
        .trim()
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered(IdentityProfile),
    DuplicatePhone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

pub trait EnrolledIdentitySource: Send + Sync {
    /// 埋め込みを持つ登録済み人物をすべて返す
    fn load_enrolled_identities(
        &self,
    ) -> impl Future<Output = Result<Vec<EnrolledIdentity>, BackendError>> + Send;
}

pub trait IdentityDirectory: Send + Sync {
    /// 見つからない場合は `Ok(None)`
    fn lookup_identity(
        &self,
        identity_key: &str,
    ) -> impl Future<Output = Result<Option<IdentityProfile>, BackendError>> + Send;
}

pub trait AttendanceHistory: Send + Sync {
    /// `day` の範囲内で最も新しい打刻の向き
    fn last_event_today(
        &self,
        identity_key: &str,
        day: &AttendanceDay,
    ) -> impl Future<Output = Result<Option<Direction>, BackendError>> + Send;

    /// `day` の最終打刻を反転させた打刻を追加して返す。
    ///
    /// 読み取りと追加は人物ごとに直列化されること。同じ人物への同時呼び出しで
    /// 同じ向きが続けて記録されてはならない。
    fn record_toggled_event(
        &self,
        identity_key: &str,
        day: &AttendanceDay,
        recorded_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<AttendanceEvent, BackendError>> + Send;
}

pub trait IdentityRegistry: Send + Sync {
    /// 電話番号が既に登録されていれば `DuplicatePhone`
    fn register_identity(
        &self,
        identity: &NewIdentity,
    ) -> impl Future<Output = Result<RegisterOutcome, BackendError>> + Send;
}

pub trait OrganizationRegistry: Send + Sync {
    /// get-or-create。戻り値の bool は新規作成されたかどうか
    fn ensure_organization(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<(Organization, bool), BackendError>> + Send;

    fn list_organizations(
        &self,
    ) -> impl Future<Output = Result<Vec<Organization>, BackendError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_joins_first_and_last() {
        assert_eq!(display_name("Asha", Some("Rao")), "Asha Rao");
        assert_eq!(display_name(" Asha ", None), "Asha");
        assert_eq!(display_name("Asha", Some("  ")), "Asha");
    }
}
