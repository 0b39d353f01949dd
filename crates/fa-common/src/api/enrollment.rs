use serde::{Deserialize, Serialize};

use crate::directory::{IdentityProfile, NewIdentity};

#[derive(Debug, Clone, Deserialize)]
pub struct EnrollIdentityRequest {
    #[serde(alias = "name")]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    /// 登録写真から検出された顔の埋め込み。先頭のみ使う
    #[serde(default)]
    pub faces: Vec<Vec<f32>>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 受け入れ側の組織以外は全て外部（ベンダー）扱い。host 未設定なら全員ベンダー
pub fn is_vendor(organization: Option<&str>, host_organization: Option<&str>) -> bool {
    match (organization.map(str::trim), host_organization.map(str::trim)) {
        (Some(org), Some(host)) if !host.is_empty() => !org.eq_ignore_ascii_case(host),
        _ => true,
    }
}

impl EnrollIdentityRequest {
    pub fn into_new_identity(
        self,
        identity_key: String,
        host_organization: Option<&str>,
    ) -> NewIdentity {
        let organization = non_blank(self.organization);
        let is_vendor = is_vendor(organization.as_deref(), host_organization);

        NewIdentity {
            identity_key,
            first_name: self.first_name.trim().to_string(),
            last_name: non_blank(self.last_name),
            phone: non_blank(self.phone),
            email: non_blank(self.email),
            organization,
            is_vendor,
            embedding: self.faces.into_iter().next(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollIdentityResponse {
    pub identity_key: String,
    pub display_name: String,
    pub organization: Option<String>,
    pub is_vendor: bool,
    /// キャッシュに載って照合対象になったか
    pub searchable: bool,
}

impl EnrollIdentityResponse {
    pub fn new(profile: IdentityProfile, searchable: bool) -> Self {
        Self {
            identity_key: profile.identity_key,
            display_name: profile.display_name,
            organization: profile.organization,
            is_vendor: profile.is_vendor,
            searchable,
        }
    }
}
