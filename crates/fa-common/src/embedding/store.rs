//! 登録済み人物の埋め込みキャッシュ。
//!
//! ロック規律:
//! - 変更（populate / upsert / remove）とスナップショット取得は同じ排他区間で直列化する
//! - 排他区間で行うのはマップの差し替えと `Arc` の複製だけ。正規化や類似度計算は区間の外で行う
//! - スナップショットは不変なので、ロックを持たずに全件走査できる
//!
//! 内部は `Arc<BTreeMap>` の copy-on-write。スナップショットが生きている間に
//! 変更が入った場合だけマップ（中身は `Arc` なのでポインタのみ）が複製される。

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::vector::{normalize, EmbeddingVector, VectorError};
use crate::directory::{BackendError, EnrolledIdentitySource, EnrolledIdentity};

#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRecord {
    pub identity_key: String,
    pub display_name: String,
    pub organization: Option<String>,
    pub embedding: EmbeddingVector,
}

type RecordMap = BTreeMap<String, Arc<IdentityRecord>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateReport {
    pub loaded: usize,
    pub skipped: usize,
    /// 既に 1 件以上載っていたため何もしなかった
    pub already_populated: bool,
}

#[derive(Debug)]
pub struct EmbeddingStore {
    dimension: usize,
    records: Mutex<Arc<RecordMap>>,
}

impl EmbeddingStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: Mutex::new(Arc::new(BTreeMap::new())),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn prepare(&self, raw: &[f32]) -> Result<EmbeddingVector, VectorError> {
        if raw.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                got: raw.len(),
            });
        }
        normalize(raw)
    }

    /// 起動時の一括ロード。既に 1 件以上ある場合は no-op。
    ///
    /// 正規化は排他区間の外で行い、空判定と差し替えだけを排他区間で行う。
    /// 同時に呼ばれても反映されるのは最初に差し替えた 1 回だけ。
    /// ゼロノルムや次元違いの埋め込みはスキップする（その人物は照合対象にならない）。
    pub fn populate<I>(&self, identities: I) -> PopulateReport
    where
        I: IntoIterator<Item = EnrolledIdentity>,
    {
        if !self.is_empty() {
            return Self::already_populated();
        }

        let mut map = RecordMap::new();
        let mut skipped = 0;

        for identity in identities {
            match self.prepare(&identity.embedding) {
                Ok(embedding) => {
                    let record = IdentityRecord {
                        identity_key: identity.identity_key.clone(),
                        display_name: identity.display_name,
                        organization: identity.organization,
                        embedding,
                    };
                    map.insert(identity.identity_key, Arc::new(record));
                }
                Err(err) => {
                    warn!(
                        identity_key = %identity.identity_key,
                        error = %err,
                        "skipping identity with unusable embedding"
                    );
                    skipped += 1;
                }
            }
        }

        let mut guard = self.records.lock();
        if !guard.is_empty() {
            return Self::already_populated();
        }
        // 重複キーは後勝ち
        let report = PopulateReport {
            loaded: map.len(),
            skipped,
            already_populated: false,
        };
        *guard = Arc::new(map);
        drop(guard);

        info!(
            loaded = report.loaded,
            skipped = report.skipped,
            "loaded known face embeddings"
        );
        report
    }

    fn already_populated() -> PopulateReport {
        debug!("embedding cache already populated; skipping");
        PopulateReport {
            already_populated: true,
            ..PopulateReport::default()
        }
    }

    /// 登録時の追加 / 置き換え。
    ///
    /// ゼロノルムなら追加せずエラーを返す（呼び出し側はログだけ出して続行してよい）。
    /// 置き換えはレコード単位で行われ、読み手が書きかけのレコードを見ることはない。
    pub fn upsert(
        &self,
        identity_key: impl Into<String>,
        raw_embedding: &[f32],
        display_name: impl Into<String>,
        organization: Option<String>,
    ) -> Result<(), VectorError> {
        let embedding = self.prepare(raw_embedding)?;
        let identity_key = identity_key.into();
        let record = Arc::new(IdentityRecord {
            identity_key: identity_key.clone(),
            display_name: display_name.into(),
            organization,
            embedding,
        });

        let mut guard = self.records.lock();
        Arc::make_mut(&mut guard).insert(identity_key, record);
        Ok(())
    }

    /// 正本から削除された人物をキャッシュからも外す
    pub fn remove(&self, identity_key: &str) -> bool {
        let mut guard = self.records.lock();
        if !guard.contains_key(identity_key) {
            return false;
        }
        Arc::make_mut(&mut guard).remove(identity_key).is_some()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            records: Arc::clone(&self.records.lock()),
        }
    }

    /// 空の場合のみ外部ストアから読み込んで populate する
    pub async fn warm_from<S>(&self, source: &S) -> Result<PopulateReport, BackendError>
    where
        S: EnrolledIdentitySource,
    {
        if !self.is_empty() {
            return Ok(Self::already_populated());
        }

        let identities = source.load_enrolled_identities().await?;
        Ok(self.populate(identities))
    }
}

/// ある時点のキャッシュの不変ビュー。走査順は identity_key の昇順。
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    records: Arc<RecordMap>,
}

impl StoreSnapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, identity_key: &str) -> Option<&IdentityRecord> {
        self.records.get(identity_key).map(Arc::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdentityRecord> {
        self.records.values().map(Arc::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::vector::l2_norm;

    fn enrolled(key: &str, embedding: Vec<f32>) -> EnrolledIdentity {
        EnrolledIdentity {
            identity_key: key.into(),
            embedding,
            display_name: format!("{key} name"),
            organization: Some("Acme".into()),
        }
    }

    #[test]
    fn populate_normalizes_and_skips_degenerate_embeddings() {
        let store = EmbeddingStore::new(2);
        let report = store.populate(vec![
            enrolled("a", vec![3.0, 4.0]),
            enrolled("zero", vec![0.0, 0.0]),
            enrolled("short", vec![1.0]),
            enrolled("b", vec![0.0, 10.0]),
        ]);

        assert_eq!(report.loaded, 2);
        assert_eq!(report.skipped, 2);
        assert!(!report.already_populated);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.get("zero").is_none());
        for record in snapshot.iter() {
            assert!((l2_norm(record.embedding.as_slice()) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn populate_is_noop_once_populated() {
        let store = EmbeddingStore::new(2);
        store.populate(vec![enrolled("a", vec![1.0, 0.0])]);

        let second = store.populate(vec![enrolled("b", vec![0.0, 1.0])]);

        assert!(second.already_populated);
        assert_eq!(store.len(), 1);
        assert!(store.snapshot().get("b").is_none());
    }

    #[test]
    fn populated_store_does_not_consume_the_source() {
        let store = EmbeddingStore::new(2);
        store.populate(vec![enrolled("a", vec![1.0, 0.0])]);

        let pulled = std::cell::Cell::new(0);
        let report = store.populate(
            vec![enrolled("b", vec![0.0, 1.0])]
                .into_iter()
                .inspect(|_| pulled.set(pulled.get() + 1)),
        );

        assert!(report.already_populated);
        assert_eq!(pulled.get(), 0);
    }

    #[test]
    fn upsert_replaces_existing_record() {
        let store = EmbeddingStore::new(2);
        store.upsert("a", &[1.0, 0.0], "Old", None).unwrap();
        store
            .upsert("a", &[0.0, 2.0], "New", Some("Acme".into()))
            .unwrap();

        let snapshot = store.snapshot();
        let record = snapshot.get("a").unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(record.display_name, "New");
        assert_eq!(record.embedding.as_slice(), &[0.0, 1.0]);
    }

    #[test]
    fn upsert_rejects_zero_norm_and_wrong_dimension() {
        let store = EmbeddingStore::new(3);

        assert_eq!(
            store.upsert("zero", &[0.0, 0.0, 0.0], "Zero", None),
            Err(VectorError::ZeroNormVector)
        );
        assert_eq!(
            store.upsert("short", &[1.0, 0.0], "Short", None),
            Err(VectorError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        );
        assert!(store.is_empty());
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutations() {
        let store = EmbeddingStore::new(2);
        store.upsert("a", &[1.0, 0.0], "A", None).unwrap();

        let before = store.snapshot();
        store.upsert("b", &[0.0, 1.0], "B", None).unwrap();
        assert!(store.remove("a"));

        assert_eq!(before.len(), 1);
        assert!(before.get("a").is_some());

        let after = store.snapshot();
        assert_eq!(after.len(), 1);
        assert!(after.get("b").is_some());
    }

    #[test]
    fn remove_reports_missing_keys() {
        let store = EmbeddingStore::new(2);
        assert!(!store.remove("ghost"));
    }

    #[test]
    fn snapshot_iterates_in_key_order() {
        let store = EmbeddingStore::new(2);
        for key in ["c", "a", "b"] {
            store.upsert(key, &[1.0, 1.0], key, None).unwrap();
        }

        let keys: Vec<_> = store
            .snapshot()
            .iter()
            .map(|r| r.identity_key.clone())
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn concurrent_upserts_never_lose_entries() {
        let store = EmbeddingStore::new(4);
        let threads = 16;
        let per_thread = 32;

        std::thread::scope(|scope| {
            for t in 0..threads {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..per_thread {
                        let raw = [1.0 + i as f32, t as f32, 0.5, -1.0];
                        store
                            .upsert(format!("id-{t}-{i}"), &raw, "someone", None)
                            .unwrap();
                        // 走査中の読み手が混ざっても壊れないこと
                        let _ = store.snapshot().len();
                    }
                });
            }
        });

        assert_eq!(store.len(), threads * per_thread);
    }

    #[test]
    fn concurrent_populate_collapses_to_single_execution() {
        let store = EmbeddingStore::new(2);

        let reports: Vec<PopulateReport> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|t| {
                    let store = &store;
                    scope.spawn(move || {
                        store.populate(vec![
                            enrolled(&format!("t{t}-a"), vec![1.0, 0.0]),
                            enrolled(&format!("t{t}-b"), vec![0.0, 1.0]),
                        ])
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(reports.iter().filter(|r| !r.already_populated).count(), 1);
        assert_eq!(store.len(), 2);
    }
}
