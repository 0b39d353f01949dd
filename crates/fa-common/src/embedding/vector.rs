use thiserror::Error;

/// L2 ノルムがこれ以下のベクトルはゼロベクトルとして扱う
const ZERO_NORM_EPSILON: f32 = 1e-10;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VectorError {
    #[error("cannot normalize zero-norm vector")]
    ZeroNormVector,
    #[error("vector contains NaN or infinite component at index {index}")]
    NonFiniteComponent { index: usize },
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// 単位長に正規化済みの埋め込みベクトル。
///
/// `normalize` 経由でしか生成できないため、保持している値は常に L2 ノルム 1 を満たす。
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl AsRef<[f32]> for EmbeddingVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// 生の埋め込みを単位長へスケールする。
///
/// ゼロノルムは `ZeroNormVector`、NaN/Inf を含む場合は `NonFiniteComponent` を返す。
pub fn normalize(raw: &[f32]) -> Result<EmbeddingVector, VectorError> {
    if let Some(index) = raw.iter().position(|x| !x.is_finite()) {
        return Err(VectorError::NonFiniteComponent { index });
    }

    let norm = l2_norm(raw);
    if norm <= ZERO_NORM_EPSILON {
        return Err(VectorError::ZeroNormVector);
    }

    Ok(EmbeddingVector(raw.iter().map(|x| x / norm).collect()))
}

/// 正規化済みベクトル同士の内積（= コサイン類似度, -1.0〜1.0）
///
/// 正規化もしないし次元違いの救済もしない。次元違いは設定ミスなので呼び出し側へ返す。
pub fn cosine_similarity(a: &EmbeddingVector, b: &EmbeddingVector) -> Result<f32, VectorError> {
    if a.dimension() != b.dimension() {
        return Err(VectorError::DimensionMismatch {
            expected: a.dimension(),
            got: b.dimension(),
        });
    }

    Ok(a.0.iter().zip(b.0.iter()).map(|(x, y)| x * y).sum())
}
