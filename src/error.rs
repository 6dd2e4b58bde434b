use std::path::PathBuf;

/// 索引核心的错误分类
///
/// 扫描期间的软失败（权限不足、目录消失、链接环）不走这里，
/// 它们只计入 stats，见 [`crate::scan::SoftFailure`]。
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// 不变量被破坏（例如 trie 终点引用了不存在的 entry）。
    /// 会话会被整体重建，调用方不应重试同一操作来“修补”。
    #[error("index inconsistency: {0}")]
    IndexInconsistency(String),

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
