use std::fmt;

/// 构建或查询索引时产生的错误。
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// 池或其上级分配器无法满足请求
    #[error("allocation of {requested} elements failed")]
    Allocation { requested: usize },

    /// 分页存储上的页传输失败，不重试
    #[error("paged storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// 内部一致性检查失败，例如映射键不构成排列，或后缀数组不是排列
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

/// [`IndexError`] 的粗粒度分类，不随错误信息变化。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Allocation,
    Io,
    InvalidInput,
    InvariantViolation,
}

impl IndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexError::Allocation { .. } => ErrorKind::Allocation,
            IndexError::Io(_) => ErrorKind::Io,
            IndexError::InvalidInput(_) => ErrorKind::InvalidInput,
            IndexError::InvariantViolation(_) => ErrorKind::InvariantViolation,
        }
    }

    pub(crate) fn invalid(msg: impl fmt::Display) -> Self {
        IndexError::InvalidInput(msg.to_string())
    }

    pub(crate) fn invariant(msg: impl fmt::Display) -> Self {
        IndexError::InvariantViolation(msg.to_string())
    }
}

impl From<bincode::Error> for IndexError {
    fn from(e: bincode::Error) -> Self {
        match *e {
            bincode::ErrorKind::Io(io) => IndexError::Io(io),
            other => IndexError::InvalidInput(format!("malformed manifest: {other}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
