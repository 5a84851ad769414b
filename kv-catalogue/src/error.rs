#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("TiKV error: {0}")]
    TikvError(#[from] tikv_client::Error),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Unexpected reply: expected {expected}, got {got}")]
    UnexpectedReply { expected: &'static str, got: String },
    #[error("Invalid utf8: {0}")]
    InvalidUtf8(std::string::FromUtf8Error),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    #[error("Invalid field {field}: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("Invalid sort key: {0}")]
    InvalidSortKey(String),
    #[error("Pipeline response out of order: expected product {expected}, got {got}")]
    ResponseOrder { expected: u64, got: u64 },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found")]
    NotFound,
}

/// 调用方关心的错误分类
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// 输入有误，修正后可重试
    Validation,
    NotFound,
    /// 存储层或存储中数据的问题，原样上抛
    Store,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::Store,
        }
    }
}
