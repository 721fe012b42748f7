/// 统一错误类型
///
/// 所有错误都通过命令的响应通道同步返回给调用方，资源管理器自身不会因此退出

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("资源已存在: {0}")]
    AlreadyExists(String),

    #[error("资源仍被引用: {0}")]
    InUse(String),

    #[error("状态错误: {0}")]
    InvalidState(String),

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    #[error("资源不足: {0}")]
    InsufficientResource(String),

    #[error("无需变更: {0}")]
    NoChange(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("服务不可用: {0}")]
    Unavailable(String),

    #[error("内部错误: {0}")]
    Internal(String),

    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// 引用了不存在的资源
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// 修改请求与当前配置完全一致
    pub fn is_no_change(&self) -> bool {
        matches!(self, Error::NoChange(_))
    }

    /// 前置条件不满足（重复、仍被引用、状态不符、容量不足）
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::AlreadyExists(_)
                | Error::InUse(_)
                | Error::InvalidState(_)
                | Error::InvalidArgument(_)
                | Error::InsufficientResource(_)
        )
    }
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, Error>;
