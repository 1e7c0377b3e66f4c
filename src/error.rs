//! 错误处理模块
//!
//! 定义应用程序的错误类型和错误处理逻辑。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 参数验证错误（空文本、超长文本、无拾取目标）
    #[error("参数验证失败: {0}")]
    Validation(String),

    /// 认证错误（无会话或作者与当前用户不一致）
    #[error("认证失败: {0}")]
    Authentication(String),

    /// 授权错误（持久层拒绝写入）
    #[error("未授权访问: {0}")]
    Authorization(String),

    /// 唯一约束冲突
    #[error("唯一约束冲突: {0}")]
    Conflict(String),

    /// 资源不存在
    #[error("资源不存在: {0}")]
    NotFound(String),

    /// 连接错误（传输层失败、超时）
    #[error("连接错误: {0}")]
    Connection(String),

    /// 持久层错误
    #[error("数据库错误: {0}")]
    Database(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(String),
}

impl AppError {
    /// 稳定的错误代码，供界面展示
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "BAD_REQUEST",
            AppError::Authentication(_) => "UNAUTHORIZED",
            AppError::Authorization(_) => "FORBIDDEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Connection(_) => "SERVICE_UNAVAILABLE",
            AppError::Config(_) => "CONFIG_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    /// 是否应直接展示给用户
    ///
    /// 只有本地校验错误和写入失败会到达用户；拉取失败在内部恢复。
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_)
                | AppError::Authentication(_)
                | AppError::Authorization(_)
                | AppError::Conflict(_)
                | AppError::Connection(_)
                | AppError::Database(_)
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AppError::Serialization(e.to_string())
        } else {
            AppError::Connection(e.to_string())
        }
    }
}

/// 错误响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: String,
    /// 错误消息
    pub message: String,
    /// 详细信息
    pub details: Option<String>,
}

impl ErrorResponse {
    /// 创建新错误响应
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            details: None,
        }
    }

    /// 添加详细信息
    pub fn with_details(mut self, details: &str) -> Self {
        self.details = Some(details.to_string());
        self
    }
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        ErrorResponse::new(err.error_code(), &err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;
