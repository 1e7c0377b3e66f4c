use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 后端（持久层）配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BackendConfig {
    /// 后端服务地址
    pub url: String,
    /// 匿名访问密钥
    pub anon_key: String,
    /// 便签表名
    pub notes_table: String,
    /// 用户资料表名
    pub profiles_table: String,
    /// 请求超时（秒）
    pub request_timeout: u64,
    /// 是否以特权身份读取（读取便签正文）
    pub privileged: bool,
}

/// 便签配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotesConfig {
    /// 便签正文最大字符数
    pub max_text_chars: usize,
}

/// 变更订阅配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FeedConfig {
    /// 订阅主题（支持 `notes:*` 通配）
    pub topic: String,
    /// 轮询间隔（秒），用于不支持推送的传输
    pub poll_interval_secs: u64,
    /// 广播通道容量
    pub channel_capacity: usize,
}

/// 通知配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NotificationConfig {
    /// 是否发送通知
    pub enabled: bool,
    /// 通知函数路径
    pub function_path: String,
    /// 邮件主题
    pub subject: String,
    /// 邮件正文（`{name}` 会被替换为作者名称）
    pub html: String,
    /// 作者无资料时使用的名称
    pub fallback_name: String,
}

/// 会话配置（无界面运行时使用的静态身份）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    /// 用户 ID
    pub user_id: Option<String>,
    /// 用户邮箱
    pub email: Option<String>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录
    pub log_dir: Option<PathBuf>,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 后端配置
    pub backend: BackendConfig,
    /// 便签配置
    pub notes: NotesConfig,
    /// 变更订阅配置
    pub feed: FeedConfig,
    /// 通知配置
    pub notification: NotificationConfig,
    /// 会话配置
    pub session: SessionConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 应用名称
    pub app_name: String,
    /// 环境
    pub environment: String,
}

impl AppConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            backend: BackendConfig {
                url: "http://localhost:54321".into(),
                anon_key: "dev-anon-key-change-in-production".into(),
                notes_table: "notes".into(),
                profiles_table: "profiles".into(),
                request_timeout: 30,
                privileged: false,
            },
            notes: NotesConfig {
                max_text_chars: 500,
            },
            feed: FeedConfig {
                topic: "notes:*".into(),
                poll_interval_secs: 5,
                channel_capacity: 64,
            },
            notification: NotificationConfig {
                enabled: true,
                function_path: "/functions/v1/send-note-email".into(),
                subject: "Your note was added to the tree".into(),
                html: "<p>Hi {name}, your note was added to the tree. Happy new year!</p>"
                    .into(),
                fallback_name: "Friend".into(),
            },
            session: SessionConfig::default(),
            logging: LoggingConfig {
                level: "debug".into(),
                structured: false,
                log_dir: None,
            },
            app_name: "tree-notes".into(),
            environment: "development".into(),
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::development();
        config.backend.url = String::new();
        config.backend.anon_key = String::new();
        config.feed.poll_interval_secs = 15;
        config.logging.level = "info".into();
        config.logging.structured = true;
        config.logging.log_dir = Some(PathBuf::from("./logs"));
        config.environment = "production".into();
        config
    }
}
