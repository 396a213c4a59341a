//! 掉落引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DropError {
    #[error("规则文件解析失败: {0}")]
    ConfigParse(String),

    #[error("文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("获取记录存储失败: {0}")]
    LogStore(String),

    #[error("展示动作执行失败: {0}")]
    Presentation(String),

    #[error("无效的指令参数: {0}")]
    InvalidInput(String),

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),
}

impl DropError {
    /// 获取错误码，用于日志聚合与指标标签
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "CONFIG_PARSE_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::LogStore(_) => "LOG_STORE_ERROR",
            Self::Presentation(_) => "PRESENTATION_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// 是否属于用户输入错误（直接回复调用方，不记录为故障）
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

impl From<serde_yaml::Error> for DropError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::ConfigParse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DropError>;
