// 错误类型定义

use thiserror::Error;

// Clash API 请求错误
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("无效的控制器地址：{0}")]
    InvalidEndpoint(String),

    #[error("HTTP 请求失败：{0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}：{body}")]
    Status { status: u16, body: String },

    #[error("响应解析失败：{0}")]
    Decode(#[from] serde_json::Error),

    #[error("WebSocket 错误：{0}")]
    WebSocket(String),
}

impl ApiError {
    // 核心繁忙（503/504），可稍后重试
    pub fn is_busy(&self) -> bool {
        matches!(self, ApiError::Status { status: 503 | 504, .. })
    }
}

// 表单处理错误
#[derive(Error, Debug)]
pub enum FormError {
    // 开发期错误：失焦事件携带了表单不认识的字段名
    #[error("未知的输入字段：{0}")]
    UnknownField(String),

    #[error("字段 {field} 的取值无效：{value}")]
    InvalidValue { field: String, value: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

// 偏好设置存储错误
#[derive(Error, Debug)]
pub enum PreferenceError {
    #[error("读写偏好设置文件失败：{0}")]
    Io(#[from] std::io::Error),

    #[error("偏好设置格式错误：{0}")]
    Format(#[from] serde_json::Error),

    #[error("后端索引越界：{index}（共 {len} 个）")]
    BackendIndex { index: usize, len: usize },
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
