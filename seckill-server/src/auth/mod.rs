//! 用户身份
//!
//! 会话认证不在本服务范围内；上游网关校验登录后通过 `X-User-Id`
//! 头透传用户 ID，[`CurrentUser`] 提取器负责读取与校验。

pub mod extractor;

pub use extractor::{CurrentUser, USER_ID_HEADER};
