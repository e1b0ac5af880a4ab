//! 基础设施层
//!
//! 持有 HTTP 客户端与设备身份，只暴露能力，不认识业务流程

pub mod gateway;
pub mod identity;

pub use gateway::{ApiRequest, HttpGateway, Method, ProgressFn, RequestBody, Transport, USER_ID_HEADER};
pub use identity::DeviceIdentity;
