//! 알림 수신 설정
//!
//! [`IntakeConfig`]는 core의 [`ReceiverConfig`](holdfast_core::config::ReceiverConfig)를
//! 기반으로 수신기 전용 설정을 제공합니다.

use holdfast_core::config::ReceiverConfig;

use crate::error::IntakeError;

/// 알림 수신기 설정
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// 수신 바인드 주소
    pub listen_addr: String,
    /// 수신 포트 (테스트에서는 0으로 임시 포트 할당 가능)
    pub port: u16,
    /// 알림 채널 용량
    pub channel_capacity: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_owned(),
            port: 8766,
            channel_capacity: 256,
        }
    }
}

impl IntakeConfig {
    /// core의 `ReceiverConfig`에서 수신기 설정을 생성합니다.
    pub fn from_core(core: &ReceiverConfig) -> Self {
        Self {
            listen_addr: core.listen_addr.clone(),
            port: core.port,
            channel_capacity: core.channel_capacity,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IntakeError> {
        if self.listen_addr.is_empty() {
            return Err(IntakeError::Config {
                field: "listen_addr".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        if self.channel_capacity == 0 {
            return Err(IntakeError::Config {
                field: "channel_capacity".to_owned(),
                reason: "must be non-zero".to_owned(),
            });
        }
        Ok(())
    }

    /// 바인드 대상 주소 문자열을 반환합니다.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.port)
    }
}
