//! 알림 수신 에러 타입

use holdfast_core::error::{ConfigError, HoldfastError, IntakeError as CoreIntakeError};

/// 알림 수신 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    /// 수신 소켓 바인딩 실패
    #[error("bind failed on {addr}: {reason}")]
    Bind {
        /// 바인드 시도 주소
        addr: String,
        /// 실패 사유
        reason: String,
    },

    /// 페이로드 파싱 실패
    #[error("payload parse failed: {0}")]
    Parse(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),
}

impl From<IntakeError> for HoldfastError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::Bind { addr, reason } => {
                HoldfastError::Intake(CoreIntakeError::Bind(format!("{addr}: {reason}")))
            }
            IntakeError::Parse(msg) | IntakeError::Channel(msg) => {
                HoldfastError::Intake(CoreIntakeError::Parse(msg))
            }
            IntakeError::Config { field, reason } => {
                HoldfastError::Config(ConfigError::InvalidValue { field, reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_display() {
        let err = IntakeError::Bind {
            addr: "0.0.0.0:8766".to_owned(),
            reason: "address in use".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0.0.0.0:8766"));
        assert!(msg.contains("address in use"));
    }

    #[test]
    fn converts_to_holdfast_error() {
        let err: HoldfastError = IntakeError::Parse("bad json".to_owned()).into();
        assert!(matches!(err, HoldfastError::Intake(_)));

        let err: HoldfastError = IntakeError::Config {
            field: "port".to_owned(),
            reason: "zero".to_owned(),
        }
        .into();
        assert!(matches!(err, HoldfastError::Config(_)));
    }
}
