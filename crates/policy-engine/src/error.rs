//! 정책 엔진 에러 타입
//!
//! [`PolicyEngineError`]는 정책 엔진 내부에서 발생하는 모든 에러를
//! 표현합니다. `From<PolicyEngineError> for HoldfastError` 변환이 구현되어
//! 있어 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use holdfast_core::error::{ConfigError, HoldfastError, PipelineError, PolicyError};

/// 정책 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum PolicyEngineError {
    /// 정책 규칙 유효성 검증 실패
    #[error("rule validation error: rule '{rule}': {reason}")]
    RuleValidation {
        /// 문제가 된 규칙 이름
        rule: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 등록된 핸들러가 없는 액션 종류를 사용
    #[error("rule '{rule}' uses action '{action}' with no registered handler")]
    UnsupportedAction {
        /// 문제가 된 규칙 이름
        rule: String,
        /// 액션 종류
        action: String,
    },

    /// 웹훅 목적지가 설정되지 않음
    #[error("no webhook url configured (rule override or engine default required)")]
    NoWebhookUrl,

    /// 웹훅 전달 실패
    #[error("webhook delivery failed: {0}")]
    NotifyFailed(String),

    /// 액션 실행 실패
    #[error("action '{action}' failed: {reason}")]
    ActionFailed {
        /// 액션 종류
        action: String,
        /// 실패 사유
        reason: String,
    },

    /// 액션 실행 타임아웃
    #[error("action '{action}' timed out after {timeout_secs}s")]
    ActionTimeout {
        /// 액션 종류
        action: String,
        /// 타임아웃 (초)
        timeout_secs: u64,
    },

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

impl From<PolicyEngineError> for HoldfastError {
    fn from(err: PolicyEngineError) -> Self {
        match err {
            PolicyEngineError::RuleValidation { rule, reason } => {
                HoldfastError::Policy(PolicyError::Validation { rule, reason })
            }
            PolicyEngineError::UnsupportedAction { rule, action } => {
                HoldfastError::Policy(PolicyError::UnsupportedAction { rule, action })
            }
            PolicyEngineError::NoWebhookUrl | PolicyEngineError::NotifyFailed(_) => {
                HoldfastError::Policy(PolicyError::Notify(err.to_string()))
            }
            PolicyEngineError::ActionFailed { .. } | PolicyEngineError::ActionTimeout { .. } => {
                HoldfastError::Policy(PolicyError::Notify(err.to_string()))
            }
            PolicyEngineError::Config { field, reason } => {
                HoldfastError::Config(ConfigError::InvalidValue { field, reason })
            }
            PolicyEngineError::Channel(msg) => {
                HoldfastError::Pipeline(PipelineError::ChannelSend(msg))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_validation_display() {
        let err = PolicyEngineError::RuleValidation {
            rule: "crit".to_owned(),
            reason: "empty name".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("crit"));
        assert!(msg.contains("empty name"));
    }

    #[test]
    fn unsupported_action_display() {
        let err = PolicyEngineError::UnsupportedAction {
            rule: "crit-kill".to_owned(),
            action: "kill".to_owned(),
        };
        assert!(err.to_string().contains("no registered handler"));
    }

    #[test]
    fn action_timeout_display() {
        let err = PolicyEngineError::ActionTimeout {
            action: "webhook".to_owned(),
            timeout_secs: 10,
        };
        assert!(err.to_string().contains("timed out after 10s"));
    }

    #[test]
    fn converts_to_holdfast_error() {
        let err: HoldfastError = PolicyEngineError::NoWebhookUrl.into();
        assert!(matches!(err, HoldfastError::Policy(PolicyError::Notify(_))));

        let err: HoldfastError = PolicyEngineError::UnsupportedAction {
            rule: "r".to_owned(),
            action: "kill".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            HoldfastError::Policy(PolicyError::UnsupportedAction { .. })
        ));

        let err: HoldfastError = PolicyEngineError::Channel("closed".to_owned()).into();
        assert!(matches!(err, HoldfastError::Pipeline(_)));
    }
}
