//! 런타임 가드 에러 타입
//!
//! [`RuntimeGuardError`]는 런타임 가드 내부에서 발생하는 모든 에러를
//! 표현합니다. `From<RuntimeGuardError> for HoldfastError` 변환이 구현되어
//! 있어 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use holdfast_core::error::{HoldfastError, RuntimeError};

/// 런타임 가드 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum RuntimeGuardError {
    /// 런타임 API 호출 실패
    #[error("runtime api error: {0}")]
    Api(String),

    /// 런타임 소켓 연결 실패
    #[error("runtime connection error: {0}")]
    Connection(String),

    /// 컨테이너를 찾을 수 없음
    #[error("container not found: {0}")]
    NotFound(String),

    /// 대응 액션 실행 실패
    #[error("action failed for container '{container_id}': {reason}")]
    ActionFailed {
        /// 대상 컨테이너 ID
        container_id: String,
        /// 실패 사유
        reason: String,
    },
}

impl From<RuntimeGuardError> for HoldfastError {
    fn from(err: RuntimeGuardError) -> Self {
        match err {
            RuntimeGuardError::Api(msg) => HoldfastError::Runtime(RuntimeError::Api(msg)),
            RuntimeGuardError::Connection(msg) => {
                HoldfastError::Runtime(RuntimeError::Connection(msg))
            }
            RuntimeGuardError::NotFound(id) => HoldfastError::Runtime(RuntimeError::NotFound(id)),
            RuntimeGuardError::ActionFailed {
                container_id,
                reason,
            } => HoldfastError::Runtime(RuntimeError::ActionFailed {
                container_id,
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = RuntimeGuardError::Api("list containers failed".to_owned());
        assert!(err.to_string().contains("list containers failed"));
    }

    #[test]
    fn action_failed_display() {
        let err = RuntimeGuardError::ActionFailed {
            container_id: "abc123".to_owned(),
            reason: "kill failed".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("kill failed"));
    }

    #[test]
    fn converts_to_holdfast_error() {
        let err: HoldfastError = RuntimeGuardError::NotFound("xyz".to_owned()).into();
        assert!(matches!(
            err,
            HoldfastError::Runtime(RuntimeError::NotFound(_))
        ));

        let err: HoldfastError = RuntimeGuardError::ActionFailed {
            container_id: "abc".to_owned(),
            reason: "boom".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            HoldfastError::Runtime(RuntimeError::ActionFailed { .. })
        ));
    }
}
