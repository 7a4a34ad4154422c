//! 에러 타입 — 도메인별 에러 정의

/// Holdfast 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum HoldfastError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 정책 평가/검증 에러
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// 컨테이너 런타임 에러
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// 알림 수신 에러
    #[error("intake error: {0}")]
    Intake(#[from] IntakeError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,
}

/// 정책 평가/검증 에러
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// 정책 규칙 유효성 검증 실패
    #[error("policy validation error: rule '{rule}': {reason}")]
    Validation { rule: String, reason: String },

    /// 등록된 핸들러가 없는 액션 종류를 참조
    #[error("rule '{rule}' uses action '{action}' with no registered handler")]
    UnsupportedAction { rule: String, action: String },

    /// 알림 전달 실패
    #[error("notification failed: {0}")]
    Notify(String),
}

/// 컨테이너 런타임 에러
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
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
        container_id: String,
        reason: String,
    },
}

/// 알림 수신 에러
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    /// 수신 소켓 바인딩 실패
    #[error("bind failed: {0}")]
    Bind(String),

    /// 페이로드 파싱 실패
    #[error("payload parse failed: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "general.log_level".to_owned(),
            reason: "must be one of: trace, debug, info, warn, error".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("general.log_level"));
        assert!(msg.contains("must be one of"));
    }

    #[test]
    fn pipeline_error_display() {
        assert_eq!(
            PipelineError::AlreadyRunning.to_string(),
            "pipeline already running"
        );
        assert!(
            PipelineError::InitFailed("no receiver".to_owned())
                .to_string()
                .contains("no receiver")
        );
    }

    #[test]
    fn policy_error_display() {
        let err = PolicyError::UnsupportedAction {
            rule: "crit-kill".to_owned(),
            action: "kill".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("crit-kill"));
        assert!(msg.contains("kill"));
    }

    #[test]
    fn runtime_error_display() {
        let err = RuntimeError::ActionFailed {
            container_id: "abc123".to_owned(),
            reason: "kill failed".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("kill failed"));
    }

    #[test]
    fn errors_convert_into_holdfast_error() {
        let err: HoldfastError = ConfigError::FileNotFound {
            path: "/etc/holdfast/holdfast.toml".to_owned(),
        }
        .into();
        assert!(matches!(err, HoldfastError::Config(_)));

        let err: HoldfastError = RuntimeError::NotFound("xyz".to_owned()).into();
        assert!(matches!(err, HoldfastError::Runtime(_)));

        let err: HoldfastError = IntakeError::Bind("port in use".to_owned()).into();
        assert!(matches!(err, HoldfastError::Intake(_)));
    }
}
