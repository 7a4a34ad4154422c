//! 이벤트 시스템 — 모듈 간 통신의 기본 단위
//!
//! 모든 모듈 간 통신은 이벤트 기반 메시지 패싱으로 수행됩니다.
//! [`EventMetadata`]는 모든 이벤트에 공통으로 포함되는 메타데이터이며,
//! [`Event`] trait은 모든 이벤트 타입이 구현해야 하는 인터페이스입니다.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::types::Alert;

// --- 모듈명 상수 ---

/// 알림 수신/정규화 모듈명
pub const MODULE_INTAKE: &str = "intake";
/// 정책 엔진 모듈명
pub const MODULE_POLICY_ENGINE: &str = "policy-engine";
/// 런타임 가드 모듈명
pub const MODULE_RUNTIME_GUARD: &str = "runtime-guard";

// --- 이벤트 타입 상수 ---

/// 알림 이벤트 타입
pub const EVENT_TYPE_ALERT: &str = "alert";
/// 액션 이벤트 타입
pub const EVENT_TYPE_ACTION: &str = "action";

/// 이벤트 메타데이터 — 모든 이벤트에 공통으로 포함되는 추적 정보
///
/// 각 이벤트의 발생 시각, 생성 모듈, 추적 ID를 담고 있어
/// 알림 수신부터 액션 실행까지의 흐름을 연결할 수 있습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
    /// 이벤트를 생성한 모듈명 (예: "intake", "policy-engine")
    pub source_module: String,
    /// 추적 ID — 같은 흐름의 이벤트를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새로운 UUID v4 trace_id를 생성하여 메타데이터를 만듭니다.
    ///
    /// 새로운 이벤트 체인의 시작점에서 사용합니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] source={} trace={}",
            unix_timestamp_str(self.timestamp),
            self.source_module,
            self.trace_id,
        )
    }
}

/// 모든 이벤트가 구현해야 하는 기본 trait
///
/// `Send + Sync + 'static` 바운드로 `tokio::mpsc` 채널을 통한
/// 안전한 전송을 보장합니다.
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터 (timestamp, source_module, trace_id)
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (로깅 및 라우팅에 사용)
    fn event_type(&self) -> &str;
}

/// 정규화된 알림 이벤트
///
/// intake가 원시 알림 페이로드를 정규화한 뒤 정책 엔진으로 전달합니다.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 정규화된 알림
    pub alert: Alert,
}

impl AlertEvent {
    /// 새로운 trace를 시작하는 알림 이벤트를 생성합니다.
    pub fn new(alert: Alert) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_INTAKE),
            alert,
        }
    }

    /// 기존 trace에 연결된 알림 이벤트를 생성합니다.
    pub fn with_trace(alert: Alert, trace_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::new(MODULE_INTAKE, trace_id),
            alert,
        }
    }
}

impl Event for AlertEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_ALERT
    }
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AlertEvent[{}] rule={} severity={} container={}",
            &self.id[..8.min(self.id.len())],
            self.alert.rule,
            self.alert.severity,
            self.alert.container_name.as_deref().unwrap_or("-"),
        )
    }
}

/// 실행된 액션 이벤트
///
/// 정책 매칭으로 대응 액션이 실행(또는 dry-run 기록)되었을 때 생성됩니다.
#[derive(Debug, Clone)]
pub struct ActionEvent {
    /// 이벤트 고유 ID
    pub id: String,
    /// 이벤트 메타데이터
    pub metadata: EventMetadata,
    /// 액션 타입 (예: "kill", "quarantine")
    pub action_type: String,
    /// 대상 (컨테이너 ID 또는 "-")
    pub target: String,
    /// 성공 여부
    pub success: bool,
}

impl ActionEvent {
    /// 새로운 trace를 시작하는 액션 이벤트를 생성합니다.
    pub fn new(action_type: impl Into<String>, target: impl Into<String>, success: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::with_new_trace(MODULE_POLICY_ENGINE),
            action_type: action_type.into(),
            target: target.into(),
            success,
        }
    }

    /// 기존 trace에 연결된 액션 이벤트를 생성합니다.
    pub fn with_trace(
        action_type: impl Into<String>,
        target: impl Into<String>,
        success: bool,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: EventMetadata::new(MODULE_POLICY_ENGINE, trace_id),
            action_type: action_type.into(),
            target: target.into(),
            success,
        }
    }
}

impl Event for ActionEvent {
    fn event_id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn event_type(&self) -> &str {
        EVENT_TYPE_ACTION
    }
}

impl fmt::Display for ActionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "OK" } else { "FAILED" };
        write!(
            f,
            "ActionEvent[{}] type={} target={} status={}",
            &self.id[..8.min(self.id.len())],
            self.action_type,
            self.target,
            status,
        )
    }
}

/// SystemTime을 사람이 읽을 수 있는 형태로 변환합니다.
fn unix_timestamp_str(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => {
            let secs = duration.as_secs();
            format!("{secs}")
        }
        Err(_) => "unknown".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::types::Severity;

    use super::*;

    fn sample_alert() -> Alert {
        Alert {
            id: "alert-001".to_owned(),
            rule: "Terminal shell in container".to_owned(),
            severity: Severity::Notice,
            output: "A shell was spawned in a container".to_owned(),
            time: SystemTime::now(),
            container_id: Some("abc123def456".to_owned()),
            container_name: Some("web-1".to_owned()),
            container_image: Some("nginx:latest".to_owned()),
            proc_name: None,
            proc_cmdline: None,
            proc_pid: None,
            parent_name: None,
            user_id: None,
            user_name: None,
            fd_name: None,
            fd_type: None,
            tags: Vec::new(),
            output_fields: HashMap::new(),
            source: "syscall".to_owned(),
            hostname: None,
        }
    }

    #[test]
    fn event_metadata_new_preserves_trace_id() {
        let meta = EventMetadata::new("test-module", "trace-abc-123");
        assert_eq!(meta.source_module, "test-module");
        assert_eq!(meta.trace_id, "trace-abc-123");
        assert!(meta.timestamp <= SystemTime::now());
    }

    #[test]
    fn event_metadata_with_new_trace_generates_uuid() {
        let meta = EventMetadata::with_new_trace("test-module");
        // UUID v4 형식 확인: 8-4-4-4-12
        assert_eq!(meta.trace_id.len(), 36);
        assert_eq!(meta.trace_id.chars().filter(|c| *c == '-').count(), 4);
    }

    #[test]
    fn event_metadata_display() {
        let meta = EventMetadata::new("intake", "trace-xyz");
        let display = meta.to_string();
        assert!(display.contains("intake"));
        assert!(display.contains("trace-xyz"));
    }

    #[test]
    fn alert_event_implements_event_trait() {
        let event = AlertEvent::new(sample_alert());
        assert_eq!(event.event_type(), "alert");
        assert!(!event.event_id().is_empty());
        assert_eq!(event.metadata().source_module, "intake");
    }

    #[test]
    fn alert_event_with_trace_preserves_trace_id() {
        let event = AlertEvent::with_trace(sample_alert(), "my-trace-id");
        assert_eq!(event.metadata().trace_id, "my-trace-id");
    }

    #[test]
    fn alert_event_display() {
        let event = AlertEvent::new(sample_alert());
        let display = event.to_string();
        assert!(display.contains("Terminal shell in container"));
        assert!(display.contains("notice"));
        assert!(display.contains("web-1"));
    }

    #[test]
    fn action_event_implements_event_trait() {
        let event = ActionEvent::new("kill", "abc123def456", true);
        assert_eq!(event.event_type(), "action");
        assert_eq!(event.action_type, "kill");
        assert_eq!(event.target, "abc123def456");
        assert!(event.success);
    }

    #[test]
    fn action_event_with_trace() {
        let event = ActionEvent::with_trace("quarantine", "abc123", false, "trace-from-alert");
        assert_eq!(event.metadata().trace_id, "trace-from-alert");
        assert!(!event.success);
    }

    #[test]
    fn action_event_display_success() {
        let event = ActionEvent::new("kill", "abc", true);
        assert!(event.to_string().contains("OK"));
    }

    #[test]
    fn action_event_display_failure() {
        let event = ActionEvent::new("kill", "abc", false);
        assert!(event.to_string().contains("FAILED"));
    }

    #[test]
    fn events_are_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<AlertEvent>();
        assert_send_sync::<ActionEvent>();
    }
}
