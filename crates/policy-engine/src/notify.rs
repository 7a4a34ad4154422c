//! 외부 알림 전달 -- 웹훅 통지 능력
//!
//! [`Notifier`] trait은 디스패처가 호출하는 통지 능력의 계약이고,
//! [`WebhookNotifier`]는 구조화된 알림 요약을 HTTP POST로 전달하는
//! 프로덕션 구현입니다. URL은 규칙별 오버라이드가 전역 기본값보다
//! 우선합니다.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use holdfast_core::types::{Alert, PolicyRule};

use crate::error::PolicyEngineError;

/// 통지 능력 계약
///
/// 구현체는 성공/실패를 `Result`로 보고해야 하며, 전달 실패가 호출자를
/// 중단시켜서는 안 됩니다 (디스패처가 실패로 집계).
pub trait Notifier: Send + Sync + 'static {
    /// 알림 요약을 설정된 목적지로 전달합니다.
    ///
    /// # Errors
    /// - [`PolicyEngineError::NoWebhookUrl`]: 목적지가 설정되지 않음
    /// - [`PolicyEngineError::NotifyFailed`]: 전송 실패 또는 비 2xx 응답
    fn notify(
        &self,
        alert: &Alert,
        rule: &PolicyRule,
    ) -> impl Future<Output = Result<(), PolicyEngineError>> + Send;
}

/// 웹훅 통지 구현
///
/// `reqwest` 클라이언트에 바운디드 타임아웃을 설정하여 전달이 무한정
/// 대기하지 않도록 합니다. 재시도는 하지 않습니다.
pub struct WebhookNotifier {
    client: reqwest::Client,
    default_url: Option<String>,
}

impl WebhookNotifier {
    /// 새 웹훅 통지기를 생성합니다.
    ///
    /// # Arguments
    /// - `default_url`: 규칙별 오버라이드가 없을 때 사용할 전역 URL
    /// - `timeout`: 요청 전체에 적용되는 타임아웃
    pub fn new(default_url: Option<String>, timeout: Duration) -> Result<Self, PolicyEngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PolicyEngineError::NotifyFailed(format!("client build failed: {e}")))?;
        Ok(Self {
            client,
            default_url,
        })
    }

    /// 전달할 구조화된 페이로드를 생성합니다.
    pub fn payload(alert: &Alert, rule: &PolicyRule) -> serde_json::Value {
        let time_secs = alert
            .time
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        serde_json::json!({
            "source": "holdfast",
            "alert": {
                "rule": alert.rule,
                "severity": alert.severity,
                "output": alert.output,
                "time": time_secs,
                "container_id": alert.container_id,
                "container_name": alert.container_name,
                "container_image": alert.container_image,
                "process": alert.proc_name,
                "cmdline": alert.proc_cmdline,
                "user": alert.user_name,
                "tags": alert.tags,
            },
            "policy": {
                "name": rule.name,
                "action": rule.action,
            },
        })
    }
}

impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &Alert, rule: &PolicyRule) -> Result<(), PolicyEngineError> {
        let url = rule
            .webhook_url
            .as_deref()
            .or(self.default_url.as_deref())
            .ok_or(PolicyEngineError::NoWebhookUrl)?;

        let payload = Self::payload(alert, rule);

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PolicyEngineError::NotifyFailed(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(url = url, status = %status, "webhook notification sent");
            Ok(())
        } else {
            Err(PolicyEngineError::NotifyFailed(format!(
                "webhook {url} returned status {status}"
            )))
        }
    }
}

/// 테스트용 통지 더블
///
/// 전달된 (규칙 이름, 탐지 규칙명) 쌍을 기록하며, 실패 모드를 설정할 수
/// 있습니다. 이 크레이트와 하위 크레이트의 테스트에서 사용됩니다.
#[derive(Default)]
pub struct MockNotifier {
    fail: bool,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockNotifier {
    /// 항상 성공하는 mock을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 항상 실패하는 mock을 생성합니다.
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 지금까지 기록된 호출 수를 반환합니다.
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// 기록된 (규칙 이름, 탐지 규칙명) 호출 목록을 반환합니다.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for MockNotifier {
    async fn notify(&self, alert: &Alert, rule: &PolicyRule) -> Result<(), PolicyEngineError> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((rule.name.clone(), alert.rule.clone()));
        if self.fail {
            return Err(PolicyEngineError::NotifyFailed("mock failure".to_owned()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use holdfast_core::types::{ActionKind, Severity};

    use super::*;

    fn sample_alert() -> Alert {
        Alert {
            id: "alert-001".to_owned(),
            rule: "Reverse Shell in Container".to_owned(),
            severity: Severity::Critical,
            output: "A shell was spawned with a network fd".to_owned(),
            time: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            container_id: Some("abc123def456".to_owned()),
            container_name: Some("web-1".to_owned()),
            container_image: Some("nginx:latest".to_owned()),
            proc_name: Some("bash".to_owned()),
            proc_cmdline: Some("bash -i".to_owned()),
            proc_pid: Some(4242),
            parent_name: None,
            user_id: Some(0),
            user_name: Some("root".to_owned()),
            fd_name: None,
            fd_type: None,
            tags: vec!["mitre_execution".to_owned()],
            output_fields: HashMap::new(),
            source: "syscall".to_owned(),
            hostname: None,
        }
    }

    fn sample_rule(webhook_url: Option<&str>) -> PolicyRule {
        PolicyRule {
            name: "crit-webhook".to_owned(),
            description: String::new(),
            severity_min: Severity::Critical,
            rule_patterns: Vec::new(),
            container_patterns: Vec::new(),
            image_patterns: Vec::new(),
            exclude_containers: Vec::new(),
            action: ActionKind::Webhook,
            webhook_url: webhook_url.map(str::to_owned),
            cooldown_secs: 0,
        }
    }

    #[test]
    fn payload_contains_alert_and_policy() {
        let payload = WebhookNotifier::payload(&sample_alert(), &sample_rule(None));
        assert_eq!(payload["source"], "holdfast");
        assert_eq!(payload["alert"]["rule"], "Reverse Shell in Container");
        assert_eq!(payload["alert"]["severity"], "critical");
        assert_eq!(payload["alert"]["container_name"], "web-1");
        assert_eq!(payload["alert"]["time"], 1_700_000_000u64);
        assert_eq!(payload["policy"]["name"], "crit-webhook");
        assert_eq!(payload["policy"]["action"], "webhook");
    }

    #[test]
    fn payload_handles_missing_optional_fields() {
        let mut alert = sample_alert();
        alert.container_id = None;
        alert.user_name = None;
        let payload = WebhookNotifier::payload(&alert, &sample_rule(None));
        assert!(payload["alert"]["container_id"].is_null());
        assert!(payload["alert"]["user"].is_null());
    }

    #[tokio::test]
    async fn no_url_configured_is_a_failure() {
        let notifier = WebhookNotifier::new(None, Duration::from_secs(1)).unwrap();
        let result = notifier.notify(&sample_alert(), &sample_rule(None)).await;
        assert!(matches!(
            result.unwrap_err(),
            PolicyEngineError::NoWebhookUrl
        ));
    }

    #[tokio::test]
    async fn unreachable_url_is_a_failure() {
        let notifier = WebhookNotifier::new(
            Some("http://127.0.0.1:9/falco".to_owned()),
            Duration::from_secs(1),
        )
        .unwrap();
        let result = notifier.notify(&sample_alert(), &sample_rule(None)).await;
        assert!(matches!(
            result.unwrap_err(),
            PolicyEngineError::NotifyFailed(_)
        ));
    }

    #[tokio::test]
    async fn rule_url_overrides_default() {
        // 규칙 URL이 우선한다는 것은 실패 메시지에 규칙 URL이 나타나는 것으로 확인
        let notifier = WebhookNotifier::new(
            Some("http://127.0.0.1:9/default".to_owned()),
            Duration::from_secs(1),
        )
        .unwrap();
        let rule = sample_rule(Some("http://127.0.0.1:9/override"));
        let err = notifier
            .notify(&sample_alert(), &rule)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/override"));
    }

    #[tokio::test]
    async fn mock_notifier_records_calls() {
        let notifier = MockNotifier::new();
        notifier
            .notify(&sample_alert(), &sample_rule(None))
            .await
            .unwrap();
        assert_eq!(notifier.call_count(), 1);
        assert_eq!(
            notifier.calls()[0],
            (
                "crit-webhook".to_owned(),
                "Reverse Shell in Container".to_owned()
            )
        );
    }

    #[tokio::test]
    async fn mock_notifier_failing_mode() {
        let notifier = MockNotifier::failing();
        let result = notifier.notify(&sample_alert(), &sample_rule(None)).await;
        assert!(result.is_err());
        // 실패해도 호출 자체는 기록됨
        assert_eq!(notifier.call_count(), 1);
    }
}
