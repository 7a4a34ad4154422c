//! 액션 디스패치 -- 매칭된 규칙의 액션을 능력 호출로 변환
//!
//! [`ActionDispatcher`]는 규칙의 액션 종류를 능력(log/webhook/kill/
//! quarantine) 호출로 해석하고, 전역 dry-run 모드를 존중하며, 결과를
//! 메트릭에 기록합니다. 능력 호출은 바운디드 타임아웃으로 감싸고
//! 재시도하지 않습니다. 어떤 실패도 이 경계를 넘어 전파되지 않습니다 —
//! 다음 알림의 처리는 항상 계속됩니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use holdfast_core::event::{ActionEvent, AlertEvent};
use holdfast_core::metrics::EngineMetrics;
use holdfast_core::types::{ActionKind, Alert, PolicyRule, Severity};
use holdfast_runtime_guard::RuntimeClient;

use crate::error::PolicyEngineError;
use crate::notify::Notifier;

/// 디스패치 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 능력 호출 성공 (또는 dry-run 기록) — executed 카운터 증가
    Executed,
    /// 능력 호출 실패/타임아웃 — failed 카운터 증가
    Failed,
    /// 등록된 핸들러 없음 — 카운터 증가 없이 알림 폐기
    Dropped,
}

/// 설정 로드 시점에 모든 규칙의 액션이 실행 가능한지 검증합니다.
///
/// 런타임이 연결되지 않은 상태에서 kill/quarantine을 선언한 규칙이 있으면
/// 알림마다 런타임에 발견되는 대신 시작 시점에 즉시 실패합니다.
pub fn ensure_action_support(
    rules: &[PolicyRule],
    runtime_available: bool,
) -> Result<(), PolicyEngineError> {
    for rule in rules {
        if rule.action.requires_runtime() && !runtime_available {
            return Err(PolicyEngineError::UnsupportedAction {
                rule: rule.name.clone(),
                action: rule.action.to_string(),
            });
        }
    }
    Ok(())
}

/// 액션 디스패처
///
/// 매칭되어 쿨다운을 통과한 알림 1건에 대해 정확히 1번의 능력 호출을
/// 수행합니다.
pub struct ActionDispatcher<R: RuntimeClient, N: Notifier> {
    /// 컨테이너 런타임 (degraded 모드에서는 None)
    runtime: Option<Arc<R>>,
    /// 통지 능력
    notifier: Arc<N>,
    /// 파이프라인 카운터 (엔진과 공유)
    metrics: Arc<EngineMetrics>,
    /// 감사용 액션 이벤트 채널
    action_tx: mpsc::Sender<ActionEvent>,
    /// dry-run 모드
    dry_run: bool,
    /// 능력 호출 타임아웃
    action_timeout: Duration,
}

impl<R: RuntimeClient, N: Notifier> ActionDispatcher<R, N> {
    /// 새 디스패처를 생성합니다.
    pub fn new(
        runtime: Option<Arc<R>>,
        notifier: Arc<N>,
        metrics: Arc<EngineMetrics>,
        action_tx: mpsc::Sender<ActionEvent>,
        dry_run: bool,
        action_timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            notifier,
            metrics,
            action_tx,
            dry_run,
            action_timeout,
        }
    }

    /// 규칙의 액션을 실행하고 결과를 집계합니다.
    pub async fn dispatch(&self, event: &AlertEvent, rule: &PolicyRule) -> DispatchOutcome {
        let alert = &event.alert;
        let kind = rule.action;

        warn!(
            policy = %rule.name,
            action = %kind,
            container_id = alert.short_container_id().unwrap_or("-"),
            container_name = alert.container_name.as_deref().unwrap_or("-"),
            rule = %alert.rule,
            "executing policy action"
        );

        if self.dry_run {
            info!(
                policy = %rule.name,
                action = %kind,
                container_id = alert.short_container_id().unwrap_or("-"),
                "dry run: action counted, not executed"
            );
            self.metrics.incr_executed(kind.as_str());
            self.emit_action_event(event, kind, true).await;
            return DispatchOutcome::Executed;
        }

        if kind.requires_runtime() && self.runtime.is_none() {
            error!(
                policy = %rule.name,
                action = %kind,
                "action kind has no registered handler, dropping alert"
            );
            return DispatchOutcome::Dropped;
        }

        let invocation = self.invoke(kind, alert, rule);
        let result = match tokio::time::timeout(self.action_timeout, invocation).await {
            Ok(result) => result,
            Err(_elapsed) => Err(PolicyEngineError::ActionTimeout {
                action: kind.to_string(),
                timeout_secs: self.action_timeout.as_secs(),
            }),
        };

        match result {
            Ok(()) => {
                info!(
                    policy = %rule.name,
                    action = %kind,
                    container_id = alert.short_container_id().unwrap_or("-"),
                    "policy action completed"
                );
                self.metrics.incr_executed(kind.as_str());
                self.emit_action_event(event, kind, true).await;
                DispatchOutcome::Executed
            }
            Err(e) => {
                error!(
                    policy = %rule.name,
                    action = %kind,
                    container_id = alert.short_container_id().unwrap_or("-"),
                    rule = %alert.rule,
                    error = %e,
                    "policy action failed"
                );
                self.metrics.incr_failed();
                self.emit_action_event(event, kind, false).await;
                DispatchOutcome::Failed
            }
        }
    }

    /// 단일 능력 호출 (타임아웃 없음 — 호출자가 감쌈).
    async fn invoke(
        &self,
        kind: ActionKind,
        alert: &Alert,
        rule: &PolicyRule,
    ) -> Result<(), PolicyEngineError> {
        match kind {
            ActionKind::LogOnly => {
                log_alert(alert, rule);
                Ok(())
            }
            ActionKind::Webhook => self.notifier.notify(alert, rule).await,
            ActionKind::Kill => {
                let runtime = self.require_runtime(rule, kind)?;
                let container_id = require_container_id(alert, kind)?;
                runtime.kill_container(container_id).await.map_err(|e| {
                    PolicyEngineError::ActionFailed {
                        action: kind.to_string(),
                        reason: e.to_string(),
                    }
                })
            }
            ActionKind::Quarantine => {
                let runtime = self.require_runtime(rule, kind)?;
                let container_id = require_container_id(alert, kind)?;
                let detached = runtime
                    .disconnect_all_networks(container_id)
                    .await
                    .map_err(|e| PolicyEngineError::ActionFailed {
                        action: kind.to_string(),
                        reason: e.to_string(),
                    })?;
                if detached == 0 {
                    // 분리할 네트워크가 없었음 — 원하는 최종 상태가 이미 성립
                    info!(
                        container_id = alert.short_container_id().unwrap_or("-"),
                        "container had no network attachments"
                    );
                } else {
                    info!(
                        container_id = alert.short_container_id().unwrap_or("-"),
                        networks_detached = detached,
                        "container quarantined"
                    );
                }
                Ok(())
            }
        }
    }

    fn require_runtime(
        &self,
        rule: &PolicyRule,
        kind: ActionKind,
    ) -> Result<&Arc<R>, PolicyEngineError> {
        self.runtime
            .as_ref()
            .ok_or_else(|| PolicyEngineError::UnsupportedAction {
                rule: rule.name.clone(),
                action: kind.to_string(),
            })
    }

    async fn emit_action_event(&self, event: &AlertEvent, kind: ActionKind, success: bool) {
        let target = event
            .alert
            .container_id
            .clone()
            .unwrap_or_else(|| "-".to_owned());
        let action_event =
            ActionEvent::with_trace(kind.as_str(), target, success, event.metadata.trace_id.clone());
        if let Err(e) = self.action_tx.send(action_event).await {
            error!(error = %e, "failed to send action event");
        }
    }
}

fn require_container_id<'a>(
    alert: &'a Alert,
    kind: ActionKind,
) -> Result<&'a str, PolicyEngineError> {
    alert
        .container_id
        .as_deref()
        .ok_or_else(|| PolicyEngineError::ActionFailed {
            action: kind.to_string(),
            reason: "alert has no container id".to_owned(),
        })
}

/// 심각도에 맞는 레벨로 보안 알림을 기록합니다.
fn log_alert(alert: &Alert, rule: &PolicyRule) {
    if alert.severity >= Severity::Critical {
        error!(
            rule = %alert.rule,
            severity = %alert.severity,
            container_id = alert.short_container_id().unwrap_or("-"),
            container_name = alert.container_name.as_deref().unwrap_or("-"),
            container_image = alert.container_image.as_deref().unwrap_or("-"),
            process = alert.proc_name.as_deref().unwrap_or("-"),
            cmdline = alert.proc_cmdline.as_deref().unwrap_or("-"),
            user = alert.user_name.as_deref().unwrap_or("-"),
            connection = alert.fd_name.as_deref().unwrap_or("-"),
            tags = ?alert.tags,
            policy = %rule.name,
            "SECURITY ALERT"
        );
    } else {
        warn!(
            rule = %alert.rule,
            severity = %alert.severity,
            container_id = alert.short_container_id().unwrap_or("-"),
            container_name = alert.container_name.as_deref().unwrap_or("-"),
            container_image = alert.container_image.as_deref().unwrap_or("-"),
            process = alert.proc_name.as_deref().unwrap_or("-"),
            cmdline = alert.proc_cmdline.as_deref().unwrap_or("-"),
            user = alert.user_name.as_deref().unwrap_or("-"),
            connection = alert.fd_name.as_deref().unwrap_or("-"),
            tags = ?alert.tags,
            policy = %rule.name,
            "SECURITY ALERT"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::SystemTime;

    use holdfast_core::types::ContainerInfo;
    use holdfast_runtime_guard::MockRuntimeClient;

    use crate::notify::MockNotifier;

    use super::*;

    fn sample_alert(container_id: Option<&str>) -> Alert {
        Alert {
            id: "alert-001".to_owned(),
            rule: "Reverse Shell in Container".to_owned(),
            severity: Severity::Critical,
            output: "test".to_owned(),
            time: SystemTime::now(),
            container_id: container_id.map(str::to_owned),
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

    fn rule_with_action(action: ActionKind) -> PolicyRule {
        PolicyRule {
            name: "test-rule".to_owned(),
            description: String::new(),
            severity_min: Severity::Warning,
            rule_patterns: Vec::new(),
            container_patterns: Vec::new(),
            image_patterns: Vec::new(),
            exclude_containers: Vec::new(),
            action,
            webhook_url: None,
            cooldown_secs: 0,
        }
    }

    fn sample_container(id: &str) -> ContainerInfo {
        ContainerInfo {
            id: id.to_owned(),
            name: "web-1".to_owned(),
            image: "nginx:latest".to_owned(),
            status: "running".to_owned(),
            created_at: SystemTime::now(),
        }
    }

    struct Harness {
        dispatcher: ActionDispatcher<MockRuntimeClient, MockNotifier>,
        runtime: Arc<MockRuntimeClient>,
        notifier: Arc<MockNotifier>,
        metrics: Arc<EngineMetrics>,
        action_rx: mpsc::Receiver<ActionEvent>,
    }

    fn harness(runtime: MockRuntimeClient, notifier: MockNotifier, dry_run: bool) -> Harness {
        let runtime = Arc::new(runtime);
        let notifier = Arc::new(notifier);
        let metrics = Arc::new(EngineMetrics::new());
        let (action_tx, action_rx) = mpsc::channel(16);
        let dispatcher = ActionDispatcher::new(
            Some(Arc::clone(&runtime)),
            Arc::clone(&notifier),
            Arc::clone(&metrics),
            action_tx,
            dry_run,
            Duration::from_secs(5),
        );
        Harness {
            dispatcher,
            runtime,
            notifier,
            metrics,
            action_rx,
        }
    }

    #[test]
    fn ensure_action_support_without_runtime() {
        let rules = vec![rule_with_action(ActionKind::Kill)];
        assert!(ensure_action_support(&rules, true).is_ok());
        assert!(matches!(
            ensure_action_support(&rules, false).unwrap_err(),
            PolicyEngineError::UnsupportedAction { .. }
        ));

        let passive = vec![
            rule_with_action(ActionKind::LogOnly),
            rule_with_action(ActionKind::Webhook),
        ];
        assert!(ensure_action_support(&passive, false).is_ok());
    }

    #[tokio::test]
    async fn log_only_always_executes() {
        let mut h = harness(MockRuntimeClient::new(), MockNotifier::new(), false);
        let event = AlertEvent::new(sample_alert(Some("abc123def456")));
        let outcome = h
            .dispatcher
            .dispatch(&event, &rule_with_action(ActionKind::LogOnly))
            .await;
        assert_eq!(outcome, DispatchOutcome::Executed);
        assert_eq!(h.metrics.actions_executed("log_only"), 1);

        let action_event = h.action_rx.recv().await.unwrap();
        assert!(action_event.success);
        assert_eq!(action_event.action_type, "log_only");
    }

    #[tokio::test]
    async fn kill_invokes_runtime_and_counts() {
        let runtime =
            MockRuntimeClient::new().with_containers(vec![sample_container("abc123def456")]);
        let mut h = harness(runtime, MockNotifier::new(), false);
        let event = AlertEvent::new(sample_alert(Some("abc123def456")));

        let outcome = h
            .dispatcher
            .dispatch(&event, &rule_with_action(ActionKind::Kill))
            .await;
        assert_eq!(outcome, DispatchOutcome::Executed);
        assert_eq!(h.runtime.killed(), vec!["abc123def456"]);
        assert_eq!(h.metrics.actions_executed("kill"), 1);
        assert_eq!(h.metrics.actions_failed(), 0);

        let action_event = h.action_rx.recv().await.unwrap();
        assert_eq!(action_event.target, "abc123def456");
        assert!(action_event.success);
    }

    #[tokio::test]
    async fn kill_without_container_id_fails() {
        let mut h = harness(MockRuntimeClient::new(), MockNotifier::new(), false);
        let event = AlertEvent::new(sample_alert(None));

        let outcome = h
            .dispatcher
            .dispatch(&event, &rule_with_action(ActionKind::Kill))
            .await;
        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_eq!(h.metrics.actions_failed(), 1);
        assert_eq!(h.metrics.actions_executed("kill"), 0);

        let action_event = h.action_rx.recv().await.unwrap();
        assert!(!action_event.success);
        assert_eq!(action_event.target, "-");
    }

    #[tokio::test]
    async fn kill_runtime_failure_counts_failed() {
        let runtime = MockRuntimeClient::new()
            .with_containers(vec![sample_container("abc123def456")])
            .with_failing_actions();
        let mut h = harness(runtime, MockNotifier::new(), false);
        let event = AlertEvent::new(sample_alert(Some("abc123def456")));

        let outcome = h
            .dispatcher
            .dispatch(&event, &rule_with_action(ActionKind::Kill))
            .await;
        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_eq!(h.metrics.actions_failed(), 1);
        assert!(!h.action_rx.recv().await.unwrap().success);
    }

    #[tokio::test]
    async fn quarantine_counts_detached_networks() {
        let runtime = MockRuntimeClient::new()
            .with_containers(vec![sample_container("abc123def456")])
            .with_networks("abc123def456", vec!["bridge".to_owned(), "app".to_owned()]);
        let h = harness(runtime, MockNotifier::new(), false);
        let event = AlertEvent::new(sample_alert(Some("abc123def456")));

        let outcome = h
            .dispatcher
            .dispatch(&event, &rule_with_action(ActionKind::Quarantine))
            .await;
        assert_eq!(outcome, DispatchOutcome::Executed);
        assert_eq!(h.runtime.quarantined(), vec!["abc123def456"]);
        assert_eq!(h.metrics.actions_executed("quarantine"), 1);
    }

    #[tokio::test]
    async fn quarantine_with_zero_attachments_is_success() {
        let runtime =
            MockRuntimeClient::new().with_containers(vec![sample_container("abc123def456")]);
        let h = harness(runtime, MockNotifier::new(), false);
        let event = AlertEvent::new(sample_alert(Some("abc123def456")));

        let outcome = h
            .dispatcher
            .dispatch(&event, &rule_with_action(ActionKind::Quarantine))
            .await;
        assert_eq!(outcome, DispatchOutcome::Executed);
        assert_eq!(h.metrics.actions_executed("quarantine"), 1);
        assert_eq!(h.metrics.actions_failed(), 0);
    }

    #[tokio::test]
    async fn webhook_success_and_failure() {
        let h = harness(MockRuntimeClient::new(), MockNotifier::new(), false);
        let event = AlertEvent::new(sample_alert(Some("abc123def456")));
        let outcome = h
            .dispatcher
            .dispatch(&event, &rule_with_action(ActionKind::Webhook))
            .await;
        assert_eq!(outcome, DispatchOutcome::Executed);
        assert_eq!(h.notifier.call_count(), 1);
        assert_eq!(h.metrics.actions_executed("webhook"), 1);

        let failing = harness(MockRuntimeClient::new(), MockNotifier::failing(), false);
        let outcome = failing
            .dispatcher
            .dispatch(&event, &rule_with_action(ActionKind::Webhook))
            .await;
        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_eq!(failing.metrics.actions_failed(), 1);
    }

    #[tokio::test]
    async fn dry_run_counts_without_invoking() {
        let runtime =
            MockRuntimeClient::new().with_containers(vec![sample_container("abc123def456")]);
        let mut h = harness(runtime, MockNotifier::new(), true);
        let event = AlertEvent::new(sample_alert(Some("abc123def456")));

        let outcome = h
            .dispatcher
            .dispatch(&event, &rule_with_action(ActionKind::Kill))
            .await;
        assert_eq!(outcome, DispatchOutcome::Executed);
        // 실제 능력은 호출되지 않음
        assert!(h.runtime.killed().is_empty());
        // executed 카운터는 증가
        assert_eq!(h.metrics.actions_executed("kill"), 1);
        assert!(h.action_rx.recv().await.unwrap().success);
    }

    #[tokio::test]
    async fn dry_run_skips_webhook_too() {
        let h = harness(MockRuntimeClient::new(), MockNotifier::new(), true);
        let event = AlertEvent::new(sample_alert(Some("abc123def456")));
        h.dispatcher
            .dispatch(&event, &rule_with_action(ActionKind::Webhook))
            .await;
        assert_eq!(h.notifier.call_count(), 0);
        assert_eq!(h.metrics.actions_executed("webhook"), 1);
    }

    #[tokio::test]
    async fn enforcement_without_runtime_drops_alert() {
        let notifier = Arc::new(MockNotifier::new());
        let metrics = Arc::new(EngineMetrics::new());
        let (action_tx, mut action_rx) = mpsc::channel(16);
        let dispatcher: ActionDispatcher<MockRuntimeClient, MockNotifier> = ActionDispatcher::new(
            None,
            Arc::clone(&notifier),
            Arc::clone(&metrics),
            action_tx,
            false,
            Duration::from_secs(5),
        );

        let event = AlertEvent::new(sample_alert(Some("abc123def456")));
        let outcome = dispatcher
            .dispatch(&event, &rule_with_action(ActionKind::Kill))
            .await;
        assert_eq!(outcome, DispatchOutcome::Dropped);
        // executed도 failed도 증가하지 않고, 이벤트도 없음
        assert_eq!(metrics.actions_executed("kill"), 0);
        assert_eq!(metrics.actions_failed(), 0);
        assert!(action_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_capability_times_out_as_failure() {
        struct SlowNotifier;

        impl Notifier for SlowNotifier {
            async fn notify(
                &self,
                _alert: &Alert,
                _rule: &PolicyRule,
            ) -> Result<(), PolicyEngineError> {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            }
        }

        let metrics = Arc::new(EngineMetrics::new());
        let (action_tx, mut action_rx) = mpsc::channel(16);
        let dispatcher: ActionDispatcher<MockRuntimeClient, SlowNotifier> = ActionDispatcher::new(
            Some(Arc::new(MockRuntimeClient::new())),
            Arc::new(SlowNotifier),
            Arc::clone(&metrics),
            action_tx,
            false,
            Duration::from_millis(10),
        );

        let event = AlertEvent::new(sample_alert(Some("abc123def456")));
        let outcome = dispatcher
            .dispatch(&event, &rule_with_action(ActionKind::Webhook))
            .await;
        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_eq!(metrics.actions_failed(), 1);
        assert!(!action_rx.recv().await.unwrap().success);
    }

    #[tokio::test]
    async fn action_event_preserves_trace_id() {
        let runtime =
            MockRuntimeClient::new().with_containers(vec![sample_container("abc123def456")]);
        let mut h = harness(runtime, MockNotifier::new(), false);
        let event = AlertEvent::with_trace(sample_alert(Some("abc123def456")), "my-trace-id");

        h.dispatcher
            .dispatch(&event, &rule_with_action(ActionKind::Kill))
            .await;
        let action_event = h.action_rx.recv().await.unwrap();
        assert_eq!(action_event.metadata.trace_id, "my-trace-id");
    }

    #[tokio::test]
    async fn dropped_channel_does_not_panic() {
        let runtime =
            MockRuntimeClient::new().with_containers(vec![sample_container("abc123def456")]);
        let h = harness(runtime, MockNotifier::new(), false);
        drop(h.action_rx);

        let event = AlertEvent::new(sample_alert(Some("abc123def456")));
        let outcome = h
            .dispatcher
            .dispatch(&event, &rule_with_action(ActionKind::Kill))
            .await;
        // 이벤트 채널이 닫혀도 액션 자체는 성공으로 집계됨
        assert_eq!(outcome, DispatchOutcome::Executed);
    }
}
