//! 정책 엔진 오케스트레이터 -- 알림 수신/평가/디스패치 전체 흐름 관리
//!
//! [`PolicyEngine`]은 core의 [`Pipeline`] trait을 구현하여
//! `holdfast-daemon`에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! AlertEvent ──mpsc──> PolicyEngine (단일 처리 태스크)
//!                          |
//!                     ExclusionList.is_excluded()
//!                          |
//!                     RuleSet.first_match()
//!                          |
//!                     CooldownTracker.check_and_arm()
//!                          |
//!                     ActionDispatcher.dispatch()
//!                          |
//!                     ActionEvent ──mpsc──> downstream
//! ```
//!
//! 쿨다운 상태와 카운터 변경은 모두 단일 태스크 안에서 일어나므로
//! 같은 (컨테이너, 규칙) 키의 두 알림이 동시에 윈도우를 통과할 수 없습니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use holdfast_core::config::ResolvedEngineConfig;
use holdfast_core::error::HoldfastError;
use holdfast_core::event::{ActionEvent, AlertEvent};
use holdfast_core::metrics::{self as metric_names, EngineMetrics};
use holdfast_core::pipeline::{HealthStatus, Pipeline};
use holdfast_runtime_guard::RuntimeClient;

use crate::cooldown::CooldownTracker;
use crate::dispatch::{ActionDispatcher, ensure_action_support};
use crate::error::PolicyEngineError;
use crate::notify::Notifier;
use crate::rule::{ExclusionList, RuleSet};

/// 엔진 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum EngineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 처리 태스크로 이동되는 엔진 내부 상태
///
/// 쿨다운 맵을 독점 소유하여 check-and-arm의 원자성을 보장합니다.
struct EngineWorker<R: RuntimeClient, N: Notifier> {
    rules: RuleSet,
    exclusions: ExclusionList,
    cooldowns: CooldownTracker,
    dispatcher: ActionDispatcher<R, N>,
    metrics: Arc<EngineMetrics>,
}

impl<R: RuntimeClient, N: Notifier> EngineWorker<R, N> {
    /// 알림 1건을 완료까지 처리합니다:
    /// 제외 → 매칭 → 쿨다운 → 디스패치 → 메트릭.
    async fn process_alert(&mut self, event: AlertEvent) {
        self.metrics.incr_received();
        debug!(
            alert_id = %event.alert.id,
            rule = %event.alert.rule,
            severity = %event.alert.severity,
            "received alert event"
        );

        if self.exclusions.is_excluded(&event.alert) {
            self.metrics.incr_skipped_excluded();
            debug!(
                container_name = event.alert.container_name.as_deref().unwrap_or("-"),
                "container excluded from enforcement"
            );
            return;
        }

        let Some(rule) = self.rules.first_match(&event.alert) else {
            debug!(
                rule = %event.alert.rule,
                severity = %event.alert.severity,
                "no policy matched"
            );
            return;
        };
        self.metrics.incr_matched();

        if !self.cooldowns.check_and_arm(&event.alert, rule).is_allowed() {
            self.metrics.incr_skipped_cooldown();
            debug!(
                container_id = event.alert.short_container_id().unwrap_or("-"),
                policy = %rule.name,
                "action skipped due to cooldown"
            );
            return;
        }

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(metric_names::ENGINE_COOLDOWN_KEYS).set(self.cooldowns.len() as f64);

        self.dispatcher.dispatch(&event, rule).await;
    }
}

/// 정책 엔진 -- 알림 수신, 정책 평가, 대응 디스패치의 전체 흐름을 관리합니다.
///
/// core의 `Pipeline` trait을 구현하여 `holdfast-daemon`에서
/// 다른 모듈과 동일한 생명주기(start/stop/health_check)로 관리됩니다.
///
/// # 사용 예시
/// ```ignore
/// use holdfast_policy_engine::{PolicyEngineBuilder, WebhookNotifier};
///
/// let (engine, action_rx) = PolicyEngineBuilder::new()
///     .config(resolved)
///     .runtime(runtime)
///     .notifier(notifier)
///     .alert_receiver(alert_rx)  // from intake
///     .build()?;
///
/// engine.start().await?;
/// ```
pub struct PolicyEngine<R: RuntimeClient, N: Notifier> {
    /// 현재 상태
    state: EngineState,
    /// 컨테이너 런타임 (health check용; degraded 모드에서는 None)
    runtime: Option<Arc<R>>,
    /// 파이프라인 카운터 (처리 태스크와 공유)
    metrics: Arc<EngineMetrics>,
    /// 알림 수신 채널 (start 시 소비됨)
    alert_rx: Option<mpsc::Receiver<AlertEvent>>,
    /// 처리 태스크로 이동될 내부 상태 (start 시 소비됨)
    worker: Option<EngineWorker<R, N>>,
    /// 종료 신호 토큰
    cancel: CancellationToken,
    /// 처리 태스크 핸들
    task: Option<tokio::task::JoinHandle<()>>,
    /// 로드된 규칙 수
    rule_count: usize,
}

impl<R: RuntimeClient, N: Notifier> PolicyEngine<R, N> {
    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            EngineState::Initialized => "initialized",
            EngineState::Running => "running",
            EngineState::Stopped => "stopped",
        }
    }

    /// 파이프라인 카운터 핸들을 반환합니다.
    ///
    /// 외부 리포팅 엔드포인트(intake의 `/metrics`)가 스냅샷을 읽을 때
    /// 사용합니다.
    pub fn metrics(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// 로드된 규칙 수를 반환합니다.
    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    /// 런타임이 연결되어 있는지 여부.
    pub fn runtime_attached(&self) -> bool {
        self.runtime.is_some()
    }
}

impl<R: RuntimeClient, N: Notifier> Pipeline for PolicyEngine<R, N> {
    fn name(&self) -> &str {
        "policy-engine"
    }

    async fn start(&mut self) -> Result<(), HoldfastError> {
        if self.state == EngineState::Running {
            return Err(holdfast_core::error::PipelineError::AlreadyRunning.into());
        }

        info!("starting policy engine");

        let mut alert_rx = self.alert_rx.take().ok_or(HoldfastError::Pipeline(
            holdfast_core::error::PipelineError::InitFailed(
                "alert receiver not available (was it consumed by a previous start? rebuild the engine to restart)"
                    .to_owned(),
            ),
        ))?;
        let mut worker = self.worker.take().ok_or(HoldfastError::Pipeline(
            holdfast_core::error::PipelineError::InitFailed(
                "engine worker already consumed".to_owned(),
            ),
        ))?;

        let cancel = self.cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("shutdown requested, stopping engine processing loop");
                        break;
                    }
                    maybe_event = alert_rx.recv() => {
                        match maybe_event {
                            Some(event) => worker.process_alert(event).await,
                            None => {
                                info!("alert channel closed, stopping engine processing loop");
                                break;
                            }
                        }
                    }
                }
            }
        });

        self.task = Some(task);
        self.state = EngineState::Running;
        info!(rules = self.rule_count, "policy engine started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), HoldfastError> {
        if self.state != EngineState::Running {
            return Err(holdfast_core::error::PipelineError::NotRunning.into());
        }

        info!("stopping policy engine");
        self.cancel.cancel();

        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            error!(error = %e, "engine processing task terminated abnormally");
        }

        self.state = EngineState::Stopped;
        info!("policy engine stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            EngineState::Running => match &self.runtime {
                Some(runtime) => {
                    if runtime.ping().await.is_ok() {
                        HealthStatus::Healthy
                    } else {
                        HealthStatus::Degraded("container runtime not reachable".to_owned())
                    }
                }
                None => HealthStatus::Degraded(
                    "no container runtime attached, enforcement disabled".to_owned(),
                ),
            },
            EngineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            EngineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 정책 엔진 빌더
///
/// 엔진을 구성하고 필요한 채널을 생성합니다.
pub struct PolicyEngineBuilder<R: RuntimeClient, N: Notifier> {
    config: Option<ResolvedEngineConfig>,
    runtime: Option<Arc<R>>,
    notifier: Option<N>,
    alert_rx: Option<mpsc::Receiver<AlertEvent>>,
    action_tx: Option<mpsc::Sender<ActionEvent>>,
    action_channel_capacity: usize,
}

impl<R: RuntimeClient, N: Notifier> PolicyEngineBuilder<R, N> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: None,
            runtime: None,
            notifier: None,
            alert_rx: None,
            action_tx: None,
            action_channel_capacity: 256,
        }
    }

    /// 최종 엔진 설정을 지정합니다 (필수).
    pub fn config(mut self, config: ResolvedEngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 컨테이너 런타임을 연결합니다.
    ///
    /// 연결하지 않으면 엔진은 degraded 모드로 동작하며, kill/quarantine을
    /// 선언한 규칙이 있는 경우 빌드가 실패합니다.
    pub fn runtime(mut self, runtime: Arc<R>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// 통지 능력을 지정합니다 (필수).
    pub fn notifier(mut self, notifier: N) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// 알림 수신 채널을 설정합니다.
    ///
    /// `holdfast-daemon`에서 intake의 알림 출력 채널을 여기에 연결합니다.
    pub fn alert_receiver(mut self, rx: mpsc::Receiver<AlertEvent>) -> Self {
        self.alert_rx = Some(rx);
        self
    }

    /// 외부 액션 전송 채널을 설정합니다.
    ///
    /// 설정하지 않으면 빌더가 새 채널을 생성합니다.
    pub fn action_sender(mut self, tx: mpsc::Sender<ActionEvent>) -> Self {
        self.action_tx = Some(tx);
        self
    }

    /// 액션 채널 용량을 설정합니다 (외부 채널 미사용 시).
    pub fn action_channel_capacity(mut self, capacity: usize) -> Self {
        self.action_channel_capacity = capacity;
        self
    }

    /// 엔진을 빌드합니다.
    ///
    /// 설정 로드 시점 검증: 모든 규칙의 액션 종류에 대해 실행 가능한
    /// 핸들러가 있어야 합니다 (런타임 없이 kill/quarantine 선언 시 실패).
    ///
    /// # Returns
    /// - `PolicyEngine`: 엔진 인스턴스
    /// - `Option<mpsc::Receiver<ActionEvent>>`: 액션 수신 채널
    ///   (외부 action_sender를 설정한 경우 None)
    pub fn build(
        self,
    ) -> Result<(PolicyEngine<R, N>, Option<mpsc::Receiver<ActionEvent>>), PolicyEngineError> {
        let config = self.config.ok_or_else(|| PolicyEngineError::Config {
            field: "config".to_owned(),
            reason: "resolved engine config must be provided".to_owned(),
        })?;
        let notifier = self.notifier.ok_or_else(|| PolicyEngineError::Config {
            field: "notifier".to_owned(),
            reason: "notifier must be provided".to_owned(),
        })?;

        ensure_action_support(&config.policies, self.runtime.is_some())?;

        let rules = RuleSet::new(config.policies)?;
        let exclusions = ExclusionList::new(config.excluded_containers);
        let metrics = Arc::new(EngineMetrics::new());

        let (action_tx, action_rx) = if let Some(tx) = self.action_tx {
            (tx, None)
        } else {
            let (tx, rx) = mpsc::channel(self.action_channel_capacity);
            (tx, Some(rx))
        };

        let dispatcher = ActionDispatcher::new(
            self.runtime.clone(),
            Arc::new(notifier),
            Arc::clone(&metrics),
            action_tx,
            config.dry_run,
            Duration::from_secs(config.action_timeout_secs),
        );

        let rule_count = rules.len();
        let worker = EngineWorker {
            rules,
            exclusions,
            cooldowns: CooldownTracker::new(),
            dispatcher,
            metrics: Arc::clone(&metrics),
        };

        let engine = PolicyEngine {
            state: EngineState::Initialized,
            runtime: self.runtime,
            metrics,
            alert_rx: self.alert_rx,
            worker: Some(worker),
            cancel: CancellationToken::new(),
            task: None,
            rule_count,
        };

        Ok((engine, action_rx))
    }
}

impl<R: RuntimeClient, N: Notifier> Default for PolicyEngineBuilder<R, N> {
    fn default() -> Self {
        Self::new()
    }
}
