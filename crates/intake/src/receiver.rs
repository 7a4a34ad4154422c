//! HTTP 알림 수신기 -- Falco 웹훅 수신 및 상태 조회 엔드포인트
//!
//! [`AlertReceiver`]는 core의 [`Pipeline`] trait을 구현하여
//! `holdfast-daemon`에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 엔드포인트
//! - `POST /falco`: 알림 제출. 파싱 불가능한 페이로드는 400으로 동기
//!   거부되고, 구조적으로 유효한 페이로드는 하위 처리 결과와 무관하게
//!   200으로 수신 확인됩니다 (제출자 관점에서 fire-and-forget).
//! - `GET /health`: 상태 요약 JSON.
//! - `GET /metrics`: 파이프라인 카운터 스냅샷 JSON.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use holdfast_core::error::HoldfastError;
use holdfast_core::event::AlertEvent;
use holdfast_core::metrics::{
    self as metric_names, EngineMetrics, MetricsSnapshot,
};
use holdfast_core::pipeline::{HealthStatus, Pipeline};

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::parser::parse_alert;

/// 수신기 상태 요약 (health 엔드포인트용 정적 정보)
#[derive(Debug, Clone)]
pub struct ReceiverInfo {
    /// 탐지된 런타임 이름 ("docker", "orbstack", "none")
    pub runtime: String,
    /// 로드된 정책 수
    pub policies: usize,
}

/// axum 핸들러가 공유하는 상태
#[derive(Clone)]
pub struct ReceiverState {
    alert_tx: mpsc::Sender<AlertEvent>,
    metrics: Arc<EngineMetrics>,
    info: Arc<ReceiverInfo>,
}

impl ReceiverState {
    /// 새 수신기 상태를 생성합니다.
    pub fn new(
        alert_tx: mpsc::Sender<AlertEvent>,
        metrics: Arc<EngineMetrics>,
        info: ReceiverInfo,
    ) -> Self {
        Self {
            alert_tx,
            metrics,
            info: Arc::new(info),
        }
    }
}

/// 수신기 라우터를 생성합니다.
pub fn router(state: ReceiverState) -> Router {
    Router::new()
        .route("/falco", post(handle_alert))
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .with_state(state)
}

/// POST /falco — 알림 수신
///
/// JSON 본문이 아예 파싱되지 않거나 객체가 아니면 400, 그 외에는
/// 정규화 후 엔진 채널로 전달하고 200을 반환합니다.
async fn handle_alert(
    State(state): State<ReceiverState>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> impl IntoResponse {
    metrics::counter!(metric_names::INTAKE_REQUESTS_TOTAL).increment(1);

    let Json(data) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            metrics::counter!(metric_names::INTAKE_PARSE_ERRORS_TOTAL).increment(1);
            warn!(error = %rejection, "rejecting unparseable alert payload");
            return (StatusCode::BAD_REQUEST, "invalid alert payload").into_response();
        }
    };

    if !data.is_object() {
        metrics::counter!(metric_names::INTAKE_PARSE_ERRORS_TOTAL).increment(1);
        warn!("rejecting non-object alert payload");
        return (StatusCode::BAD_REQUEST, "alert payload must be a JSON object").into_response();
    }

    let alert = parse_alert(&data);
    info!(
        rule = %alert.rule,
        severity = %alert.severity,
        container_id = alert.short_container_id().unwrap_or("-"),
        container_name = alert.container_name.as_deref().unwrap_or("-"),
        "alert received"
    );

    match state.alert_tx.send(AlertEvent::new(alert)).await {
        Ok(()) => {
            metrics::counter!(metric_names::INTAKE_ALERTS_FORWARDED_TOTAL).increment(1);
            (StatusCode::OK, "OK").into_response()
        }
        Err(e) => {
            error!(error = %e, "alert channel closed, cannot forward alert");
            (StatusCode::SERVICE_UNAVAILABLE, "engine unavailable").into_response()
        }
    }
}

/// GET /health — 상태 요약
async fn handle_health(State(state): State<ReceiverState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "runtime": state.info.runtime,
        "policies": state.info.policies,
    }))
}

/// GET /metrics — 파이프라인 카운터 스냅샷
async fn handle_metrics(State(state): State<ReceiverState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// 수신기 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReceiverLifecycle {
    Initialized,
    Running,
    Stopped,
}

/// HTTP 알림 수신기
///
/// start 시 리스너를 바인딩하고 axum 서버를 백그라운드 태스크로 띄우며,
/// stop 시 취소 토큰으로 graceful shutdown을 수행하고 태스크 종료를
/// 기다립니다.
pub struct AlertReceiver {
    config: IntakeConfig,
    state: ReceiverState,
    lifecycle: ReceiverLifecycle,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
    bound_addr: Option<std::net::SocketAddr>,
}

impl AlertReceiver {
    /// 새 수신기를 생성합니다.
    pub fn new(config: IntakeConfig, state: ReceiverState) -> Result<Self, IntakeError> {
        config.validate()?;
        Ok(Self {
            config,
            state,
            lifecycle: ReceiverLifecycle::Initialized,
            cancel: CancellationToken::new(),
            task: None,
            bound_addr: None,
        })
    }

    /// 실제 바인딩된 주소를 반환합니다 (start 이후에만 Some).
    ///
    /// 포트 0으로 설정한 테스트에서 임시 포트를 알아낼 때 사용합니다.
    pub fn bound_addr(&self) -> Option<std::net::SocketAddr> {
        self.bound_addr
    }

    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.lifecycle {
            ReceiverLifecycle::Initialized => "initialized",
            ReceiverLifecycle::Running => "running",
            ReceiverLifecycle::Stopped => "stopped",
        }
    }
}

impl Pipeline for AlertReceiver {
    fn name(&self) -> &str {
        "intake"
    }

    async fn start(&mut self) -> Result<(), HoldfastError> {
        if self.lifecycle == ReceiverLifecycle::Running {
            return Err(holdfast_core::error::PipelineError::AlreadyRunning.into());
        }

        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            HoldfastError::from(IntakeError::Bind {
                addr: addr.clone(),
                reason: e.to_string(),
            })
        })?;
        let bound = listener.local_addr().map_err(|e| {
            HoldfastError::from(IntakeError::Bind {
                addr: addr.clone(),
                reason: e.to_string(),
            })
        })?;
        self.bound_addr = Some(bound);

        let app = router(self.state.clone());
        let cancel = self.cancel.clone();

        let task = tokio::spawn(async move {
            let shutdown = cancel.cancelled_owned();
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "alert receiver server terminated abnormally");
            }
        });

        self.task = Some(task);
        self.lifecycle = ReceiverLifecycle::Running;
        info!(listen_addr = %bound, "alert receiver started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), HoldfastError> {
        if self.lifecycle != ReceiverLifecycle::Running {
            return Err(holdfast_core::error::PipelineError::NotRunning.into());
        }

        info!("stopping alert receiver");
        self.cancel.cancel();

        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            error!(error = %e, "alert receiver task terminated abnormally");
        }

        self.lifecycle = ReceiverLifecycle::Stopped;
        info!("alert receiver stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.lifecycle {
            ReceiverLifecycle::Running => HealthStatus::Healthy,
            ReceiverLifecycle::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ReceiverLifecycle::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}
