//! 파이프라인 trait — 모듈 생명주기와 레지스트리
//!
//! [`Pipeline`]은 intake, 정책 엔진 등 모든 모듈이 구현하는 생명주기
//! 인터페이스이고, [`PipelineRegistry`]는 등록 순서를 보존하며 일괄
//! start/stop/health_check를 수행합니다.
//!
//! # 생명주기
//! ```text
//! built → start() → running → stop() → stopped
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::error::{HoldfastError, PipelineError};

/// `dyn` 호환 trait에서 사용하는 박싱된 Future 타입
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 모듈 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작 중이나 일부 기능 저하 (사유 포함)
    Degraded(String),
    /// 비정상 (사유 포함)
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 여부.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 기능 저하 상태인지 여부.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    /// 비정상 상태인지 여부.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 모든 모듈이 구현하는 파이프라인 trait
///
/// `holdfast-daemon`이 모듈들을 동일한 생명주기로 관리할 수 있게 합니다.
pub trait Pipeline: Send + Sync {
    /// 파이프라인 이름 (로깅 및 레지스트리 키)
    fn name(&self) -> &str;

    /// 파이프라인을 시작합니다.
    ///
    /// 이미 실행 중이면 [`PipelineError::AlreadyRunning`]을 반환해야 합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), HoldfastError>> + Send;

    /// 파이프라인을 정지합니다 (graceful shutdown).
    ///
    /// 실행 중이 아니면 [`PipelineError::NotRunning`]을 반환해야 합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), HoldfastError>> + Send;

    /// 파이프라인의 건강 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// dyn 호환 파이프라인 trait
///
/// [`Pipeline`]은 RPITIT를 사용하므로 `dyn Pipeline`이 불가합니다.
/// `DynPipeline`은 [`BoxFuture`]를 반환하여 `Vec<Box<dyn DynPipeline>>`으로
/// 모듈을 동적 관리할 수 있게 합니다.
pub trait DynPipeline: Send + Sync {
    /// 파이프라인 이름
    fn name(&self) -> &str;

    /// 파이프라인을 시작합니다.
    fn start(&mut self) -> BoxFuture<'_, Result<(), HoldfastError>>;

    /// 파이프라인을 정지합니다.
    fn stop(&mut self) -> BoxFuture<'_, Result<(), HoldfastError>>;

    /// 파이프라인의 건강 상태를 확인합니다.
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

/// Pipeline을 구현한 타입은 자동으로 DynPipeline도 구현됩니다.
impl<T: Pipeline> DynPipeline for T {
    fn name(&self) -> &str {
        Pipeline::name(self)
    }

    fn start(&mut self) -> BoxFuture<'_, Result<(), HoldfastError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), HoldfastError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }
}

/// 파이프라인 레지스트리
///
/// 등록 순서가 보존됩니다. start_all과 stop_all 모두 등록 순서를 따릅니다 —
/// 생산자를 먼저 등록하면 정지 시에도 생산자가 먼저 닫혀 소비자가 잔여
/// 이벤트를 소진할 수 있습니다.
pub struct PipelineRegistry {
    pipelines: Vec<Box<dyn DynPipeline>>,
}

impl PipelineRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self {
            pipelines: Vec::new(),
        }
    }

    /// 파이프라인을 등록합니다.
    ///
    /// 동일한 이름의 파이프라인이 이미 등록되어 있으면 에러를 반환합니다.
    pub fn register(&mut self, pipeline: Box<dyn DynPipeline>) -> Result<(), HoldfastError> {
        if self.pipelines.iter().any(|p| p.name() == pipeline.name()) {
            return Err(PipelineError::InitFailed(format!(
                "pipeline '{}' already registered",
                pipeline.name()
            ))
            .into());
        }
        self.pipelines.push(pipeline);
        Ok(())
    }

    /// 등록된 파이프라인 수를 반환합니다.
    pub fn count(&self) -> usize {
        self.pipelines.len()
    }

    /// 모든 파이프라인을 등록 순서대로 시작합니다.
    ///
    /// 하나라도 실패하면 즉시 에러를 반환합니다. 이미 시작된 파이프라인의
    /// 롤백은 호출자(orchestrator)가 `stop_all`로 수행합니다.
    pub async fn start_all(&mut self) -> Result<(), HoldfastError> {
        for pipeline in &mut self.pipelines {
            tracing::info!(pipeline = pipeline.name(), "starting pipeline");
            pipeline.start().await?;
        }
        Ok(())
    }

    /// 모든 파이프라인을 등록 순서대로 정지합니다.
    ///
    /// 생산자(intake)가 먼저 닫히고 소비자(engine)가 잔여 이벤트를 소진한 뒤
    /// 정지합니다. 개별 실패는 로그로 남기고 계속 진행하며, 마지막 에러를
    /// 반환합니다.
    pub async fn stop_all(&mut self) -> Result<(), HoldfastError> {
        let mut last_error = None;
        for pipeline in &mut self.pipelines {
            tracing::info!(pipeline = pipeline.name(), "stopping pipeline");
            if let Err(e) = pipeline.stop().await {
                tracing::error!(pipeline = pipeline.name(), error = %e, "failed to stop pipeline");
                last_error = Some(e);
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 모든 파이프라인의 건강 상태를 수집합니다.
    pub async fn health_check_all(&self) -> Vec<(String, HealthStatus)> {
        let mut statuses = Vec::with_capacity(self.pipelines.len());
        for pipeline in &self.pipelines {
            statuses.push((pipeline.name().to_owned(), pipeline.health_check().await));
        }
        statuses
    }
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::new()
    }
}
