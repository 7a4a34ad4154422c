//! 메트릭 — Prometheus 상수 등록 및 파이프라인 카운터
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의하고,
//! 정책 엔진이 변경하고 외부 리포팅 엔드포인트가 읽는
//! [`EngineMetrics`] 카운터를 제공합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `holdfast_`
//! - 모듈명: `engine_`, `intake_`, `daemon_`
//! - 접미어: `_total` (counter), 없음 (gauge)

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 액션 종류 레이블 키 (log_only, webhook, kill, quarantine)
pub const LABEL_ACTION: &str = "action";

/// 심각도 레이블 키 (debug .. emergency)
pub const LABEL_SEVERITY: &str = "severity";

/// 모듈 레이블 키
pub const LABEL_MODULE: &str = "module";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Policy Engine 메트릭 ──────────────────────────────────────────

/// Engine: 수신된 알림 수 (counter)
pub const ENGINE_ALERTS_RECEIVED_TOTAL: &str = "holdfast_engine_alerts_received_total";

/// Engine: 정책에 매칭된 알림 수 (counter)
pub const ENGINE_ALERTS_MATCHED_TOTAL: &str = "holdfast_engine_alerts_matched_total";

/// Engine: 실행된 액션 수 (counter, label: action)
pub const ENGINE_ACTIONS_EXECUTED_TOTAL: &str = "holdfast_engine_actions_executed_total";

/// Engine: 실패한 액션 수 (counter)
pub const ENGINE_ACTIONS_FAILED_TOTAL: &str = "holdfast_engine_actions_failed_total";

/// Engine: 쿨다운으로 억제된 액션 수 (counter)
pub const ENGINE_ACTIONS_SKIPPED_COOLDOWN_TOTAL: &str =
    "holdfast_engine_actions_skipped_cooldown_total";

/// Engine: 전역 제외 목록으로 건너뛴 알림 수 (counter)
pub const ENGINE_ACTIONS_SKIPPED_EXCLUDED_TOTAL: &str =
    "holdfast_engine_actions_skipped_excluded_total";

/// Engine: 추적 중인 쿨다운 키 수 (gauge)
pub const ENGINE_COOLDOWN_KEYS: &str = "holdfast_engine_cooldown_keys";

// ─── Intake 메트릭 ─────────────────────────────────────────────────

/// Intake: 수신된 HTTP 요청 수 (counter)
pub const INTAKE_REQUESTS_TOTAL: &str = "holdfast_intake_requests_total";

/// Intake: 파싱 거부된 페이로드 수 (counter)
pub const INTAKE_PARSE_ERRORS_TOTAL: &str = "holdfast_intake_parse_errors_total";

/// Intake: 엔진으로 전달된 알림 수 (counter)
pub const INTAKE_ALERTS_FORWARDED_TOTAL: &str = "holdfast_intake_alerts_forwarded_total";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "holdfast_daemon_uptime_seconds";

/// Daemon: 등록된 파이프라인 수 (gauge)
pub const DAEMON_PIPELINES_REGISTERED: &str = "holdfast_daemon_pipelines_registered";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "holdfast_daemon_build_info";

// ─── 설명 등록 함수 ────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `holdfast-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        ENGINE_ALERTS_RECEIVED_TOTAL,
        "Total number of alerts received by the policy engine"
    );
    describe_counter!(
        ENGINE_ALERTS_MATCHED_TOTAL,
        "Total number of alerts that matched a policy rule"
    );
    describe_counter!(
        ENGINE_ACTIONS_EXECUTED_TOTAL,
        "Total number of response actions executed, by action kind"
    );
    describe_counter!(
        ENGINE_ACTIONS_FAILED_TOTAL,
        "Total number of response actions that failed"
    );
    describe_counter!(
        ENGINE_ACTIONS_SKIPPED_COOLDOWN_TOTAL,
        "Total number of actions suppressed by the per-target cooldown"
    );
    describe_counter!(
        ENGINE_ACTIONS_SKIPPED_EXCLUDED_TOTAL,
        "Total number of alerts skipped by the global exclusion list"
    );
    describe_gauge!(
        ENGINE_COOLDOWN_KEYS,
        "Number of (container, rule) cooldown keys currently tracked"
    );

    describe_counter!(
        INTAKE_REQUESTS_TOTAL,
        "Total number of alert submissions received over HTTP"
    );
    describe_counter!(
        INTAKE_PARSE_ERRORS_TOTAL,
        "Total number of alert payloads rejected as unparseable"
    );
    describe_counter!(
        INTAKE_ALERTS_FORWARDED_TOTAL,
        "Total number of normalized alerts forwarded to the policy engine"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "Holdfast daemon uptime in seconds");
    describe_gauge!(
        DAEMON_PIPELINES_REGISTERED,
        "Number of pipelines registered in the daemon"
    );
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}

// ─── 파이프라인 카운터 ─────────────────────────────────────────────

/// 정책 엔진 파이프라인 카운터
///
/// 단조 증가 카운터의 집합입니다. 변경은 정책 엔진의 단일 처리 태스크에서만
/// 일어나고, 읽기는 [`EngineMetrics::snapshot`]을 통해 어느 컨텍스트에서든
/// 가능합니다. 모든 증가 연산은 동일한 이름의 Prometheus 카운터도 함께
/// 올립니다.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    alerts_received: AtomicU64,
    alerts_matched: AtomicU64,
    actions_skipped_cooldown: AtomicU64,
    actions_skipped_excluded: AtomicU64,
    actions_failed: AtomicU64,
    actions_executed: Mutex<HashMap<String, u64>>,
}

impl EngineMetrics {
    /// 새 카운터 집합을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 수신 알림 카운터를 증가시킵니다.
    pub fn incr_received(&self) {
        self.alerts_received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(ENGINE_ALERTS_RECEIVED_TOTAL).increment(1);
    }

    /// 매칭 알림 카운터를 증가시킵니다.
    pub fn incr_matched(&self) {
        self.alerts_matched.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(ENGINE_ALERTS_MATCHED_TOTAL).increment(1);
    }

    /// 쿨다운 억제 카운터를 증가시킵니다.
    pub fn incr_skipped_cooldown(&self) {
        self.actions_skipped_cooldown.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(ENGINE_ACTIONS_SKIPPED_COOLDOWN_TOTAL).increment(1);
    }

    /// 전역 제외 카운터를 증가시킵니다.
    pub fn incr_skipped_excluded(&self) {
        self.actions_skipped_excluded.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(ENGINE_ACTIONS_SKIPPED_EXCLUDED_TOTAL).increment(1);
    }

    /// 액션 실패 카운터를 증가시킵니다.
    pub fn incr_failed(&self) {
        self.actions_failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(ENGINE_ACTIONS_FAILED_TOTAL).increment(1);
    }

    /// 액션 종류별 실행 카운터를 증가시킵니다.
    ///
    /// `kind`는 [`ActionKind::as_str`](crate::types::ActionKind::as_str)의
    /// 고정 문자열이어야 합니다 (high-cardinality 방지).
    pub fn incr_executed(&self, kind: &str) {
        let mut executed = self
            .actions_executed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *executed.entry(kind.to_owned()).or_insert(0) += 1;
        drop(executed);
        metrics::counter!(ENGINE_ACTIONS_EXECUTED_TOTAL, LABEL_ACTION => kind.to_owned())
            .increment(1);
    }

    /// 수신 알림 수를 반환합니다.
    pub fn alerts_received(&self) -> u64 {
        self.alerts_received.load(Ordering::Relaxed)
    }

    /// 매칭 알림 수를 반환합니다.
    pub fn alerts_matched(&self) -> u64 {
        self.alerts_matched.load(Ordering::Relaxed)
    }

    /// 쿨다운으로 억제된 액션 수를 반환합니다.
    pub fn actions_skipped_cooldown(&self) -> u64 {
        self.actions_skipped_cooldown.load(Ordering::Relaxed)
    }

    /// 전역 제외로 건너뛴 알림 수를 반환합니다.
    pub fn actions_skipped_excluded(&self) -> u64 {
        self.actions_skipped_excluded.load(Ordering::Relaxed)
    }

    /// 실패한 액션 수를 반환합니다.
    pub fn actions_failed(&self) -> u64 {
        self.actions_failed.load(Ordering::Relaxed)
    }

    /// 특정 액션 종류의 실행 수를 반환합니다.
    pub fn actions_executed(&self, kind: &str) -> u64 {
        self.actions_executed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(kind)
            .copied()
            .unwrap_or(0)
    }

    /// 일관된 시점 스냅샷을 생성합니다.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let actions_executed = self
            .actions_executed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        MetricsSnapshot {
            alerts_received: self.alerts_received(),
            alerts_matched: self.alerts_matched(),
            actions_executed,
            actions_skipped_cooldown: self.actions_skipped_cooldown(),
            actions_skipped_excluded: self.actions_skipped_excluded(),
            actions_failed: self.actions_failed(),
        }
    }
}

/// 파이프라인 카운터의 시점 스냅샷
///
/// 외부 리포팅 엔드포인트가 JSON으로 직렬화하여 노출합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// 수신된 알림 수
    pub alerts_received: u64,
    /// 정책에 매칭된 알림 수
    pub alerts_matched: u64,
    /// 액션 종류별 실행 수
    pub actions_executed: HashMap<String, u64>,
    /// 쿨다운으로 억제된 액션 수
    pub actions_skipped_cooldown: u64,
    /// 전역 제외로 건너뛴 알림 수
    pub actions_skipped_excluded: u64,
    /// 실패한 액션 수
    pub actions_failed: u64,
}
