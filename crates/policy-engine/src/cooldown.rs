//! 쿨다운 추적 -- (컨테이너, 규칙) 쌍별 억제 윈도우
//!
//! [`CooldownTracker`]는 파이프라인의 유일한 상태 보유 컴포넌트입니다.
//! 엔진의 단일 처리 태스크가 독점 소유하므로 별도의 잠금 없이도
//! check-and-arm이 원자적입니다.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use holdfast_core::types::{Alert, PolicyRule};

/// 쿨다운 판정 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownDecision {
    /// 액션 허용 (윈도우가 지금 시각으로 재무장됨)
    Allowed,
    /// 쿨다운 윈도우 내 — 액션 억제 (상태 변경 없음)
    Suppressed,
}

impl CooldownDecision {
    /// 허용 판정인지 여부.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// (컨테이너 ID, 규칙 이름) 쌍별 마지막 허용 시각 추적기
///
/// 엔트리는 첫 허용 시 생성되고 이후 허용 시마다 갱신되며, 명시적으로
/// 삭제되지 않습니다 (단조 증가하는 best-effort 인메모리 rate limiter —
/// 무제한 성장은 수용된 제약이며 재시작 시 모든 이력이 사라집니다).
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_action: HashMap<(String, String), Instant>,
}

impl CooldownTracker {
    /// 빈 추적기를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 시각 기준으로 쿨다운을 판정하고, 허용 시 즉시 재무장합니다.
    pub fn check_and_arm(&mut self, alert: &Alert, rule: &PolicyRule) -> CooldownDecision {
        self.check_and_arm_at(Instant::now(), alert, rule)
    }

    /// 주어진 시각 기준으로 쿨다운을 판정합니다 (테스트용 시각 주입).
    ///
    /// 갱신은 허용 판정 시점에 일어납니다 — 이후 액션이 실패하더라도
    /// 윈도우는 다시 무장되지 않습니다.
    pub fn check_and_arm_at(
        &mut self,
        now: Instant,
        alert: &Alert,
        rule: &PolicyRule,
    ) -> CooldownDecision {
        // 컨테이너 ID가 없거나 윈도우가 0이면 상태를 건드리지 않고 항상 허용
        let Some(container_id) = alert.container_id.as_deref() else {
            return CooldownDecision::Allowed;
        };
        if rule.cooldown_secs == 0 {
            return CooldownDecision::Allowed;
        }

        let window = Duration::from_secs(rule.cooldown_secs);
        let key = (container_id.to_owned(), rule.name.clone());

        if let Some(last) = self.last_action.get(&key)
            && now.duration_since(*last) < window
        {
            return CooldownDecision::Suppressed;
        }

        self.last_action.insert(key, now);
        CooldownDecision::Allowed
    }

    /// 추적 중인 키 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.last_action.len()
    }

    /// 추적 중인 키가 없는지 여부.
    pub fn is_empty(&self) -> bool {
        self.last_action.is_empty()
    }
}
