//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 모든 모듈이 공유하는 데이터 구조를 정의합니다.
//! [`Alert`]는 정규화된 보안 알림 한 건을, [`PolicyRule`]은 선언적 대응
//! 정책 한 항목을 나타냅니다.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// 심각도 레벨 (Falco priority와 동일한 8단계)
///
/// `Ord` 구현으로 심각도 비교가 가능합니다
/// (`Debug < Informational < Notice < Warning < Error < Critical < Alert < Emergency`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 디버그성 이벤트
    Debug,
    /// 정보성 이벤트
    Informational,
    /// 주목할 만한 이벤트
    Notice,
    /// 경고 — 파싱 실패 시 안전 기본값
    #[default]
    Warning,
    /// 오류 수준 위협
    Error,
    /// 치명적 위협
    Critical,
    /// 즉시 대응 필요
    Alert,
    /// 시스템 전체 비상
    Emergency,
}

impl Severity {
    /// 문자열에서 심각도를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않으며, 흔한 축약형도 허용합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "informational" | "info" => Some(Self::Informational),
            "notice" => Some(Self::Notice),
            "warning" | "warn" => Some(Self::Warning),
            "error" | "err" => Some(Self::Error),
            "critical" | "crit" => Some(Self::Critical),
            "alert" => Some(Self::Alert),
            "emergency" | "emerg" => Some(Self::Emergency),
            _ => None,
        }
    }

    /// 문자열을 파싱하되, 인식할 수 없는 값은 [`Severity::Warning`]으로
    /// 안전하게 강등합니다. 알림 입력 경로에서는 항상 이 함수를 사용합니다.
    pub fn parse_or_default(s: &str) -> Self {
        Self::from_str_loose(s).unwrap_or_default()
    }

    /// 메트릭 레이블용 고정 문자열을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Informational => "informational",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 정규화된 보안 알림
///
/// 외부 탐지기(Falco 등)가 보낸 이벤트를 intake가 정규화한 결과입니다.
/// `rule`과 `severity`는 항상 존재하며(소스가 생략하면 기본값 적용),
/// 나머지 필드는 모두 선택적입니다 — 부재가 하위 로직을 중단시켜서는 안 됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// 알림 ID (소스 제공 uuid 또는 intake가 생성)
    pub id: String,
    /// 탐지 규칙명
    pub rule: String,
    /// 심각도
    pub severity: Severity,
    /// 원본 출력 메시지
    pub output: String,
    /// 이벤트 발생 시각
    pub time: SystemTime,

    // --- 대상 컨텍스트 ---
    /// 대상 컨테이너 ID (있을 경우)
    pub container_id: Option<String>,
    /// 대상 컨테이너 이름 (있을 경우)
    pub container_name: Option<String>,
    /// 대상 컨테이너 이미지 (있을 경우)
    pub container_image: Option<String>,

    // --- 행위자 컨텍스트 ---
    /// 프로세스명
    pub proc_name: Option<String>,
    /// 프로세스 커맨드라인
    pub proc_cmdline: Option<String>,
    /// 프로세스 PID
    pub proc_pid: Option<u32>,
    /// 부모 프로세스명
    pub parent_name: Option<String>,
    /// 사용자 UID
    pub user_id: Option<u32>,
    /// 사용자명
    pub user_name: Option<String>,

    // --- 네트워크 컨텍스트 ---
    /// 연결 디스크립터 (예: "10.0.0.1:4444->10.0.0.2:22")
    pub fd_name: Option<String>,
    /// 디스크립터 유형 (예: "ipv4")
    pub fd_type: Option<String>,

    /// 분류 태그 (순서 보존; MITRE 전술/기법 식별자 포함 가능)
    pub tags: Vec<String>,
    /// 일급 필드로 승격되지 않은 원본 출력 필드
    pub output_fields: HashMap<String, serde_json::Value>,
    /// 이벤트 소스 (기본 "syscall")
    pub source: String,
    /// 발생 호스트명
    pub hostname: Option<String>,
}

impl Alert {
    /// 로깅용 축약 컨테이너 ID (앞 12자)를 반환합니다.
    pub fn short_container_id(&self) -> Option<&str> {
        self.container_id
            .as_deref()
            .map(|id| &id[..12.min(id.len())])
    }

    /// 태그에서 MITRE ATT&CK 전술(`mitre_` 접두어)을 추출합니다.
    pub fn mitre_tactics(&self) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|t| t.starts_with("mitre_"))
            .map(String::as_str)
            .collect()
    }

    /// 태그에서 MITRE ATT&CK 기법 ID(`T` 접두어)를 추출합니다.
    pub fn technique_ids(&self) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|t| t.starts_with('T') && t[1..].chars().next().is_some_and(|c| c.is_ascii_digit()))
            .map(String::as_str)
            .collect()
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} container={}",
            self.severity,
            self.rule,
            self.container_name.as_deref().unwrap_or("-"),
        )
    }
}

/// 대응 액션 종류
///
/// 정책이 지정할 수 있는 액션의 닫힌 집합입니다.
/// 런타임이 연결되지 않은 빌드에서는 `Kill`/`Quarantine`이 선언만 가능하며,
/// 디스패처가 설정 로드 시점에 실행 가능 여부를 검증합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// 로그만 남기고 종료 (항상 성공)
    #[default]
    LogOnly,
    /// 외부 웹훅으로 알림 전송
    Webhook,
    /// 대상 컨테이너 강제 종료
    Kill,
    /// 대상 컨테이너를 모든 네트워크에서 분리
    Quarantine,
}

impl ActionKind {
    /// 메트릭 태그용 고정된 액션 종류명을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LogOnly => "log_only",
            Self::Webhook => "webhook",
            Self::Kill => "kill",
            Self::Quarantine => "quarantine",
        }
    }

    /// 컨테이너 런타임 연결이 필요한 액션인지 여부.
    pub fn requires_runtime(&self) -> bool {
        matches!(self, Self::Kill | Self::Quarantine)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 대응 정책 규칙
///
/// 선언 순서대로 평가되며, 첫 번째로 모든 조건을 만족하는 규칙이 선택됩니다
/// ("first match wins"). 패턴 목록이 비어있으면 제약 없음으로 해석되고,
/// `exclude_containers`가 비어있으면 아무것도 제외하지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// 규칙 고유 이름 (쿨다운 키와 감사 로그에 사용)
    pub name: String,
    /// 규칙 설명
    #[serde(default)]
    pub description: String,
    /// 이 규칙이 매칭되는 최소 심각도
    #[serde(default)]
    pub severity_min: Severity,
    /// 탐지 규칙명 glob 패턴 (비어있으면 모든 규칙에 매칭)
    #[serde(default)]
    pub rule_patterns: Vec<String>,
    /// 컨테이너 이름 glob 패턴
    #[serde(default)]
    pub container_patterns: Vec<String>,
    /// 컨테이너 이미지 glob 패턴
    #[serde(default)]
    pub image_patterns: Vec<String>,
    /// 이 규칙에서 제외할 컨테이너 이름 glob 패턴
    #[serde(default)]
    pub exclude_containers: Vec<String>,
    /// 실행할 액션
    #[serde(default)]
    pub action: ActionKind,
    /// 규칙별 웹훅 URL (전역 기본값보다 우선)
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// 동일 (컨테이너, 규칙) 쌍에 대한 최소 재실행 간격 (초, 0 = 억제 없음)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_cooldown_secs() -> u64 {
    60
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (>={}, action={}, cooldown={}s)",
            self.name, self.severity_min, self.action, self.cooldown_secs,
        )
    }
}

/// 컨테이너 정보
///
/// 런타임 조회(inspect/list) 결과의 공통 표현입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// 컨테이너 ID
    pub id: String,
    /// 컨테이너 이름
    pub name: String,
    /// 이미지명
    pub image: String,
    /// 상태 (running, exited 등)
    pub status: String,
    /// 생성 시각
    pub created_at: SystemTime,
}

impl fmt::Display for ContainerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) image={} status={}",
            self.name,
            &self.id[..12.min(self.id.len())],
            self.image,
            self.status,
        )
    }
}
