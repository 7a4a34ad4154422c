//! 설정 관리 — holdfast.toml 파싱 및 런타임 설정
//!
//! [`HoldfastConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선, holdfast-daemon에서 적용)
//! 2. 환경변수 (`HOLDFAST_RECEIVER_PORT=8766` 형식)
//! 3. 설정 파일 (`holdfast.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 2단계 빌드
//!
//! 로드된 설정은 불변이며, 파이프라인 컴포넌트를 생성하기 전에
//! [`HoldfastConfig::resolve_engine`]으로 기본값이 모두 적용된
//! [`ResolvedEngineConfig`]를 만들어 사용합니다. 로드 이후 설정 객체를
//! 수정하는 경로는 없습니다.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ConfigError, HoldfastError};
use crate::types::{ActionKind, PolicyRule, Severity};

/// Holdfast 통합 설정
///
/// `holdfast.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoldfastConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 알림 수신 설정
    #[serde(default)]
    pub receiver: ReceiverConfig,
    /// 컨테이너 런타임 설정
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// 정책 엔진 설정
    #[serde(default)]
    pub engine: EngineConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 대응 정책 규칙 (선언 순서대로 평가)
    #[serde(default)]
    pub policies: Vec<PolicyRule>,
}

impl HoldfastConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, HoldfastError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, HoldfastError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HoldfastError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                HoldfastError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, HoldfastError> {
        toml::from_str(toml_str).map_err(|e| {
            HoldfastError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `HOLDFAST_{SECTION}_{FIELD}`
    /// 예: `HOLDFAST_RECEIVER_PORT=8766`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "HOLDFAST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "HOLDFAST_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "HOLDFAST_GENERAL_PID_FILE");

        // Receiver
        override_string(
            &mut self.receiver.listen_addr,
            "HOLDFAST_RECEIVER_LISTEN_ADDR",
        );
        override_u16(&mut self.receiver.port, "HOLDFAST_RECEIVER_PORT");

        // Runtime
        override_bool(&mut self.runtime.auto_detect, "HOLDFAST_RUNTIME_AUTO_DETECT");
        override_string(&mut self.runtime.runtime_type, "HOLDFAST_RUNTIME_TYPE");
        override_string(
            &mut self.runtime.docker_socket,
            "HOLDFAST_RUNTIME_DOCKER_SOCKET",
        );

        // Engine
        override_bool(&mut self.engine.dry_run, "HOLDFAST_ENGINE_DRY_RUN");
        override_string(
            &mut self.engine.default_webhook_url,
            "HOLDFAST_ENGINE_DEFAULT_WEBHOOK_URL",
        );
        override_u64(
            &mut self.engine.action_timeout_secs,
            "HOLDFAST_ENGINE_ACTION_TIMEOUT_SECS",
        );
        override_csv(
            &mut self.engine.excluded_containers,
            "HOLDFAST_ENGINE_EXCLUDED_CONTAINERS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "HOLDFAST_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "HOLDFAST_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "HOLDFAST_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), HoldfastError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.receiver.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "receiver.port".to_owned(),
                reason: "must be non-zero".to_owned(),
            }
            .into());
        }

        if self.receiver.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "receiver.channel_capacity".to_owned(),
                reason: "must be non-zero".to_owned(),
            }
            .into());
        }

        let valid_runtimes = ["", "docker", "orbstack"];
        if !valid_runtimes.contains(&self.runtime.runtime_type.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "runtime.runtime_type".to_owned(),
                reason: "must be one of: docker, orbstack (or empty for auto)".to_owned(),
            }
            .into());
        }

        if self.engine.action_timeout_secs == 0 || self.engine.action_timeout_secs > 300 {
            return Err(ConfigError::InvalidValue {
                field: "engine.action_timeout_secs".to_owned(),
                reason: "must be 1-300".to_owned(),
            }
            .into());
        }

        // 정책 이름은 쿨다운 키로 쓰이므로 비어있거나 중복될 수 없음
        let mut seen = std::collections::HashSet::new();
        for rule in &self.policies {
            if rule.name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "policies.name".to_owned(),
                    reason: "policy name cannot be empty".to_owned(),
                }
                .into());
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "policies.name".to_owned(),
                    reason: format!("duplicate policy name '{}'", rule.name),
                }
                .into());
            }
        }

        Ok(())
    }

    /// 엔진용 최종 설정을 생성합니다 (2단계 빌드의 2단계).
    ///
    /// 정책이 하나도 없으면 내장 기본 정책으로 대체하고,
    /// 빈 웹훅 URL 문자열은 `None`으로 정규화합니다.
    /// 반환값은 불변이며 파이프라인 컴포넌트 생성 전에 한 번만 만듭니다.
    pub fn resolve_engine(&self) -> ResolvedEngineConfig {
        let policies = if self.policies.is_empty() {
            let defaults = default_policies();
            info!(
                policy_count = defaults.len(),
                "no policies configured, using built-in defaults"
            );
            defaults
        } else {
            self.policies.clone()
        };

        let default_webhook_url = if self.engine.default_webhook_url.is_empty() {
            None
        } else {
            Some(self.engine.default_webhook_url.clone())
        };

        ResolvedEngineConfig {
            dry_run: self.engine.dry_run,
            action_timeout_secs: self.engine.action_timeout_secs,
            default_webhook_url,
            excluded_containers: self.engine.excluded_containers.clone(),
            policies,
        }
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열 = 기록하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// 알림 수신 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// 수신 바인드 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 알림 채널 용량
    pub channel_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_owned(),
            port: 8766,
            channel_capacity: 256,
        }
    }
}

/// 컨테이너 런타임 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 런타임 자동 탐지 활성화
    pub auto_detect: bool,
    /// 선호 런타임 종류 ("docker", "orbstack", 빈 문자열 = 자동)
    pub runtime_type: String,
    /// Docker 소켓 경로 오버라이드 (빈 문자열 = 탐지 결과 사용)
    pub docker_socket: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            auto_detect: true,
            runtime_type: String::new(),
            docker_socket: String::new(),
        }
    }
}

/// 정책 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// dry-run 모드 — 액션을 실행하지 않고 카운트만 합니다
    pub dry_run: bool,
    /// 규칙별 오버라이드가 없을 때 사용할 웹훅 URL (빈 문자열 = 없음)
    pub default_webhook_url: String,
    /// 액션 실행 타임아웃 (초)
    pub action_timeout_secs: u64,
    /// 전역 제외 컨테이너 이름 glob 패턴 (규칙 평가 전에 적용)
    pub excluded_containers: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            default_webhook_url: String::new(),
            action_timeout_secs: 10,
            excluded_containers: vec!["holdfast*".to_owned()],
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화
    pub enabled: bool,
    /// 메트릭 수신 바인드 주소
    pub listen_addr: String,
    /// 메트릭 포트
    pub port: u16,
    /// 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9090,
            endpoint: "/metrics".to_owned(),
        }
    }
}

/// 엔진용 최종 설정 — 기본값이 모두 적용된 불변 값
///
/// [`HoldfastConfig::resolve_engine`]이 생성하며, 정책 목록은 항상 비어있지
/// 않습니다.
#[derive(Debug, Clone)]
pub struct ResolvedEngineConfig {
    /// dry-run 모드
    pub dry_run: bool,
    /// 액션 실행 타임아웃 (초)
    pub action_timeout_secs: u64,
    /// 전역 기본 웹훅 URL
    pub default_webhook_url: Option<String>,
    /// 전역 제외 컨테이너 패턴
    pub excluded_containers: Vec<String>,
    /// 평가 순서대로 정렬된 정책 목록 (항상 1개 이상)
    pub policies: Vec<PolicyRule>,
}

/// 내장 기본 정책을 반환합니다.
///
/// 설정 파일에 정책이 하나도 없을 때 사용됩니다:
/// 1. critical 이상 — 쿨다운 없음, 대표적인 고위험 규칙 패턴
/// 2. error 이상 — 30초 쿨다운
/// 3. warning 이상 — 60초 쿨다운 (catch-all)
pub fn default_policies() -> Vec<PolicyRule> {
    vec![
        PolicyRule {
            name: "critical-threats".to_owned(),
            description: "Respond to critical security threats".to_owned(),
            severity_min: Severity::Critical,
            rule_patterns: vec![
                "*Reverse Shell*".to_owned(),
                "*Crypto Miner*".to_owned(),
                "*Container Escape*".to_owned(),
                "*Kernel Module*".to_owned(),
                "*Process Injection*".to_owned(),
                "*Download and Execute*".to_owned(),
            ],
            container_patterns: Vec::new(),
            image_patterns: Vec::new(),
            exclude_containers: Vec::new(),
            action: ActionKind::LogOnly,
            webhook_url: None,
            cooldown_secs: 0,
        },
        PolicyRule {
            name: "high-threats".to_owned(),
            description: "Respond to high priority threats".to_owned(),
            severity_min: Severity::Error,
            rule_patterns: Vec::new(),
            container_patterns: Vec::new(),
            image_patterns: Vec::new(),
            exclude_containers: Vec::new(),
            action: ActionKind::LogOnly,
            webhook_url: None,
            cooldown_secs: 30,
        },
        PolicyRule {
            name: "suspicious-activity".to_owned(),
            description: "Log suspicious activity".to_owned(),
            severity_min: Severity::Warning,
            rule_patterns: Vec::new(),
            container_patterns: Vec::new(),
            image_patterns: Vec::new(),
            exclude_containers: Vec::new(),
            action: ActionKind::LogOnly,
            webhook_url: None,
            cooldown_secs: 60,
        },
    ]
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        *target = value;
    }
}

fn override_bool(target: &mut bool, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(var = var, value = %value, "ignoring non-boolean env override"),
        }
    }
}

fn override_u16(target: &mut u16, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(var = var, value = %value, "ignoring non-numeric env override"),
        }
    }
}

fn override_u64(target: &mut u64, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(var = var, value = %value, "ignoring non-numeric env override"),
        }
    }
}

fn override_csv(target: &mut Vec<String>, var: &str) {
    if let Ok(value) = std::env::var(var) {
        *target = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
    }
}
