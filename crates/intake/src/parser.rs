//! 알림 정규화 -- Falco JSON 페이로드를 [`Alert`] 레코드로 변환
//!
//! 결정 로직 없는 순수 필드 추출/강제변환입니다. JSON 객체는 어떤 내용이든
//! 항상 Alert를 산출합니다 — 누락된 필드는 안전한 기본값으로 채워지고,
//! 인식할 수 없는 심각도는 warning으로 강등됩니다.

use std::collections::HashMap;
use std::time::SystemTime;

use serde_json::Value;

use holdfast_core::types::{Alert, Severity};

/// Falco JSON 알림을 정규화된 [`Alert`]로 변환합니다.
///
/// `output_fields`의 일급 필드 승격은 여러 후보 키를 순서대로 시도합니다
/// (예: 컨테이너 이미지는 `container.image.repository`, `container.image`,
/// `image` 순).
pub fn parse_alert(data: &Value) -> Alert {
    let output_fields = data
        .get("output_fields")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<HashMap<String, Value>>()
        })
        .unwrap_or_default();

    let id = get_str_value(data, "uuid").unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let rule = get_str_value(data, "rule").unwrap_or_else(|| "unknown".to_owned());
    let severity = data
        .get("priority")
        .and_then(Value::as_str)
        .map(Severity::parse_or_default)
        .unwrap_or_default();
    let output = get_str_value(data, "output").unwrap_or_default();
    let time = parse_time(data.get("time").and_then(Value::as_str));

    let tags = data
        .get("tags")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    Alert {
        id,
        rule,
        severity,
        output,
        time,
        container_id: get_field(&output_fields, &["container.id", "container_id"]),
        container_name: get_field(&output_fields, &["container.name", "container_name"]),
        container_image: get_field(
            &output_fields,
            &["container.image.repository", "container.image", "image"],
        ),
        proc_name: get_field(&output_fields, &["proc.name", "process"]),
        proc_cmdline: get_field(&output_fields, &["proc.cmdline", "cmdline"]),
        proc_pid: get_int_field(&output_fields, &["proc.pid"]),
        parent_name: get_field(&output_fields, &["proc.pname", "parent"]),
        user_id: get_int_field(&output_fields, &["user.uid"]),
        user_name: get_field(&output_fields, &["user.name", "user"]),
        fd_name: get_field(&output_fields, &["fd.name", "connection"]),
        fd_type: get_field(&output_fields, &["fd.type"]),
        tags,
        output_fields,
        source: get_str_value(data, "source").unwrap_or_else(|| "syscall".to_owned()),
        hostname: get_str_value(data, "hostname"),
    }
}

/// RFC3339 타임스탬프를 파싱하고, 실패 시 현재 시각으로 대체합니다.
fn parse_time(time_str: Option<&str>) -> SystemTime {
    time_str
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(SystemTime::from)
        .unwrap_or_else(SystemTime::now)
}

/// 최상위 필드에서 비어있지 않은 문자열을 읽습니다.
fn get_str_value(data: &Value, key: &str) -> Option<String> {
    match data.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// output_fields에서 첫 번째로 존재하는 키의 문자열 값을 읽습니다.
///
/// 숫자 값은 문자열로 강제변환합니다 (소스가 pid 등을 숫자로 보낼 수 있음).
fn get_field(fields: &HashMap<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        match fields.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// output_fields에서 첫 번째로 존재하는 키의 정수 값을 읽습니다.
///
/// 숫자와 숫자 문자열 모두 허용하며, 변환 불가능한 값은 건너뜁니다.
fn get_int_field(fields: &HashMap<String, Value>, keys: &[&str]) -> Option<u32> {
    for key in keys {
        match fields.get(*key) {
            Some(Value::Number(n)) => {
                if let Some(parsed) = n.as_u64().and_then(|v| u32::try_from(v).ok()) {
                    return Some(parsed);
                }
            }
            Some(Value::String(s)) => {
                if let Ok(parsed) = s.parse::<u32>() {
                    return Some(parsed);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_payload() -> Value {
        json!({
            "uuid": "a9c2f1d0-0000-4000-8000-000000000001",
            "rule": "Reverse Shell in Container",
            "priority": "Critical",
            "output": "A shell was spawned with a network fd (container=web-1)",
            "time": "2024-06-01T10:30:00.123456789Z",
            "source": "syscall",
            "hostname": "node-01",
            "tags": ["container", "mitre_execution", "T1059"],
            "output_fields": {
                "container.id": "abc123def456",
                "container.name": "web-1",
                "container.image.repository": "nginx",
                "proc.name": "bash",
                "proc.cmdline": "bash -i",
                "proc.pid": 4242,
                "proc.pname": "nc",
                "user.name": "root",
                "user.uid": 0,
                "fd.name": "10.0.0.5:4444->10.0.0.9:39112",
                "fd.type": "ipv4"
            }
        })
    }

    #[test]
    fn parses_full_payload() {
        let alert = parse_alert(&sample_payload());
        assert_eq!(alert.id, "a9c2f1d0-0000-4000-8000-000000000001");
        assert_eq!(alert.rule, "Reverse Shell in Container");
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.container_id.as_deref(), Some("abc123def456"));
        assert_eq!(alert.container_name.as_deref(), Some("web-1"));
        assert_eq!(alert.container_image.as_deref(), Some("nginx"));
        assert_eq!(alert.proc_name.as_deref(), Some("bash"));
        assert_eq!(alert.proc_cmdline.as_deref(), Some("bash -i"));
        assert_eq!(alert.proc_pid, Some(4242));
        assert_eq!(alert.parent_name.as_deref(), Some("nc"));
        assert_eq!(alert.user_id, Some(0));
        assert_eq!(alert.user_name.as_deref(), Some("root"));
        assert_eq!(alert.fd_type.as_deref(), Some("ipv4"));
        assert_eq!(alert.source, "syscall");
        assert_eq!(alert.hostname.as_deref(), Some("node-01"));
        assert_eq!(alert.tags.len(), 3);
    }

    #[test]
    fn empty_object_yields_safe_defaults() {
        let alert = parse_alert(&json!({}));
        assert_eq!(alert.rule, "unknown");
        assert_eq!(alert.severity, Severity::Warning);
        assert!(alert.container_id.is_none());
        assert!(alert.container_name.is_none());
        assert!(alert.tags.is_empty());
        assert_eq!(alert.source, "syscall");
        // id는 생성됨
        assert!(!alert.id.is_empty());
    }

    #[test]
    fn unknown_priority_degrades_to_warning() {
        let alert = parse_alert(&json!({"priority": "SUPER-BAD"}));
        assert_eq!(alert.severity, Severity::Warning);
    }

    #[test]
    fn uppercase_priority_is_parsed() {
        let alert = parse_alert(&json!({"priority": "EMERGENCY"}));
        assert_eq!(alert.severity, Severity::Emergency);

        let alert = parse_alert(&json!({"priority": "Notice"}));
        assert_eq!(alert.severity, Severity::Notice);
    }

    #[test]
    fn missing_priority_defaults_to_warning() {
        let alert = parse_alert(&json!({"rule": "x"}));
        assert_eq!(alert.severity, Severity::Warning);
    }

    #[test]
    fn time_parse_failure_falls_back_to_now() {
        let before = SystemTime::now();
        let alert = parse_alert(&json!({"time": "not-a-timestamp"}));
        assert!(alert.time >= before);

        let alert = parse_alert(&json!({}));
        assert!(alert.time >= before);
    }

    #[test]
    fn valid_rfc3339_time_is_preserved() {
        let alert = parse_alert(&json!({"time": "2024-06-01T10:30:00Z"}));
        let secs = alert
            .time
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert_eq!(secs, 1_717_237_800);
    }

    #[test]
    fn image_fallback_keys() {
        let alert = parse_alert(&json!({
            "output_fields": {"container.image": "redis:7"}
        }));
        assert_eq!(alert.container_image.as_deref(), Some("redis:7"));

        let alert = parse_alert(&json!({
            "output_fields": {"image": "postgres:16"}
        }));
        assert_eq!(alert.container_image.as_deref(), Some("postgres:16"));

        // 우선순위: repository 키가 먼저
        let alert = parse_alert(&json!({
            "output_fields": {
                "container.image.repository": "nginx",
                "image": "ignored"
            }
        }));
        assert_eq!(alert.container_image.as_deref(), Some("nginx"));
    }

    #[test]
    fn numeric_fields_coerced_from_strings() {
        let alert = parse_alert(&json!({
            "output_fields": {"proc.pid": "1234", "user.uid": "1000"}
        }));
        assert_eq!(alert.proc_pid, Some(1234));
        assert_eq!(alert.user_id, Some(1000));
    }

    #[test]
    fn non_numeric_int_fields_are_skipped() {
        let alert = parse_alert(&json!({
            "output_fields": {"proc.pid": "not-a-pid", "user.uid": -5}
        }));
        assert_eq!(alert.proc_pid, None);
        assert_eq!(alert.user_id, None);
    }

    #[test]
    fn empty_string_fields_treated_as_absent() {
        let alert = parse_alert(&json!({
            "rule": "",
            "output_fields": {"container.name": ""}
        }));
        assert_eq!(alert.rule, "unknown");
        assert!(alert.container_name.is_none());
    }

    #[test]
    fn numeric_promoted_field_coerced_to_string() {
        // 소스가 컨테이너 ID를 숫자로 보내는 비정상 케이스도 수용
        let alert = parse_alert(&json!({
            "output_fields": {"container.id": 123456}
        }));
        assert_eq!(alert.container_id.as_deref(), Some("123456"));
    }

    #[test]
    fn raw_output_fields_are_preserved() {
        let alert = parse_alert(&json!({
            "output_fields": {
                "container.id": "abc123",
                "evt.type": "execve",
                "custom.field": 42
            }
        }));
        // 승격되지 않은 필드도 원본 매핑에 남음
        assert_eq!(alert.output_fields.len(), 3);
        assert_eq!(alert.output_fields["evt.type"], "execve");
        assert_eq!(alert.output_fields["custom.field"], 42);
    }

    #[test]
    fn non_string_tags_are_skipped() {
        let alert = parse_alert(&json!({"tags": ["container", 42, null, "T1059"]}));
        assert_eq!(alert.tags, vec!["container", "T1059"]);
    }

    #[test]
    fn non_object_payload_yields_default_alert() {
        let alert = parse_alert(&json!([1, 2, 3]));
        assert_eq!(alert.rule, "unknown");
        assert_eq!(alert.severity, Severity::Warning);
    }
}
