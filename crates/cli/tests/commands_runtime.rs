use std::env;
use std::sync::{Mutex, OnceLock};

use helpdesk_cli::commands::{config, doctor, migrate};
use serde_json::Value;

#[test]
fn migrate_returns_success_against_in_memory_database() {
    with_env(&[("HELPDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_reports_config_failure_for_invalid_threshold() {
    with_env(&[("HELPDESK_HANDOFF_SENTIMENT_THRESHOLD", "2.5")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn migrate_reports_connectivity_failure_for_unreachable_database() {
    with_env(
        &[("HELPDESK_DATABASE_URL", "sqlite:///nonexistent-dir/helpdesk.db")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 4, "expected db connectivity failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["error_class"], "db_connectivity");
        },
    );
}

#[test]
fn doctor_json_passes_with_reachable_database() {
    with_env(&[("HELPDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "expected doctor to pass");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks.len(), 3);
        assert!(checks.iter().all(|check| check["status"] == "pass"));
    });
}

#[test]
fn doctor_fails_and_skips_downstream_checks_when_config_is_invalid() {
    with_env(&[("HELPDESK_HANDOFF_CONFIDENCE_THRESHOLD", "7")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1, "expected doctor failure exit code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks[0]["status"], "fail");
        assert_eq!(checks[1]["status"], "skipped");
        assert_eq!(checks[2]["status"], "skipped");
    });
}

#[test]
fn doctor_human_output_lists_each_check() {
    with_env(&[("HELPDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("config_validation"));
        assert!(result.output.contains("handoff_policy_readiness"));
        assert!(result.output.contains("database_connectivity"));
    });
}

#[test]
fn config_reports_env_sources_and_redacts_the_api_key() {
    with_env(
        &[
            ("HELPDESK_DATABASE_URL", "sqlite::memory:"),
            ("HELPDESK_LLM_API_KEY", "sk-secret-value"),
        ],
        || {
            let output = config::run();

            assert!(output.contains("database.url = sqlite::memory:"));
            assert!(output.contains("env (HELPDESK_DATABASE_URL)"));
            assert!(output.contains("llm.api_key = <redacted>"));
            assert!(
                !output.contains("sk-secret-value"),
                "api key material must never be printed"
            );
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "HELPDESK_DATABASE_URL",
        "HELPDESK_DATABASE_MAX_CONNECTIONS",
        "HELPDESK_DATABASE_TIMEOUT_SECS",
        "HELPDESK_LLM_PROVIDER",
        "HELPDESK_LLM_API_KEY",
        "HELPDESK_LLM_BASE_URL",
        "HELPDESK_LLM_MODEL",
        "HELPDESK_LLM_TEMPERATURE",
        "HELPDESK_LLM_TIMEOUT_SECS",
        "HELPDESK_LLM_MAX_RETRIES",
        "HELPDESK_SERVER_BIND_ADDRESS",
        "HELPDESK_SERVER_PORT",
        "HELPDESK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "HELPDESK_MEMORY_SHORT_TERM_MAX_MESSAGES",
        "HELPDESK_HANDOFF_ENABLED",
        "HELPDESK_HANDOFF_SENTIMENT_THRESHOLD",
        "HELPDESK_HANDOFF_CONFIDENCE_THRESHOLD",
        "HELPDESK_HANDOFF_DEFAULT_WAIT_TIME",
        "HELPDESK_HANDOFF_SENSITIVE_TOPICS",
        "HELPDESK_HANDOFF_WAIT_TIME_MESSAGE",
        "HELPDESK_LOGGING_LEVEL",
        "HELPDESK_LOGGING_FORMAT",
        "HELPDESK_LOG_LEVEL",
        "HELPDESK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
