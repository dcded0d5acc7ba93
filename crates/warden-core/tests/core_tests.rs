#[cfg(test)]
mod tests {
    // ── Audit log ──────────────────────────────────────────────

    mod audit {
        use serde_json::json;
        use uuid::Uuid;
        use warden_core::{AuditEntry, AuditEvent, AuditLog};

        fn decision_entry(actor: &str) -> AuditEntry {
            AuditEntry::new(
                actor,
                AuditEvent::Decision {
                    verdict: "allow".into(),
                    matched_rule: Some("health_check".into()),
                    reason: "read-only".into(),
                },
            )
        }

        #[test]
        fn test_append_links_chain() {
            let log = AuditLog::new();
            let first = log.append(decision_entry("scheduler"));
            let second = log.append(decision_entry("scheduler"));

            assert!(first.prev_hash.is_none());
            assert_eq!(second.prev_hash.as_deref(), Some(first.hash.as_str()));
            assert_ne!(first.hash, second.hash);
        }

        #[test]
        fn test_verify_chain() {
            let log = AuditLog::new();
            for _ in 0..5 {
                log.append(decision_entry("scheduler"));
            }
            assert!(log.verify_chain());
            assert_eq!(log.len(), 5);
        }

        #[test]
        fn test_empty_chain_verifies() {
            let log = AuditLog::new();
            assert!(log.is_empty());
            assert!(log.verify_chain());
        }

        #[test]
        fn test_filter_by_job_and_action() {
            let log = AuditLog::new();
            let action_id = Uuid::new_v4();
            log.append(decision_entry("scheduler").job("nightly").action(action_id));
            log.append(decision_entry("scheduler").job("other"));

            assert_eq!(log.for_job("nightly").len(), 1);
            assert_eq!(log.for_action(action_id).len(), 1);
            assert!(log.for_job("missing").is_empty());
        }

        #[test]
        fn test_detail_round_trips() {
            let log = AuditLog::new();
            let record = log.append(
                AuditEntry::new(
                    "executor",
                    AuditEvent::ExecutionResult {
                        success: false,
                        summary: "exit 1".into(),
                    },
                )
                .detail(json!({"attempt": 2})),
            );
            assert_eq!(record.detail["attempt"], 2);
        }
    }

    // ── Event bus ──────────────────────────────────────────────

    mod events {
        use warden_core::{ControlEvent, EventBus};

        #[tokio::test]
        async fn test_publish_subscribe() {
            let bus = EventBus::new(16);
            let mut rx = bus.subscribe();
            bus.publish(ControlEvent::JobSubmitted {
                job_id: "nightly".into(),
            });
            match rx.recv().await.unwrap() {
                ControlEvent::JobSubmitted { job_id } => assert_eq!(job_id, "nightly"),
                other => panic!("unexpected event: {other:?}"),
            }
        }

        #[test]
        fn test_publish_without_subscribers_is_fine() {
            let bus = EventBus::default();
            bus.publish(ControlEvent::SafeModeResumed {
                actor: "operator".into(),
            });
        }

        #[test]
        fn test_event_serializes_tagged() {
            let event = ControlEvent::BudgetRefused {
                scope: "restart_service".into(),
                used: 3.0,
                limit: 3.0,
            };
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["kind"], "budget_refused");
            assert_eq!(json["scope"], "restart_service");
        }
    }

    // ── Action vocabulary ──────────────────────────────────────

    mod action {
        use serde_json::json;
        use warden_core::{ProposedAction, RiskLevel, Severity, Verdict};

        #[test]
        fn test_proposed_action_new() {
            let action = ProposedAction::new(
                "restart_service",
                json!({"unit": "docker.service"}),
                "agent",
                RiskLevel::High,
            );
            assert_eq!(action.tool_name, "restart_service");
            assert_eq!(action.requested_by, "agent");
            assert_eq!(action.risk_hint, RiskLevel::High);
        }

        #[test]
        fn test_risk_ordering() {
            assert!(RiskLevel::Low < RiskLevel::Medium);
            assert!(RiskLevel::High < RiskLevel::Critical);
        }

        #[test]
        fn test_severity_ordering() {
            assert!(Severity::Warning < Severity::Critical);
        }

        #[test]
        fn test_verdict_display() {
            assert_eq!(Verdict::RequireApproval.to_string(), "require_approval");
            assert_eq!(Verdict::Allow.to_string(), "allow");
        }

        #[test]
        fn test_verdict_serde() {
            let v: Verdict = serde_json::from_str("\"require_approval\"").unwrap();
            assert_eq!(v, Verdict::RequireApproval);
        }
    }

    // ── Errors ─────────────────────────────────────────────────

    mod error {
        use warden_core::WardenError;

        #[test]
        fn test_refusals_carry_reasons() {
            let err = WardenError::BudgetExceeded {
                scope: "restart_service".into(),
                used: 4.0,
                limit: 3.0,
            };
            let msg = err.to_string();
            assert!(msg.contains("restart_service"));
            assert!(msg.contains("limit 3"));

            let err = WardenError::SafeModeBlocked {
                reason: "repeated_failure".into(),
            };
            assert!(err.to_string().contains("repeated_failure"));
        }
    }
}
