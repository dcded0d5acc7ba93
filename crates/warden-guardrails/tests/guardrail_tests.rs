#[cfg(test)]
mod tests {
    // ── Budget tracker ─────────────────────────────────────────

    mod budget {
        use chrono::Duration;
        use warden_config::BudgetsConfig;
        use warden_guardrails::{BudgetLimit, BudgetTracker};

        #[test]
        fn test_unlimited_without_limit() {
            let tracker = BudgetTracker::new(None);
            for _ in 0..100 {
                assert!(tracker.try_consume("anything", 1));
            }
        }

        #[test]
        fn test_window_exhaustion_refuses() {
            let tracker = BudgetTracker::new(None);
            tracker.set_limit(
                "restart_service",
                BudgetLimit::per_window(3, Duration::hours(1)),
            );
            assert!(tracker.try_consume("restart_service", 1));
            assert!(tracker.try_consume("restart_service", 1));
            assert!(tracker.try_consume("restart_service", 1));
            // Fourth attempt inside the same window is refused.
            assert!(!tracker.try_consume("restart_service", 1));

            let usage = tracker.usage("restart_service").unwrap();
            assert_eq!(usage.current_count, 3);
            assert_eq!(usage.max_operations, 3);
        }

        #[test]
        fn test_count_never_exceeds_max() {
            let tracker = BudgetTracker::new(None);
            tracker.set_limit("x", BudgetLimit::per_window(2, Duration::hours(1)));
            assert!(tracker.try_consume("x", 2));
            assert!(!tracker.try_consume("x", 1));
            assert_eq!(tracker.usage("x").unwrap().current_count, 2);
        }

        #[test]
        fn test_lazy_window_rollover() {
            let tracker = BudgetTracker::new(None);
            tracker.set_limit("x", BudgetLimit::per_window(1, Duration::milliseconds(40)));
            assert!(tracker.try_consume("x", 1));
            assert!(!tracker.try_consume("x", 1));

            std::thread::sleep(std::time::Duration::from_millis(80));
            // First call after the boundary resets the counter.
            assert!(tracker.try_consume("x", 1));
        }

        #[test]
        fn test_scopes_are_independent() {
            let tracker = BudgetTracker::new(None);
            tracker.set_limit("a", BudgetLimit::per_window(1, Duration::hours(1)));
            tracker.set_limit("b", BudgetLimit::per_window(1, Duration::hours(1)));
            assert!(tracker.try_consume("a", 1));
            assert!(tracker.try_consume("b", 1));
            assert!(!tracker.try_consume("a", 1));
            assert!(!tracker.try_consume("b", 1));
        }

        #[test]
        fn test_from_config() {
            let raw = r#"
                default_window_secs = 60
                default_max_operations = 2

                [[scopes]]
                scope = "restart_service"
                window_secs = 3600
                max_operations = 3
            "#;
            let config: BudgetsConfig = toml::from_str(raw).unwrap();
            let tracker = BudgetTracker::from_config(&config);
            assert_eq!(tracker.limit("restart_service").unwrap().max_operations, 3);
            // Unknown scopes inherit the default limit.
            assert_eq!(tracker.limit("other_tool").unwrap().max_operations, 2);
        }
    }

    // ── Anomaly detector ───────────────────────────────────────

    mod anomaly {
        use warden_core::Severity;
        use warden_guardrails::{AnomalyDetector, AnomalyKind, AnomalyThresholds};

        fn thresholds() -> AnomalyThresholds {
            AnomalyThresholds {
                repeated_failures: 3,
                cpu_spike_percent: 90.0,
                cpu_spike_samples: 3,
                memory_leak_mb: 500,
                error_rate: 0.5,
                error_rate_min_samples: 5,
            }
        }

        #[test]
        fn test_repeated_failures_fire_at_threshold() {
            let detector = AnomalyDetector::new(thresholds());
            assert!(detector.record_outcome("restart_service", false).is_empty());
            assert!(detector.record_outcome("restart_service", false).is_empty());
            let events = detector.record_outcome("restart_service", false);
            assert!(events
                .iter()
                .any(|e| e.kind == AnomalyKind::RepeatedFailure && e.severity == Severity::Critical));
        }

        #[test]
        fn test_success_resets_streak() {
            let detector = AnomalyDetector::new(thresholds());
            detector.record_outcome("x", false);
            detector.record_outcome("x", false);
            detector.record_outcome("x", true);
            assert!(detector.record_outcome("x", false).is_empty());
        }

        #[test]
        fn test_streaks_are_per_tool() {
            let detector = AnomalyDetector::new(thresholds());
            detector.record_outcome("a", false);
            detector.record_outcome("b", false);
            detector.record_outcome("a", false);
            detector.record_outcome("b", false);
            // Neither tool has reached three consecutive failures.
            assert!(detector.record_outcome("other", true).is_empty());
        }

        #[test]
        fn test_error_rate_needs_minimum_sample() {
            let detector = AnomalyDetector::new(AnomalyThresholds {
                repeated_failures: 100,
                ..thresholds()
            });
            // Four failures: below the five-sample minimum, no event.
            for _ in 0..4 {
                assert!(detector.record_outcome("x", false).is_empty());
            }
            let events = detector.record_outcome("x", false);
            assert!(events.iter().any(|e| e.kind == AnomalyKind::ErrorRate));
        }

        #[test]
        fn test_cpu_spike_requires_sustained_samples() {
            let detector = AnomalyDetector::new(thresholds());
            assert!(detector.record_resource_sample(95.0, 100).is_empty());
            assert!(detector.record_resource_sample(96.0, 100).is_empty());
            let events = detector.record_resource_sample(97.0, 100);
            assert!(events.iter().any(|e| e.kind == AnomalyKind::CpuSpike));
        }

        #[test]
        fn test_cool_sample_resets_cpu_streak() {
            let detector = AnomalyDetector::new(thresholds());
            detector.record_resource_sample(95.0, 100);
            detector.record_resource_sample(10.0, 100);
            detector.record_resource_sample(95.0, 100);
            assert!(detector.record_resource_sample(95.0, 100).is_empty());
        }

        #[test]
        fn test_memory_growth_over_baseline() {
            let detector = AnomalyDetector::new(thresholds());
            assert!(detector.record_resource_sample(10.0, 1000).is_empty());
            let events = detector.record_resource_sample(10.0, 1600);
            assert!(events.iter().any(|e| e.kind == AnomalyKind::MemoryLeak));
        }

        #[test]
        fn test_exhausted_retries_event() {
            let detector = AnomalyDetector::new(thresholds());
            let event = detector.record_exhausted_retries("restart_service", 4);
            assert_eq!(event.kind, AnomalyKind::RepeatedFailure);
            assert_eq!(event.severity, Severity::Critical);
            assert_eq!(detector.recent(1).len(), 1);
        }

        #[test]
        fn test_summary() {
            let detector = AnomalyDetector::new(thresholds());
            detector.record_outcome("x", true);
            detector.record_outcome("x", false);
            for _ in 0..3 {
                detector.record_outcome("y", false);
            }
            let summary = detector.summary();
            assert!(summary.total_24h >= 1);
            assert!(summary.critical_24h >= 1);
            assert!(summary.recent_error_rate > 0.5);
            assert!(summary.last.is_some());
        }
    }

    // ── Safe mode ──────────────────────────────────────────────

    mod safe_mode {
        use chrono::Duration;
        use warden_core::{EventBus, Severity};
        use warden_guardrails::{
            AnomalyDetector, AnomalyThresholds, SafeModeController, SafeModePolicy,
        };

        fn policy(manual: bool) -> SafeModePolicy {
            SafeModePolicy {
                auto_trip_severity: Severity::Critical,
                requires_manual_resume: manual,
                cooldown: Duration::milliseconds(30),
            }
        }

        #[test]
        fn test_trip_and_resume() {
            let controller = SafeModeController::new(policy(true), EventBus::default());
            assert!(!controller.is_active());

            controller.trip("operator pause", "alice");
            assert!(controller.is_active());
            assert_eq!(
                controller.state().reason.as_deref(),
                Some("operator pause")
            );

            controller.resume("alice").unwrap();
            assert!(!controller.is_active());
        }

        #[test]
        fn test_trip_is_idempotent() {
            let controller = SafeModeController::new(policy(true), EventBus::default());
            controller.trip("first", "alice");
            controller.trip("second", "bob");
            assert_eq!(controller.state().reason.as_deref(), Some("first"));
            assert_eq!(controller.state().activated_by.as_deref(), Some("alice"));
        }

        #[test]
        fn test_resume_is_idempotent() {
            let controller = SafeModeController::new(policy(true), EventBus::default());
            controller.resume("alice").unwrap();
            controller.trip("pause", "alice");
            controller.resume("alice").unwrap();
            controller.resume("alice").unwrap();
            assert!(!controller.is_active());
        }

        #[test]
        fn test_manual_resume_requires_actor() {
            let controller = SafeModeController::new(policy(true), EventBus::default());
            controller.trip("pause", "alice");
            assert!(controller.resume("  ").is_err());
            assert!(controller.is_active());
        }

        #[test]
        fn test_offer_trips_on_critical_only() {
            let controller = SafeModeController::new(policy(true), EventBus::default());
            let detector = AnomalyDetector::new(AnomalyThresholds {
                repeated_failures: 1,
                cpu_spike_percent: 90.0,
                cpu_spike_samples: 1,
                memory_leak_mb: 500,
                error_rate: 1.0,
                error_rate_min_samples: 100,
            });

            // Warning-severity cpu spike does not trip.
            let warning = &detector.record_resource_sample(99.0, 100)[0];
            assert!(!controller.offer(warning));

            // Critical repeated failure trips.
            let critical = &detector.record_outcome("x", false)[0];
            assert!(controller.offer(critical));
            assert!(controller.is_active());
        }

        #[test]
        fn test_auto_resume_after_cooldown() {
            let controller = SafeModeController::new(policy(false), EventBus::default());
            controller.trip("anomaly", "anomaly_detector");
            assert!(!controller.maybe_auto_resume());

            std::thread::sleep(std::time::Duration::from_millis(60));
            assert!(controller.maybe_auto_resume());
            assert!(!controller.is_active());
        }

        #[test]
        fn test_no_auto_resume_when_manual_required() {
            let controller = SafeModeController::new(policy(true), EventBus::default());
            controller.trip("anomaly", "anomaly_detector");
            std::thread::sleep(std::time::Duration::from_millis(60));
            assert!(!controller.maybe_auto_resume());
            assert!(controller.is_active());
        }

        #[test]
        fn test_transitions_are_audited() {
            let audit = std::sync::Arc::new(warden_core::AuditLog::new());
            let controller = SafeModeController::with_audit(
                policy(true),
                EventBus::default(),
                std::sync::Arc::clone(&audit),
            );

            controller.trip("operator pause", "alice");
            controller.resume("alice").unwrap();

            let records = audit.records();
            assert_eq!(records.len(), 2);
            assert!(matches!(
                records[0].event,
                warden_core::AuditEvent::SafeMode { active: true, .. }
            ));
            assert!(matches!(
                records[1].event,
                warden_core::AuditEvent::SafeMode { active: false, .. }
            ));
            assert!(audit.verify_chain());
        }

        #[test]
        fn test_transitions_are_published() {
            let bus = EventBus::default();
            let mut rx = bus.subscribe();
            let controller = SafeModeController::new(policy(true), bus);

            controller.trip("pause", "alice");
            controller.resume("alice").unwrap();

            match rx.try_recv().unwrap() {
                warden_core::ControlEvent::SafeModeTripped { actor, .. } => {
                    assert_eq!(actor, "alice");
                }
                other => panic!("unexpected event: {other:?}"),
            }
            assert!(matches!(
                rx.try_recv().unwrap(),
                warden_core::ControlEvent::SafeModeResumed { .. }
            ));
        }
    }

    // ── Confidence gate ────────────────────────────────────────

    mod confidence {
        use warden_guardrails::{ConfidenceCutoffs, ConfidenceGate};

        #[test]
        fn test_three_way_gate() {
            let cutoffs = ConfidenceCutoffs {
                auto_execute: 0.9,
                approval: 0.5,
            };
            assert_eq!(cutoffs.check(0.95), ConfidenceGate::AutoExecute);
            assert_eq!(cutoffs.check(0.7), ConfidenceGate::NeedsApproval);
            assert_eq!(cutoffs.check(0.2), ConfidenceGate::Refuse);
        }
    }
}
