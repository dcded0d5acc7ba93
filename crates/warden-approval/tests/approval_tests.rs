#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::time::Duration;
    use warden_approval::{ApprovalOutcome, ApprovalState, ApprovalWorkflow};
    use warden_core::{EventBus, ProposedAction, RiskLevel};

    fn workflow(timeout: Duration) -> ApprovalWorkflow {
        ApprovalWorkflow::new(timeout, EventBus::default())
    }

    fn action(tool: &str) -> ProposedAction {
        ProposedAction::new(tool, json!({"unit": "docker.service"}), "agent", RiskLevel::High)
    }

    #[tokio::test]
    async fn test_approve_releases_waiter() {
        let wf = workflow(Duration::from_secs(60));
        let (request, rx) = wf.submit(&action("restart_service"), None, 0.7);
        assert_eq!(request.state, ApprovalState::Pending);
        assert_eq!(wf.pending_count(), 1);

        let decided = wf.approve(request.id, "alice").unwrap();
        assert_eq!(decided.state, ApprovalState::Approved);
        assert_eq!(decided.decided_by.as_deref(), Some("alice"));

        assert_eq!(
            rx.await.unwrap(),
            ApprovalOutcome::Approved {
                actor: "alice".into()
            }
        );
        assert_eq!(wf.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reject_releases_waiter_with_note() {
        let wf = workflow(Duration::from_secs(60));
        let (request, rx) = wf.submit(&action("restart_service"), None, 0.7);

        wf.reject(request.id, "bob", Some("not during peak".into()))
            .unwrap();
        match rx.await.unwrap() {
            ApprovalOutcome::Rejected { actor, note } => {
                assert_eq!(actor, "bob");
                assert_eq!(note.as_deref(), Some("not during peak"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_decision_is_already_decided() {
        let wf = workflow(Duration::from_secs(60));
        let (request, _rx) = wf.submit(&action("restart_service"), None, 0.7);

        wf.approve(request.id, "alice").unwrap();
        let err = wf.reject(request.id, "bob", None).unwrap_err();
        assert!(matches!(
            err,
            warden_core::WardenError::AlreadyDecided { .. }
        ));

        // The real outcome is the first one.
        assert_eq!(
            wf.get(request.id).unwrap().state,
            ApprovalState::Approved
        );
    }

    #[tokio::test]
    async fn test_unknown_request_id() {
        let wf = workflow(Duration::from_secs(60));
        let err = wf.approve(uuid::Uuid::new_v4(), "alice").unwrap_err();
        assert!(matches!(
            err,
            warden_core::WardenError::ApprovalNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_timer_expires_pending_request() {
        let wf = workflow(Duration::from_millis(40));
        let (request, rx) = wf.submit(&action("restart_service"), None, 0.7);

        assert_eq!(rx.await.unwrap(), ApprovalOutcome::Expired);
        let expired = wf.get(request.id).unwrap();
        assert_eq!(expired.state, ApprovalState::Expired);
        // Expiry is tagged distinctly, not as a human rejection.
        assert!(expired.decided_by.is_none());
    }

    #[tokio::test]
    async fn test_late_approval_after_expiry_loses_race() {
        let wf = workflow(Duration::from_millis(30));
        let (request, rx) = wf.submit(&action("restart_service"), None, 0.7);

        // Wait until the timer has fired.
        assert_eq!(rx.await.unwrap(), ApprovalOutcome::Expired);

        let err = wf.approve(request.id, "alice").unwrap_err();
        assert!(matches!(
            err,
            warden_core::WardenError::AlreadyDecided { .. }
        ));
        assert_eq!(wf.get(request.id).unwrap().state, ApprovalState::Expired);
    }

    #[tokio::test]
    async fn test_decision_beats_timer() {
        let wf = workflow(Duration::from_millis(80));
        let (request, rx) = wf.submit(&action("restart_service"), None, 0.7);

        wf.approve(request.id, "alice").unwrap();
        // Let the timer fire; it must not overwrite the decision.
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(
            rx.await.unwrap(),
            ApprovalOutcome::Approved {
                actor: "alice".into()
            }
        );
        assert_eq!(wf.get(request.id).unwrap().state, ApprovalState::Approved);
    }

    #[tokio::test]
    async fn test_cancel_pending_request() {
        let wf = workflow(Duration::from_secs(60));
        let (request, rx) = wf.submit(&action("restart_service"), None, 0.7);

        let cancelled = wf.cancel(request.id, "scheduler").unwrap();
        assert_eq!(cancelled.state, ApprovalState::Rejected);
        assert_eq!(cancelled.note.as_deref(), Some("cancelled"));
        assert!(matches!(
            rx.await.unwrap(),
            ApprovalOutcome::Rejected { .. }
        ));

        // A second cancel is an idempotency violation, not a merge.
        assert!(matches!(
            wf.cancel(request.id, "scheduler").unwrap_err(),
            warden_core::WardenError::AlreadyDecided { .. }
        ));
    }

    #[tokio::test]
    async fn test_pending_listing_oldest_first() {
        let wf = workflow(Duration::from_secs(60));
        let (first, _rx1) = wf.submit(&action("a"), None, 0.7);
        let (second, _rx2) = wf.submit(&action("b"), None, 0.7);

        let pending = wf.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first.id);
        assert_eq!(pending[1].id, second.id);
    }

    #[tokio::test]
    async fn test_history_pagination_and_filter() {
        let wf = workflow(Duration::from_secs(60));
        for i in 0..5 {
            let (request, _rx) = wf.submit(&action(&format!("tool_{i}")), None, 0.7);
            if i % 2 == 0 {
                wf.approve(request.id, "alice").unwrap();
            } else {
                wf.reject(request.id, "alice", None).unwrap();
            }
        }

        let newest_two = wf.history(0, 2, false);
        assert_eq!(newest_two.len(), 2);
        assert_eq!(newest_two[0].tool_name, "tool_4");

        let approved = wf.history(0, 10, true);
        assert_eq!(approved.len(), 3);
        assert!(approved
            .iter()
            .all(|r| r.state == ApprovalState::Approved));

        let second_page = wf.history(1, 2, false);
        assert_eq!(second_page.len(), 2);
        assert_eq!(second_page[0].tool_name, "tool_2");
    }

    #[tokio::test]
    async fn test_dry_run_preview_travels_with_request() {
        let wf = workflow(Duration::from_secs(60));
        let report = warden_core::DryRunReport {
            summary: "would restart docker.service".into(),
            changes: vec![],
            affected: vec!["docker.service".into()],
            warnings: vec![],
            reversible: true,
        };
        let (request, _rx) = wf.submit(&action("restart_service"), Some(report), 0.7);
        let stored = wf.get(request.id).unwrap();
        assert_eq!(
            stored.dry_run.unwrap().affected,
            vec!["docker.service".to_string()]
        );
    }
}
