// ==========================================
// 审计追踪测试
// ==========================================
// 职责: 验证审计日志归属、排序、只追加、发件箱补写、人工评论
// ==========================================


#[cfg(test)]
mod audit_trail_test {
    use itad_ledger::api::{ApiError, CommentRequest};
    use itad_ledger::domain::types::{AuditAction, AuditEntityType, AuditModule};
    use itad_ledger::domain::{ActorContext, AuditSearchFilter, LedgerOperation, RequestMetadata};
    use itad_ledger::engine::{AuditRecorder, BatchTotalsAccumulator, LedgerEntryValidator, SessionChannel, SessionContextPropagator};
    use itad_ledger::domain::LedgerRoute;
    use itad_ledger::repository::audit_outbox_repo::{AuditOutboxRepository, OutboxStatus};
    use serde_json::json;
    use std::sync::Arc;

    use crate::test_helpers::{actor, create_test_state, seed_batch};

    struct UnavailableChannel;

    impl SessionChannel for UnavailableChannel {
        fn publish(&self, _scope_id: &str, _actor: &ActorContext) -> anyhow::Result<()> {
            anyhow::bail!("session channel offline")
        }
        fn clear(&self, _scope_id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn comment(entity_type: &str, entity_id: &str, text: &str) -> CommentRequest {
        CommentRequest {
            entity_type: Some(entity_type.to_string()),
            entity_id: Some(entity_id.to_string()),
            entity_reference: Some("REF-1".to_string()),
            comment: Some(text.to_string()),
            module: None,
        }
    }

    #[test]
    fn test_each_operation_produces_exactly_one_entry() {
        let (_tmp, state) = create_test_state();
        seed_batch(&state, "B1", "W1", &["U1", "U2"]);
        let before = state.audit_api.history("BATCH", "B1").unwrap().len();

        let metadata = RequestMetadata {
            ip_address: Some("10.0.0.5".to_string()),
            endpoint: Some("/api/finanzas/update-batch-totals".to_string()),
            ..Default::default()
        };
        state
            .finance_api
            .update_batch_totals(&LedgerOperation::new("B1", "cost", json!(5)), Some(actor("u-1")), metadata.clone())
            .unwrap();
        assert_eq!(state.audit_api.history("BATCH", "B1").unwrap().len(), before + 1);

        state
            .warehouse_api
            .set_batch_price(
                &itad_ledger::domain::PriceDistributionRequest {
                    batch_id: Some("B1".to_string()),
                    warehouse_code: None,
                    total_price: Some(json!(10)),
                },
                Some(actor("u-1")),
                RequestMetadata::default(),
            )
            .unwrap();

        let logs = state.audit_api.history("BATCH", "B1").unwrap();
        assert_eq!(logs.len(), before + 2);
        let finance = logs.iter().find(|e| e.module == AuditModule::Finance).unwrap();
        assert_eq!(finance.metadata, metadata);
        assert_eq!(finance.user_email.as_deref(), Some("u-1@itad.test"));
        assert_eq!(finance.ticket_id.as_deref(), Some("T-B1"));
        assert_eq!(finance.entity_reference.as_deref(), Some("LOT-B1"));
    }

    #[test]
    fn test_history_is_newest_first() {
        let (_tmp, state) = create_test_state();
        seed_batch(&state, "B1", "W1", &[]);
        for i in 0..5 {
            state
                .finance_api
                .update_batch_totals(&LedgerOperation::new("B1", "revenue", json!(i + 1)), None, RequestMetadata::default())
                .unwrap();
        }

        let logs = state.audit_api.history("BATCH", "B1").unwrap();
        assert_eq!(logs.len(), 6);
        assert!(logs.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert_eq!(logs.last().unwrap().action, AuditAction::Create);
        assert!(state.audit_api.history("SPACESHIP", "B1").unwrap().is_empty());
    }

    #[test]
    fn test_binding_failure_degrades_to_system_actor() {
        let (_tmp, state) = create_test_state();
        seed_batch(&state, "B1", "W1", &[]);

        let recorder = Arc::new(AuditRecorder::new(state.conn.clone()));
        let accumulator = BatchTotalsAccumulator::new(state.conn.clone(), recorder);
        let propagator = SessionContextPropagator::new(Arc::new(UnavailableChannel));

        let scope = propagator.bind(Some(actor("u-1")));
        assert!(scope.is_degraded());
        let op = LedgerEntryValidator::new()
            .validate(&LedgerOperation::new("B1", "cost", json!(3)), LedgerRoute::BatchTotals)
            .unwrap();
        let applied = accumulator.apply(&op, &scope).unwrap();
        assert!(applied.audit_recorded);

        let latest = &state.audit_api.history("BATCH", "B1").unwrap()[0];
        assert!(latest.is_system());
        assert_eq!(latest.actor_display(), "system");
    }

    #[test]
    fn test_outbox_replays_after_audit_table_recovers() {
        let (_tmp, state) = create_test_state();
        seed_batch(&state, "B1", "W1", &[]);

        state
            .conn
            .lock()
            .unwrap()
            .execute_batch("ALTER TABLE audit_logs RENAME TO audit_logs_offline")
            .unwrap();

        state
            .finance_api
            .update_batch_totals(&LedgerOperation::new("B1", "revenue", json!(12)), Some(actor("u-2")), RequestMetadata::default())
            .unwrap();
        let summary = state.finance_api.get_batch_financials("B1").unwrap();
        assert_eq!(summary.revenue_total.cents(), 1_200);

        let outbox = AuditOutboxRepository::new(state.conn.clone());
        assert_eq!(outbox.count_by_status(OutboxStatus::Pending).unwrap(), 1);

        state
            .conn
            .lock()
            .unwrap()
            .execute_batch("ALTER TABLE audit_logs_offline RENAME TO audit_logs")
            .unwrap();

        let report = state.audit_recorder.flush_outbox(5).unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(outbox.count_by_status(OutboxStatus::Delivered).unwrap(), 1);

        let latest = &state.audit_api.history("BATCH", "B1").unwrap()[0];
        assert_eq!(latest.module, AuditModule::Finance);
        assert_eq!(latest.user_id.as_deref(), Some("u-2"));

        // 再次补写不会重复
        let report = state.audit_recorder.flush_outbox(5).unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(state.audit_api.history("BATCH", "B1").unwrap().len(), 2);
    }

    #[test]
    fn test_audit_log_rows_are_append_only() {
        let (_tmp, state) = create_test_state();
        seed_batch(&state, "B1", "W1", &[]);

        let conn = state.conn.lock().unwrap();
        assert!(conn.execute("UPDATE audit_logs SET description = 'x'", []).is_err());
        assert!(conn.execute("DELETE FROM audit_logs", []).is_err());
    }

    #[tokio::test]
    async fn test_comment_resolves_linkage_and_requires_actor() {
        let (_tmp, state) = create_test_state();
        seed_batch(&state, "B1", "W1", &["U1"]);

        let entry = state
            .audit_api
            .add_comment(&comment("asset", "U1", "  pantalla rayada  "), Some(actor("u-3")), RequestMetadata::default())
            .await
            .unwrap();
        assert_eq!(entry.action, AuditAction::Comment);
        assert_eq!(entry.entity_type, AuditEntityType::Asset);
        assert_eq!(entry.description, "pantalla rayada");
        assert_eq!(entry.asset_id.as_deref(), Some("U1"));
        assert_eq!(entry.batch_id.as_deref(), Some("B1"));
        assert_eq!(entry.ticket_id.as_deref(), Some("T-B1"));
        assert_eq!(entry.additional_data.as_ref().unwrap()["is_manual"], json!(true));

        let err = state
            .audit_api
            .add_comment(&comment("BATCH", "B1", "ok!"), None, RequestMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));

        let err = state
            .audit_api
            .add_comment(&comment("BATCH", "B1", " a "), Some(actor("u-3")), RequestMetadata::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);

        let err = state
            .audit_api
            .add_comment(&comment("SALE", "S1", "valid text"), Some(actor("u-3")), RequestMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let long = "x".repeat(1001);
        let err = state
            .audit_api
            .add_comment(&comment("TICKET", "T-1", &long), Some(actor("u-3")), RequestMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }

    #[test]
    fn test_search_filters_and_paginates() {
        let (_tmp, state) = create_test_state();
        seed_batch(&state, "B1", "W1", &["U1", "U2", "U3"]);
        seed_batch(&state, "B2", "W2", &[]);
        state
            .finance_api
            .update_batch_totals(&LedgerOperation::new("B2", "cost", json!(1)), Some(actor("u-7")), RequestMetadata::default())
            .unwrap();

        let reception = AuditSearchFilter {
            module: Some(AuditModule::Reception),
            ..Default::default()
        };
        let page = state.audit_api.search(&reception, Some(1), Some(2)).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.logs.len(), 2);

        let by_user = AuditSearchFilter {
            user_id: Some("u-7".to_string()),
            ..Default::default()
        };
        let page = state.audit_api.search(&by_user, None, None).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.logs[0].entity_id, "B2");

        let text = AuditSearchFilter {
            search: Some("lot-b2".to_string()),
            ..Default::default()
        };
        assert_eq!(state.audit_api.search(&text, None, None).unwrap().total, 2);

        let found = state.audit_api.find(&page.logs[0].id).unwrap();
        assert_eq!(found.id, page.logs[0].id);
        assert_eq!(state.audit_api.find("missing").unwrap_err().status(), 404);
    }
}
