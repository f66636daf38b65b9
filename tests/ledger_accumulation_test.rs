// ==========================================
// 批次台账累加测试
// ==========================================
// 职责: 验证累加语义、并发不丢更新、非法输入不改数据
// ==========================================


#[cfg(test)]
mod ledger_accumulation_test {
    use itad_ledger::api::ApiError;
    use itad_ledger::app::AppState;
    use itad_ledger::domain::types::{AuditAction, AuditModule, CostKind};
    use itad_ledger::domain::{LedgerOperation, Money, RequestMetadata};
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    use crate::test_helpers::{actor, create_test_db, create_test_state, seed_batch};

    fn batch_totals(state: &AppState, batch_id: &str) -> (Money, Money) {
        let summary = state.finance_api.get_batch_financials(batch_id).unwrap();
        (summary.total_cost, summary.revenue_total)
    }

    #[test]
    fn test_scenario_cost_then_revenue() {
        let (_tmp, state) = create_test_state();
        seed_batch(&state, "B1", "W1", &[]);

        state
            .finance_api
            .update_batch_totals(&LedgerOperation::new("B1", "cost", json!(100)), Some(actor("u-1")), RequestMetadata::default())
            .unwrap();
        state
            .finance_api
            .update_batch_totals(&LedgerOperation::new("B1", "revenue", json!(40)), Some(actor("u-1")), RequestMetadata::default())
            .unwrap();

        let summary = state.finance_api.get_batch_financials("B1").unwrap();
        assert_eq!(summary.acquisition_cost, Money::from_cents(10_000));
        assert_eq!(summary.total_cost, Money::from_cents(10_000));
        assert_eq!(summary.revenue_total, Money::from_cents(4_000));

        let finance_logs: Vec<_> = state
            .audit_api
            .history("BATCH", "B1")
            .unwrap()
            .into_iter()
            .filter(|e| e.module == AuditModule::Finance)
            .collect();
        assert_eq!(finance_logs.len(), 2);
        assert!(finance_logs.iter().all(|e| e.action == AuditAction::Update));
        assert!(finance_logs.iter().all(|e| e.user_id.as_deref() == Some("u-1")));

        let revenue_change = &finance_logs[0].changes_summary.as_ref().unwrap()["revenue_total"];
        assert_eq!(revenue_change.old, json!(0.0));
        assert_eq!(revenue_change.new, json!(40.0));
    }

    #[test]
    fn test_itemized_expenses_accumulate_per_kind() {
        let (_tmp, state) = create_test_state();
        seed_batch(&state, "B1", "W1", &[]);

        for (kind, amount) in [("logistics", "12.50"), ("logistics", "7.50"), ("data_wipe", "30"), ("acquisition", "200")] {
            state
                .finance_api
                .set_batch_expense(&LedgerOperation::new("B1", kind, json!(amount)), None, RequestMetadata::default())
                .unwrap();
        }
        state
            .finance_api
            .update_batch_totals(&LedgerOperation::new("B1", "revenue", json!(400)), None, RequestMetadata::default())
            .unwrap();

        let summary = state.finance_api.get_batch_financials("B1").unwrap();
        assert_eq!(summary.cost_breakdown[&CostKind::Logistics], Money::from_cents(2_000));
        assert_eq!(summary.cost_breakdown[&CostKind::DataWipe], Money::from_cents(3_000));
        assert_eq!(summary.cost_breakdown[&CostKind::Parts], Money::ZERO);
        assert_eq!(summary.total_cost, Money::from_cents(25_000));
        assert_eq!(summary.gross_profit, Money::from_cents(20_000));
        assert_eq!(summary.operating_profit, Money::from_cents(15_000));
        assert_eq!(summary.profit_margin_pct, 37.5);
    }

    #[test]
    fn test_invalid_amounts_leave_totals_unchanged() {
        let (_tmp, state) = create_test_state();
        seed_batch(&state, "B1", "W1", &[]);
        state
            .finance_api
            .update_batch_totals(&LedgerOperation::new("B1", "cost", json!(10)), None, RequestMetadata::default())
            .unwrap();

        for amount in [json!(-5), json!("abc"), json!("NaN"), json!("Infinity")] {
            let err = state
                .finance_api
                .update_batch_totals(&LedgerOperation::new("B1", "cost", amount), None, RequestMetadata::default())
                .unwrap_err();
            assert!(matches!(err, ApiError::InvalidAmount(_)));
        }

        let err = state
            .finance_api
            .set_batch_expense(&LedgerOperation::new("B1", "cost", json!(1)), None, RequestMetadata::default())
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidKind(_)));

        assert_eq!(batch_totals(&state, "B1"), (Money::from_cents(1_000), Money::ZERO));
        let finance_entries = state
            .audit_api
            .history("BATCH", "B1")
            .unwrap()
            .into_iter()
            .filter(|e| e.module == AuditModule::Finance)
            .count();
        assert_eq!(finance_entries, 1);
    }

    #[test]
    fn test_overflowing_accumulation_is_rejected_and_state_stays_usable() {
        let (_tmp, state) = create_test_state();
        seed_batch(&state, "B1", "W1", &[]);
        let max_amount = json!("999999999999999.99");

        // 92 笔最大金额仍在 i64 分范围内, 分散到两个科目
        for kind in ["acquisition", "logistics"] {
            for _ in 0..46 {
                state
                    .finance_api
                    .set_batch_expense(&LedgerOperation::new("B1", kind, max_amount.clone()), None, RequestMetadata::default())
                    .unwrap();
            }
        }
        let before = batch_totals(&state, "B1");
        assert_eq!(before.0, Money::from_cents(92 * 99_999_999_999_999_999));

        let err = state
            .finance_api
            .set_batch_expense(&LedgerOperation::new("B1", "parts", max_amount.clone()), None, RequestMetadata::default())
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidAmount(_)));
        assert_eq!(batch_totals(&state, "B1"), before);

        // 拒绝后连接与锁仍可用
        state
            .finance_api
            .update_batch_totals(&LedgerOperation::new("B1", "revenue", json!("1.00")), None, RequestMetadata::default())
            .unwrap();
        let summary = state.finance_api.get_batch_financials("B1").unwrap();
        assert_eq!(summary.revenue_total, Money::from_cents(100));
        assert_eq!(summary.cost_breakdown[&CostKind::Parts], Money::ZERO);
    }

    #[test]
    fn test_zero_with_exponent_is_accepted_as_noop() {
        let (_tmp, state) = create_test_state();
        seed_batch(&state, "B1", "W1", &[]);

        state
            .finance_api
            .update_batch_totals(&LedgerOperation::new("B1", "revenue", json!("0e99")), None, RequestMetadata::default())
            .unwrap();
        assert_eq!(batch_totals(&state, "B1"), (Money::ZERO, Money::ZERO));
    }

    #[test]
    fn test_unknown_batch_is_not_found() {
        let (_tmp, state) = create_test_state();
        let err = state
            .finance_api
            .update_batch_totals(&LedgerOperation::new("B404", "revenue", json!(1)), None, RequestMetadata::default())
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_concurrent_accumulation_on_shared_state() {
        let (_tmp, state) = create_test_state();
        seed_batch(&state, "B1", "W1", &[]);
        let state = Arc::new(state);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = state.clone();
                thread::spawn(move || {
                    for j in 0..10 {
                        let cents = 100 + i * 10 + j;
                        let amount = format!("{}.{:02}", cents / 100, cents % 100);
                        state
                            .finance_api
                            .update_batch_totals(&LedgerOperation::new("B1", "cost", json!(amount)), None, RequestMetadata::default())
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let expected: i64 = (0..8).flat_map(|i| (0..10).map(move |j| 100 + i * 10 + j)).sum();
        assert_eq!(batch_totals(&state, "B1").0, Money::from_cents(expected));
    }

    #[test]
    fn test_concurrent_accumulation_across_connections() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let states: Vec<Arc<AppState>> = (0..4)
            .map(|_| Arc::new(AppState::new(db_path.clone()).unwrap()))
            .collect();
        seed_batch(&states[0], "B1", "W1", &[]);

        let handles: Vec<_> = states
            .iter()
            .cloned()
            .map(|state| {
                thread::spawn(move || {
                    for _ in 0..25 {
                        state
                            .finance_api
                            .update_batch_totals(&LedgerOperation::new("B1", "revenue", json!(0.01)), None, RequestMetadata::default())
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(batch_totals(&states[0], "B1").1, Money::from_cents(100));
        let finance_entries = states[0]
            .audit_api
            .history("BATCH", "B1")
            .unwrap()
            .into_iter()
            .filter(|e| e.module == AuditModule::Finance)
            .count();
        assert_eq!(finance_entries, 100);
    }
}
