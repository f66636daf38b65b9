// ==========================================
// ConfigManager 集成测试
// ==========================================
// 测试目标: 验证配置读取默认值、覆写、以及配置对业务行为的影响
// ==========================================


use itad_ledger::app::handlers::set_batch_price;
use itad_ledger::config::{config_keys, ConfigManager, LedgerConfigReader};
use itad_ledger::domain::RequestMetadata;
use itad_ledger::CommentRequest;
use serde_json::json;
use test_helpers::{actor, create_test_db, create_test_state, seed_batch};

#[tokio::test]
async fn test_config_manager_creation() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");

    let config_manager = ConfigManager::new(&db_path);
    assert!(
        config_manager.is_ok(),
        "ConfigManager should be created successfully"
    );
}

#[tokio::test]
async fn test_defaults_on_fresh_database() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    let config_manager = ConfigManager::new(&db_path).expect("Failed to create ConfigManager");

    assert_eq!(config_manager.get_outbox_max_retries().await.unwrap(), 5);
    assert_eq!(config_manager.get_outbox_flush_interval_secs().await.unwrap(), 30);
    assert_eq!(config_manager.get_comment_min_len().await.unwrap(), 3);
    assert_eq!(config_manager.get_comment_max_len().await.unwrap(), 1000);
    assert_eq!(config_manager.get_currency_symbol().await.unwrap(), "Q");
}

#[tokio::test]
async fn test_overrides_persist_across_instances() {
    let (_temp_file, db_path) = create_test_db().expect("Failed to create test db");
    {
        let writer = ConfigManager::new(&db_path).unwrap();
        writer
            .set_global_config_value(config_keys::OUTBOX_FLUSH_INTERVAL_SECS, "120")
            .unwrap();
        writer
            .set_global_config_value(config_keys::OUTBOX_MAX_RETRIES, "0")
            .unwrap();
    }

    let reader = ConfigManager::new(&db_path).unwrap();
    assert_eq!(reader.get_outbox_flush_interval_secs().await.unwrap(), 120);
    // 下限为 1
    assert_eq!(reader.get_outbox_max_retries().await.unwrap(), 1);
}

#[tokio::test]
async fn test_currency_symbol_drives_distribution_message() {
    let (_tmp, state) = create_test_state();
    seed_batch(&state, "B1", "W1", &["U1", "U2"]);
    state
        .config
        .set_global_config_value(config_keys::CURRENCY_SYMBOL, "$")
        .unwrap();

    let resp = set_batch_price(
        &state,
        None,
        RequestMetadata::default(),
        json!({"batchId": "B1", "totalPrice": "80"}),
    )
    .await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body["message"], json!("售价 $80.00 已分摊到 2 台设备"));
}

#[tokio::test]
async fn test_comment_bounds_follow_configuration() {
    let (_tmp, state) = create_test_state();
    seed_batch(&state, "B1", "W1", &[]);
    state
        .config
        .set_global_config_value(config_keys::COMMENT_MAX_LEN, "10")
        .unwrap();

    let req = |text: &str| CommentRequest {
        entity_type: Some("BATCH".to_string()),
        entity_id: Some("B1".to_string()),
        entity_reference: None,
        comment: Some(text.to_string()),
        module: None,
    };

    let ok = state
        .audit_api
        .add_comment(&req("diez chars"), Some(actor("u-1")), RequestMetadata::default())
        .await;
    assert!(ok.is_ok());

    let too_long = state
        .audit_api
        .add_comment(&req("once chars!"), Some(actor("u-1")), RequestMetadata::default())
        .await;
    assert_eq!(too_long.unwrap_err().status(), 400);
}
