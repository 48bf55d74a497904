use core_logic::{ChainConfig, HttpConfig};

#[test]
fn test_http_config_defaults() {
    let config = HttpConfig::default();
    assert_eq!(config.timeout_secs, 30);
    assert_eq!(config.max_attempts, 3);
    assert_eq!(config.backoff_base_ms, 3_000);
}

#[test]
fn test_http_config_partial_json() {
    let config: HttpConfig = serde_json::from_str(r#"{"max_attempts": 5}"#).unwrap();
    assert_eq!(config.max_attempts, 5);
    assert_eq!(config.timeout_secs, 30);
}

#[test]
fn test_chain_config_default_is_incomplete() {
    let config = ChainConfig::default();
    assert!(!config.is_complete());
    assert_eq!(config.contract_method, "withdraw");
    assert_eq!(
        config.missing_fields(),
        vec!["rpc_url", "chain_id", "contract_address"]
    );
}

#[test]
fn test_chain_config_complete() {
    let config = ChainConfig {
        rpc_url: "https://rpc.example.com".to_string(),
        chain_id: 8453,
        contract_address: "0x0000000000000000000000000000000000000001".to_string(),
        ..ChainConfig::default()
    };
    assert!(config.is_complete());
}
