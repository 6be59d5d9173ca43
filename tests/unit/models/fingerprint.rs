//! Unit tests for indicator fingerprint derivation

use serde_json::{json, Value};
use std::collections::BTreeMap;
use tradewatch::models::indicator::{IndicatorRequest, Interval};

fn request_with_params(parameters: BTreeMap<String, Value>) -> IndicatorRequest {
    IndicatorRequest {
        indicator_type: "SMA".to_string(),
        symbol: "AAPL".to_string(),
        interval: Interval::Daily,
        parameters,
        data_source: "alphavantage".to_string(),
    }
}

#[test]
fn fingerprint_is_invariant_under_key_insertion_order() {
    let mut forward = BTreeMap::new();
    forward.insert("series_type".to_string(), json!("close"));
    forward.insert("time_period".to_string(), json!(20));

    let mut reversed = BTreeMap::new();
    reversed.insert("time_period".to_string(), json!(20));
    reversed.insert("series_type".to_string(), json!("close"));

    assert_eq!(
        request_with_params(forward).fingerprint(),
        request_with_params(reversed).fingerprint()
    );
}

#[test]
fn fingerprint_canonicalizes_nested_parameter_objects() {
    let mut first = BTreeMap::new();
    first.insert("options".to_string(), json!({"a": 1, "b": {"x": 2, "y": 3}}));

    let mut second = BTreeMap::new();
    second.insert("options".to_string(), json!({"b": {"y": 3, "x": 2}, "a": 1}));

    assert_eq!(
        request_with_params(first).fingerprint(),
        request_with_params(second).fingerprint()
    );
}

#[test]
fn fingerprint_differs_when_parameters_differ() {
    let mut twenty = BTreeMap::new();
    twenty.insert("time_period".to_string(), json!(20));
    let mut fifty = BTreeMap::new();
    fifty.insert("time_period".to_string(), json!(50));

    assert_ne!(
        request_with_params(twenty).fingerprint(),
        request_with_params(fifty).fingerprint()
    );
}

#[test]
fn fingerprint_normalizes_type_and_symbol_case() {
    let upper = IndicatorRequest {
        indicator_type: "SMA".to_string(),
        symbol: "AAPL".to_string(),
        interval: Interval::Daily,
        parameters: BTreeMap::new(),
        data_source: "alphavantage".to_string(),
    };
    let lower = IndicatorRequest {
        indicator_type: "sma".to_string(),
        symbol: "aapl".to_string(),
        interval: Interval::Daily,
        parameters: BTreeMap::new(),
        data_source: "ALPHAVANTAGE".to_string(),
    };

    assert_eq!(upper.fingerprint(), lower.fingerprint());
}

#[test]
fn fingerprint_differs_across_intervals() {
    let daily = request_with_params(BTreeMap::new());
    let mut weekly = request_with_params(BTreeMap::new());
    weekly.interval = Interval::Weekly;

    assert_ne!(daily.fingerprint(), weekly.fingerprint());
}
