// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn header_id_prefers_canonical_config_location() {
    let mut cfg = BatchConfig::builder().build();
    cfg.header_id = Some("legacy-1".into());
    cfg.config.insert("headerId".into(), json!("canonical-1"));
    assert_eq!(cfg.header_id(), Some("canonical-1".to_string()));
}

#[test]
fn header_id_falls_back_to_legacy_field() {
    let mut cfg = BatchConfig::builder().build();
    cfg.header_id = Some("legacy-1".into());
    assert_eq!(cfg.header_id(), Some("legacy-1".to_string()));
}

#[test]
fn set_header_id_writes_only_canonical_location() {
    let mut cfg = BatchConfig::builder().build();
    cfg.set_header_id("new-header");
    assert_eq!(cfg.header_id, None);
    assert_eq!(cfg.config.get("headerId"), Some(&json!("new-header")));
}

#[test]
fn hardware_satisfies_when_manifest_requires_nothing() {
    let cfg = BatchConfig::builder().build();
    assert!(cfg.hardware_satisfies(&[]));
}

#[test]
fn hardware_satisfies_fails_when_manifest_requires_hardware_and_batch_has_none() {
    let cfg = BatchConfig::builder().build();
    assert!(!cfg.hardware_satisfies(&["scanner".to_string()]));
}

#[test]
fn hardware_satisfies_when_batch_overrides_explicitly() {
    let mut cfg = BatchConfig::builder().build();
    cfg.hardware.insert("scanner".into(), json!({"port": "/dev/ttyUSB0"}));
    assert!(cfg.hardware_satisfies(&["scanner".to_string()]));
}

#[test]
fn merge_dicts_extends_rather_than_replaces() {
    let mut cfg = BatchConfig::builder().build();
    cfg.parameters.insert("a".into(), json!(1));
    cfg.merge_dicts(None, Some([("b".to_string(), json!(2))].into_iter().collect()), None);
    assert_eq!(cfg.parameters.get("a"), Some(&json!(1)));
    assert_eq!(cfg.parameters.get("b"), Some(&json!(2)));
}

#[test]
fn builder_defaults_to_first_slot() {
    let cfg = BatchConfig::builder().build();
    assert_eq!(cfg.slot_id, SlotId::FIRST);
}
