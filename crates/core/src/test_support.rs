// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proptest strategies shared by other crates' property tests (I1 slot
//! uniqueness, I2 status monotonicity). Gated behind `test-support` so
//! production builds never pull in `proptest`.

use crate::batch::BatchConfig;
use crate::ids::{BatchId, SlotId, MAX_SLOTS};
use proptest::prelude::*;

/// An arbitrary valid slot number in `1..=MAX_SLOTS`.
pub fn slot_id_strategy() -> impl Strategy<Value = SlotId> {
    (1..=MAX_SLOTS).prop_map(|n| SlotId::new(n).unwrap_or(SlotId::FIRST))
}

/// An arbitrary batch id drawn from a small alphabet, for collision testing.
pub fn batch_id_strategy() -> impl Strategy<Value = BatchId> {
    "[a-z]{1,8}".prop_map(BatchId::new)
}

/// An arbitrary `BatchConfig` with a random but valid slot assignment,
/// for use by the Batch Config Service's I1 proptest module.
pub fn batch_config_strategy() -> impl Strategy<Value = BatchConfig> {
    (batch_id_strategy(), slot_id_strategy()).prop_map(|(id, slot_id)| {
        BatchConfig::builder().id(id.as_str()).slot_id(slot_id).build()
    })
}
