//! Deterministic accessory identifiers.

use uuid::Uuid;

/// Namespace all bridge identifiers are derived in.
const BRIDGE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_2c3a_8e4b_5d70_9a1f_0c2e_4b6d_8f10);

/// Generate a stable UUID for an arbitrary string.
///
/// The same input yields the same UUID across runs, so an accessory keyed on
/// a fixed string is found again in the cache after a restart.
pub fn generate(data: &str) -> Uuid {
    Uuid::new_v5(&BRIDGE_NAMESPACE, data.as_bytes())
}
