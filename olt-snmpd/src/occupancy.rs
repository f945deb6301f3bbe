use std::collections::BTreeSet;
use shared::protocol::MAX_ONU_PER_PON;

/// Slots in 1..=128 that are not in `occupied`, ascending. Ids outside the
/// range are ignored.
pub fn free_slots(occupied: &BTreeSet<u32>) -> Vec<u32> {
    (1..=MAX_ONU_PER_PON)
        .filter(|slot| !occupied.contains(slot))
        .collect()
}
