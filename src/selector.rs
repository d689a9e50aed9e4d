//! `RouteSelector`: picks the next binding from a routing group for one
//! message, advancing the group's rotating cursor exactly once per
//! successful selection.

use crate::binding::{Binding, BindingKind, BindingRef, LoadBalancingMode};
use crate::message::RoutableMessage;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn matches(mode: LoadBalancingMode, binding: &dyn Binding, msg: &dyn RoutableMessage) -> bool {
    if mode.excludes_remote() && binding.kind().is_remote() {
        return false;
    }
    binding.filter().map_or(true, |f| f.matches(msg))
}

/// Select the next binding from `bindings` given the group's `cursor` and the
/// table's load-balancing `mode`. Returns `None` if no binding in the group
/// matches `msg` under `mode` — callers then proceed as if the group were
/// empty.
///
/// On any `Some` result the cursor has been advanced by exactly one position
/// relative to where the scan started; on `None` the cursor is left
/// untouched.
#[must_use]
pub fn select(
    bindings: &[BindingRef],
    cursor: &AtomicU32,
    mode: LoadBalancingMode,
    msg: &dyn RoutableMessage,
) -> Option<BindingRef> {
    let len = bindings.len();
    if len == 0 {
        return None;
    }

    let start = (cursor.load(Ordering::Relaxed) as usize) % len;
    let mut pos = start;
    let mut best_low: Option<usize> = None;

    for _ in 0..len {
        let b = &bindings[pos];

        if matches(mode, b.as_ref(), msg) {
            if len == 1 {
                cursor.store(((pos + 1) % len) as u32, Ordering::Relaxed);
                return Some(Arc::clone(b));
            }

            if b.is_connected() && (mode.is_strict() || b.is_high_accept_priority(msg)) {
                cursor.store(((pos + 1) % len) as u32, Ordering::Relaxed);
                return Some(Arc::clone(b));
            }

            if best_low.is_none()
                || (mode == LoadBalancingMode::OnDemand && matches!(b.kind(), BindingKind::Local))
            {
                best_low = Some(pos);
            }
        }

        pos = (pos + 1) % len;
    }

    let chosen = best_low?;
    cursor.store(((chosen + 1) % len) as u32, Ordering::Relaxed);
    Some(Arc::clone(&bindings[chosen]))
}
