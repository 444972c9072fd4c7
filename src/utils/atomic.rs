//! Atomic float accumulation
//!
//! Floats are accumulated through compare-and-swap over their bit pattern.
//! The add uses relaxed ordering; publication of final totals is the
//! caller's concern (an acquire fence at end-of-render).

use std::sync::atomic::{AtomicU32, Ordering};

/// Add `delta` to an f32 stored in an `AtomicU32`, returning the previous
/// value. Retries on CAS failure; each failure means another writer made
/// progress, so the loop terminates under finite contention.
pub fn add_f32(val: &AtomicU32, delta: f32) -> f32 {
    let mut old = val.load(Ordering::Relaxed);
    loop {
        let new = (f32::from_bits(old) + delta).to_bits();
        match val.compare_exchange_weak(old, new, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return f32::from_bits(old),
            Err(current) => old = current,
        }
    }
}

/// Raise an f32 stored in an `AtomicU32` to at least `value`
pub fn max_f32(val: &AtomicU32, value: f32) -> f32 {
    let mut old = val.load(Ordering::Relaxed);
    loop {
        let old_f = f32::from_bits(old);
        if old_f >= value {
            return old_f;
        }
        match val.compare_exchange_weak(
            old,
            value.to_bits(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return old_f,
            Err(current) => old = current,
        }
    }
}

pub fn load_f32(val: &AtomicU32) -> f32 {
    f32::from_bits(val.load(Ordering::Relaxed))
}

pub fn store_f32(val: &AtomicU32, value: f32) {
    val.store(value.to_bits(), Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::fence;

    #[test]
    fn test_concurrent_adds_sum() {
        let total = AtomicU32::new(0.0f32.to_bits());
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..1000 {
                        add_f32(&total, 0.5);
                    }
                });
            }
        });
        fence(Ordering::Acquire);
        assert_eq!(load_f32(&total), 4000.0);
    }

    #[test]
    fn test_max() {
        let m = AtomicU32::new(1.0f32.to_bits());
        max_f32(&m, 0.5);
        assert_eq!(load_f32(&m), 1.0);
        max_f32(&m, 2.5);
        assert_eq!(load_f32(&m), 2.5);
    }
}
