use log::warn;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

/// Logs each distinct warning key at most once.
#[derive(Debug, Default)]
pub struct WarnOnce {
    seen: Mutex<FxHashSet<String>>,
}

impl WarnOnce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the warning was emitted, `false` if the key was seen before.
    pub fn warn(&self, key: impl Into<String>, message: impl FnOnce() -> String) -> bool {
        let key = key.into();
        {
            let mut seen = self.seen.lock();
            if !seen.insert(key) {
                return false;
            }
        }
        warn!("{}", message());
        true
    }

    pub fn clear(&self) {
        self.seen.lock().clear();
    }
}

/// Deterministic 64-bit hash used for coordinate noise.
pub fn hash_coords(x: i32, y: i32, z: i32, salt: u64) -> u64 {
    let mut h = salt ^ 0x9E37_79B9_7F4A_7C15;
    for v in [x as u32 as u64, y as u32 as u64, z as u32 as u64] {
        h ^= v;
        h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h ^= h >> 31;
    }
    h ^= h >> 29;
    h = h.wrapping_mul(0x94D0_49BB_1331_11EB);
    h ^ (h >> 32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warn_once_per_key() {
        let once = WarnOnce::new();
        assert!(once.warn("a", || "first".to_string()));
        assert!(!once.warn("a", || "again".to_string()));
        assert!(once.warn("b", || "other".to_string()));
        once.clear();
        assert!(once.warn("a", || "after clear".to_string()));
    }

    #[test]
    fn test_hash_coords_is_stable() {
        assert_eq!(hash_coords(1, 2, 3, 7), hash_coords(1, 2, 3, 7));
        assert_ne!(hash_coords(1, 2, 3, 7), hash_coords(1, 2, 4, 7));
        assert_ne!(hash_coords(1, 2, 3, 7), hash_coords(1, 2, 3, 8));
    }
}
