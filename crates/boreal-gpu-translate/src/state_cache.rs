//! Shadowed render-state groups.
//!
//! The translator tracks sixteen 32-bit state groups: slots 0-7 hold the
//! grouped immediate-state words, slots 8-15 the single-word pipeline
//! controls. A group that arrives with an unchanged value is not re-emitted.

pub const GROUP_COUNT: usize = 16;

#[derive(Debug, Default, Clone)]
pub struct RenderStateCache {
    values: [u32; GROUP_COUNT],
    valid: u16,
}

impl RenderStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a group value unconditionally, bypassing change detection.
    /// Used for the descriptor words that never emit by themselves.
    pub fn store(&mut self, group: usize, value: u32) {
        debug_assert!(group < GROUP_COUNT);
        self.values[group] = value;
        self.valid |= 1 << group;
    }

    /// Compare-and-update: returns `true` when the caller must translate and
    /// emit (first sighting or changed value), `false` when the device
    /// already holds this exact value.
    pub fn cache_group(&mut self, group: usize, value: u32) -> bool {
        debug_assert!(group < GROUP_COUNT);
        let mask = 1u16 << group;
        if self.valid & mask != 0 && self.values[group] == value {
            return false;
        }
        self.values[group] = value;
        self.valid |= mask;
        true
    }

    pub fn get(&self, group: usize) -> u32 {
        debug_assert!(group < GROUP_COUNT);
        self.values[group]
    }

    pub fn is_valid(&self, group: usize) -> bool {
        debug_assert!(group < GROUP_COUNT);
        self.valid & (1 << group) != 0
    }

    /// Forget every shadow at once. Group-by-group invalidation is never
    /// needed; the cache lives and dies with its context.
    pub fn reset(&mut self) {
        self.valid = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_use_and_change_report_changed() {
        let mut c = RenderStateCache::new();
        assert!(c.cache_group(5, 0xAA));
        assert!(!c.cache_group(5, 0xAA));
        assert!(c.cache_group(5, 0xAB));
        assert_eq!(c.get(5), 0xAB);
    }

    #[test]
    fn groups_are_independent() {
        let mut c = RenderStateCache::new();
        assert!(c.cache_group(0, 1));
        assert!(c.cache_group(15, 1));
        assert!(!c.cache_group(0, 1));
    }

    #[test]
    fn reset_invalidates_everything() {
        let mut c = RenderStateCache::new();
        c.store(3, 9);
        assert!(c.is_valid(3));
        c.reset();
        assert!(!c.is_valid(3));
        assert!(c.cache_group(3, 9));
    }
}
