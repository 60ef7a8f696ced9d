//! Integration tests for the LRU-K replacer's eviction ordering.

use trackdb::buffer::LruKReplacer;
use trackdb::common::FrameId;

#[test]
fn frames_below_k_accesses_evict_before_frames_at_k() {
    let replacer = LruKReplacer::new(2, 10);

    // Frame 0 has a single access (+inf k-distance).
    replacer.record_access(FrameId::new(0));
    replacer.set_evictable(FrameId::new(0), true);

    // Frame 1 has two accesses (finite k-distance), so it's preferred to
    // stay resident over frame 0.
    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(1));
    replacer.set_evictable(FrameId::new(1), true);

    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), None);
}

#[test]
fn pinned_frames_are_never_evicted() {
    let replacer = LruKReplacer::new(2, 10);

    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));
    replacer.set_evictable(FrameId::new(1), true);

    // Frame 0 is never marked evictable, so it must never surface.
    for _ in 0..3 {
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        replacer.record_access(FrameId::new(1));
        replacer.set_evictable(FrameId::new(1), true);
    }
}

#[test]
fn remove_drops_a_frame_from_consideration_without_evicting_it() {
    let replacer = LruKReplacer::new(2, 10);

    replacer.record_access(FrameId::new(0));
    replacer.set_evictable(FrameId::new(0), true);
    replacer.record_access(FrameId::new(1));
    replacer.set_evictable(FrameId::new(1), true);

    assert_eq!(replacer.size(), 2);
    replacer.remove(FrameId::new(0));
    assert_eq!(replacer.size(), 1);
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
}

#[test]
fn repeated_access_refreshes_k_distance_and_delays_eviction() {
    let replacer = LruKReplacer::new(2, 10);

    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(0));
    replacer.set_evictable(FrameId::new(0), true);

    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(1));
    replacer.set_evictable(FrameId::new(1), true);

    // Touch frame 0 again; its k-distance shrinks, so frame 1 now has the
    // larger backward distance and is evicted first.
    replacer.record_access(FrameId::new(0));

    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
}
