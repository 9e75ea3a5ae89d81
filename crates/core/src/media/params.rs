use std::sync::Arc;

use parking_lot::RwLock;

/// An SPS/PPS pair from one encoder format description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    /// Sequence parameter set NAL unit (type 7), header byte included.
    pub sps: Vec<u8>,
    /// Picture parameter set NAL unit (type 8), header byte included.
    pub pps: Vec<u8>,
}

impl ParameterSets {
    pub fn new(sps: impl Into<Vec<u8>>, pps: impl Into<Vec<u8>>) -> Self {
        Self {
            sps: sps.into(),
            pps: pps.into(),
        }
    }

    /// Derive profile-level-id from the SPS (RFC 6184 §8.1): bytes 1–3 are
    /// profile_idc, constraint flags, level_idc.
    pub fn profile_level_id(&self) -> Option<String> {
        if self.sps.len() < 4 {
            return None;
        }
        Some(format!(
            "{:02x}{:02x}{:02x}",
            self.sps[1], self.sps[2], self.sps[3]
        ))
    }
}

/// Latest SPS/PPS for one stream.
///
/// The pair is stored as one immutable `Arc<ParameterSets>` and swapped as
/// a whole, so [`snapshot`](Self::snapshot) never mixes an SPS from one
/// update with a PPS from another. Cloning the cache shares the slot; the
/// encoder's format-change path can update it while the driver reads it.
#[derive(Debug, Clone, Default)]
pub struct ParameterSetCache {
    current: Arc<RwLock<Option<Arc<ParameterSets>>>>,
}

impl ParameterSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached pair.
    pub fn update(&self, sps: &[u8], pps: &[u8]) {
        self.replace(ParameterSets::new(sps, pps));
    }

    /// Replace the cached pair with an already-built value.
    ///
    /// Returns `true` when the new pair differs from the previous one.
    pub fn replace(&self, sets: ParameterSets) -> bool {
        let mut slot = self.current.write();
        let changed = slot.as_deref() != Some(&sets);
        if changed {
            tracing::debug!(
                sps_len = sets.sps.len(),
                pps_len = sets.pps.len(),
                profile_level_id = sets.profile_level_id().as_deref().unwrap_or("-"),
                "parameter sets updated"
            );
            *slot = Some(Arc::new(sets));
        }
        changed
    }

    /// Current pair, if the encoder has reported one.
    pub fn snapshot(&self) -> Option<Arc<ParameterSets>> {
        self.current.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn empty_until_updated() {
        let cache = ParameterSetCache::new();
        assert!(cache.is_empty());
        assert!(cache.snapshot().is_none());

        cache.update(&[0x67, 0x42, 0x00, 0x1e], &[0x68, 0xce]);
        let snap = cache.snapshot().unwrap();
        assert_eq!(snap.sps, vec![0x67, 0x42, 0x00, 0x1e]);
        assert_eq!(snap.pps, vec![0x68, 0xce]);
    }

    #[test]
    fn update_overwrites_previous_pair() {
        let cache = ParameterSetCache::new();
        cache.update(&[0x67, 1], &[0x68, 1]);
        let old = cache.snapshot().unwrap();
        cache.update(&[0x67, 2], &[0x68, 2]);

        // An earlier snapshot is unaffected by later updates.
        assert_eq!(old.sps, vec![0x67, 1]);
        assert_eq!(cache.snapshot().unwrap().pps, vec![0x68, 2]);
    }

    #[test]
    fn replace_reports_change() {
        let cache = ParameterSetCache::new();
        assert!(cache.replace(ParameterSets::new(vec![0x67], vec![0x68])));
        assert!(!cache.replace(ParameterSets::new(vec![0x67], vec![0x68])));
        assert!(cache.replace(ParameterSets::new(vec![0x67, 1], vec![0x68])));
    }

    #[test]
    fn clones_share_state() {
        let cache = ParameterSetCache::new();
        let writer = cache.clone();
        writer.update(&[0x67], &[0x68]);
        assert!(!cache.is_empty());
    }

    #[test]
    fn snapshot_never_torn() {
        let cache = ParameterSetCache::new();
        cache.update(&[0x67, 0], &[0x68, 0]);

        let writer = cache.clone();
        let handle = thread::spawn(move || {
            for generation in 1..=255u8 {
                writer.update(&[0x67, generation], &[0x68, generation]);
            }
        });

        for _ in 0..10_000 {
            let snap = cache.snapshot().unwrap();
            assert_eq!(snap.sps[1], snap.pps[1], "SPS and PPS from different updates");
        }
        handle.join().unwrap();
    }

    #[test]
    fn profile_level_id_from_sps() {
        let sets = ParameterSets::new(vec![0x67, 0x42, 0xC0, 0x1F], vec![0x68]);
        assert_eq!(sets.profile_level_id().as_deref(), Some("42c01f"));
        assert!(ParameterSets::new(vec![0x67], vec![0x68]).profile_level_id().is_none());
    }
}
