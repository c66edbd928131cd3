//! Registry of bucket daemons.
//!
//! Maps each bucket to the single daemon that owns it. The registry has no
//! locking of its own; the supervisor keeps it behind one mutex.

use std::collections::HashMap;

use gcsvol_common::types::BucketName;

use crate::daemon::BucketDaemon;

/// Bucket → daemon mapping with unique keys.
#[derive(Debug, Default)]
pub struct MountRegistry {
    daemons: HashMap<BucketName, BucketDaemon>,
}

impl MountRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a daemon under its bucket.
    ///
    /// Returns the daemon that previously owned the bucket, if any.
    pub fn insert(&mut self, daemon: BucketDaemon) -> Option<BucketDaemon> {
        self.daemons.insert(daemon.bucket().clone(), daemon)
    }

    /// Looks up the daemon for a bucket.
    #[must_use]
    pub fn get(&self, bucket: &BucketName) -> Option<&BucketDaemon> {
        self.daemons.get(bucket)
    }

    /// Looks up the daemon for a bucket mutably.
    pub fn get_mut(&mut self, bucket: &BucketName) -> Option<&mut BucketDaemon> {
        self.daemons.get_mut(bucket)
    }

    /// Removes and returns the daemon for a bucket.
    pub fn remove(&mut self, bucket: &BucketName) -> Option<BucketDaemon> {
        self.daemons.remove(bucket)
    }

    /// Removes and returns every daemon, sorted by bucket.
    pub fn drain(&mut self) -> Vec<BucketDaemon> {
        let mut daemons: Vec<_> = self.daemons.drain().map(|(_, d)| d).collect();
        daemons.sort_by(|a, b| a.bucket().cmp(b.bucket()));
        daemons
    }
}
