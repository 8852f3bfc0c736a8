//! N+1 lazy-load detection.
//!
//! The N+1 pattern shows up when code loads N owners and then reads an
//! association on each one, issuing N+1 queries where `includes` would issue 2.
//! Every lazily executed association query reports its
//! [`LoadOrigin`](rowmodel_core::LoadOrigin) to the session, which counts it
//! here.
//!
//! ```ignore
//! // warns once three posts have each loaded their user
//! for post in &posts {
//!     post.load_one::<User, _>(&session, "user")?;
//! }
//!
//! // one extra query instead of N
//! let posts = session.query::<Post>().includes("user").all(&session)?;
//! ```

use std::collections::HashMap;

use serde::Serialize;

/// Tracks lazy loads per `(owner table, association)`.
#[derive(Debug)]
pub struct N1QueryTracker {
    counts: HashMap<(&'static str, &'static str), usize>,
    threshold: usize,
    enabled: bool,
}

impl Default for N1QueryTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about N+1 detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct N1Stats {
    /// Total number of lazy loads recorded
    pub total_loads: usize,
    /// Number of distinct associations loaded
    pub relationships_loaded: usize,
    /// Number of associations at or above the threshold
    pub potential_n1: usize,
}

impl N1QueryTracker {
    /// Create a new tracker with default threshold (3).
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            threshold: 3,
            enabled: true,
        }
    }

    /// A warning is emitted when the number of lazy loads for a single
    /// association reaches this threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Record one lazy load of `relationship` on an `owner` record.
    pub fn record_load(&mut self, owner: &'static str, relationship: &'static str) {
        if !self.enabled {
            return;
        }

        let count = self.counts.entry((owner, relationship)).or_insert(0);
        *count += 1;

        if *count == self.threshold {
            tracing::warn!(
                target: "rowmodel::n1",
                owner,
                relationship,
                queries = *count,
                threshold = self.threshold,
                "N+1 query pattern detected; consider `includes(\"{relationship}\")`"
            );
        }
    }

    /// Reset all counts. Sessions call this when a unit of work ends.
    pub fn reset(&mut self) {
        self.counts.clear();
    }

    #[must_use]
    pub fn count_for(&self, owner: &str, relationship: &str) -> usize {
        self.counts
            .iter()
            .find(|((o, r), _)| *o == owner && *r == relationship)
            .map_or(0, |(_, c)| *c)
    }

    #[must_use]
    pub fn stats(&self) -> N1Stats {
        N1Stats {
            total_loads: self.counts.values().sum(),
            relationships_loaded: self.counts.len(),
            potential_n1: self
                .counts
                .values()
                .filter(|c| **c >= self.threshold)
                .count(),
        }
    }
}
