//! Near-duplicate clustering over fingerprints.
//!
//! # Algorithm
//!
//! 1. **Bucketing**: every image goes into the bucket for its capture day and
//!    the two neighbouring days. Images without a usable timestamp share an
//!    `Unknown` bucket. If that yields at most one bucket, or more than half
//!    of the images are unknown, a single global bucket is used instead.
//! 2. **Comparison**: every unordered pair is scored once. Day buckets
//!    overlap, so a pair of dated images is scored only in the lowest bucket
//!    both belong to, `Day(max(da, db) - 1)`. No pair set is kept.
//! 3. **Union-find**: pairs at or above the threshold are merged. Each root
//!    records the minimum similarity of the qualifying links inside its set.
//! 4. **Materialization**: sets with two or more members become
//!    [`SimilarityGroup`]s, largest first.
//!
//! Images whose capture days are more than two days apart never share a
//! bucket and are therefore not compared unless the global bucket is in use.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

use super::groups::SimilarityGroup;
use crate::cancel::CancelFlag;
use crate::config::{BucketingMode, DEFAULT_SIMILARITY_THRESHOLD};
use crate::features::Fingerprint;
use crate::progress::{
    Phase, ProgressCallback, ProgressThrottle, ProgressUpdate, DEFAULT_PROGRESS_INTERVAL,
};
use crate::source::ImageId;

/// Milliseconds per bucketing day.
pub const DAY_MS: i64 = 86_400_000;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y:%m:%d %H:%M:%S",
];

/// Epoch milliseconds for an ISO-8601 timestamp.
///
/// Accepts RFC 3339, offset-less date-times (taken as UTC) and bare dates.
#[must_use]
pub fn parse_timestamp_ms(timestamp: &str) -> Option<i64> {
    let ts = timestamp.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.timestamp_millis());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(ts, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(ts, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Day index (days since the Unix epoch) of a timestamp.
#[must_use]
pub fn day_index(timestamp: &str) -> Option<i64> {
    parse_timestamp_ms(timestamp).map(|ms| ms.div_euclid(DAY_MS))
}

/// Key of a comparison bucket. `Unknown` sorts after every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BucketKey {
    /// Days since the Unix epoch
    Day(i64),
    /// Missing or unparseable timestamp
    Unknown,
}

/// One image to cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterInput {
    /// Image id
    pub id: ImageId,
    /// Gradient hash
    pub fingerprint: Fingerprint,
    /// ISO-8601 creation timestamp, if known
    pub created_at: Option<String>,
}

impl ClusterInput {
    /// Create an input without a timestamp.
    #[must_use]
    pub fn new(id: impl Into<ImageId>, fingerprint: Fingerprint) -> Self {
        Self {
            id: id.into(),
            fingerprint,
            created_at: None,
        }
    }

    /// Attach a creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }
}

/// Settings for one clustering pass.
#[derive(Clone)]
pub struct ClusterConfig {
    /// Link threshold in [0, 1]
    pub threshold: f64,
    /// Bucketing strategy
    pub bucketing: BucketingMode,
    /// Minimum interval between progress updates
    pub progress_interval: Duration,
    /// Cancellation signal
    pub cancel: CancelFlag,
    /// Optional progress receiver
    pub progress: Option<Arc<dyn ProgressCallback>>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            bucketing: BucketingMode::Auto,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            cancel: CancelFlag::new(),
            progress: None,
        }
    }
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("threshold", &self.threshold)
            .field("bucketing", &self.bucketing)
            .field("progress_interval", &self.progress_interval)
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl ClusterConfig {
    /// Set the link threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the bucketing strategy.
    #[must_use]
    pub fn with_bucketing(mut self, bucketing: BucketingMode) -> Self {
        self.bucketing = bucketing;
        self
    }

    /// Set the progress throttle interval.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Use a shared cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }
}

/// Counters from a clustering pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterStats {
    /// Distinct image ids clustered
    pub images: usize,
    /// Images without a usable timestamp
    pub unknown_timestamps: usize,
    /// Buckets compared
    pub buckets: usize,
    /// Whether everything was compared in one global bucket
    pub global_fallback: bool,
    /// Upfront pair estimate used for progress
    pub pairs_estimated: usize,
    /// Pairs actually scored
    pub pairs_compared: usize,
    /// Groups emitted
    pub groups: usize,
}

/// Result of a clustering pass.
#[derive(Debug, Clone, Default)]
pub struct ClusterOutcome {
    /// Groups, largest first
    pub groups: Vec<SimilarityGroup>,
    /// Pass counters
    pub stats: ClusterStats,
    /// Whether the pass was cancelled (groups are then empty)
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy)]
struct Node {
    parent: usize,
    rank: u8,
    similarity: f64,
}

/// Disjoint-set forest over node indices.
#[derive(Debug)]
struct UnionFind {
    nodes: Vec<Node>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            nodes: (0..len)
                .map(|i| Node {
                    parent: i,
                    rank: 0,
                    similarity: 1.0,
                })
                .collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.nodes[root].parent != root {
            root = self.nodes[root].parent;
        }
        let mut cur = x;
        while self.nodes[cur].parent != root {
            let next = self.nodes[cur].parent;
            self.nodes[cur].parent = root;
            cur = next;
        }
        root
    }

    /// Link `a` and `b` with the given similarity. Returns true if two sets
    /// were merged.
    fn union(&mut self, a: usize, b: usize, similarity: f64) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            let node = &mut self.nodes[ra];
            node.similarity = node.similarity.min(similarity);
            return false;
        }

        let merged = self.nodes[ra]
            .similarity
            .min(self.nodes[rb].similarity)
            .min(similarity);

        let (root, child) = match self.nodes[ra].rank.cmp(&self.nodes[rb].rank) {
            std::cmp::Ordering::Less => (rb, ra),
            std::cmp::Ordering::Greater => (ra, rb),
            std::cmp::Ordering::Equal => {
                self.nodes[ra].rank = self.nodes[ra].rank.saturating_add(1);
                (ra, rb)
            }
        };
        self.nodes[child].parent = root;
        self.nodes[root].similarity = merged;
        true
    }
}

/// Partition node indices into day buckets (each node lands in its day and
/// both neighbours) plus an `Unknown` bucket.
fn day_buckets(days: &[Option<i64>]) -> BTreeMap<BucketKey, Vec<usize>> {
    let mut buckets: BTreeMap<BucketKey, Vec<usize>> = BTreeMap::new();
    for (node, day) in days.iter().enumerate() {
        match day {
            Some(d) => {
                for key in [d - 1, *d, d + 1] {
                    buckets.entry(BucketKey::Day(key)).or_default().push(node);
                }
            }
            None => buckets.entry(BucketKey::Unknown).or_default().push(node),
        }
    }
    buckets
}

/// Whether `key` is the lowest bucket holding both `a` and `b`.
///
/// The `Unknown` bucket never overlaps another one, and it is also the key of
/// the single global bucket.
fn owns_pair(key: BucketKey, days: &[Option<i64>], a: usize, b: usize) -> bool {
    match key {
        BucketKey::Unknown => true,
        BucketKey::Day(k) => match (days[a], days[b]) {
            (Some(da), Some(db)) => k == da.max(db) - 1,
            _ => false,
        },
    }
}

fn pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Cluster fingerprints into similarity groups.
///
/// Repeated ids are clustered once (first occurrence wins). Returns an empty,
/// `cancelled` outcome if the flag is raised before or during the pass.
pub fn cluster(inputs: &[ClusterInput], config: &ClusterConfig) -> ClusterOutcome {
    let progress = config.progress.as_deref();
    let mut stats = ClusterStats::default();

    let mut seen: HashSet<&ImageId> = HashSet::with_capacity(inputs.len());
    let nodes: Vec<&ClusterInput> = inputs.iter().filter(|i| seen.insert(&i.id)).collect();
    stats.images = nodes.len();

    let days: Vec<Option<i64>> = nodes
        .iter()
        .map(|n| n.created_at.as_deref().and_then(day_index))
        .collect();
    stats.unknown_timestamps = days.iter().filter(|d| d.is_none()).count();

    let mut buckets = match config.bucketing {
        BucketingMode::Global => BTreeMap::new(),
        BucketingMode::Auto => day_buckets(&days),
    };
    let degenerate = buckets.len() <= 1 || stats.unknown_timestamps * 2 > nodes.len();
    if degenerate {
        if config.bucketing == BucketingMode::Auto {
            log::debug!(
                "Bucketing degenerate ({} buckets, {}/{} unknown timestamps); using one global bucket",
                buckets.len(),
                stats.unknown_timestamps,
                nodes.len()
            );
        }
        buckets.clear();
        buckets.insert(BucketKey::Unknown, (0..nodes.len()).collect());
        stats.global_fallback = true;
    }
    stats.buckets = buckets.len();
    stats.pairs_estimated = buckets.values().map(|m| pair_count(m.len())).sum();

    let total = stats.pairs_estimated;
    log::info!(
        "Phase 2: comparing {} images in {} buckets (~{} pairs)",
        nodes.len(),
        stats.buckets,
        total
    );
    if let Some(cb) = progress {
        cb.on_phase_start(Phase::Comparing, total);
    }

    let cancelled = || {
        if let Some(cb) = progress {
            cb.on_phase_end(Phase::Comparing);
        }
        log::info!("Comparison cancelled");
        ClusterOutcome {
            cancelled: true,
            ..ClusterOutcome::default()
        }
    };

    let mut forest = UnionFind::new(nodes.len());
    let mut throttle = ProgressThrottle::new(config.progress_interval);
    let mut visited = 0usize;
    let mut scored = 0usize;

    for (key, members) in &buckets {
        if config.cancel.is_cancelled() {
            return cancelled();
        }
        log::trace!("Comparing bucket {:?} ({} images)", key, members.len());

        for (i, &a) in members.iter().enumerate() {
            if config.cancel.is_cancelled() {
                return cancelled();
            }
            for &b in &members[i + 1..] {
                visited += 1;
                if a != b && owns_pair(*key, &days, a, b) {
                    scored += 1;
                    let similarity = nodes[a].fingerprint.similarity(&nodes[b].fingerprint);
                    if similarity >= config.threshold && forest.union(a, b, similarity) {
                        log::trace!(
                            "Linked {} and {} ({:.3})",
                            nodes[a].id,
                            nodes[b].id,
                            similarity
                        );
                    }
                }

                if let Some(cb) = progress {
                    let current = visited.min(total);
                    if current < total && throttle.should_emit(current, total) {
                        cb.on_progress(ProgressUpdate {
                            current,
                            total,
                            phase: Phase::Comparing,
                        });
                    }
                }
            }
        }
    }
    stats.pairs_compared = scored;

    if let Some(cb) = progress {
        cb.on_progress(ProgressUpdate {
            current: total,
            total,
            phase: Phase::Comparing,
        });
    }

    let groups = materialize(&nodes, &mut forest);
    stats.groups = groups.len();
    log::info!(
        "Found {} groups after {} comparisons",
        groups.len(),
        stats.pairs_compared
    );

    if let Some(cb) = progress {
        cb.on_phase_end(Phase::Comparing);
    }
    ClusterOutcome {
        groups,
        stats,
        cancelled: false,
    }
}

fn materialize(nodes: &[&ClusterInput], forest: &mut UnionFind) -> Vec<SimilarityGroup> {
    let mut sets: HashMap<usize, Vec<usize>> = HashMap::new();
    for node in 0..nodes.len() {
        let root = forest.find(node);
        sets.entry(root).or_default().push(node);
    }

    let mut found: Vec<(usize, Vec<usize>)> = sets
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .collect();
    found.sort_by_key(|(_, members)| (Reverse(members.len()), members[0]));

    found
        .into_iter()
        .enumerate()
        .map(|(n, (root, members))| {
            SimilarityGroup::new(
                format!("group_{}", n),
                members.into_iter().map(|m| nodes[m].id.clone()).collect(),
                forest.nodes[root].similarity,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FINGERPRINT_BYTES;

    fn fp_with_flipped_bits(bits: usize) -> Fingerprint {
        let mut bytes = [0u8; FINGERPRINT_BYTES];
        for bit in 0..bits {
            bytes[bit / 8] |= 0x80 >> (bit % 8);
        }
        Fingerprint::from_bytes(bytes)
    }

    #[test]
    fn test_parse_timestamps() {
        assert_eq!(day_index("1970-01-01T00:00:00Z"), Some(0));
        assert_eq!(day_index("1970-01-02T23:59:59Z"), Some(1));
        assert_eq!(day_index("1969-12-31T23:00:00Z"), Some(-1));
        assert_eq!(day_index("1970-01-03T01:00:00+02:00"), Some(1));
        assert_eq!(day_index("1970-01-03 12:00:00"), Some(2));
        assert_eq!(day_index("1970-01-04"), Some(3));
        assert_eq!(day_index("not a date"), None);
        assert_eq!(day_index(""), None);
    }

    #[test]
    fn test_bucket_key_order() {
        assert!(BucketKey::Day(i64::MAX) < BucketKey::Unknown);
        assert!(BucketKey::Day(-5) < BucketKey::Day(3));
    }

    #[test]
    fn test_day_buckets_neighbours() {
        let buckets = day_buckets(&[Some(10), Some(12), None]);
        assert_eq!(buckets[&BucketKey::Day(9)], vec![0]);
        assert_eq!(buckets[&BucketKey::Day(11)], vec![0, 1]);
        assert_eq!(buckets[&BucketKey::Day(13)], vec![1]);
        assert_eq!(buckets[&BucketKey::Unknown], vec![2]);
        assert_eq!(buckets.len(), 6);
    }

    #[test]
    fn test_union_find_tracks_minimum() {
        let mut uf = UnionFind::new(4);
        assert!(uf.union(0, 1, 0.95));
        assert!(uf.union(2, 3, 0.90));
        assert!(uf.union(1, 2, 0.99));
        let root = uf.find(3);
        assert_eq!(uf.find(0), root);
        assert!((uf.nodes[root].similarity - 0.90).abs() < 1e-12);

        assert!(!uf.union(0, 3, 0.86));
        let root = uf.find(0);
        assert!((uf.nodes[root].similarity - 0.86).abs() < 1e-12);
    }

    #[test]
    fn test_cluster_links_and_skips() {
        let inputs = vec![
            ClusterInput::new("a", Fingerprint::zero()),
            ClusterInput::new("b", fp_with_flipped_bits(10)),
            ClusterInput::new("c", fp_with_flipped_bits(200)),
        ];
        let outcome = cluster(&inputs, &ClusterConfig::default());
        assert_eq!(outcome.groups.len(), 1);
        let group = &outcome.groups[0];
        assert_eq!(group.id, "group_0");
        assert_eq!(group.members, vec![ImageId::new("a"), ImageId::new("b")]);
        assert!((group.similarity - (1.0 - 10.0 / 256.0)).abs() < 1e-12);
        assert!(outcome.stats.global_fallback);
        assert_eq!(outcome.stats.pairs_compared, 3);
    }

    #[test]
    fn test_repeated_ids_collapse() {
        let inputs = vec![
            ClusterInput::new("a", Fingerprint::zero()),
            ClusterInput::new("a", Fingerprint::zero()),
        ];
        let outcome = cluster(&inputs, &ClusterConfig::default());
        assert!(outcome.groups.is_empty());
        assert_eq!(outcome.stats.images, 1);
    }

    #[test]
    fn test_overlapping_buckets_compare_once() {
        let inputs = vec![
            ClusterInput::new("a", Fingerprint::zero()).with_created_at("2024-03-01T10:00:00Z"),
            ClusterInput::new("b", Fingerprint::zero()).with_created_at("2024-03-01T11:00:00Z"),
        ];
        let outcome = cluster(&inputs, &ClusterConfig::default());
        assert!(!outcome.stats.global_fallback);
        assert_eq!(outcome.stats.buckets, 3);
        assert_eq!(outcome.stats.pairs_estimated, 3);
        assert_eq!(outcome.stats.pairs_compared, 1);
        assert_eq!(outcome.groups.len(), 1);
    }

    #[test]
    fn test_each_dated_pair_scored_once() {
        let days = [1u32, 1, 2, 3, 3, 4, 6, 7, 9, 9, 9, 12];
        let inputs: Vec<ClusterInput> = days
            .iter()
            .enumerate()
            .map(|(i, d)| {
                ClusterInput::new(format!("img{}", i), fp_with_flipped_bits(i * 20))
                    .with_created_at(format!("2024-03-{:02}T10:00:00Z", d))
            })
            .collect();

        let mut expected = 0;
        for (i, a) in days.iter().enumerate() {
            for b in &days[i + 1..] {
                if a.abs_diff(*b) <= 2 {
                    expected += 1;
                }
            }
        }

        let outcome = cluster(&inputs, &ClusterConfig::default());
        assert!(!outcome.stats.global_fallback);
        assert_eq!(outcome.stats.pairs_compared, expected);
        assert!(outcome.stats.pairs_compared < outcome.stats.pairs_estimated);

        let global = cluster(
            &inputs,
            &ClusterConfig::default().with_bucketing(BucketingMode::Global),
        );
        assert_eq!(global.stats.pairs_compared, pair_count(days.len()));
    }

    #[test]
    fn test_owns_pair_picks_lowest_shared_bucket() {
        let days = [Some(10), Some(12), None, None, Some(10)];
        assert!(owns_pair(BucketKey::Day(11), &days, 0, 1));
        assert!(!owns_pair(BucketKey::Day(10), &days, 0, 1));
        assert!(owns_pair(BucketKey::Day(9), &days, 0, 4));
        assert!(!owns_pair(BucketKey::Day(10), &days, 0, 4));
        assert!(owns_pair(BucketKey::Unknown, &days, 2, 3));
        assert!(!owns_pair(BucketKey::Day(11), &days, 0, 2));
    }

    #[test]
    fn test_distant_days_not_compared() {
        let inputs = vec![
            ClusterInput::new("a", Fingerprint::zero()).with_created_at("2024-03-01T10:00:00Z"),
            ClusterInput::new("b", Fingerprint::zero()).with_created_at("2024-03-10T10:00:00Z"),
        ];
        let auto = cluster(&inputs, &ClusterConfig::default());
        assert!(auto.groups.is_empty());
        assert_eq!(auto.stats.pairs_compared, 0);

        let global = cluster(
            &inputs,
            &ClusterConfig::default().with_bucketing(BucketingMode::Global),
        );
        assert_eq!(global.groups.len(), 1);
    }

    #[test]
    fn test_mostly_unknown_falls_back() {
        let inputs = vec![
            ClusterInput::new("a", Fingerprint::zero()).with_created_at("2024-03-01T10:00:00Z"),
            ClusterInput::new("b", Fingerprint::zero()),
            ClusterInput::new("c", Fingerprint::zero()),
        ];
        let outcome = cluster(&inputs, &ClusterConfig::default());
        assert!(outcome.stats.global_fallback);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].len(), 3);
    }

    #[test]
    fn test_groups_sorted_by_size() {
        let far = fp_with_flipped_bits(128);
        let inputs = vec![
            ClusterInput::new("p1", Fingerprint::zero()),
            ClusterInput::new("q1", far),
            ClusterInput::new("q2", far),
            ClusterInput::new("q3", far),
            ClusterInput::new("p2", Fingerprint::zero()),
        ];
        let outcome = cluster(&inputs, &ClusterConfig::default());
        assert_eq!(outcome.groups.len(), 2);
        assert_eq!(outcome.groups[0].len(), 3);
        assert_eq!(outcome.groups[0].id, "group_0");
        assert_eq!(outcome.groups[1].members, vec![ImageId::new("p1"), ImageId::new("p2")]);
        assert_eq!(outcome.groups[1].id, "group_1");
    }

    #[test]
    fn test_cancelled_returns_empty() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let inputs = vec![
            ClusterInput::new("a", Fingerprint::zero()),
            ClusterInput::new("b", Fingerprint::zero()),
        ];
        let outcome = cluster(&inputs, &ClusterConfig::default().with_cancel_flag(cancel));
        assert!(outcome.cancelled);
        assert!(outcome.groups.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let outcome = cluster(&[], &ClusterConfig::default());
        assert!(outcome.groups.is_empty());
        assert!(!outcome.cancelled);
        assert_eq!(outcome.stats.pairs_estimated, 0);
    }
}
