//! In-process approximate nearest-neighbor index.
//!
//! The store keeps every active chunk vector in this IVF-style index:
//! vectors are partitioned by k-means into `√n` clusters, and a query probes
//! only the closest clusters instead of scanning the whole corpus — sub-linear
//! average lookup once the corpus is large. Below [`EXHAUSTIVE_FLOOR`]
//! entries the index falls back to an exact scan, so small corpora (and the
//! test suite) get exact results.
//!
//! Clustering is rebuilt when the corpus has doubled since the last build.
//! Centroid seeding uses a fixed RNG seed, so index builds are reproducible
//! for a given insertion sequence.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;

use crate::embedding::cosine_similarity;

/// Below this many entries, search scans everything (exact results).
const EXHAUSTIVE_FLOOR: usize = 256;

/// Maximum k-means refinement passes per rebuild.
const KMEANS_ITERATIONS: usize = 10;

struct IndexEntry {
    id: String,
    vector: Vec<f32>,
}

pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    tombstones: HashSet<usize>,
    centroids: Vec<Vec<f32>>,
    postings: Vec<Vec<usize>>,
    /// Entry count at the time of the last clustering build.
    indexed_len: usize,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            tombstones: HashSet::new(),
            centroids: Vec::new(),
            postings: Vec::new(),
            indexed_len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len() - self.tombstones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a vector. Insertion order is the search tie-breaker, so callers
    /// must insert in persistence order when reloading.
    pub fn insert(&mut self, id: impl Into<String>, vector: Vec<f32>) {
        let idx = self.entries.len();
        self.entries.push(IndexEntry {
            id: id.into(),
            vector,
        });

        if !self.centroids.is_empty() {
            let c = self.nearest_centroid(&self.entries[idx].vector);
            self.postings[c].push(idx);
        }

        self.maybe_rebuild();
    }

    /// Drop entries (e.g. superseded chunk generations) from search results.
    pub fn remove(&mut self, ids: &[String]) {
        let dead: HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();
        for (idx, entry) in self.entries.iter().enumerate() {
            if dead.contains(entry.id.as_str()) {
                self.tombstones.insert(idx);
            }
        }
    }

    /// Rank entries by cosine similarity to `query`, most similar first,
    /// ties broken by insertion order. When `allowed` is given, entries
    /// outside it are excluded before ranking.
    ///
    /// Results above the exhaustive floor are approximate: only the probed
    /// clusters are scanned.
    pub fn search(
        &self,
        query: &[f32],
        allowed: Option<&HashSet<String>>,
    ) -> Vec<(String, f32)> {
        let candidate_indices: Vec<usize> = if self.should_scan_exhaustively() {
            (0..self.entries.len()).collect()
        } else {
            self.probe_clusters(query)
        };

        let mut scored: Vec<(usize, f32)> = candidate_indices
            .into_iter()
            .filter(|idx| !self.tombstones.contains(idx))
            .filter(|idx| match allowed {
                Some(set) => set.contains(self.entries[*idx].id.as_str()),
                None => true,
            })
            .map(|idx| (idx, cosine_similarity(query, &self.entries[idx].vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        scored
            .into_iter()
            .map(|(idx, sim)| (self.entries[idx].id.clone(), sim))
            .collect()
    }

    fn should_scan_exhaustively(&self) -> bool {
        self.centroids.is_empty() || self.entries.len() < EXHAUSTIVE_FLOOR
    }

    fn probe_clusters(&self, query: &[f32]) -> Vec<usize> {
        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(c, centroid)| (c, cosine_similarity(query, centroid)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let nprobe = ((self.centroids.len() as f64).sqrt().ceil() as usize).max(2);

        let mut candidates = Vec::new();
        for (c, _) in ranked.into_iter().take(nprobe) {
            candidates.extend_from_slice(&self.postings[c]);
        }
        candidates.sort_unstable();
        candidates
    }

    fn maybe_rebuild(&mut self) {
        let n = self.entries.len();
        if n < EXHAUSTIVE_FLOOR {
            return;
        }
        if self.indexed_len > 0 && n < self.indexed_len * 2 {
            return;
        }
        self.rebuild();
    }

    fn rebuild(&mut self) {
        // Purge tombstones while we are re-deriving everything anyway.
        if !self.tombstones.is_empty() {
            let mut kept = Vec::with_capacity(self.entries.len() - self.tombstones.len());
            for (idx, entry) in self.entries.drain(..).enumerate() {
                if !self.tombstones.contains(&idx) {
                    kept.push(entry);
                }
            }
            self.entries = kept;
            self.tombstones.clear();
        }

        let n = self.entries.len();
        let k = ((n as f64).sqrt() as usize).clamp(4, 256).min(n);
        if n == 0 || k == 0 {
            self.centroids.clear();
            self.postings.clear();
            self.indexed_len = 0;
            return;
        }

        // Seed centroids from a deterministic sample of the corpus.
        let mut rng = StdRng::seed_from_u64(n as u64);
        let mut sample: Vec<usize> = (0..n).collect();
        sample.shuffle(&mut rng);
        self.centroids = sample
            .into_iter()
            .take(k)
            .map(|i| self.entries[i].vector.clone())
            .collect();

        let mut assignments = vec![0usize; n];
        for _ in 0..KMEANS_ITERATIONS {
            let mut moved = false;
            for (i, entry) in self.entries.iter().enumerate() {
                let c = self.nearest_centroid(&entry.vector);
                if assignments[i] != c {
                    assignments[i] = c;
                    moved = true;
                }
            }

            let dims = self.entries[0].vector.len();
            let mut sums = vec![vec![0.0f32; dims]; self.centroids.len()];
            let mut counts = vec![0usize; self.centroids.len()];
            for (i, entry) in self.entries.iter().enumerate() {
                counts[assignments[i]] += 1;
                for (d, v) in entry.vector.iter().enumerate() {
                    sums[assignments[i]][d] += v;
                }
            }
            for (c, centroid) in self.centroids.iter_mut().enumerate() {
                if counts[c] > 0 {
                    *centroid = sums[c]
                        .iter()
                        .map(|s| s / counts[c] as f32)
                        .collect();
                }
            }

            if !moved {
                break;
            }
        }

        self.postings = vec![Vec::new(); self.centroids.len()];
        for (i, c) in assignments.iter().enumerate() {
            self.postings[*c].push(i);
        }
        self.indexed_len = n;
    }

    fn nearest_centroid(&self, vector: &[f32]) -> usize {
        let mut best = 0usize;
        let mut best_sim = f32::NEG_INFINITY;
        for (c, centroid) in self.centroids.iter().enumerate() {
            let sim = cosine_similarity(vector, centroid);
            if sim > best_sim {
                best_sim = sim;
                best = c;
            }
        }
        best
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis_vector(dims: usize, axis: usize, value: f32) -> Vec<f32> {
        let mut v = vec![0.0; dims];
        v[axis % dims] = value;
        v
    }

    #[test]
    fn exact_search_ranks_self_first() {
        let mut index = VectorIndex::new();
        for i in 0..20 {
            index.insert(format!("c{i}"), axis_vector(8, i, 1.0));
        }
        let hits = index.search(&axis_vector(8, 3, 1.0), None);
        assert_eq!(hits[0].0, "c3");
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn similarities_are_non_increasing() {
        let mut index = VectorIndex::new();
        index.insert("a", vec![1.0, 0.0]);
        index.insert("b", vec![0.7, 0.7]);
        index.insert("c", vec![0.0, 1.0]);
        let hits = index.search(&[1.0, 0.0], None);
        for pair in hits.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut index = VectorIndex::new();
        index.insert("first", vec![1.0, 0.0]);
        index.insert("second", vec![1.0, 0.0]);
        let hits = index.search(&[1.0, 0.0], None);
        assert_eq!(hits[0].0, "first");
        assert_eq!(hits[1].0, "second");
    }

    #[test]
    fn allowed_set_filters_before_ranking() {
        let mut index = VectorIndex::new();
        index.insert("a", vec![1.0, 0.0]);
        index.insert("b", vec![0.9, 0.1]);
        let allowed: HashSet<String> = ["b".to_string()].into_iter().collect();
        let hits = index.search(&[1.0, 0.0], Some(&allowed));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "b");
    }

    #[test]
    fn removed_entries_stop_matching() {
        let mut index = VectorIndex::new();
        index.insert("old", vec![1.0, 0.0]);
        index.insert("new", vec![1.0, 0.0]);
        index.remove(&["old".to_string()]);
        let hits = index.search(&[1.0, 0.0], None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "new");
    }

    #[test]
    fn clustered_search_still_finds_the_query_vector() {
        let mut index = VectorIndex::new();
        // Enough entries to trigger clustering.
        for i in 0..600 {
            index.insert(format!("c{i}"), axis_vector(32, i, 1.0 + (i % 7) as f32));
        }
        assert!(!index.centroids.is_empty());

        let query = axis_vector(32, 11, 1.0);
        let hits = index.search(&query, None);
        // The exact-direction match must surface despite cluster probing.
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }
}
