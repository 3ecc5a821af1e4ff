//! Quality statistics over a memory population

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::MemoryRecord;

/// How many memories to surface in the effectiveness ranking
const TOP_N: usize = 5;

/// A memory ranked by how often it actually prevented a repeat mistake
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedMemory {
    pub id: Uuid,
    pub error_signature: String,
    pub error_category: String,
    pub hit_count: u32,
    pub times_saved: u32,
    /// times_saved / max(hit_count, 1)
    pub effectiveness: f64,
}

/// Aggregated statistics for one store (or one global domain)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    pub total: usize,
    pub active: usize,
    pub archived: usize,
    pub total_hits: u64,
    pub total_saves: u64,
    /// Share of surfaced matches that were confirmed useful (0.0 - 1.0)
    pub save_rate: f64,
    /// Active memory count per category; empty category reported as "unknown"
    pub categories: BTreeMap<String, usize>,
    /// Most effective active memories, best first
    pub top_memories: Vec<RankedMemory>,
}

impl StatsReport {
    /// Aggregate over every record of a store, archived included.
    pub fn from_records(records: &[MemoryRecord]) -> Self {
        let total = records.len();
        let archived = records.iter().filter(|r| r.is_archived()).count();
        let active = total - archived;

        let total_hits: u64 = records.iter().map(|r| u64::from(r.hit_count)).sum();
        let total_saves: u64 = records.iter().map(|r| u64::from(r.times_saved)).sum();
        let save_rate = if total_hits > 0 {
            total_saves as f64 / total_hits as f64
        } else {
            0.0
        };

        let mut categories: BTreeMap<String, usize> = BTreeMap::new();
        for record in records.iter().filter(|r| !r.is_archived()) {
            let key = if record.error_category.is_empty() {
                "unknown".to_string()
            } else {
                record.error_category.clone()
            };
            *categories.entry(key).or_default() += 1;
        }

        let mut ranked: Vec<RankedMemory> = records
            .iter()
            .filter(|r| !r.is_archived())
            .map(|r| RankedMemory {
                id: r.id,
                error_signature: truncate(&r.error_signature, 80),
                error_category: r.error_category.clone(),
                hit_count: r.hit_count,
                times_saved: r.times_saved,
                effectiveness: r.effectiveness(),
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.effectiveness
                .partial_cmp(&a.effectiveness)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.hit_count.cmp(&a.hit_count))
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.truncate(TOP_N);

        Self {
            total,
            active,
            archived,
            total_hits,
            total_saves,
            save_rate,
            categories,
            top_memories: ranked,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryRecord;

    fn record(category: &str, hits: u32, saves: u32) -> MemoryRecord {
        let mut r = MemoryRecord::new(format!("sig-{category}-{hits}-{saves}"))
            .with_category(category);
        r.hit_count = hits;
        r.times_saved = saves;
        r
    }

    #[test]
    fn aggregates_counts_and_save_rate() {
        let mut archived = record("api", 2, 0);
        archived.state = crate::record::MemoryState::Archived;

        let records = vec![record("api", 4, 2), record("database", 4, 0), archived];
        let report = StatsReport::from_records(&records);

        assert_eq!(report.total, 3);
        assert_eq!(report.active, 2);
        assert_eq!(report.archived, 1);
        assert_eq!(report.total_hits, 10);
        assert_eq!(report.total_saves, 2);
        assert!((report.save_rate - 0.2).abs() < 1e-9);
        assert_eq!(report.categories.get("api"), Some(&1));
        assert_eq!(report.categories.get("database"), Some(&1));
    }

    #[test]
    fn ranks_by_effectiveness() {
        let records = vec![
            record("api", 10, 1),  // 0.1
            record("api", 4, 3),   // 0.75
            record("api", 2, 1),   // 0.5
        ];
        let report = StatsReport::from_records(&records);

        let eff: Vec<f64> = report
            .top_memories
            .iter()
            .map(|m| m.effectiveness)
            .collect();
        assert_eq!(eff, vec![0.75, 0.5, 0.1]);
    }

    #[test]
    fn archived_memories_never_rank() {
        let mut archived = record("api", 10, 10);
        archived.state = crate::record::MemoryState::Archived;
        let records = vec![archived, record("api", 2, 1)];

        let report = StatsReport::from_records(&records);
        assert_eq!(report.top_memories.len(), 1);
        assert!((report.top_memories[0].effectiveness - 0.5).abs() < 1e-9);
    }

    #[test]
    fn zero_hits_do_not_divide_by_zero() {
        let mut r = MemoryRecord::new("sig");
        r.hit_count = 0;
        let report = StatsReport::from_records(&[r]);
        assert_eq!(report.save_rate, 0.0);
        assert_eq!(report.top_memories[0].effectiveness, 0.0);
    }
}
