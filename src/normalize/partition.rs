use std::collections::BTreeMap;

use super::span::Reading;

/// One input row reduced to the fields the correction needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Index of the source row in the input table.
    pub row: usize,
    pub cpu: i64,
    pub ts_uptime_us: i64,
    pub reading: Reading,
}

/// Groups samples by CPU, each group sorted by timestamp.
///
/// The sort is stable, so samples sharing a timestamp keep their input
/// order. Groups iterate in ascending CPU order.
pub fn partition_by_cpu(samples: Vec<Sample>) -> BTreeMap<i64, Vec<Sample>> {
    let mut partitions: BTreeMap<i64, Vec<Sample>> = BTreeMap::new();
    for sample in samples {
        partitions.entry(sample.cpu).or_default().push(sample);
    }
    for partition in partitions.values_mut() {
        partition.sort_by_key(|s| s.ts_uptime_us);
    }
    partitions
}
