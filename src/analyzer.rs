//! Descriptive statistics over a loaded flow table.
//!
//! Every function here is a pure read over [`FlowTable`]; nothing is cached
//! and running an analysis twice yields identical results.
//!
//! # Ranking
//!
//! Rankings count occurrences of a key and sort by count descending. The sort
//! is stable, so equal counts keep the order in which their keys were first
//! grouped:
//! - talkers, listeners, applications: order of first appearance in the log
//! - communication pairs: lexicographic `(src, dst)` order
//!
//! # Traffic Estimate
//! estimated bytes = Σ ip_size × sampling_rate(first row)
//!
//! The first row's sampling rate stands in for the whole log. This is an
//! approximation inherited from how the logs are produced (constant rate per
//! agent) and is kept exactly.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use serde::Serialize;
use tracing::debug;

use crate::loader::FlowTable;
use crate::record::Protocol;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A ranked key and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedCount<K> {
    pub key: K,
    pub count: usize,
}

/// Occurrence count of an ordered (source, destination) address pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairCount {
    pub src_ip: String,
    pub dst_ip: String,
    pub count: usize,
}

/// TCP/UDP share of all sampled rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolMix {
    pub total: usize,
    pub tcp_count: usize,
    pub udp_count: usize,
    pub tcp_percentage: f64,
    pub udp_percentage: f64,
}

impl ProtocolMix {
    /// Percentages use the full row count as denominator, so they need not
    /// add up to 100 when other protocols are present. An empty table
    /// reports 0% for both.
    pub fn from_table(table: &FlowTable) -> Self {
        let mut tcp_count = 0;
        let mut udp_count = 0;

        for record in table.records() {
            match record.protocol() {
                Protocol::Tcp => tcp_count += 1,
                Protocol::Udp => udp_count += 1,
                Protocol::Other(_) => {}
            }
        }

        let total = table.len();
        Self {
            total,
            tcp_count,
            udp_count,
            tcp_percentage: percentage(tcp_count, total),
            udp_percentage: percentage(udp_count, total),
        }
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

/// Extrapolated traffic volume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficEstimate {
    pub total_ip_size: u64,
    /// Sampling rate of the first row; `None` for an empty table.
    pub sampling_rate: Option<u32>,
    pub estimated_total_bytes: u64,
    pub estimated_total_mb: f64,
}

impl TrafficEstimate {
    pub fn from_table(table: &FlowTable) -> Self {
        let total_ip_size: u64 = table.records().iter().map(|r| r.ip_size as u64).sum();
        let sampling_rate = table.first().map(|r| r.sampling_rate);
        let estimated_total_bytes =
            total_ip_size.saturating_mul(sampling_rate.unwrap_or(0) as u64);

        Self {
            total_ip_size,
            sampling_rate,
            estimated_total_bytes,
            estimated_total_mb: estimated_total_bytes as f64 / BYTES_PER_MB,
        }
    }
}

/// The core metrics printed before the pair analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoreMetrics {
    pub top_n: usize,
    pub top_talkers: Vec<RankedCount<String>>,
    pub top_listeners: Vec<RankedCount<String>>,
    pub top_applications: Vec<RankedCount<u16>>,
    pub protocol_mix: ProtocolMix,
    pub traffic: TrafficEstimate,
}

/// Computes talkers, listeners, applications, protocol mix and traffic.
pub fn analyze_core_metrics(table: &FlowTable, top_n: usize) -> CoreMetrics {
    let records = table.records();

    let top_talkers = owned_keys(top_by_frequency(
        records.iter().map(|r| r.src_ip.as_str()),
        top_n,
    ));
    let top_listeners = owned_keys(top_by_frequency(
        records.iter().map(|r| r.dst_ip.as_str()),
        top_n,
    ));
    let top_applications = top_by_frequency(records.iter().map(|r| r.dst_port), top_n);

    let metrics = CoreMetrics {
        top_n,
        top_talkers,
        top_listeners,
        top_applications,
        protocol_mix: ProtocolMix::from_table(table),
        traffic: TrafficEstimate::from_table(table),
    };

    debug!(
        "Core metrics over {} rows: {} talkers, {} listeners, {} applications",
        records.len(),
        metrics.top_talkers.len(),
        metrics.top_listeners.len(),
        metrics.top_applications.len()
    );

    metrics
}

/// Counts keys and returns the `n` most frequent.
///
/// Ties keep first-appearance order. Fewer than `n` distinct keys yields
/// fewer entries; the result is never padded.
pub fn top_by_frequency<K, I>(keys: I, n: usize) -> Vec<RankedCount<K>>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = K>,
{
    let mut slots: HashMap<K, usize> = HashMap::new();
    let mut counts: Vec<RankedCount<K>> = Vec::new();

    for key in keys {
        match slots.get(&key) {
            Some(&slot) => counts[slot].count += 1,
            None => {
                slots.insert(key.clone(), counts.len());
                counts.push(RankedCount { key, count: 1 });
            }
        }
    }

    rank(counts, n)
}

fn rank<K>(mut counts: Vec<RankedCount<K>>, n: usize) -> Vec<RankedCount<K>> {
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(n);
    counts
}

fn owned_keys(ranked: Vec<RankedCount<&str>>) -> Vec<RankedCount<String>> {
    ranked
        .into_iter()
        .map(|r| RankedCount {
            key: r.key.to_string(),
            count: r.count,
        })
        .collect()
}

/// Returns the `n` most frequent ordered (src, dst) pairs.
pub fn top_pairs(table: &FlowTable, n: usize) -> Vec<PairCount> {
    let mut groups: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for record in table.records() {
        *groups
            .entry((record.src_ip.as_str(), record.dst_ip.as_str()))
            .or_insert(0) += 1;
    }

    let distinct = groups.len();
    let ranked = rank(
        groups
            .into_iter()
            .map(|(key, count)| RankedCount { key, count })
            .collect(),
        n,
    );

    debug!("{} distinct pairs, keeping {}", distinct, ranked.len());

    ranked
        .into_iter()
        .map(|r| PairCount {
            src_ip: r.key.0.to_string(),
            dst_ip: r.key.1.to_string(),
            count: r.count,
        })
        .collect()
}
