//! Export Module
//!
//! Formats the analysis results for standard output, either as the
//! human-readable report or as a single JSON document for other tools.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use crate::analyzer::{CoreMetrics, PairCount, ProtocolMix, RankedCount, TrafficEstimate};
use crate::record::Protocol;

/// Output format for the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Destination for status and diagnostic lines.
///
/// Text reports interleave status lines with the statistics on stdout. JSON
/// reports keep stdout for the document and send status lines to stderr.
#[derive(Debug, Clone, Copy)]
pub struct Console {
    format: OutputFormat,
}

impl Console {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn status(&self, line: &str) {
        match self.format {
            OutputFormat::Text => println!("{}", line),
            OutputFormat::Json => eprintln!("{}", line),
        }
    }

    /// Prints a report section; only text reports print sections.
    pub fn section(&self, text: &str) {
        if self.format == OutputFormat::Text {
            print!("{}", text);
        }
    }
}

/// What happened to the pair graph image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum VisualisationOutcome {
    Saved { path: PathBuf },
    Skipped { reason: String },
    Disabled,
}

/// JSON-serializable full report
#[derive(Serialize)]
pub struct JsonReport<'a> {
    pub version: &'static str,
    pub generated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub records: usize,
    pub skipped_rows: usize,
    pub top_talkers: &'a [RankedCount<String>],
    pub top_listeners: &'a [RankedCount<String>],
    pub top_applications: &'a [RankedCount<u16>],
    pub protocol_mix: &'a ProtocolMix,
    pub traffic: &'a TrafficEstimate,
    pub top_pairs: &'a [PairCount],
    pub visualisation: &'a VisualisationOutcome,
}

impl<'a> JsonReport<'a> {
    pub fn new(
        input: Option<String>,
        skipped_rows: usize,
        metrics: &'a CoreMetrics,
        pairs: &'a [PairCount],
        visualisation: &'a VisualisationOutcome,
    ) -> Self {
        Self {
            version: "1.0",
            generated_at: Utc::now().to_rfc3339(),
            input,
            records: metrics.protocol_mix.total,
            skipped_rows,
            top_talkers: &metrics.top_talkers,
            top_listeners: &metrics.top_listeners,
            top_applications: &metrics.top_applications,
            protocol_mix: &metrics.protocol_mix,
            traffic: &metrics.traffic,
            top_pairs: pairs,
            visualisation,
        }
    }

    /// Exports report as pretty-printed JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

/// Formats the core metrics as the text report.
pub fn core_metrics_text(metrics: &CoreMetrics) -> String {
    let mut output = String::new();
    let n = metrics.top_n;

    output.push_str(&format!("Top {} Talkers (Source IPs)\n", n));
    push_ranking(&mut output, &metrics.top_talkers);

    output.push_str(&format!("\nTop {} Listeners (Destination IPs)\n", n));
    push_ranking(&mut output, &metrics.top_listeners);

    output.push_str(&format!("\nTop {} Applications (by Destination Port)\n", n));
    push_ranking(&mut output, &metrics.top_applications);

    output.push_str(&protocol_mix_text(&metrics.protocol_mix));
    output.push_str(&traffic_text(&metrics.traffic));

    output
}

fn push_ranking<K: std::fmt::Display>(output: &mut String, ranking: &[RankedCount<K>]) {
    if ranking.is_empty() {
        output.push_str("  (no data)\n");
        return;
    }

    let width = ranking
        .iter()
        .map(|r| r.key.to_string().len())
        .max()
        .unwrap_or(0);

    for entry in ranking {
        output.push_str(&format!(
            "  {:<width$}  {:>8}\n",
            entry.key.to_string(),
            entry.count,
            width = width
        ));
    }
}

fn protocol_mix_text(mix: &ProtocolMix) -> String {
    let line = |protocol: Protocol, number: u8, count: usize, percentage: f64| {
        format!(
            "{} packets (Protocol {}): {} ({:.2}%)\n",
            protocol, number, count, percentage
        )
    };

    format!(
        "\nTransport Protocol Proportion\n{}{}",
        line(Protocol::Tcp, Protocol::TCP_NUMBER, mix.tcp_count, mix.tcp_percentage),
        line(Protocol::Udp, Protocol::UDP_NUMBER, mix.udp_count, mix.udp_percentage)
    )
}

fn traffic_text(traffic: &TrafficEstimate) -> String {
    let rate = match traffic.sampling_rate {
        Some(rate) => format!("1 in {}", rate),
        None => "unknown (no rows)".to_string(),
    };

    format!(
        "\nTotal Estimated Traffic\n\
         Total IP_size in log file: {} bytes\n\
         Sampling Rate: {}\n\
         Estimated Total Traffic: {:.2} MB\n",
        traffic.total_ip_size, rate, traffic.estimated_total_mb
    )
}

/// Formats the top communication pairs as the text report.
pub fn pairs_text(pairs: &[PairCount]) -> String {
    let mut output = String::from("\nAdditional Analysis: Top Communication Pairs\n");

    if pairs.is_empty() {
        output.push_str("  (no data)\n");
        return output;
    }

    let width = pairs
        .iter()
        .map(|p| p.src_ip.len() + p.dst_ip.len() + 4)
        .max()
        .unwrap_or(0);

    for pair in pairs {
        output.push_str(&format!(
            "  {:<width$}  {:>8}\n",
            format!("{} -> {}", pair.src_ip, pair.dst_ip),
            pair.count,
            width = width
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::tests::record;
    use crate::analyzer::{analyze_core_metrics, top_pairs};
    use crate::loader::FlowTable;

    fn sample_table() -> FlowTable {
        FlowTable::from_records(vec![
            record("10.0.0.1", "10.0.0.2", 6, 443, 1000),
            record("10.0.0.1", "10.0.0.3", 17, 53, 48),
            record("10.0.0.4", "10.0.0.2", 6, 443, 1000),
        ])
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Text.to_string(), "text");
        assert_eq!(OutputFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_core_metrics_text() {
        let metrics = analyze_core_metrics(&sample_table(), 5);
        let text = core_metrics_text(&metrics);

        assert!(text.starts_with("Top 5 Talkers (Source IPs)\n"));
        assert!(text.contains("  10.0.0.1         2\n"));
        assert!(text.contains("Top 5 Applications (by Destination Port)\n  443         2\n"));
        assert!(text.contains("TCP packets (Protocol 6): 2 (66.67%)"));
        assert!(text.contains("UDP packets (Protocol 17): 1 (33.33%)"));
        assert!(text.contains("Total IP_size in log file: 2048 bytes"));
        assert!(text.contains("Sampling Rate: 1 in 2048"));
        assert!(text.contains("Estimated Total Traffic: 4.00 MB"));
    }

    #[test]
    fn test_empty_metrics_text() {
        let metrics = analyze_core_metrics(&FlowTable::from_records(vec![]), 5);
        let text = core_metrics_text(&metrics);

        assert!(text.contains("Top 5 Talkers (Source IPs)\n  (no data)\n"));
        assert!(text.contains("TCP packets (Protocol 6): 0 (0.00%)"));
        assert!(text.contains("Sampling Rate: unknown (no rows)"));
        assert!(text.contains("Estimated Total Traffic: 0.00 MB"));
    }

    #[test]
    fn test_repeated_text_is_identical() {
        let table = sample_table();
        let first = core_metrics_text(&analyze_core_metrics(&table, 5))
            + &pairs_text(&top_pairs(&table, 5));
        let second = core_metrics_text(&analyze_core_metrics(&table, 5))
            + &pairs_text(&top_pairs(&table, 5));

        assert_eq!(first, second);
    }

    #[test]
    fn test_pairs_text() {
        let pairs = vec![
            PairCount {
                src_ip: "A".to_string(),
                dst_ip: "B".to_string(),
                count: 3,
            },
            PairCount {
                src_ip: "A".to_string(),
                dst_ip: "CC".to_string(),
                count: 1,
            },
        ];
        let text = pairs_text(&pairs);

        assert!(text.contains("  A -> B          3\n"));
        assert!(text.contains("  A -> CC         1\n"));
    }

    #[test]
    fn test_json_report() {
        let table = sample_table();
        let metrics = analyze_core_metrics(&table, 5);
        let pairs = top_pairs(&table, 5);
        let outcome = VisualisationOutcome::Skipped {
            reason: "no font".to_string(),
        };

        let json = JsonReport::new(Some("Data_2.csv".to_string()), 0, &metrics, &pairs, &outcome)
            .to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["records"], 3);
        assert_eq!(value["input"], "Data_2.csv");
        assert_eq!(value["top_talkers"][0]["key"], "10.0.0.1");
        assert_eq!(value["top_applications"][0]["key"], 443);
        assert_eq!(value["protocol_mix"]["tcp_count"], 2);
        assert_eq!(value["traffic"]["sampling_rate"], 2048);
        assert_eq!(value["top_pairs"][0]["count"], 1);
        assert_eq!(value["visualisation"]["status"], "skipped");
        assert_eq!(value["visualisation"]["reason"], "no font");
    }

    #[test]
    fn test_visualisation_outcome_serialization() {
        let saved = VisualisationOutcome::Saved {
            path: PathBuf::from("out.png"),
        };
        assert_eq!(
            serde_json::to_string(&saved).unwrap(),
            r#"{"status":"saved","path":"out.png"}"#
        );
        assert_eq!(
            serde_json::to_string(&VisualisationOutcome::Disabled).unwrap(),
            r#"{"status":"disabled"}"#
        );
    }
}
