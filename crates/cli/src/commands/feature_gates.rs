//! `feature-gates`: what the control plane reports

use anyhow::Result;
use rightsizer_lib::feature_gates::IN_PLACE_RESIZE_GATE;
use rightsizer_lib::{ClusterClient, FeatureGateDetector, InPlaceResizeMode};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;

use crate::output::{color_status, print_info, print_json, print_table, OutputFormat};

#[derive(Debug, Serialize, Tabled)]
pub struct GateRow {
    #[tabled(rename = "Gate")]
    pub gate: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

/// Rows sorted by gate name, optionally only the in-place resize gate
pub fn gate_rows(gates: &HashMap<String, bool>, only_resize: bool) -> Vec<GateRow> {
    let mut rows: Vec<GateRow> = gates
        .iter()
        .filter(|(name, _)| !only_resize || name.as_str() == IN_PLACE_RESIZE_GATE)
        .map(|(name, enabled)| GateRow {
            gate: name.clone(),
            status: if *enabled { "enabled" } else { "disabled" }.to_string(),
        })
        .collect();
    rows.sort_by(|a, b| a.gate.cmp(&b.gate));
    rows
}

pub async fn show_feature_gates(
    cluster: Arc<dyn ClusterClient>,
    only_resize: bool,
    format: OutputFormat,
) -> Result<()> {
    // One-shot scrape: no caching, and failures are reported instead of degraded
    let detector = FeatureGateDetector::new(cluster, InPlaceResizeMode::Auto, Duration::ZERO);
    let gates = detector.scrape().await?;
    let rows = gate_rows(&gates, only_resize);

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            let rows: Vec<GateRow> = rows
                .into_iter()
                .map(|row| GateRow {
                    status: color_status(&row.status),
                    ..row
                })
                .collect();
            print_table(rows, "No feature gates reported");

            let resize = gates.get(IN_PLACE_RESIZE_GATE).copied().unwrap_or(false);
            println!();
            print_info(&format!(
                "Running pods {} be resized in place",
                if resize { "will" } else { "will not" }
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gates() -> HashMap<String, bool> {
        HashMap::from([
            ("SidecarContainers".to_string(), true),
            (IN_PLACE_RESIZE_GATE.to_string(), false),
            ("APIListChunking".to_string(), true),
        ])
    }

    #[test]
    fn test_gate_rows_sorted() {
        let rows = gate_rows(&gates(), false);
        let names: Vec<_> = rows.iter().map(|r| r.gate.as_str()).collect();
        assert_eq!(
            names,
            vec!["APIListChunking", "InPlacePodVerticalScaling", "SidecarContainers"]
        );
    }

    #[test]
    fn test_gate_rows_only_resize() {
        let rows = gate_rows(&gates(), true);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "disabled");
    }
}
