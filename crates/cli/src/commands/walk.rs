//! `plan` and `apply`: one walk over the cluster

use anyhow::{bail, Result};
use rightsizer_lib::{
    ClusterClient, ClusterWalker, PatchRecord, RecommendationProvider, RunSummary, WalkerConfig,
};
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;

use crate::output::{
    color_status, or_dash, print_info, print_json, print_success, print_table, print_warning,
    OutputFormat,
};

/// One container of one patch
#[derive(Debug, Serialize, Tabled)]
pub struct PatchRow {
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Namespace")]
    pub namespace: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Container")]
    pub container: String,
    #[tabled(rename = "CPU")]
    pub cpu: String,
    #[tabled(rename = "Memory")]
    pub memory: String,
    #[tabled(rename = "Outcome")]
    pub outcome: String,
    #[tabled(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Flatten patch records into one row per container, sorted for stable output
pub fn patch_rows(patches: &[PatchRecord]) -> Vec<PatchRow> {
    let mut rows: Vec<PatchRow> = patches
        .iter()
        .flat_map(|record| {
            let error = match &record.outcome {
                rightsizer_lib::PatchOutcome::Failed(e) => Some(e.clone()),
                _ => None,
            };
            record.containers.iter().map(move |container| PatchRow {
                kind: record.kind.to_string(),
                namespace: record.namespace.clone(),
                name: record.name.clone(),
                container: container.container_name.clone(),
                cpu: or_dash(container.requests.cpu.as_deref()),
                memory: or_dash(container.requests.memory.as_deref()),
                outcome: record.outcome.label().to_string(),
                error: error.clone(),
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        (&a.namespace, &a.name, &a.kind, &a.container)
            .cmp(&(&b.namespace, &b.name, &b.kind, &b.container))
    });
    rows
}

/// Walk the cluster once; `config.dry_run` decides between plan and apply
pub async fn run_walk(
    cluster: Arc<dyn ClusterClient>,
    provider: Arc<dyn RecommendationProvider>,
    config: WalkerConfig,
    format: OutputFormat,
) -> Result<()> {
    let dry_run = config.dry_run;
    let walker = Arc::new(ClusterWalker::new(cluster, provider, config));
    let summary = walker.run().await?;
    let rows = patch_rows(&summary.patches);

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            let rows: Vec<PatchRow> = rows
                .into_iter()
                .map(|row| PatchRow {
                    outcome: color_status(&row.outcome),
                    ..row
                })
                .collect();
            print_table(rows, "No patches needed");
            print_summary(&summary, dry_run);
        }
    }

    if summary.failed() > 0 {
        bail!("{} patch(es) were rejected by the cluster", summary.failed());
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!();
    print_info(&format!(
        "{} namespace(s), {} deployment(s) visited; in-place resize {}",
        summary.namespaces_visited,
        summary.deployments_visited,
        if summary.in_place_resize {
            "enabled"
        } else {
            "disabled"
        }
    ));

    if summary.namespaces_failed + summary.deployments_failed > 0 {
        print_warning(&format!(
            "{} namespace(s) and {} deployment(s) could not be fully listed",
            summary.namespaces_failed, summary.deployments_failed
        ));
    }

    if dry_run {
        print_info(&format!(
            "{} patch(es) planned, nothing was sent",
            summary.planned()
        ));
    } else if summary.failed() == 0 {
        print_success(&format!("{} patch(es) applied", summary.applied()));
    }
}
