//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use chrono::DateTime;

use super::commands::{ContextInfo, ManifestCheck};
use crate::cluster::ClusterInfo;
use crate::config::validation::format_lint_report;
use crate::library::LibraryStatus;
use crate::reconcile::{ObservedCluster, ReconciliationResult};

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let render_row = |cells: &mut dyn Iterator<Item = String>| {
        let line = cells
            .enumerate()
            .map(|(i, cell)| match widths.get(i) {
                Some(width) => format!("{:width$}", cell, width = *width),
                None => cell,
            })
            .collect::<Vec<_>>()
            .join("   ");
        format!("{}\n", line.trim_end())
    };

    let mut output = render_row(&mut headers.iter().map(|h| h.to_uppercase()));
    for row in rows {
        output.push_str(&render_row(&mut row.into_iter()));
    }
    output
}

/// Render epoch milliseconds as UTC, `-` when unset or out of range
pub fn format_timestamp(millis: Option<i64>) -> String {
    millis
        .and_then(DateTime::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

// ============================================================================
// Context display
// ============================================================================

/// Format context list for display
pub fn format_context_list(contexts: &[ContextInfo]) -> String {
    let headers = &["", "NAME", "HOST", "AUTH"];
    let rows: Vec<Vec<String>> = contexts
        .iter()
        .map(|ctx| {
            vec![
                if ctx.is_current { "*" } else { " " }.to_string(),
                ctx.name.clone(),
                ctx.host.clone(),
                ctx.auth.to_string(),
            ]
        })
        .collect();

    format_table(headers, rows)
}

/// Format current context for display
pub fn format_current_context(ctx: &ContextInfo) -> String {
    format!("Current context: {} ({})\n", ctx.name, ctx.host)
}

// ============================================================================
// Cluster display
// ============================================================================

/// Format library statuses as a table
pub fn format_library_list(libraries: &[LibraryStatus]) -> String {
    let headers = &["LIBRARY", "STATUS", "SCOPE", "MESSAGE"];
    let rows: Vec<Vec<String>> = libraries
        .iter()
        .map(|s| {
            vec![
                s.library.to_string(),
                s.status.to_string(),
                if s.is_library_for_all_clusters {
                    "all-clusters"
                } else {
                    "cluster"
                }
                .to_string(),
                s.messages.join("; "),
            ]
        })
        .collect();

    format_table(headers, rows)
}

fn format_cluster_summary(info: &ClusterInfo) -> String {
    let mut output = String::new();

    output.push_str(&format!("Cluster ID:      {}\n", info.cluster_id));
    output.push_str(&format!("Name:            {}\n", info.cluster_name));
    output.push_str(&format!("State:           {}\n", info.state));
    if !info.state_message.is_empty() {
        output.push_str(&format!("State Message:   {}\n", info.state_message));
    }
    output.push_str(&format!("Spark Version:   {}\n", info.spark_version));
    if let Some(node_type) = &info.node_type_id {
        output.push_str(&format!("Node Type:       {}\n", node_type));
    }
    if let Some(pool) = &info.instance_pool_id {
        output.push_str(&format!("Instance Pool:   {}\n", pool));
    }
    output.push_str(&format!("Workers:         {}\n", info.sizing_label()));
    output.push_str(&format!(
        "Autotermination: {}\n",
        match info.autotermination_minutes {
            0 => "disabled".to_string(),
            m => format!("{} min", m),
        }
    ));
    output.push_str(&format!("Started:         {}\n", format_timestamp(info.start_time)));
    if info.terminated_time.is_some() {
        output.push_str(&format!(
            "Terminated:      {}\n",
            format_timestamp(info.terminated_time)
        ));
    }

    if !info.custom_tags.is_empty() {
        output.push_str("Tags:\n");
        for (k, v) in &info.custom_tags {
            output.push_str(&format!("  {}={}\n", k, v));
        }
    }

    output
}

/// Format a cluster and its libraries for detailed display
pub fn format_cluster_detail(observed: &ObservedCluster) -> String {
    let mut output = format_cluster_summary(&observed.info);

    output.push_str(&format!("\nLibraries ({}):\n", observed.libraries.len()));
    if !observed.libraries.is_empty() {
        output.push_str(&format_library_list(&observed.libraries));
    }

    output
}

// ============================================================================
// Reconciliation display
// ============================================================================

/// Format the outcome of apply or delete
pub fn format_reconcile_result(result: &ReconciliationResult) -> String {
    let mut output = String::new();
    let cluster_id = result.cluster_id().unwrap_or("-");

    match &result.outcome {
        Ok(()) if result.is_noop() => {
            output.push_str(&format!("✓ {} {} (no changes)\n", result.operation, cluster_id));
        }
        Ok(()) => {
            output.push_str(&format!("✓ {} {}\n", result.operation, cluster_id));
        }
        Err(failure) => {
            output.push_str(&format!("✗ {} {} failed\n", result.operation, cluster_id));
            output.push_str(&format!("  Error: {}\n", failure));
        }
    }

    if !result.actions.is_empty() {
        let actions: Vec<String> = result.actions.iter().map(|a| a.to_string()).collect();
        output.push_str(&format!("  Actions: {}\n", actions.join(", ")));
    }

    if let Some(info) = &result.cluster {
        output.push_str(&format!("  State:   {}\n", info.state));
    }

    if !result.libraries.is_empty() {
        output.push('\n');
        output.push_str(&format_library_list(&result.libraries));
    }

    output
}

// ============================================================================
// Validation display
// ============================================================================

/// Format a manifest check for display
pub fn format_manifest_check(check: &ManifestCheck, path: &str) -> String {
    let mut output = String::new();

    if let Some(ref error) = check.error {
        output.push_str(&format!("✗ {} is invalid\n\n", path));
        output.push_str(&format!("  Error: {}\n", error));
        return output;
    }

    if check.valid {
        output.push_str(&format!("✓ {} is valid\n\n", path));
    } else {
        output.push_str(&format!("✗ {} has lint errors\n\n", path));
    }
    output.push_str(&format!("  Cluster:   {}\n", check.cluster_name));
    output.push_str(&format!("  Libraries: {}\n", check.libraries));

    if !check.lint.messages.is_empty() {
        output.push('\n');
        output.push_str(&format_lint_report(&check.lint));
    }

    output
}
