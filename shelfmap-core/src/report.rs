// Output table and run summary generation

use crate::crawl::CrawlRun;
use crate::table::WideCategoryTable;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shelfmap_scanner::error::{Result, ScanError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

const BOM: &[u8] = "\u{feff}".as_bytes();

/// `{data_dir}/{dd-mm-YYYY}/{prefix}_{ddmmYYYY}_{rows}.csv`
pub fn output_path(data_dir: &Path, prefix: &str, date: NaiveDate, rows: usize) -> PathBuf {
    data_dir.join(date.format("%d-%m-%Y").to_string()).join(format!(
        "{}_{}_{}.csv",
        prefix,
        date.format("%d%m%Y"),
        rows
    ))
}

fn clean(value: &str) -> String {
    value.replace(['\n', '\r'], "")
}

/// The table as string records, nulls as empty fields and newlines removed.
pub fn table_records(table: &WideCategoryTable) -> Vec<Vec<String>> {
    table
        .rows()
        .iter()
        .map(|row| {
            (0..table.depths())
                .flat_map(|depth| match row.get(depth).and_then(Option::as_ref) {
                    Some(node) => [
                        clean(&node.id),
                        clean(&node.name),
                        clean(&node.path_or_link),
                    ],
                    None => [String::new(), String::new(), String::new()],
                })
                .collect()
        })
        .collect()
}

/// Write the table as `;`-delimited UTF-8 with a byte-order mark. Nothing is
/// written for an empty table.
pub fn write_table(
    table: &WideCategoryTable,
    data_dir: &Path,
    prefix: &str,
    date: NaiveDate,
) -> Result<Option<PathBuf>> {
    if table.is_empty() {
        info!("The data file will not be saved because it has no rows");
        return Ok(None);
    }

    let path = output_path(data_dir, prefix, date, table.len());
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(BOM.to_vec());
    writer
        .write_record(table.header())
        .map_err(|e| ScanError::persistence(&path, e))?;
    for record in table_records(table) {
        writer
            .write_record(&record)
            .map_err(|e| ScanError::persistence(&path, e))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ScanError::persistence(&path, e))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ScanError::persistence(&path, e))?;
    }
    fs::write(&path, bytes).map_err(|e| ScanError::persistence(&path, e))?;

    info!(
        "Data file {} saved with {} rows",
        path.display(),
        table.len()
    );
    Ok(Some(path))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub date: String,
    pub start: String,
    pub end: String,
    pub elapsed: String,
    pub rows: usize,
    pub rows_per_minute: f64,
    pub reached_depth: usize,
    pub links_discovered: usize,
    pub roots: usize,
    pub cache_hits: usize,
    pub resolved: usize,
    pub redirected: usize,
    pub excluded: usize,
    pub cache_entries: usize,
    pub cache_new_entries: usize,
    pub errors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

impl RunSummary {
    pub fn from_run(run: &CrawlRun) -> Self {
        let report = &run.report;
        let metrics = &run.metrics;
        RunSummary {
            run_id: metrics.run_id.clone(),
            date: metrics.date.clone(),
            start: metrics.start.clone(),
            end: metrics.end.clone(),
            elapsed: metrics.elapsed.clone(),
            rows: metrics.rows,
            rows_per_minute: metrics.rows_per_minute,
            reached_depth: report.reached_depth,
            links_discovered: report.links_discovered,
            roots: report.roots,
            cache_hits: report.cache_hits,
            resolved: report.resolved,
            redirected: report.redirected,
            excluded: report.excluded,
            cache_entries: report.cache.len(),
            cache_new_entries: report.cache.new_entries(),
            errors: metrics.errors,
            output_path: run
                .output_path
                .as_ref()
                .map(|p| p.display().to_string()),
            fatal: report.fatal.as_ref().map(|e| e.to_string()),
        }
    }

    fn status(&self) -> &str {
        if self.fatal.is_some() {
            "Aborted"
        } else if self.errors > 0 {
            "Completed with errors"
        } else {
            "Completed"
        }
    }
}

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

pub fn generate_text_summary(summary: &RunSummary, table: &WideCategoryTable) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                        SHELFMAP CATEGORY CRAWL SUMMARY\n");
    report.push_str(RULE);
    report.push('\n');

    report.push_str(&format!("Run ID:       {}\n", summary.run_id));
    report.push_str(&format!("Status:       {}\n", summary.status()));
    report.push_str(&format!(
        "Date:         {} {} - {}\n",
        summary.date, summary.start, summary.end
    ));
    report.push_str(&format!("Elapsed:      {}\n", summary.elapsed));
    report.push_str(&format!(
        "Rows:         {} ({:.2}/min)\n",
        summary.rows, summary.rows_per_minute
    ));
    report.push_str(&format!("Depth:        {}\n", summary.reached_depth));
    if let Some(ref path) = summary.output_path {
        report.push_str(&format!("Output:       {}\n", path));
    }
    if let Some(ref fatal) = summary.fatal {
        report.push_str(&format!("Fatal:        {}\n", fatal));
    }
    report.push('\n');

    report.push_str(RULE);
    report.push_str("RESOLUTION\n");
    report.push_str(RULE);
    report.push('\n');
    report.push_str(&format!("  Menu links:      {}\n", summary.links_discovered));
    report.push_str(&format!("  From cache:      {}\n", summary.cache_hits));
    report.push_str(&format!("  Resolved:        {}\n", summary.resolved));
    report.push_str(&format!("  Redirected:      {}\n", summary.redirected));
    report.push_str(&format!("  Excluded:        {}\n", summary.excluded));
    report.push_str(&format!("  Root categories: {}\n", summary.roots));
    report.push_str(&format!(
        "  Link cache:      {} entries ({} new)\n",
        summary.cache_entries, summary.cache_new_entries
    ));
    report.push_str(&format!("  Errors:          {}\n", summary.errors));
    report.push('\n');

    if !table.is_empty() {
        report.push_str(RULE);
        report.push_str("CATEGORY TREE\n");
        report.push_str(RULE);
        report.push('\n');
        report.push_str(&generate_category_tree(table));
    }

    report
}

pub fn generate_json_summary(summary: &RunSummary) -> std::result::Result<String, serde_json::Error> {
    serde_json::to_string_pretty(summary)
}

/// Render the run summary in `format`; the text form includes the category tree.
pub fn render_summary(
    format: ReportFormat,
    summary: &RunSummary,
    table: &WideCategoryTable,
) -> std::result::Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_summary(summary, table)),
        ReportFormat::Json => generate_json_summary(summary),
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

#[derive(Debug, Default)]
struct TreeNode {
    id: String,
    name: String,
    children: Vec<TreeNode>,
}

/// Render the table's branches as an indented tree, in row order.
pub fn generate_category_tree(table: &WideCategoryTable) -> String {
    let mut root = TreeNode::default();
    for row in table.rows() {
        let mut current = &mut root;
        for cell in row.iter().map_while(Option::as_ref) {
            let position = match current.children.iter().position(|c| c.id == cell.id) {
                Some(position) => position,
                None => {
                    current.children.push(TreeNode {
                        id: cell.id.clone(),
                        name: clean(&cell.name),
                        children: Vec::new(),
                    });
                    current.children.len() - 1
                }
            };
            current = &mut current.children[position];
        }
    }

    let mut output = String::new();
    for node in &root.children {
        output.push_str(&format!("{} ({})\n", node.name, node.id));
        render_children(&node.children, "", &mut output);
    }
    output
}

fn render_children(children: &[TreeNode], prefix: &str, output: &mut String) {
    for (i, child) in children.iter().enumerate() {
        let last = i + 1 == children.len();
        let (branch, extension) = if last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        output.push_str(&format!("{}{}{} ({})\n", prefix, branch, child.name, child.id));
        render_children(&child.children, &format!("{}{}", prefix, extension), output);
    }
}
