use crate::patterns::ClusterTable;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;

/// One row of the result table: a representative line and how many lines it
/// absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub count: usize,
    pub tag: String,
    pub text: String,
}

impl ResultRow {
    /// `tag text`, the form shown in snapshots.
    pub fn line(&self) -> String {
        format!("{} {}", self.tag, self.text)
    }
}

/// Result rows ordered by count, highest first. Order among equal counts is
/// not specified.
pub fn result_rows(table: &ClusterTable) -> Vec<ResultRow> {
    table
        .iter()
        .map(|(tag, rep)| ResultRow { count: rep.count, tag: tag.to_string(), text: rep.text.clone() })
        .sorted_unstable_by(|a, b| b.count.cmp(&a.count))
        .collect()
}

/// Newline-separated `count<TAB>tag text` rows.
pub fn render_snapshot(rows: &[ResultRow]) -> String {
    let mut out = String::new();
    for row in rows {
        out.push_str(&format!("{}\t{}\n", row.count, row.line()));
    }
    out
}

pub fn granularity_percent(granularity: f64) -> i64 {
    (granularity * 100.0).round() as i64
}

fn csv_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// CSV export: a header naming the similarity threshold, then one
/// `count,"text"` row per representative in snapshot order.
pub fn render_csv(rows: &[ResultRow], granularity: f64) -> String {
    let mut csv = format!("\"Count\",\"Line ({}% similarity)\"\n", granularity_percent(granularity));
    for row in rows {
        csv.push_str(&format!("{},{}\n", row.count, csv_quote(&row.text)));
    }
    csv
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonReport {
    pub file: String,
    pub filter: String,
    pub granularity: f64,
    pub matches: usize,
    pub generated_at: DateTime<Utc>,
    pub results: Vec<ResultRow>,
}

impl JsonReport {
    /// `matches` is the full representative count; `results` may be a
    /// truncated prefix of the table.
    pub fn new(file: String, filter: String, granularity: f64, matches: usize, results: Vec<ResultRow>) -> Self {
        Self { file, filter, granularity, matches, generated_at: Utc::now(), results }
    }
}
