//! Report renderings: plain records, CSV and a fixed-width text table.
//!
//! Each rendering takes an optional [`Envelope`] describing the query the
//! rows came from.

use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use super::{Report, Value};

const COLUMN_GAP: &str = "  ";

/// Query metadata emitted alongside exported rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub title: String,
    pub metrics: Vec<String>,
    pub dimensions: Vec<String>,
}

impl Envelope {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Envelope naming the report's own metric and dimension headers.
    pub fn for_report(title: impl Into<String>, report: &Report) -> Self {
        Self {
            title: title.into(),
            metrics: report.metrics().map(|c| c.name.clone()).collect(),
            dimensions: report.dimensions().map(|c| c.name.clone()).collect(),
        }
    }
}

impl Report {
    /// One ordered map per row keyed by snake slug, dates as ISO-8601.
    pub fn records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows()
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(column, value)| {
                        (
                            column.snake_slug.clone(),
                            serde_json::to_value(value).unwrap_or_default(),
                        )
                    })
                    .collect()
            })
            .collect()
    }

    /// Records, wrapped as `{title, metrics, dimensions, rows}` when an
    /// envelope is given.
    pub fn to_json(&self, envelope: Option<&Envelope>) -> serde_json::Value {
        let rows = serde_json::Value::Array(
            self.records()
                .into_iter()
                .map(serde_json::Value::Object)
                .collect(),
        );
        match envelope {
            None => rows,
            Some(env) => serde_json::json!({
                "title": env.title,
                "metrics": env.metrics,
                "dimensions": env.dimensions,
                "rows": rows,
            }),
        }
    }

    /// RFC 4180 text with a snake-slug header row. The envelope, if any,
    /// precedes it as `# key: value` comment lines.
    pub fn to_csv(&self, envelope: Option<&Envelope>) -> String {
        let mut out = String::new();
        if let Some(env) = envelope {
            out.push_str(&format!("# title: {}\r\n", env.title));
            out.push_str(&format!("# metrics: {}\r\n", env.metrics.join(", ")));
            out.push_str(&format!("# dimensions: {}\r\n", env.dimensions.join(", ")));
        }
        let header: Vec<String> = self
            .headers()
            .iter()
            .map(|c| csv_field(&c.snake_slug))
            .collect();
        out.push_str(&header.join(","));
        out.push_str("\r\n");
        for row in self.rows() {
            let fields: Vec<String> = row
                .values()
                .iter()
                .map(|v| csv_field(&v.to_string()))
                .collect();
            out.push_str(&fields.join(","));
            out.push_str("\r\n");
        }
        out
    }

    /// Human-readable table headed by column names. Numbers are right
    /// aligned, everything else left aligned.
    pub fn to_table(&self, envelope: Option<&Envelope>) -> String {
        let headers = self.headers();
        let cells: Vec<Vec<String>> = self
            .rows()
            .iter()
            .map(|row| row.values().iter().map(Value::to_string).collect())
            .collect();
        let mut widths: Vec<usize> = headers.iter().map(|c| c.name.width()).collect();
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.width());
            }
        }
        let numeric: Vec<bool> = (0..headers.len())
            .map(|i| {
                self.rows()
                    .first()
                    .is_some_and(|row| row.values()[i].is_numeric())
            })
            .collect();

        let mut lines = Vec::with_capacity(cells.len() + 6);
        if let Some(env) = envelope {
            lines.push(env.title.clone());
            lines.push(format!("metrics: {}", env.metrics.join(", ")));
            lines.push(format!("dimensions: {}", env.dimensions.join(", ")));
            lines.push(String::new());
        }
        let header_cells: Vec<String> = headers.iter().map(|c| c.name.clone()).collect();
        lines.push(render_line(&header_cells, &widths, &numeric));
        lines.push(
            widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join(COLUMN_GAP),
        );
        for row in &cells {
            lines.push(render_line(row, &widths, &numeric));
        }
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

fn render_line(cells: &[String], widths: &[usize], numeric: &[bool]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .zip(numeric)
        .map(|((cell, width), right)| {
            let fill = " ".repeat(width.saturating_sub(cell.width()));
            if *right {
                format!("{fill}{cell}")
            } else {
                format!("{cell}{fill}")
            }
        })
        .collect();
    padded.join(COLUMN_GAP).trim_end().to_string()
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{Column, ColumnKind, ColumnRegistry, DataType};
    use crate::transport::{ColumnHeader, RawPage};
    use std::collections::BTreeMap;

    fn report() -> Report {
        let registry = ColumnRegistry::new([
            Column::new("ga:date", ColumnKind::Dimension, DataType::String).with_name("Date"),
            Column::new("ga:pagePath", ColumnKind::Dimension, DataType::String)
                .with_name("Page"),
            Column::new("ga:pageviews", ColumnKind::Metric, DataType::Integer)
                .with_name("Pageviews"),
        ])
        .unwrap();
        let page = RawPage {
            column_headers: ["ga:date", "ga:pagePath", "ga:pageviews"]
                .into_iter()
                .map(ColumnHeader::new)
                .collect(),
            rows: Some(vec![
                vec!["20140701".into(), "/a,b".into(), "42".into()],
                vec!["20140702".into(), "/say \"hi\"".into(), "7".into()],
            ]),
            ..RawPage::default()
        };
        let mut report = Report::new();
        report.append(&page, &registry, BTreeMap::new()).unwrap();
        report
    }

    #[test]
    fn records_use_snake_slugs_and_iso_dates() {
        let records = report().records();
        assert_eq!(records.len(), 2);
        let keys: Vec<&String> = records[0].keys().collect();
        assert_eq!(keys, ["date", "page_path", "pageviews"]);
        assert_eq!(records[0]["date"], "2014-07-01");
        assert_eq!(records[0]["pageviews"], 42);
    }

    #[test]
    fn json_envelope_wraps_rows() {
        let r = report();
        let env = Envelope::for_report("Pageviews by day", &r);
        let json = r.to_json(Some(&env));
        assert_eq!(json["title"], "Pageviews by day");
        assert_eq!(json["metrics"][0], "Pageviews");
        assert_eq!(json["dimensions"][1], "Page");
        assert_eq!(json["rows"].as_array().unwrap().len(), 2);
        assert!(r.to_json(None).is_array());
    }

    #[test]
    fn csv_quotes_special_fields() {
        let csv = report().to_csv(None);
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert_eq!(lines[0], "date,page_path,pageviews");
        assert_eq!(lines[1], "2014-07-01,\"/a,b\",42");
        assert_eq!(lines[2], "2014-07-02,\"/say \"\"hi\"\"\",7");
    }

    #[test]
    fn csv_envelope_comment_lines() {
        let r = report();
        let csv = r.to_csv(Some(&Envelope::for_report("Top pages", &r)));
        assert!(csv.starts_with("# title: Top pages\r\n# metrics: Pageviews\r\n# dimensions: Date, Page\r\n"));
    }

    #[test]
    fn table_aligns_numbers_right() {
        let table = report().to_table(None);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(
            lines[0],
            format!("Date{}Page{}Pageviews", " ".repeat(8), " ".repeat(7))
        );
        assert_eq!(lines[1], "----------  ---------  ---------");
        assert_eq!(lines[2], format!("2014-07-01  /a,b{}42", " ".repeat(14)));
        assert_eq!(lines[3], format!("2014-07-02  /say \"hi\"{}7", " ".repeat(10)));
    }
}
