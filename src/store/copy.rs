//! PostgreSQL `COPY ... FROM STDIN` text format.
//!
//! Columns are tab separated, rows newline terminated, NULL is `\N`, and backslash,
//! tab, newline and carriage return inside values are backslash escaped.

use crate::common::model::sample::Sample;
use std::fmt::Write;

/// Store columns, in load order.
pub const COLUMNS: [&str; 5] = ["time", "web_url", "http_status", "resp_time", "regex_match"];

/// NULL marker of the text format.
pub const NULL: &str = "\\N";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%:z";

pub fn copy_statement(table: &str) -> String {
    format!("COPY {} ({}) FROM STDIN", table, COLUMNS.join(", "))
}

pub fn encode_rows(batch: &[Sample]) -> Vec<u8> {
    let mut out = String::with_capacity(batch.len() * 96);
    for sample in batch {
        let _ = write!(out, "{}\t", sample.timestamp.format(TIMESTAMP_FORMAT));
        escape_into(&sample.url, &mut out);
        let _ = write!(
            out,
            "\t{}\t{}\t",
            sample.http_status, sample.response_time_seconds
        );
        out.push_str(match sample.pattern_match {
            Some(true) => "t",
            Some(false) => "f",
            None => NULL,
        });
        out.push('\n');
    }
    out.into_bytes()
}

fn escape_into(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}
