//! Ranked score table built from accepted Candidate Records.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::ranking::scorer::{CandidateRecord, CANDIDATE_NAME_KEY};

pub const TOTAL_SCORE_COLUMN: &str = "Total Score";

/// One row of the ranked table. `scores` is aligned with the table's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedCandidate {
    pub name: String,
    pub scores: Vec<u8>,
    pub total: u32,
}

/// Candidate rows under a fixed column list (the Header Mapping's headers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreTable {
    columns: Vec<String>,
    rows: Vec<RankedCandidate>,
}

impl ScoreTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a record, laying its scores out in column order.
    pub fn push(&mut self, record: &CandidateRecord) {
        let scores: Vec<u8> = self
            .columns
            .iter()
            .map(|column| record.score(column).unwrap_or(0))
            .collect();
        let total = scores.iter().map(|s| u32::from(*s)).sum();
        self.rows.push(RankedCandidate {
            name: record.name.clone(),
            scores,
            total,
        });
    }

    /// Sorts rows by total, highest first. The sort is stable, so ties keep insertion order.
    pub fn rank(mut self) -> Self {
        self.rows.sort_by(|a, b| b.total.cmp(&a.total));
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[RankedCandidate] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Full header row: name column, each score column, then the total column.
    pub fn header_row(&self) -> Vec<&str> {
        std::iter::once(CANDIDATE_NAME_KEY)
            .chain(self.columns.iter().map(String::as_str))
            .chain(std::iter::once(TOTAL_SCORE_COLUMN))
            .collect()
    }

    /// Rows as JSON objects keyed by column name, in rank order.
    pub fn ranking(&self) -> Vec<RankedRow<'_>> {
        self.rows
            .iter()
            .map(|row| RankedRow {
                columns: &self.columns,
                row,
            })
            .collect()
    }
}

/// Serialization view of one row: `{"Candidate Name", <header>..., "Total Score"}`.
pub struct RankedRow<'a> {
    columns: &'a [String],
    row: &'a RankedCandidate,
}

impl Serialize for RankedRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len() + 2))?;
        map.serialize_entry(CANDIDATE_NAME_KEY, &self.row.name)?;
        for (column, score) in self.columns.iter().zip(&self.row.scores) {
            map.serialize_entry(column, score)?;
        }
        map.serialize_entry(TOTAL_SCORE_COLUMN, &self.row.total)?;
        map.end()
    }
}
