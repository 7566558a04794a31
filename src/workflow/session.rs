use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::transcript::Segment;

/// An uploaded data file, identified on the assistant side by `file_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    pub name: String,
    pub file_id: String,
}

/// What the user uploaded before processing starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    pub data_files: Vec<DataFile>,
    /// Free-form hypotheses text as entered by the user.
    pub hypotheses_text: String,
}

impl Upload {
    pub fn file_ids(&self) -> Vec<String> {
        self.data_files.iter().map(|f| f.file_id.clone()).collect()
    }
}

/// Description of one dataset column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub column_name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub unique_value_count: u64,
}

/// Assistant-produced dataset summary keyed by column name, editable column
/// by column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub columns: BTreeMap<String, ColumnSummary>,
}

impl DatasetSummary {
    pub fn column(&self, name: &str) -> Option<&ColumnSummary> {
        self.columns.get(name)
    }

    pub(crate) fn column_mut(&mut self, name: &str) -> Option<&mut ColumnSummary> {
        self.columns.get_mut(name)
    }
}

/// One hypothesis as returned by bulk refinement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinedHypothesis {
    pub title: String,
    /// Extended critique of the hypothesis against the data.
    #[serde(default)]
    pub hypothesis_refined_with_data_text: String,
    /// Short, current version of the hypothesis.
    pub refined_hypothesis_text: String,
}

/// One turn of the report refinement chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ReportTurn {
    User { content: String },
    Assistant { segments: Vec<Segment> },
}
