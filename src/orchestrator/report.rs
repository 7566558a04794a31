//! Report prompt assembly and image inlining for generated reports.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::transcript::{segments_to_prompt_text, ImageRef, ImageStore};
use crate::workflow::HypothesisRecord;

static IMAGE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[\w./\\-]+\.(?:png|jpg|jpeg|gif)").unwrap());

/// Flatten every record's title and execution history into one prompt.
///
/// Follow-up prompts appear before the output of their run; image segments
/// contribute file ids and store locations rather than markup.
pub fn build_report_prompt(records: &[HypothesisRecord]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for record in records {
        parts.push(record.title().to_string());
        if let Some(accepted) = record.final_hypothesis() {
            parts.push(accepted.to_string());
        }
        for (index, run) in record.execution_runs().iter().enumerate() {
            if let Some(prompt) = &run.prompt {
                parts.push(prompt.clone());
            }
            if let Some(segments) = record.run_segments(index) {
                parts.extend(segments_to_prompt_text(segments));
            }
        }
    }
    parts.join(" ")
}

/// Replace image paths mentioned in report markdown with inline images from
/// the store. Paths whose image cannot be loaded become a visible note.
pub fn inline_report_images(text: &str, store: &dyn ImageStore) -> String {
    IMAGE_PATH_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let path = &caps[0];
            let file_id = image_file_id(path);
            let image = ImageRef {
                file_id: file_id.to_string(),
                location: None,
            };
            match store.render(&image) {
                Ok(html) => html,
                Err(e) => {
                    warn!(path = %path, error = %e, "Report image not found");
                    format!("[Image not found: {}]", path)
                }
            }
        })
        .into_owned()
}

/// File id of an image path: its file name without extension.
fn image_file_id(path: &str) -> &str {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}
