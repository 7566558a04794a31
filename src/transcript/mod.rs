//! Streaming-response aggregation.
//!
//! An assistant turn arrives as an ordered stream of typed, possibly partial
//! events. [`TranscriptAggregator`] folds that stream into an ordered list of
//! type-homogeneous [`Segment`]s: consecutive events of the same kind are
//! concatenated into one segment (run-length encoding over segment type).

pub mod images;

pub use images::{DirImageStore, ImageRef, ImageStore, MemoryImageStore};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Which tool produced a step text delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepTool {
    #[default]
    Code,
    #[serde(other)]
    Other,
}

/// One output of a completed tool step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutput {
    /// Console output of executed code.
    Log { text: String },
    /// A generated image. `bytes` is filled in by the orchestrator after
    /// fetching; it never travels on the wire.
    Image {
        id: String,
        #[serde(skip)]
        bytes: Option<Vec<u8>>,
    },
    #[serde(other)]
    Unrecognized,
}

/// Provider-agnostic streaming event. Unknown wire tags decode to
/// [`StreamEvent::Unrecognized`] and are skipped by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    StepStarted {
        #[serde(default)]
        has_tool_call: bool,
    },
    StepTextDelta {
        #[serde(default)]
        tool: StepTool,
        fragment: String,
    },
    StepCompleted {
        #[serde(default)]
        outputs: Vec<StepOutput>,
    },
    MessageStarted,
    MessageTextDelta {
        fragment: String,
    },
    #[serde(other)]
    Unrecognized,
}

/// Kind of a transcript segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    CodeInput,
    CodeOutput,
    Image,
    Text,
}

/// One contiguous, type-homogeneous chunk of an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    CodeInput {
        content: String,
    },
    CodeOutput {
        content: String,
    },
    /// Rendered references in `content`, one per image (or a failure note),
    /// with the stored references kept alongside for later reuse.
    Image {
        content: Vec<String>,
        #[serde(default)]
        images: Vec<ImageRef>,
    },
    Text {
        content: String,
    },
}

impl Segment {
    fn empty(kind: SegmentKind) -> Self {
        match kind {
            SegmentKind::CodeInput => Segment::CodeInput {
                content: String::new(),
            },
            SegmentKind::CodeOutput => Segment::CodeOutput {
                content: String::new(),
            },
            SegmentKind::Image => Segment::Image {
                content: Vec::new(),
                images: Vec::new(),
            },
            SegmentKind::Text => Segment::Text {
                content: String::new(),
            },
        }
    }

    pub fn kind(&self) -> SegmentKind {
        match self {
            Segment::CodeInput { .. } => SegmentKind::CodeInput,
            Segment::CodeOutput { .. } => SegmentKind::CodeOutput,
            Segment::Image { .. } => SegmentKind::Image,
            Segment::Text { .. } => SegmentKind::Text,
        }
    }

    /// Textual content for code/log/text segments.
    pub fn text(&self) -> Option<&str> {
        match self {
            Segment::CodeInput { content }
            | Segment::CodeOutput { content }
            | Segment::Text { content } => Some(content),
            Segment::Image { .. } => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Segment::Image { content, .. } => content.is_empty(),
            other => other.text().map_or(true, str::is_empty),
        }
    }

    fn push_text(&mut self, fragment: &str) {
        match self {
            Segment::CodeInput { content }
            | Segment::CodeOutput { content }
            | Segment::Text { content } => content.push_str(fragment),
            Segment::Image { .. } => {}
        }
    }

    /// Append the content of a same-kind segment.
    fn absorb(&mut self, other: Segment) {
        match (self, other) {
            (
                Segment::Image { content, images },
                Segment::Image {
                    content: more,
                    images: more_images,
                },
            ) => {
                content.extend(more);
                images.extend(more_images);
            }
            (this, other) => {
                if let Some(text) = other.text() {
                    this.push_text(text);
                }
            }
        }
    }
}

/// Stateful fold over one assistant turn's events.
///
/// Feed events in order with [`push`](Self::push), then call
/// [`finish`](Self::finish). Partial results are always kept: nothing that
/// was aggregated before a bad event is discarded.
pub struct TranscriptAggregator<'a> {
    store: &'a dyn ImageStore,
    segments: Vec<Segment>,
    ignored: usize,
}

impl<'a> TranscriptAggregator<'a> {
    pub fn new(store: &'a dyn ImageStore) -> Self {
        Self {
            store,
            segments: Vec::new(),
            ignored: 0,
        }
    }

    /// Open a segment of `kind` unless the current one already is.
    fn ensure_slot(&mut self, kind: SegmentKind) -> &mut Segment {
        if self.segments.last().map(Segment::kind) != Some(kind) {
            self.segments.push(Segment::empty(kind));
        }
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }

    pub fn push(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::StepStarted { has_tool_call } => {
                if has_tool_call {
                    self.ensure_slot(SegmentKind::CodeInput);
                }
            }
            StreamEvent::StepTextDelta { tool, fragment } => {
                if tool == StepTool::Code && !fragment.is_empty() {
                    self.ensure_slot(SegmentKind::CodeInput).push_text(&fragment);
                }
            }
            StreamEvent::StepCompleted { outputs } => {
                for output in outputs {
                    self.push_output(output);
                }
            }
            StreamEvent::MessageStarted => {
                self.ensure_slot(SegmentKind::Text);
            }
            StreamEvent::MessageTextDelta { fragment } => {
                if !fragment.is_empty() {
                    self.ensure_slot(SegmentKind::Text).push_text(&fragment);
                }
            }
            StreamEvent::Unrecognized => {
                self.ignored += 1;
                debug!("Ignoring unrecognized stream event");
            }
        }
    }

    fn push_output(&mut self, output: StepOutput) {
        match output {
            StepOutput::Log { text } => {
                self.ensure_slot(SegmentKind::CodeOutput).push_text(&text);
            }
            StepOutput::Image { id, bytes } => {
                let rendered = self.render_image(&id, bytes.as_deref());
                if let Segment::Image { content, images } = self.ensure_slot(SegmentKind::Image) {
                    match rendered {
                        Ok((image, html)) => {
                            content.push(html);
                            images.push(image);
                        }
                        Err(note) => {
                            content.push(note);
                            images.push(ImageRef {
                                file_id: id,
                                location: None,
                            });
                        }
                    }
                }
            }
            StepOutput::Unrecognized => {
                self.ignored += 1;
                debug!("Ignoring unrecognized step output");
            }
        }
    }

    fn render_image(&self, id: &str, bytes: Option<&[u8]>) -> Result<(ImageRef, String), String> {
        let Some(bytes) = bytes else {
            warn!(file_id = %id, "Image bytes unavailable");
            return Err(format!("[Image unavailable: {}]", id));
        };
        let stored = self
            .store
            .store(id, bytes)
            .and_then(|image| self.store.render(&image).map(|html| (image, html)));
        stored.map_err(|e| {
            warn!(file_id = %id, error = %e, "Failed to store image");
            format!("[Image unavailable: {}: {}]", id, e)
        })
    }

    /// Number of events or outputs skipped as unrecognized.
    pub fn ignored(&self) -> usize {
        self.ignored
    }

    /// Close the turn: drop segments that never received content and merge
    /// neighbours of the same kind that this exposes.
    pub fn finish(self) -> Vec<Segment> {
        let mut out: Vec<Segment> = Vec::with_capacity(self.segments.len());
        for segment in self.segments.into_iter().filter(|s| !s.is_empty()) {
            match out.last_mut() {
                Some(last) if last.kind() == segment.kind() => last.absorb(segment),
                _ => out.push(segment),
            }
        }
        out
    }
}

/// Aggregate a complete event sequence for one assistant turn.
pub fn aggregate<I>(events: I, store: &dyn ImageStore) -> Vec<Segment>
where
    I: IntoIterator<Item = StreamEvent>,
{
    let mut aggregator = TranscriptAggregator::new(store);
    for event in events {
        aggregator.push(event);
    }
    let ignored = aggregator.ignored();
    let segments = aggregator.finish();
    debug!(segments = segments.len(), ignored, "Transcript aggregated");
    segments
}

/// Flatten segments to plain text, e.g. for building a later prompt.
/// Image segments contribute their file ids and store locations.
pub fn segments_to_prompt_text(segments: &[Segment]) -> Vec<String> {
    let mut parts = Vec::new();
    for segment in segments {
        match segment {
            Segment::Image { images, .. } => {
                for image in images {
                    parts.push(image.file_id.clone());
                    if let Some(location) = &image.location {
                        parts.push(location.clone());
                    }
                }
            }
            other => {
                if let Some(text) = other.text() {
                    parts.push(text.to_string());
                }
            }
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn code(fragment: &str) -> StreamEvent {
        StreamEvent::StepTextDelta {
            tool: StepTool::Code,
            fragment: fragment.to_string(),
        }
    }

    fn log(text: &str) -> StepOutput {
        StepOutput::Log {
            text: text.to_string(),
        }
    }

    #[test]
    fn test_code_deltas_then_log_make_two_segments() {
        let store = MemoryImageStore::new();
        let segments = aggregate(
            vec![
                StreamEvent::StepStarted { has_tool_call: true },
                code("import pandas"),
                code(" as pd\n"),
                code("pd.read_csv('x')"),
                StreamEvent::StepCompleted {
                    outputs: vec![log("ok")],
                },
            ],
            &store,
        );

        assert_eq!(
            segments,
            vec![
                Segment::CodeInput {
                    content: "import pandas as pd\npd.read_csv('x')".to_string()
                },
                Segment::CodeOutput {
                    content: "ok".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_logs_accumulate_into_one_segment() {
        let store = MemoryImageStore::new();
        let segments = aggregate(
            vec![StreamEvent::StepCompleted {
                outputs: vec![log("a\n"), log("b\n")],
            }],
            &store,
        );
        assert_eq!(
            segments,
            vec![Segment::CodeOutput {
                content: "a\nb\n".to_string()
            }]
        );
    }

    #[test]
    fn test_message_text_segment() {
        let store = MemoryImageStore::new();
        let segments = aggregate(
            vec![
                StreamEvent::MessageStarted,
                StreamEvent::MessageTextDelta {
                    fragment: "The effect ".to_string(),
                },
                StreamEvent::MessageTextDelta {
                    fragment: "is significant.".to_string(),
                },
            ],
            &store,
        );
        assert_eq!(
            segments,
            vec![Segment::Text {
                content: "The effect is significant.".to_string()
            }]
        );
    }

    #[test]
    fn test_images_are_stored_and_rendered() {
        let store = MemoryImageStore::new();
        let segments = aggregate(
            vec![StreamEvent::StepCompleted {
                outputs: vec![
                    log("plotting"),
                    StepOutput::Image {
                        id: "file-a".to_string(),
                        bytes: Some(b"A".to_vec()),
                    },
                    StepOutput::Image {
                        id: "file-b".to_string(),
                        bytes: Some(b"B".to_vec()),
                    },
                ],
            }],
            &store,
        );

        assert_eq!(segments.len(), 2);
        match &segments[1] {
            Segment::Image { content, images } => {
                assert_eq!(content.len(), 2);
                assert!(content[0].contains("base64,QQ=="));
                let ids: Vec<&str> = images.iter().map(|i| i.file_id.as_str()).collect();
                assert_eq!(ids, vec!["file-a", "file-b"]);
            }
            other => panic!("expected image segment, got {:?}", other),
        }
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_missing_image_bytes_yield_failure_note() {
        let store = MemoryImageStore::new();
        let segments = aggregate(
            vec![
                StreamEvent::StepCompleted {
                    outputs: vec![StepOutput::Image {
                        id: "file-x".to_string(),
                        bytes: None,
                    }],
                },
                StreamEvent::MessageStarted,
                StreamEvent::MessageTextDelta {
                    fragment: "after".to_string(),
                },
            ],
            &store,
        );

        assert_eq!(segments.len(), 2);
        match &segments[0] {
            Segment::Image { content, images } => {
                assert_eq!(content, &vec!["[Image unavailable: file-x]".to_string()]);
                assert_eq!(images[0].file_id, "file-x");
            }
            other => panic!("expected image segment, got {:?}", other),
        }
        assert_eq!(segments[1].text(), Some("after"));
    }

    #[test]
    fn test_unrecognized_event_is_transparent() {
        let store = MemoryImageStore::new();
        let with_noise = vec![
            code("x = 1"),
            StreamEvent::Unrecognized,
            code("\ny = 2"),
            StreamEvent::MessageStarted,
            StreamEvent::MessageTextDelta {
                fragment: "done".to_string(),
            },
        ];
        let clean: Vec<StreamEvent> = with_noise
            .iter()
            .filter(|e| **e != StreamEvent::Unrecognized)
            .cloned()
            .collect();

        assert_eq!(aggregate(with_noise, &store), aggregate(clean, &store));
    }

    #[test]
    fn test_non_code_tool_deltas_are_ignored() {
        let store = MemoryImageStore::new();
        let segments = aggregate(
            vec![StreamEvent::StepTextDelta {
                tool: StepTool::Other,
                fragment: "search query".to_string(),
            }],
            &store,
        );
        assert!(segments.is_empty());
    }

    #[test]
    fn test_empty_segments_are_dropped_and_neighbours_merged() {
        let store = MemoryImageStore::new();
        let segments = aggregate(
            vec![
                code("a"),
                StreamEvent::MessageStarted,
                StreamEvent::StepStarted { has_tool_call: true },
                code("b"),
            ],
            &store,
        );
        assert_eq!(
            segments,
            vec![Segment::CodeInput {
                content: "ab".to_string()
            }]
        );
    }

    #[test]
    fn test_partial_results_survive_push_without_finish_order() {
        let store = MemoryImageStore::new();
        let mut aggregator = TranscriptAggregator::new(&store);
        aggregator.push(code("print(1)"));
        aggregator.push(StreamEvent::Unrecognized);
        assert_eq!(aggregator.ignored(), 1);
        let segments = aggregator.finish();
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn test_wire_decoding_of_events() {
        let events: Vec<StreamEvent> = serde_json::from_value(json!([
            {"type": "step_started", "has_tool_call": true},
            {"type": "step_text_delta", "tool": "code", "fragment": "x"},
            {"type": "step_completed", "outputs": [
                {"kind": "log", "text": "1"},
                {"kind": "image", "id": "file-1"},
                {"kind": "audio", "id": "file-2"}
            ]},
            {"type": "message_started"},
            {"type": "message_text_delta", "fragment": "hi"},
            {"type": "run_usage", "tokens": 10}
        ]))
        .unwrap();

        assert_eq!(events.len(), 6);
        assert_eq!(events[5], StreamEvent::Unrecognized);
        match &events[2] {
            StreamEvent::StepCompleted { outputs } => {
                assert_eq!(outputs[2], StepOutput::Unrecognized);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_segment_serialization_shape() {
        let segment = Segment::CodeOutput {
            content: "ok".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&segment).unwrap(),
            json!({"type": "code_output", "content": "ok"})
        );
    }

    #[test]
    fn test_segments_to_prompt_text_uses_image_ids() {
        let segments = vec![
            Segment::Text {
                content: "result".to_string(),
            },
            Segment::Image {
                content: vec!["<img>".to_string()],
                images: vec![ImageRef {
                    file_id: "file-9".to_string(),
                    location: Some("images/file-9.png".to_string()),
                }],
            },
        ];
        assert_eq!(
            segments_to_prompt_text(&segments),
            vec!["result", "file-9", "images/file-9.png"]
        );
    }
}
