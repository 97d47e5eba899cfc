use std::collections::HashSet;

/// One recognised speech fragment. Its position in the merger is its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TranscriptSegment {
    pub transcript: String,
}

impl TranscriptSegment {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
        }
    }
}

impl From<&str> for TranscriptSegment {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TranscriptSegment {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Joins segments in arrival order, keeping only the first segment for each
/// distinct text.
pub fn merge_transcripts(segments: &[TranscriptSegment]) -> String {
    let mut seen = HashSet::with_capacity(segments.len());
    segments
        .iter()
        .filter(|segment| seen.insert(segment.transcript.as_str()))
        .map(|segment| segment.transcript.as_str())
        .collect()
}

/// Accumulates the segments of one recording session.
///
/// The combined string is recomputed from every segment on each change, since
/// recognisers may revise fragments that were already merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptMerger {
    segments: Vec<TranscriptSegment>,
}

impl TranscriptMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[TranscriptSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Appends a segment and returns the new combined string.
    pub fn push(&mut self, segment: impl Into<TranscriptSegment>) -> String {
        self.segments.push(segment.into());
        self.combined()
    }

    /// Replaces the text of the segment at `position`.
    ///
    /// Returns `None` when no segment exists there.
    pub fn revise(&mut self, position: usize, transcript: impl Into<String>) -> Option<String> {
        let segment = self.segments.get_mut(position)?;
        segment.transcript = transcript.into();
        Some(self.combined())
    }

    /// Replaces the whole segment sequence, as delivered by recognisers that
    /// republish their full result list.
    pub fn replace_all(
        &mut self,
        segments: impl IntoIterator<Item = TranscriptSegment>,
    ) -> String {
        self.segments = segments.into_iter().collect();
        self.combined()
    }

    pub fn combined(&self) -> String {
        merge_transcripts(&self.segments)
    }

    pub fn reset(&mut self) {
        self.segments.clear();
    }
}
