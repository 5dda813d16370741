use serde::{Deserialize, Serialize};

/// Output of the Change Detector (spec §4.5): what happened to a source
/// since it was last processed, and implicitly, the repair action
/// prescribed for it (see `doc_index::change_detector`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Unchanged,
    NewDocument,
    ContentChanged,
    OptionsChanged,
    MetadataOnly,
    Corrupt,
}

impl ChangeKind {
    /// Whether this change requires re-running the indexing pipeline at all.
    pub fn requires_reindex(self) -> bool {
        matches!(
            self,
            ChangeKind::NewDocument
                | ChangeKind::ContentChanged
                | ChangeKind::OptionsChanged
                | ChangeKind::Corrupt
        )
    }
}
