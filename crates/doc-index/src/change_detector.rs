use doc_types::{ChangeKind, DocumentRecord, DocumentState, Fingerprint};

/// Pure function: compares newly observed source state against the current
/// Registry record (if any) and reports what changed (spec §4.5). Does no
/// I/O, so it is fully unit-testable in isolation from storage.
pub fn detect_change(
    existing: Option<&DocumentRecord>,
    content_fp: Fingerprint,
    options_fp: Fingerprint,
    consistency_ok: bool,
) -> ChangeKind {
    let Some(existing) = existing else {
        return ChangeKind::NewDocument;
    };

    if !consistency_ok {
        return ChangeKind::Corrupt;
    }

    let content_same = existing.fingerprint == content_fp;
    let options_same = existing.options_fp == options_fp;

    // Tie-break (spec §4.5): if both changed, ContentChanged wins.
    match (content_same, options_same) {
        (true, true) => {
            if existing.state == DocumentState::Ready {
                ChangeKind::Unchanged
            } else {
                // A record exists with matching fingerprints but never
                // reached Ready (e.g. crashed mid-index): treat as new work.
                ChangeKind::NewDocument
            }
        }
        (false, _) => ChangeKind::ContentChanged,
        (true, false) => ChangeKind::OptionsChanged,
    }
}

/// `MetadataOnly` is detected separately from content/options fingerprints
/// (spec §4.5: the Change Detector's input is "new source bytes + metadata",
/// two distinct things). `detect_change` only ever sees the content hash, so
/// a declared size/mtime that drifted without the bytes changing still comes
/// back `Unchanged`; the Index Manager calls this afterwards, only on that
/// `Unchanged` result, to tell a genuine no-op apart from a metadata-only one.
pub fn is_metadata_only_drift(
    existing: &DocumentRecord,
    declared_size: Option<u64>,
    declared_mtime: Option<i64>,
) -> bool {
    existing.state == DocumentState::Ready
        && (declared_size.is_some() && declared_size != existing.declared_size
            || declared_mtime.is_some() && declared_mtime != existing.declared_mtime)
}

#[cfg(test)]
mod test {
    use super::*;
    use doc_types::{DocumentId, SourceHandle};
    use time::OffsetDateTime;

    fn record(fp: Fingerprint, ofp: Fingerprint, state: DocumentState) -> DocumentRecord {
        let mut r = DocumentRecord::new_pending(
            DocumentId("d".into()),
            SourceHandle::parse("/tmp/a.pdf"),
            fp,
            ofp,
            OffsetDateTime::UNIX_EPOCH,
        );
        r.state = state;
        r
    }

    #[test]
    fn no_record_is_new_document() {
        let fp = Fingerprint::of(b"a", None, None);
        assert_eq!(detect_change(None, fp, fp, true), ChangeKind::NewDocument);
    }

    #[test]
    fn unchanged_when_both_fingerprints_match_and_ready() {
        let fp = Fingerprint::of(b"a", None, None);
        let ofp = Fingerprint::of(b"o", None, None);
        let r = record(fp, ofp, DocumentState::Ready);
        assert_eq!(detect_change(Some(&r), fp, ofp, true), ChangeKind::Unchanged);
    }

    #[test]
    fn content_change_wins_tie_break() {
        let fp = Fingerprint::of(b"a", None, None);
        let fp2 = Fingerprint::of(b"b", None, None);
        let ofp = Fingerprint::of(b"o", None, None);
        let ofp2 = Fingerprint::of(b"o2", None, None);
        let r = record(fp, ofp, DocumentState::Ready);
        assert_eq!(detect_change(Some(&r), fp2, ofp2, true), ChangeKind::ContentChanged);
    }

    #[test]
    fn options_change_alone() {
        let fp = Fingerprint::of(b"a", None, None);
        let ofp = Fingerprint::of(b"o", None, None);
        let ofp2 = Fingerprint::of(b"o2", None, None);
        let r = record(fp, ofp, DocumentState::Ready);
        assert_eq!(detect_change(Some(&r), fp, ofp2, true), ChangeKind::OptionsChanged);
    }

    #[test]
    fn inconsistent_flags_force_corrupt() {
        let fp = Fingerprint::of(b"a", None, None);
        let ofp = Fingerprint::of(b"o", None, None);
        let r = record(fp, ofp, DocumentState::Ready);
        assert_eq!(detect_change(Some(&r), fp, ofp, false), ChangeKind::Corrupt);
    }

    #[test]
    fn metadata_drift_detected_when_declared_mtime_moves() {
        let fp = Fingerprint::of(b"a", None, None);
        let ofp = Fingerprint::of(b"o", None, None);
        let mut r = record(fp, ofp, DocumentState::Ready);
        r.declared_size = Some(100);
        r.declared_mtime = Some(1_000);
        assert!(is_metadata_only_drift(&r, Some(100), Some(2_000)));
    }

    #[test]
    fn no_drift_when_declared_metadata_matches() {
        let fp = Fingerprint::of(b"a", None, None);
        let ofp = Fingerprint::of(b"o", None, None);
        let mut r = record(fp, ofp, DocumentState::Ready);
        r.declared_size = Some(100);
        r.declared_mtime = Some(1_000);
        assert!(!is_metadata_only_drift(&r, Some(100), Some(1_000)));
    }

    #[test]
    fn no_drift_reported_when_caller_has_no_metadata_to_compare() {
        let fp = Fingerprint::of(b"a", None, None);
        let ofp = Fingerprint::of(b"o", None, None);
        let mut r = record(fp, ofp, DocumentState::Ready);
        r.declared_size = Some(100);
        assert!(!is_metadata_only_drift(&r, None, None));
    }

    #[test]
    fn pending_record_never_reports_metadata_drift() {
        let fp = Fingerprint::of(b"a", None, None);
        let ofp = Fingerprint::of(b"o", None, None);
        let mut r = record(fp, ofp, DocumentState::Pending);
        r.declared_size = Some(100);
        assert!(!is_metadata_only_drift(&r, Some(200), None));
    }
}
