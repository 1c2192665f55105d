//! Document load/save.
//!
//! Saves go through a temp file in the target directory followed by an atomic
//! rename, so an interrupted write leaves the previous version intact.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use draftgate_core::Document;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::StoreError;

/// Read and parse a document from disk.
pub fn load_document(path: &Path) -> Result<Document, StoreError> {
    let raw = fs::read_to_string(path).map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            StoreError::NotFound(path.to_path_buf())
        } else {
            StoreError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    Document::parse(path, &raw).map_err(|source| StoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a document back to its own path.
pub fn save_document(doc: &Document) -> Result<(), StoreError> {
    let path = doc.path();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(StoreError::io(dir))?;
    tmp.write_all(doc.serialize().as_bytes())
        .map_err(StoreError::io(tmp.path()))?;
    tmp.as_file().sync_all().map_err(StoreError::io(tmp.path()))?;
    tmp.persist(path).map_err(|err| StoreError::Io {
        path: path.to_path_buf(),
        source: err.error,
    })?;

    debug!(path = %path.display(), "document saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftgate_core::MetaValue;

    #[test]
    fn load_modify_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draft.md");
        fs::write(&path, "---\ntitle: Espresso\n# keep me\n---\nBody\n").unwrap();

        let mut doc = load_document(&path).unwrap();
        doc.set("keywords", MetaValue::List(vec!["espresso".into()]));
        save_document(&doc).unwrap();

        let saved = fs::read_to_string(&path).unwrap();
        assert_eq!(
            saved,
            "---\ntitle: Espresso\n# keep me\nkeywords: [espresso]\n---\nBody\n"
        );
        assert_eq!(load_document(&path).unwrap(), doc);
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draft.md");
        fs::write(&path, "Body\n").unwrap();
        let doc = load_document(&path).unwrap();
        save_document(&doc).unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_document(&dir.path().join("nope.md")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.md");
        fs::write(&path, "---\ntitle: x\n").unwrap();
        let err = load_document(&path).unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }
}
