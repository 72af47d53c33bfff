use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Deleted,
    /// Content or type changed; also used for unmerged entries.
    Modified,
}

/// One changed path, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// Every path that differs between two revisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}
impl ChangeSet {
    pub fn new(changes: Vec<Change>) -> Self {
        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    /// Parse the output of `git diff --name-status -z`.
    ///
    /// Entries are NUL-separated: a status letter, then one path (or two for
    /// renames and copies, which are only produced when rename detection is
    /// left on). A rename counts as a deletion plus an addition.
    pub fn from_name_status(output: &[u8]) -> Result<Self> {
        let mut fields = output.split(|b| *b == 0).filter(|f| !f.is_empty());
        let mut changes = Vec::new();
        while let Some(status) = fields.next() {
            match status.first() {
                Some(b'A') => changes.push(Change { kind: ChangeKind::Added, path: next_path(&mut fields)? }),
                Some(b'D') => changes.push(Change { kind: ChangeKind::Deleted, path: next_path(&mut fields)? }),
                Some(b'M' | b'T' | b'U') => {
                    changes.push(Change { kind: ChangeKind::Modified, path: next_path(&mut fields)? })
                },
                Some(b'R') => {
                    let old = next_path(&mut fields)?;
                    let new = next_path(&mut fields)?;
                    changes.push(Change { kind: ChangeKind::Deleted, path: old });
                    changes.push(Change { kind: ChangeKind::Added, path: new });
                },
                Some(b'C') => {
                    let _source = next_path(&mut fields)?;
                    changes.push(Change { kind: ChangeKind::Added, path: next_path(&mut fields)? });
                },
                _ => exn::bail!(ErrorKind::InvalidOutput("unknown diff status")),
            }
        }
        Ok(Self { changes })
    }
}

fn next_path<'a>(fields: &mut impl Iterator<Item = &'a [u8]>) -> Result<PathBuf> {
    let raw = fields.next().ok_or_raise(|| ErrorKind::InvalidOutput("missing path in diff"))?;
    Ok(PathBuf::from(String::from_utf8_lossy(raw).into_owned()))
}

impl IntoIterator for ChangeSet {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;
    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(kind: ChangeKind, path: &str) -> Change {
        Change { kind, path: PathBuf::from(path) }
    }

    #[test]
    fn test_parse_name_status() {
        let output = b"A\0recipes/foo_1.1.bb\0D\0recipes/foo_1.0.bb\0M\0conf/layer.conf\0T\0classes/x.bbclass\0";
        let changes = ChangeSet::from_name_status(output).unwrap();
        assert_eq!(
            changes.into_iter().collect::<Vec<_>>(),
            vec![
                change(ChangeKind::Added, "recipes/foo_1.1.bb"),
                change(ChangeKind::Deleted, "recipes/foo_1.0.bb"),
                change(ChangeKind::Modified, "conf/layer.conf"),
                change(ChangeKind::Modified, "classes/x.bbclass"),
            ]
        );
    }

    #[test]
    fn test_parse_paths_with_spaces_and_renames() {
        let output = b"R100\0old name.bb\0new name.bb\0";
        let changes = ChangeSet::from_name_status(output).unwrap();
        assert_eq!(
            changes.into_iter().collect::<Vec<_>>(),
            vec![change(ChangeKind::Deleted, "old name.bb"), change(ChangeKind::Added, "new name.bb")]
        );
    }

    #[test]
    fn test_parse_empty_and_malformed() {
        assert!(ChangeSet::from_name_status(b"").unwrap().is_empty());
        assert!(ChangeSet::from_name_status(b"A\0").is_err());
        assert!(ChangeSet::from_name_status(b"X\0path\0").is_err());
    }
}
