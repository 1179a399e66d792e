//! Path resolution: walking `/`-separated components from the root,
//! materializing inodes on demand.

use crate::dentry::EntryKey;
use crate::error::{Error, ErrorKind, Result};
use crate::mount::Mount;

/// The outcome of resolving a path. The resolver never fails outright (see
/// "Resolver totality"): a miss at any level simply reports `found = false`
/// against the deepest entry reached.
pub struct Resolved {
    /// The deepest entry reached: the target itself on a hit, or the parent
    /// (or ancestor) directory at which the walk stopped on a miss.
    pub entry: EntryKey,
    pub found: bool,
    pub is_root: bool,
}

/// Splits `path` into non-empty components, rejecting anything that isn't
/// an absolute path.
fn components(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(Error::new(ErrorKind::Invalid));
    }
    Ok(path.split('/').filter(|c| !c.is_empty()).collect())
}

/// Scans `parent`'s sibling list for a child named `name` (strict
/// equality — the original's `strlen`-bounded `memcmp` prefix match is not
/// preserved). A non-directory or empty directory simply has no children,
/// so this doubles as the "descended into a regular file" check.
fn find_child(mount: &mut Mount, parent: EntryKey, name: &str) -> Result<Option<EntryKey>> {
    mount.ensure_materialized(parent)?;
    let parent_ino = mount.entry(parent).ino;
    let mut cursor = mount.inode(parent_ino).expect("materialized above").children_head;
    while let Some(ck) = cursor {
        let entry = mount.entry(ck);
        if entry.name == name {
            return Ok(Some(ck));
        }
        cursor = entry.next_sibling;
    }
    Ok(None)
}

/// Resolves `path` against the tree rooted at `mount.root()`.
///
/// A miss at any level — an intermediate component missing, or a
/// descent into a non-directory — stops the walk and reports the deepest
/// entry reached with `found = false`, per the resolver's totality
/// invariant: this never itself produces a `NotFound`/`NotDir` error.
pub fn resolve(mount: &mut Mount, path: &str) -> Result<Resolved> {
    let parts = components(path)?;
    if parts.is_empty() {
        return Ok(Resolved {
            entry: mount.root(),
            found: true,
            is_root: true,
        });
    }

    let mut current = mount.root();
    for part in &parts {
        match find_child(mount, current, part)? {
            Some(child) => current = child,
            None => {
                return Ok(Resolved {
                    entry: current,
                    found: false,
                    is_root: false,
                })
            }
        }
    }

    mount.ensure_materialized(current)?;
    Ok(Resolved {
        entry: current,
        found: true,
        is_root: false,
    })
}

/// Splits a path into its parent directory path and final component name.
/// `/a/b/c` -> `("/a/b", "c")`; `/a` -> `("/", "a")`.
pub fn split_parent(path: &str) -> Result<(String, String)> {
    let parts = components(path)?;
    let Some((last, rest)) = parts.split_last() else {
        return Err(Error::new(ErrorKind::Invalid));
    };
    let parent = if rest.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", rest.join("/"))
    };
    Ok((parent, last.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_paths() {
        assert!(components("rel/path").is_err());
    }

    #[test]
    fn splits_parent_and_name() {
        assert_eq!(split_parent("/a/b/c").unwrap(), ("/a/b".to_string(), "c".to_string()));
        assert_eq!(split_parent("/a").unwrap(), ("/".to_string(), "a".to_string()));
    }
}
