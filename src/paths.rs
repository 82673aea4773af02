//! Lexical path arithmetic for list files.
//!
//! List files link to task files with paths relative to the list's own
//! directory. Both directions (writing a link, matching a link back to a
//! task) are computed without touching the file system, so they behave the
//! same for files that do not exist yet.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without consulting the file system.
///
/// Leading `..` components of a relative path are kept; `..` directly
/// under the root is dropped.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

/// Path of `target` relative to the directory `base`.
///
/// Returns `None` when no lexical answer exists: one path is absolute and
/// the other is not, or `base` climbs above its own start with `..`.
#[must_use]
pub fn relative_to(base: &Path, target: &Path) -> Option<PathBuf> {
    let base = normalize_lexically(base);
    let target = normalize_lexically(target);
    if base.is_absolute() != target.is_absolute() {
        return None;
    }

    let base_parts: Vec<_> = base.components().collect();
    let target_parts: Vec<_> = target.components().collect();
    let common = base_parts.iter().zip(&target_parts).take_while(|(a, b)| a == b).count();

    let base_rest = &base_parts[common..];
    if base_rest.iter().any(|c| matches!(c, Component::ParentDir)) {
        return None;
    }

    let mut relative = PathBuf::new();
    for _ in base_rest {
        relative.push("..");
    }
    for part in &target_parts[common..] {
        relative.push(part.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    Some(relative)
}

/// Render a path with `/` separators.
#[must_use]
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// The directory a list file's links are relative to.
#[must_use]
pub fn list_dir(list_file: &Path) -> &Path {
    list_file.parent().unwrap_or_else(|| Path::new(""))
}

/// Link target for `target` as written into `list_file`.
///
/// Falls back to `target` itself when no relative path can be computed.
#[must_use]
pub fn list_link(list_file: &Path, target: &Path) -> String {
    relative_to(list_dir(list_file), target).map_or_else(|| to_slash(target), |rel| to_slash(&rel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(normalize_lexically(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize_lexically(Path::new("../a/b")), PathBuf::from("../a/b"));
        assert_eq!(normalize_lexically(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize_lexically(Path::new("a/..")), PathBuf::new());
    }

    #[test]
    fn test_relative_to_sibling_and_child() {
        assert_eq!(
            relative_to(Path::new("tasks"), Path::new("tasks/T1aaaa-x/T1aaaa-x.md")),
            Some(PathBuf::from("T1aaaa-x/T1aaaa-x.md"))
        );
        assert_eq!(
            relative_to(Path::new("lists"), Path::new("tasks/T1aaaa-x/T1aaaa-x.md")),
            Some(PathBuf::from("../tasks/T1aaaa-x/T1aaaa-x.md"))
        );
        assert_eq!(relative_to(Path::new("a/b"), Path::new("a/b")), Some(PathBuf::from(".")));
    }

    #[test]
    fn test_relative_to_needs_matching_roots() {
        assert_eq!(relative_to(Path::new("/abs"), Path::new("rel/x.md")), None);
        assert_eq!(relative_to(Path::new("../up"), Path::new("x.md")), None);
    }

    #[test]
    fn test_list_link() {
        assert_eq!(
            list_link(Path::new("tasks/free-tasks.md"), Path::new("tasks/E1aaaa-e/T2bbbb-c/T2bbbb-c.md")),
            "E1aaaa-e/T2bbbb-c/T2bbbb-c.md"
        );
        assert_eq!(list_link(Path::new("free.md"), Path::new("tasks/T1aaaa-x/T1aaaa-x.md")), "tasks/T1aaaa-x/T1aaaa-x.md");
        assert_eq!(list_link(Path::new("/root/free.md"), Path::new("tasks/x.md")), "tasks/x.md");
    }
}
