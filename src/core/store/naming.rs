//! Collision-free relative paths inside the managed folder.

use crate::error::StoreError;
use std::path::{Component, Path, PathBuf};

/// Lowercase ASCII slug: runs of anything but `[a-z0-9]` collapse to one `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Reject absolute paths, `..` and empty paths; drop `.` components.
pub fn validate_relative(path: &Path) -> Result<PathBuf, StoreError> {
    let invalid = || StoreError::InvalidRelativePath {
        path: path.to_path_buf(),
    };

    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid())
            }
        }
    }

    if clean.as_os_str().is_empty() {
        return Err(invalid());
    }
    Ok(clean)
}

/// The form stored in the index: `/`-separated, no leading slash.
pub fn relative_key(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Pick the first free variant of `candidate`.
///
/// Order: `candidate`, `stem-<slug>.ext`, then `stem[-slug]-N.ext` for N = 1, 2, ...
/// `is_taken` decides whether a relative path is occupied.
pub fn assign_path(
    candidate: &Path,
    tokens: &[String],
    is_taken: impl Fn(&Path) -> bool,
) -> Result<PathBuf, StoreError> {
    let candidate = validate_relative(candidate)?;
    if !is_taken(&candidate) {
        return Ok(candidate);
    }

    let parent = candidate.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = candidate
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let slug = slugify(
        &tokens
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("-"),
    );
    let base = if slug.is_empty() {
        stem
    } else {
        let tagged = parent.join(format!("{stem}-{slug}{extension}"));
        if !is_taken(&tagged) {
            return Ok(tagged);
        }
        format!("{stem}-{slug}")
    };

    let mut counter: u64 = 1;
    loop {
        let numbered = parent.join(format!("{base}-{counter}{extension}"));
        if !is_taken(&numbered) {
            return Ok(numbered);
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn taken(paths: &[&str]) -> impl Fn(&Path) -> bool {
        let set: HashSet<PathBuf> = paths.iter().map(PathBuf::from).collect();
        move |p: &Path| set.contains(p)
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Summer Trip!"), "summer-trip");
        assert_eq!(slugify("--a__b--"), "a-b");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn free_candidate_is_returned_unchanged() {
        let path = assign_path(Path::new("a/img.png"), &[], taken(&[])).unwrap();
        assert_eq!(path, PathBuf::from("a/img.png"));
    }

    #[test]
    fn tags_disambiguate_before_counter() {
        let tokens = vec!["Beach".to_string(), "2019".to_string()];
        let path = assign_path(Path::new("img.png"), &tokens, taken(&["img.png"])).unwrap();
        assert_eq!(path, PathBuf::from("img-beach-2019.png"));
    }

    #[test]
    fn counter_follows_tag_slug() {
        let tokens = vec!["beach".to_string()];
        let path = assign_path(
            Path::new("img.png"),
            &tokens,
            taken(&["img.png", "img-beach.png", "img-beach-1.png"]),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("img-beach-2.png"));
    }

    #[test]
    fn counter_without_tags() {
        let tokens = vec!["  ".to_string()];
        let path = assign_path(Path::new("x/img.png"), &tokens, taken(&["x/img.png"])).unwrap();
        assert_eq!(path, PathBuf::from("x/img-1.png"));
    }

    #[test]
    fn escaping_paths_are_rejected() {
        assert!(assign_path(Path::new("../img.png"), &[], taken(&[])).is_err());
        assert!(assign_path(Path::new("/etc/img.png"), &[], taken(&[])).is_err());
        assert!(validate_relative(Path::new("")).is_err());
    }

    #[test]
    fn relative_key_uses_forward_slashes() {
        assert_eq!(relative_key(Path::new("./a/b/c.png")), "a/b/c.png");
    }
}
