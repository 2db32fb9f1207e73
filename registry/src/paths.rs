//! Registry path canonicalisation. A path is a `/`-separated list of
//! non-empty segments; empty segments are dropped, `.` and `..` are
//! rejected outright.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Invalid path element {0:?}")]
    IllegalSegment(String),
}

/// Split a path string into its canonical elements.
pub fn split_path(path: &str) -> Result<Vec<String>, PathError> {
    let mut elements = Vec::new();
    for segment in path.split('/') {
        if segment.is_empty() {
            continue;
        }
        if segment == "." || segment == ".." {
            return Err(PathError::IllegalSegment(segment.to_string()));
        }
        elements.push(segment.to_string());
    }
    Ok(elements)
}

/// Inverse of [`split_path`]: join canonical elements back into a path.
pub fn join_path(elements: &[String]) -> String {
    elements.join("/")
}

/// Canonical string form of a path.
pub fn canonical(path: &str) -> Result<String, PathError> {
    Ok(join_path(&split_path(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_join_round_trips() {
        for input in ["a", "a/b/c", "/a//b/", "", "///", "x/address"] {
            let elements = split_path(input).unwrap();
            assert_eq!(
                split_path(&join_path(&elements)).unwrap(),
                elements,
                "round trip of {:?}",
                input
            );
        }
        assert_eq!(join_path(&[]), "");
    }

    #[test]
    fn drops_empty_segments() {
        assert_eq!(split_path("/a//b/").unwrap(), vec!["a", "b"]);
        assert_eq!(canonical("//foo///address").unwrap(), "foo/address");
    }

    #[test]
    fn rejects_dot_segments() {
        assert_eq!(
            split_path("a/./b"),
            Err(PathError::IllegalSegment(".".to_string()))
        );
        assert_eq!(
            split_path("../a"),
            Err(PathError::IllegalSegment("..".to_string()))
        );
    }
}
