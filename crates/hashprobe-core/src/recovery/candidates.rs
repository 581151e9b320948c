/// Path candidates and variant expansion
use std::collections::HashSet;

/// Extensions that imply sibling assets with the same stem
const VARIANT_GROUPS: &[(&str, &[&str])] = &[
    ("pmd", &["pmg", "pmc", "pma", "ppd"]),
    ("mat", &["tobj", "dds"]),
    ("tobj", &["dds"]),
    ("bank", &["bank.guids"]),
];

/// Multi-dot extensions, checked before the last-dot rule
const COMPOUND_EXTENSIONS: &[&str] = &["bank.guids"];

/// Sibling extensions implied by `ext`
pub fn variant_siblings(ext: &str) -> &'static [&'static str] {
    VARIANT_GROUPS
        .iter()
        .find(|(base, _)| *base == ext)
        .map(|(_, siblings)| *siblings)
        .unwrap_or(&[])
}

/// Whether a string could be an archive path
pub fn is_path_like(candidate: &str) -> bool {
    !candidate.is_empty()
        && !candidate.contains("//")
        && (candidate.contains('/') || candidate.contains('.'))
}

/// Trim surrounding whitespace and force exactly one leading `/`
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_start_matches('/');
    let trimmed = trimmed.trim_end_matches('/');
    format!("/{}", trimmed)
}

/// Parent directory of a normalized path; `/` for top-level entries
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Lowercase extension of a path's file name, preferring known compound extensions
pub fn extension_of(path: &str) -> Option<String> {
    let name = file_name(path).to_ascii_lowercase();
    for compound in COMPOUND_EXTENSIONS {
        if name.len() > compound.len() + 1
            && name.ends_with(compound)
            && name.as_bytes()[name.len() - compound.len() - 1] == b'.'
        {
            return Some((*compound).to_string());
        }
    }
    let dot = name.rfind('.')?;
    let ext = &name[dot + 1..];
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_string())
    }
}

/// Replace the extension of `path` (whose lowercase form is `ext`) with `sibling`
fn with_extension(path: &str, ext: &str, sibling: &str) -> String {
    let stem = &path[..path.len() - ext.len()];
    format!("{}{}", stem, sibling)
}

/// Set of tentative paths awaiting resolution
#[derive(Debug, Clone, Default)]
pub struct PathCandidates {
    paths: HashSet<String>,
}

impl PathCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate and its variants unless it is not path-like or was already visited.
    /// Returns whether anything new was inserted.
    pub fn add(&mut self, candidate: &str, visited: &HashSet<String>) -> bool {
        self.insert_expanded(candidate, Some(visited))
    }

    /// Add a candidate and its variants without consulting a visited set
    pub fn add_with_variants(&mut self, candidate: &str) -> bool {
        self.insert_expanded(candidate, None)
    }

    fn insert_expanded(&mut self, candidate: &str, visited: Option<&HashSet<String>>) -> bool {
        if !is_path_like(candidate) {
            return false;
        }
        let path = normalize_path(candidate);
        if visited.is_some_and(|v| v.contains(&path)) || self.paths.contains(&path) {
            return false;
        }

        let ext = extension_of(&path);
        self.paths.insert(path.clone());
        if let Some(ext) = ext {
            for sibling in variant_siblings(&ext) {
                let variant = with_extension(&path, &ext, sibling);
                self.insert_expanded(&variant, visited);
            }
        }
        true
    }

    /// Merge another candidate set, dropping anything already visited
    pub fn extend_from(&mut self, other: PathCandidates, visited: &HashSet<String>) {
        for path in other.paths {
            if !visited.contains(&path) {
                self.paths.insert(path);
            }
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.paths.iter()
    }

    /// Take every candidate not in `visited`, leaving the set empty
    pub fn drain_unvisited(&mut self, visited: &HashSet<String>) -> Vec<String> {
        let mut fresh: Vec<String> = self
            .paths
            .drain()
            .filter(|p| !visited.contains(p))
            .collect();
        fresh.sort();
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_likeness() {
        assert!(is_path_like("/def/city.sii"));
        assert!(is_path_like("icon.mat"));
        assert!(is_path_like("def/city"));
        assert!(!is_path_like(""));
        assert!(!is_path_like("plain"));
        assert!(!is_path_like("/def//city.sii"));
    }

    #[test]
    fn test_normalize_and_parent() {
        assert_eq!(normalize_path("def/a.sii"), "/def/a.sii");
        assert_eq!(normalize_path("  //def/a.sii "), "/def/a.sii");
        assert_eq!(normalize_path("/material/ui/"), "/material/ui");
        assert_eq!(parent_dir("/def/a.sii"), "/def");
        assert_eq!(parent_dir("/a.sii"), "/");
        assert_eq!(parent_dir("/"), "/");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("/a/b.PMD").as_deref(), Some("pmd"));
        assert_eq!(extension_of("/s/x.bank.guids").as_deref(), Some("bank.guids"));
        assert_eq!(extension_of("/s/x.bank").as_deref(), Some("bank"));
        assert_eq!(extension_of("/dir.v2/file"), None);
        assert_eq!(extension_of("/a/b."), None);
    }

    #[test]
    fn test_material_variant_closure() {
        let mut candidates = PathCandidates::new();
        assert!(candidates.add_with_variants("/a/b.mat"));
        assert!(candidates.contains("/a/b.mat"));
        assert!(candidates.contains("/a/b.tobj"));
        assert!(candidates.contains("/a/b.dds"));
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn test_model_and_bank_variants() {
        let mut candidates = PathCandidates::new();
        candidates.add_with_variants("/model/t.pmd");
        candidates.add_with_variants("/sound/x.bank");
        for path in [
            "/model/t.pmg",
            "/model/t.pmc",
            "/model/t.pma",
            "/model/t.ppd",
            "/sound/x.bank.guids",
        ] {
            assert!(candidates.contains(path), "missing {}", path);
        }
        assert_eq!(candidates.len(), 7);
    }

    #[test]
    fn test_visited_paths_are_skipped() {
        let visited: HashSet<String> = ["/a/b.mat".to_string()].into_iter().collect();
        let mut candidates = PathCandidates::new();
        assert!(!candidates.add("a/b.mat", &visited));
        assert!(!candidates.add("plain", &visited));
        assert!(candidates.is_empty());

        assert!(candidates.add("/a/c.tobj", &visited));
        assert_eq!(candidates.len(), 2);
        assert!(!candidates.add("/a/c.tobj", &visited));
    }

    #[test]
    fn test_drain_unvisited() {
        let mut candidates = PathCandidates::new();
        candidates.add_with_variants("/x/b.sii");
        candidates.add_with_variants("/x/a.sii");
        let visited: HashSet<String> = ["/x/b.sii".to_string()].into_iter().collect();
        assert_eq!(candidates.drain_unvisited(&visited), vec!["/x/a.sii"]);
        assert!(candidates.is_empty());
    }
}
