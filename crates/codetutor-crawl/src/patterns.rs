use codetutor_core::{Result, TutorError};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Include/exclude filter applied to every candidate file.
///
/// Patterns are shell-style with `*` also matching `/`. Include patterns are
/// tried against the file name and the relative path; exclude patterns against
/// the relative path only. An empty include set admits everything.
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl FileFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_set(include)?,
            exclude: build_set(exclude)?,
        })
    }

    pub fn matches(&self, relative_path: &str) -> bool {
        let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);

        let included = match &self.include {
            None => true,
            Some(set) => set.is_match(file_name) || set.is_match(relative_path),
        };
        if !included {
            return false;
        }

        match &self.exclude {
            None => true,
            Some(set) => !set.is_match(relative_path),
        }
    }
}

fn build_set(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(false)
            .build()
            .map_err(|e| TutorError::Config(format!("Invalid pattern '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| TutorError::Config(format!("Invalid pattern set: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_filter_admits_everything() {
        let filter = FileFilter::new(&[], &[]).unwrap();
        assert!(filter.matches("any/path/file.bin"));
    }

    #[test]
    fn test_include_matches_file_name_at_any_depth() {
        let filter = FileFilter::new(&strings(&["*.py"]), &[]).unwrap();
        assert!(filter.matches("pkg/sub/module.py"));
        assert!(!filter.matches("pkg/sub/module.rs"));
    }

    #[test]
    fn test_exclude_star_crosses_directories() {
        let filter = FileFilter::new(&strings(&["*.py"]), &strings(&["tests/*"])).unwrap();
        assert!(!filter.matches("tests/unit/test_a.py"));
        assert!(filter.matches("src/a.py"));
    }

    #[test]
    fn test_exclude_double_star_patterns() {
        let filter = FileFilter::new(&[], &strings(&["**/node_modules/**"])).unwrap();
        assert!(!filter.matches("web/node_modules/react/index.js"));
        assert!(filter.matches("web/src/index.js"));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        assert!(FileFilter::new(&strings(&["[unclosed"]), &[]).is_err());
    }
}
