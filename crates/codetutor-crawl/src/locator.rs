use codetutor_core::{Result, TutorError};
use std::fmt;
use std::path::PathBuf;
use url::Url;

const GITHUB_API: &str = "https://api.github.com";

/// Where a repository lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryLocator {
    Local(PathBuf),
    GitHub(GitHubRepo),
    GitLab(GitLabRepo),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepo {
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    /// Branch, tag or commit; the default branch when unset
    pub reference: Option<String>,
    /// Sub-directory to restrict the crawl to
    pub subdir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLabRepo {
    pub api_base: String,
    /// Full project path, e.g. `group/subgroup/project`
    pub project_path: String,
    pub reference: String,
    pub subdir: Option<String>,
}

impl RepositoryLocator {
    /// Parse a repository URL. Hosts containing `github` are GitHub; any
    /// other host is treated as a (possibly self-hosted) GitLab instance.
    pub fn parse_url(input: &str) -> Result<Self> {
        let url = Url::parse(input)
            .map_err(|e| TutorError::Crawl(format!("Invalid repository URL {}: {}", input, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| TutorError::Crawl(format!("Repository URL has no host: {}", input)))?
            .to_lowercase();

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        if host.contains("github") {
            parse_github(&host, &segments, input).map(RepositoryLocator::GitHub)
        } else {
            let host = match url.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host,
            };
            parse_gitlab(url.scheme(), &host, &segments, input).map(RepositoryLocator::GitLab)
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        RepositoryLocator::Local(path.into())
    }

    /// Short name used when the user did not give the project one.
    pub fn default_project_name(&self) -> String {
        match self {
            RepositoryLocator::Local(path) => path
                .canonicalize()
                .unwrap_or_else(|_| path.clone())
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string()),
            RepositoryLocator::GitHub(repo) => repo.repo.clone(),
            RepositoryLocator::GitLab(repo) => repo
                .project_path
                .rsplit('/')
                .next()
                .unwrap_or("project")
                .to_string(),
        }
    }
}

impl fmt::Display for RepositoryLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryLocator::Local(path) => write!(f, "{}", path.display()),
            RepositoryLocator::GitHub(repo) => {
                write!(f, "https://github.com/{}/{}", repo.owner, repo.repo)?;
                if let Some(reference) = &repo.reference {
                    write!(f, "/tree/{}", reference)?;
                    if let Some(subdir) = &repo.subdir {
                        write!(f, "/{}", subdir)?;
                    }
                }
                Ok(())
            }
            RepositoryLocator::GitLab(repo) => {
                let web = repo.api_base.trim_end_matches("/api/v4");
                write!(f, "{}/{}", web, repo.project_path)?;
                if repo.reference != "HEAD" || repo.subdir.is_some() {
                    write!(f, "/-/tree/{}", repo.reference)?;
                    if let Some(subdir) = &repo.subdir {
                        write!(f, "/{}", subdir)?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn join_subdir(parts: &[&str]) -> Option<String> {
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn parse_github(host: &str, segments: &[&str], input: &str) -> Result<GitHubRepo> {
    if segments.len() < 2 {
        return Err(TutorError::Crawl(format!(
            "GitHub URL must name owner and repository: {}",
            input
        )));
    }

    let api_base = if host == "github.com" || host == "www.github.com" {
        GITHUB_API.to_string()
    } else {
        // GitHub Enterprise
        format!("https://{}/api/v3", host)
    };

    let (reference, subdir) = match segments.get(2) {
        Some(&"tree") | Some(&"blob") if segments.len() >= 4 => (
            Some(segments[3].to_string()),
            join_subdir(&segments[4..]),
        ),
        _ => (None, None),
    };

    Ok(GitHubRepo {
        api_base,
        owner: segments[0].to_string(),
        repo: segments[1].trim_end_matches(".git").to_string(),
        reference,
        subdir,
    })
}

fn parse_gitlab(scheme: &str, host: &str, segments: &[&str], input: &str) -> Result<GitLabRepo> {
    // `/-/` separates the project path from tree/blob routes
    let (project, rest) = match segments.iter().position(|s| *s == "-") {
        Some(idx) => (&segments[..idx], &segments[idx + 1..]),
        None => (segments, &[][..]),
    };

    if project.is_empty() {
        return Err(TutorError::Crawl(format!(
            "GitLab URL must name a project: {}",
            input
        )));
    }

    let (reference, subdir) = if rest.len() >= 2 && rest[0] == "tree" {
        (rest[1].to_string(), join_subdir(&rest[2..]))
    } else {
        ("HEAD".to_string(), None)
    };

    let mut project_path = project.join("/");
    if let Some(stripped) = project_path.strip_suffix(".git") {
        project_path = stripped.to_string();
    }

    Ok(GitLabRepo {
        api_base: format!("{}://{}/api/v4", scheme, host),
        project_path,
        reference,
        subdir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_github_plain() {
        let loc = RepositoryLocator::parse_url("https://github.com/owner/project").unwrap();
        match loc {
            RepositoryLocator::GitHub(repo) => {
                assert_eq!(repo.api_base, GITHUB_API);
                assert_eq!(repo.owner, "owner");
                assert_eq!(repo.repo, "project");
                assert!(repo.reference.is_none());
            }
            other => panic!("expected GitHub, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_github_tree_subdir() {
        let loc =
            RepositoryLocator::parse_url("https://github.com/owner/project/tree/main/src/core")
                .unwrap();
        match loc {
            RepositoryLocator::GitHub(repo) => {
                assert_eq!(repo.reference.as_deref(), Some("main"));
                assert_eq!(repo.subdir.as_deref(), Some("src/core"));
            }
            other => panic!("expected GitHub locator, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_gitlab_nested_group() {
        let loc = RepositoryLocator::parse_url(
            "https://gitlab.example.com/group/sub/project/-/tree/develop/lib",
        )
        .unwrap();
        match loc {
            RepositoryLocator::GitLab(repo) => {
                assert_eq!(repo.api_base, "https://gitlab.example.com/api/v4");
                assert_eq!(repo.project_path, "group/sub/project");
                assert_eq!(repo.reference, "develop");
                assert_eq!(repo.subdir.as_deref(), Some("lib"));
            }
            other => panic!("expected GitLab, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_gitlab_defaults_to_head() {
        let loc = RepositoryLocator::parse_url("https://gitlab.com/group/project.git").unwrap();
        if let RepositoryLocator::GitLab(repo) = &loc {
            assert_eq!(repo.reference, "HEAD");
            assert_eq!(repo.project_path, "group/project");
        }
        assert_eq!(loc.default_project_name(), "project");
    }

    #[test]
    fn test_rejects_incomplete_urls() {
        assert!(RepositoryLocator::parse_url("https://github.com/owner").is_err());
        assert!(RepositoryLocator::parse_url("not a url").is_err());
    }
}
