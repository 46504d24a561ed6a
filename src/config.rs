//! # Configuration Schema and Loading
//!
//! This module defines the data structures behind the `.repo-fleet.toml`
//! configuration file and the logic for loading, validating, editing, and
//! saving it.
//!
//! ## Key Components
//!
//! - **`Config`**: The whole file: `[general]`, `[http]`, and `[git]` settings
//!   plus the declared `[[repository]]` and `[[project]]` tables.
//! - **`Repository`**: One declared repository or downloadable artifact, with
//!   an optional reference selector (branch, tag, or commit) and per-repository
//!   overrides for shallow cloning, depth, and submodules.
//! - **`Project`**: A named group of repositories.
//!
//! ## Paths
//!
//! `general.work_dir` may use `~` and `$VAR`/`${VAR}`. A relative work
//! directory is resolved against the directory containing the configuration
//! file; when it is omitted the configuration file's directory itself is used.
//! The raw value is what gets written back on save.
//!
//! ## Example
//!
//! ```toml
//! [general]
//! work_dir = "repos"
//! default_branch = "main"
//!
//! [[repository]]
//! name = "api"
//! url = "https://github.com/acme/api.git"
//! type = "git"
//! tag = "v1.4.0"
//! tags = ["backend"]
//!
//! [[project]]
//! name = "platform"
//! repositories = ["api"]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::transport::{RefTarget, TransportKind};

/// `[general]` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root directory under which repositories are materialized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    /// Per-repository deadline for a sync operation, in seconds.
    pub timeout_secs: u64,
    /// Branch tracked when a repository selects no reference.
    pub default_branch: String,
    /// Whether submodules are cloned recursively by default.
    pub recurse_submodules: bool,
}

impl GeneralConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            timeout_secs: defaults::TIMEOUT_SECS,
            default_branch: defaults::DEFAULT_BRANCH.to_string(),
            recurse_submodules: true,
        }
    }
}

/// `[http]` settings for plain-file downloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    /// Retries after the first failed attempt.
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl HttpConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            retry_attempts: defaults::RETRY_ATTEMPTS,
            retry_delay_ms: defaults::RETRY_DELAY_MS,
        }
    }
}

/// `[git]` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub shallow_clone: bool,
    pub clone_depth: u32,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            shallow_clone: true,
            clone_depth: defaults::CLONE_DEPTH,
        }
    }
}

/// A declared repository.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Repository {
    /// Unique name, also the default local path.
    pub name: String,
    /// Source location: a Git remote or a downloadable file URL.
    pub url: String,
    /// Transport kind; detected from the URL when omitted.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TransportKind>,
    /// Local path relative to the work directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shallow: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submodules: Option<bool>,
    /// Free-form labels used for grouping and filtering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Repository {
    /// Creates a repository with only a name and URL set.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// The transport kind, falling back to detection from the URL.
    pub fn transport_kind(&self) -> TransportKind {
        self.kind.unwrap_or_else(|| TransportKind::detect(&self.url))
    }

    /// The reference this repository should be synchronized to.
    pub fn ref_target(&self, default_branch: &str) -> RefTarget {
        RefTarget::select(
            self.commit.as_deref(),
            self.tag.as_deref(),
            self.branch.as_deref(),
            default_branch,
        )
    }

    /// The requested reference string: commit > tag > branch > default.
    pub fn effective_ref(&self, default_branch: &str) -> String {
        self.ref_target(default_branch).as_str().to_string()
    }

    /// The local path relative to the work directory.
    pub fn effective_path(&self) -> &str {
        match self.path.as_deref() {
            Some(path) if !path.is_empty() => path,
            _ => &self.name,
        }
    }

    pub fn is_shallow(&self, default_shallow: bool) -> bool {
        self.shallow.unwrap_or(default_shallow)
    }

    pub fn clone_depth(&self, default_depth: u32) -> u32 {
        self.depth.unwrap_or(default_depth)
    }

    pub fn recurse_submodules(&self, default_submodules: bool) -> bool {
        self.submodules.unwrap_or(default_submodules)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// A named group of repositories.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Project {
    pub fn has_repository(&self, name: &str) -> bool {
        self.repositories.iter().any(|r| r == name)
    }
}

/// The parsed `.repo-fleet.toml` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(rename = "repository", default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<Repository>,
    #[serde(rename = "project", default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<Project>,

    /// Where this configuration was loaded from, if anywhere.
    #[serde(skip)]
    path: Option<PathBuf>,
    /// `general.work_dir` resolved to an absolute, expanded path.
    #[serde(skip)]
    work_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            http: HttpConfig::default(),
            git: GitConfig::default(),
            repositories: Vec::new(),
            projects: Vec::new(),
            path: None,
            work_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Creates a default configuration that lives in `dir`.
    pub fn default_in(dir: &Path) -> Self {
        Self {
            path: Some(dir.join(defaults::CONFIG_FILE_NAME)),
            work_dir: dir.to_path_buf(),
            ..Self::default()
        }
    }

    /// Parses configuration text. Relative work directories resolve against
    /// `base_dir`.
    pub fn parse(content: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Config = toml::from_str(content).map_err(|e| Error::ConfigParse {
            message: e.message().to_string(),
            hint: parse_hint(e.message()),
        })?;
        config.work_dir = resolve_work_dir(config.general.work_dir.as_deref(), base_dir)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let base_dir = config_dir(path)?;
        let mut config = Self::parse(&content, &base_dir)?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Writes the configuration back to the file it was loaded from.
    pub fn save(&self) -> Result<()> {
        let path = self.path.as_ref().ok_or_else(|| Error::ConfigParse {
            message: "configuration has no file path".to_string(),
            hint: None,
        })?;
        self.save_to(path)
    }

    /// Writes the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path of the file this configuration was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Directory holding the configuration file (where the lock file lives).
    pub fn dir(&self) -> PathBuf {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// The resolved work directory.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Overrides the work directory for this run without touching the file.
    pub fn set_work_dir(&mut self, raw: &str) -> Result<()> {
        let cwd = std::env::current_dir()?;
        self.work_dir = resolve_work_dir(Some(raw), &cwd)?;
        Ok(())
    }

    pub fn get_repository(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    pub fn get_project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// All repositories belonging to `project`, in project order.
    pub fn repositories_for_project(&self, project: &str) -> Result<Vec<&Repository>> {
        let proj = self
            .get_project(project)
            .ok_or_else(|| Error::ProjectNotFound {
                name: project.to_string(),
            })?;

        proj.repositories
            .iter()
            .map(|name| {
                self.get_repository(name)
                    .ok_or_else(|| Error::RepositoryNotFound { name: name.clone() })
            })
            .collect()
    }

    /// All repositories carrying `tag`, in declaration order.
    pub fn repositories_by_tag(&self, tag: &str) -> Vec<&Repository> {
        self.repositories.iter().filter(|r| r.has_tag(tag)).collect()
    }

    pub fn add_repository(&mut self, repo: Repository) -> Result<()> {
        if self.get_repository(&repo.name).is_some() {
            return Err(Error::DuplicateRepository { name: repo.name });
        }
        validate_repository(&repo, self.repositories.len())?;
        self.repositories.push(repo);
        Ok(())
    }

    /// Removes a repository and drops it from every project.
    pub fn remove_repository(&mut self, name: &str) -> Result<Repository> {
        let idx = self
            .repositories
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| Error::RepositoryNotFound {
                name: name.to_string(),
            })?;

        for project in &mut self.projects {
            project.repositories.retain(|r| r != name);
        }
        Ok(self.repositories.remove(idx))
    }

    pub fn add_project(&mut self, project: Project) -> Result<()> {
        if self.get_project(&project.name).is_some() {
            return Err(Error::DuplicateProject { name: project.name });
        }
        for repo in &project.repositories {
            if self.get_repository(repo).is_none() {
                return Err(Error::RepositoryNotFound { name: repo.clone() });
            }
        }
        self.projects.push(project);
        Ok(())
    }

    /// Appends an existing repository to an existing project.
    pub fn add_repo_to_project(&mut self, project: &str, repo: &str) -> Result<()> {
        if self.get_repository(repo).is_none() {
            return Err(Error::RepositoryNotFound {
                name: repo.to_string(),
            });
        }
        let proj = self.project_mut(project)?;
        if proj.has_repository(repo) {
            return Err(Error::AlreadyInProject {
                repo: repo.to_string(),
                project: project.to_string(),
            });
        }
        proj.repositories.push(repo.to_string());
        Ok(())
    }

    /// Drops a repository from a project. The repository itself stays declared.
    pub fn remove_repo_from_project(&mut self, project: &str, repo: &str) -> Result<()> {
        let proj = self.project_mut(project)?;
        let idx = proj
            .repositories
            .iter()
            .position(|r| r == repo)
            .ok_or_else(|| Error::NotInProject {
                repo: repo.to_string(),
                project: project.to_string(),
            })?;
        proj.repositories.remove(idx);
        Ok(())
    }

    fn project_mut(&mut self, name: &str) -> Result<&mut Project> {
        self.projects
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::ProjectNotFound {
                name: name.to_string(),
            })
    }

    pub fn remove_project(&mut self, name: &str) -> Result<Project> {
        let idx = self
            .projects
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| Error::ProjectNotFound {
                name: name.to_string(),
            })?;
        Ok(self.projects.remove(idx))
    }

    /// Checks names, URLs, reference selectors, and project membership.
    pub fn validate(&self) -> Result<()> {
        let mut repo_names = HashSet::new();
        for (idx, repo) in self.repositories.iter().enumerate() {
            validate_repository(repo, idx)?;
            if !repo_names.insert(repo.name.as_str()) {
                return Err(Error::Validation {
                    field: format!("repository[{}].name", idx),
                    message: format!("duplicate repository name: {}", repo.name),
                });
            }
        }

        let mut project_names = HashSet::new();
        for (idx, project) in self.projects.iter().enumerate() {
            if project.name.is_empty() {
                return Err(Error::Validation {
                    field: format!("project[{}].name", idx),
                    message: "name is required".to_string(),
                });
            }
            for (member_idx, member) in project.repositories.iter().enumerate() {
                if !repo_names.contains(member.as_str()) {
                    return Err(Error::Validation {
                        field: format!("project[{}].repositories[{}]", idx, member_idx),
                        message: format!("unknown repository: {}", member),
                    });
                }
            }
            if !project_names.insert(project.name.as_str()) {
                return Err(Error::Validation {
                    field: format!("project[{}].name", idx),
                    message: format!("duplicate project name: {}", project.name),
                });
            }
        }

        if self.git.shallow_clone && self.git.clone_depth == 0 {
            return Err(Error::Validation {
                field: "git.clone_depth".to_string(),
                message: "must be at least 1 when shallow_clone is enabled".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_repository(repo: &Repository, idx: usize) -> Result<()> {
    let prefix = format!("repository[{}]", idx);

    if repo.name.is_empty() {
        return Err(Error::Validation {
            field: format!("{}.name", prefix),
            message: "name is required".to_string(),
        });
    }

    if repo.url.is_empty() {
        return Err(Error::Validation {
            field: format!("{}.url", prefix),
            message: "url is required".to_string(),
        });
    }

    validate_url(&repo.url).map_err(|message| Error::Validation {
        field: format!("{}.url", prefix),
        message,
    })?;

    let selectors = [&repo.branch, &repo.tag, &repo.commit]
        .iter()
        .filter(|s| s.as_deref().is_some_and(|v| !v.is_empty()))
        .count();
    if selectors > 1 {
        return Err(Error::Validation {
            field: prefix,
            message: "only one of branch, tag, or commit can be specified".to_string(),
        });
    }

    Ok(())
}

fn validate_url(raw: &str) -> std::result::Result<(), String> {
    // scp-style SSH remotes are not URLs
    if raw.starts_with("git@") {
        return Ok(());
    }

    let url = url::Url::parse(raw).map_err(|e| format!("invalid URL: {}", e))?;

    if url.scheme() == "file" {
        if url.path().is_empty() || url.path() == "/" {
            return Err("file:// URL must have a path".to_string());
        }
        return Ok(());
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err("URL must have a host".to_string());
    }

    Ok(())
}

fn parse_hint(message: &str) -> Option<String> {
    if message.contains("unknown variant") {
        Some("repository `type` must be \"git\" or \"http\"".to_string())
    } else if message.contains("missing field `name`") || message.contains("missing field `url`")
    {
        Some("every [[repository]] needs both `name` and `url`".to_string())
    } else {
        None
    }
}

fn config_dir(path: &Path) -> Result<PathBuf> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    if dir.is_absolute() {
        Ok(dir)
    } else {
        Ok(std::env::current_dir()?.join(dir))
    }
}

fn resolve_work_dir(raw: Option<&str>, base_dir: &Path) -> Result<PathBuf> {
    match raw.filter(|r| !r.is_empty()) {
        None => Ok(base_dir.to_path_buf()),
        Some(raw) => {
            let expanded = expand_path(raw)?;
            if expanded.is_absolute() {
                Ok(expanded)
            } else {
                Ok(base_dir.join(expanded))
            }
        }
    }
}

/// Expands a leading `~` and `$VAR` / `${VAR}` references in a path.
///
/// Unset variables expand to the empty string.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    static VAR_RE: OnceLock<Regex> = OnceLock::new();
    let re = VAR_RE.get_or_init(|| {
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
            .expect("static regex is valid")
    });

    let with_home = if raw == "~" || raw.starts_with("~/") {
        let home = dirs::home_dir().ok_or_else(|| Error::Validation {
            field: "general.work_dir".to_string(),
            message: "cannot expand ~: home directory is unknown".to_string(),
        })?;
        format!("{}{}", home.display(), &raw[1..])
    } else {
        raw.to_string()
    };

    let expanded = re.replace_all(&with_home, |caps: &regex::Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        std::env::var(name).unwrap_or_default()
    });

    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FULL: &str = r#"
[general]
work_dir = "repos"
timeout_secs = 120
default_branch = "trunk"
recurse_submodules = false

[http]
user_agent = "test-agent"
retry_attempts = 5
retry_delay_ms = 10

[git]
shallow_clone = false
clone_depth = 10

[[repository]]
name = "api"
url = "https://github.com/acme/api.git"
type = "git"
branch = "develop"
tags = ["backend", "core"]

[[repository]]
name = "schema"
url = "https://downloads.acme.dev/schema.json"
type = "http"
path = "vendor/schema.json"

[[repository]]
name = "web"
url = "git@github.com:acme/web.git"
tag = "v2.0.0"
shallow = true
depth = 3
submodules = true
tags = ["frontend"]

[[project]]
name = "platform"
repositories = ["api", "web"]
"#;

    #[test]
    fn test_parse_full_config() {
        let base = PathBuf::from("/workspace");
        let config = Config::parse(FULL, &base).unwrap();

        assert_eq!(config.general.timeout_secs, 120);
        assert_eq!(config.general.default_branch, "trunk");
        assert!(!config.general.recurse_submodules);
        assert_eq!(config.http.retry_attempts, 5);
        assert_eq!(config.http.retry_delay(), Duration::from_millis(10));
        assert!(!config.git.shallow_clone);
        assert_eq!(config.repositories.len(), 3);
        assert_eq!(config.projects.len(), 1);
        assert_eq!(config.work_dir(), Path::new("/workspace/repos"));
    }

    #[test]
    fn test_defaults_apply_when_sections_missing() {
        let config = Config::parse(
            r#"
[[repository]]
name = "api"
url = "https://github.com/acme/api.git"
"#,
            Path::new("/ws"),
        )
        .unwrap();

        assert_eq!(config.general.default_branch, "main");
        assert_eq!(config.general.timeout_secs, 600);
        assert!(config.general.recurse_submodules);
        assert_eq!(config.http.retry_attempts, 3);
        assert_eq!(config.http.retry_delay_ms, 2000);
        assert!(config.git.shallow_clone);
        assert_eq!(config.git.clone_depth, 1);
        assert_eq!(config.work_dir(), Path::new("/ws"));
    }

    #[test]
    fn test_repository_helpers() {
        let config = Config::parse(FULL, Path::new("/ws")).unwrap();
        let api = config.get_repository("api").unwrap();
        let schema = config.get_repository("schema").unwrap();
        let web = config.get_repository("web").unwrap();

        assert_eq!(api.effective_ref("trunk"), "develop");
        assert_eq!(schema.effective_ref("trunk"), "trunk");
        assert_eq!(web.effective_ref("trunk"), "v2.0.0");

        assert_eq!(api.effective_path(), "api");
        assert_eq!(schema.effective_path(), "vendor/schema.json");

        assert!(!api.is_shallow(false));
        assert!(web.is_shallow(false));
        assert_eq!(api.clone_depth(10), 10);
        assert_eq!(web.clone_depth(10), 3);
        assert!(web.recurse_submodules(false));
        assert!(!api.recurse_submodules(false));

        assert_eq!(schema.transport_kind(), TransportKind::Http);
        // type omitted, detected from the SSH URL
        assert_eq!(web.transport_kind(), TransportKind::Git);
    }

    #[test]
    fn test_lookup_by_project_and_tag() {
        let config = Config::parse(FULL, Path::new("/ws")).unwrap();

        let names: Vec<_> = config
            .repositories_for_project("platform")
            .unwrap()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["api", "web"]);

        let tagged: Vec<_> = config
            .repositories_by_tag("backend")
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(tagged, vec!["api"]);

        assert!(matches!(
            config.repositories_for_project("nope"),
            Err(Error::ProjectNotFound { .. })
        ));
        assert!(config.repositories_by_tag("nope").is_empty());
    }

    #[test]
    fn test_validation_rejects_conflicting_selectors() {
        let result = Config::parse(
            r#"
[[repository]]
name = "api"
url = "https://github.com/acme/api.git"
branch = "main"
tag = "v1.0.0"
"#,
            Path::new("/ws"),
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("only one of branch, tag, or commit"));
    }

    #[test]
    fn test_validation_rejects_duplicate_names() {
        let result = Config::parse(
            r#"
[[repository]]
name = "api"
url = "https://github.com/acme/api.git"

[[repository]]
name = "api"
url = "https://github.com/acme/api2.git"
"#,
            Path::new("/ws"),
        );
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("duplicate repository name"));
    }

    #[test]
    fn test_validation_rejects_unknown_project_member() {
        let result = Config::parse(
            r#"
[[repository]]
name = "api"
url = "https://github.com/acme/api.git"

[[project]]
name = "p"
repositories = ["api", "ghost"]
"#,
            Path::new("/ws"),
        );
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("unknown repository: ghost"));
    }

    #[test]
    fn test_validate_url_variants() {
        assert!(validate_url("https://github.com/acme/api.git").is_ok());
        assert!(validate_url("git@github.com:acme/api.git").is_ok());
        assert!(validate_url("file:///srv/git/api").is_ok());
        assert!(validate_url("ssh://git@host/repo").is_ok());
        assert!(validate_url("not a url").is_err());
        assert!(validate_url("https://").is_err());
        assert!(validate_url("file:///").is_err());
    }

    #[test]
    fn test_unknown_type_gives_hint() {
        let err = Config::parse(
            r#"
[[repository]]
name = "api"
url = "https://github.com/acme/api.git"
type = "svn"
"#,
            Path::new("/ws"),
        )
        .unwrap_err();
        let display = err.to_string();
        assert!(display.contains("Configuration parsing error"));
        assert!(display.contains("hint:"));
    }

    #[test]
    fn test_add_and_remove_repository() {
        let mut config = Config::parse(FULL, Path::new("/ws")).unwrap();

        let dup = config.add_repository(Repository::new("api", "https://github.com/x/y.git"));
        assert!(matches!(dup, Err(Error::DuplicateRepository { .. })));

        config
            .add_repository(Repository::new("cli", "https://github.com/acme/cli.git"))
            .unwrap();
        assert!(config.get_repository("cli").is_some());

        let removed = config.remove_repository("api").unwrap();
        assert_eq!(removed.name, "api");
        assert!(config.get_repository("api").is_none());
        // dropped from the project too
        assert!(!config.get_project("platform").unwrap().has_repository("api"));

        assert!(matches!(
            config.remove_repository("api"),
            Err(Error::RepositoryNotFound { .. })
        ));
    }

    #[test]
    fn test_add_project_requires_known_members() {
        let mut config = Config::parse(FULL, Path::new("/ws")).unwrap();
        let result = config.add_project(Project {
            name: "other".to_string(),
            repositories: vec!["ghost".to_string()],
            tags: vec![],
        });
        assert!(matches!(result, Err(Error::RepositoryNotFound { .. })));

        config
            .add_project(Project {
                name: "docs".to_string(),
                repositories: vec!["schema".to_string()],
                tags: vec![],
            })
            .unwrap();
        assert!(config.remove_project("docs").is_ok());
        assert!(matches!(
            config.remove_project("docs"),
            Err(Error::ProjectNotFound { .. })
        ));
    }

    #[test]
    fn test_project_membership_edits() {
        let mut config = Config::parse(FULL, Path::new("/ws")).unwrap();
        config
            .add_project(Project {
                name: "docs".to_string(),
                repositories: vec![],
                tags: vec![],
            })
            .unwrap();

        config.add_repo_to_project("docs", "schema").unwrap();
        assert_eq!(config.get_project("docs").unwrap().repositories, vec!["schema"]);

        assert!(matches!(
            config.add_repo_to_project("docs", "schema"),
            Err(Error::AlreadyInProject { .. })
        ));
        assert!(matches!(
            config.add_repo_to_project("docs", "ghost"),
            Err(Error::RepositoryNotFound { .. })
        ));
        assert!(matches!(
            config.add_repo_to_project("nope", "schema"),
            Err(Error::ProjectNotFound { .. })
        ));

        config.remove_repo_from_project("docs", "schema").unwrap();
        assert!(config.get_project("docs").unwrap().repositories.is_empty());
        assert!(config.get_repository("schema").is_some());
        assert!(matches!(
            config.remove_repo_from_project("docs", "schema"),
            Err(Error::NotInProject { .. })
        ));
        assert!(matches!(
            config.remove_repo_from_project("nope", "schema"),
            Err(Error::ProjectNotFound { .. })
        ));
    }

    #[test]
    fn test_save_and_load_preserves_raw_work_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(defaults::CONFIG_FILE_NAME);
        std::fs::write(&path, FULL).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.work_dir(), temp.path().join("repos"));
        assert_eq!(config.dir(), temp.path());
        config.save().unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("work_dir = \"repos\""));

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.repositories, config.repositories);
        assert_eq!(reloaded.projects, config.projects);
    }

    #[test]
    fn test_default_in_round_trips() {
        let temp = TempDir::new().unwrap();
        let config = Config::default_in(temp.path());
        assert_eq!(config.work_dir(), temp.path());
        config.save().unwrap();

        let loaded = Config::load(&temp.path().join(defaults::CONFIG_FILE_NAME)).unwrap();
        assert!(loaded.repositories.is_empty());
        assert_eq!(loaded.general, config.general);
    }

    #[test]
    fn test_expand_path_env_and_home() {
        std::env::set_var("REPO_FLEET_TEST_ROOT", "/opt/fleet");
        assert_eq!(
            expand_path("$REPO_FLEET_TEST_ROOT/repos").unwrap(),
            PathBuf::from("/opt/fleet/repos")
        );
        assert_eq!(
            expand_path("${REPO_FLEET_TEST_ROOT}/x").unwrap(),
            PathBuf::from("/opt/fleet/x")
        );

        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/repos").unwrap(), home.join("repos"));
        }
        assert_eq!(
            expand_path("plain/path").unwrap(),
            PathBuf::from("plain/path")
        );
    }
}
