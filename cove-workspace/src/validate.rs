//! Input checks run before any provisioning call.

use url::Url;

use crate::WorkspaceError;

const SCHEMES: &[&str] = &["https", "http", "ssh", "git"];

/// Accepts `scheme://host/owner/repo[.git]` for https, http, ssh and git schemes, and the
/// scp-like `user@host:owner/repo[.git]` form.
pub fn validate_repo_url(repo_url: &str) -> Result<(), WorkspaceError> {
    let trimmed = repo_url.trim();
    if trimmed.is_empty() {
        return Err(WorkspaceError::Validation("repository URL is empty".into()));
    }
    if trimmed != repo_url || trimmed.chars().any(char::is_whitespace) {
        return Err(invalid(repo_url, "contains whitespace"));
    }

    if !trimmed.contains("://") {
        return validate_scp_like(trimmed);
    }

    let url = Url::parse(trimmed).map_err(|e| invalid(repo_url, &e.to_string()))?;
    if !SCHEMES.contains(&url.scheme()) {
        return Err(invalid(repo_url, &format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid(repo_url, "missing host"));
    }
    check_repo_path(repo_url, url.path())
}

fn validate_scp_like(repo_url: &str) -> Result<(), WorkspaceError> {
    let (user_host, path) = repo_url
        .split_once(':')
        .ok_or_else(|| invalid(repo_url, "not a URL"))?;
    let host = match user_host.split_once('@') {
        Some((user, host)) if !user.is_empty() => host,
        _ => return Err(invalid(repo_url, "not a URL")),
    };
    if host.is_empty() || host.contains('/') {
        return Err(invalid(repo_url, "missing host"));
    }
    check_repo_path(repo_url, path)
}

fn check_repo_path(repo_url: &str, path: &str) -> Result<(), WorkspaceError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return Err(invalid(repo_url, "expected <owner>/<repository> path"));
    }
    let repo = segments[segments.len() - 1];
    if repo == ".git" {
        return Err(invalid(repo_url, "empty repository name"));
    }
    Ok(())
}

/// Rejects empty names and the patterns git itself refuses in ref names.
pub fn validate_branch(branch: &str) -> Result<(), WorkspaceError> {
    let bad = branch.is_empty()
        || branch.starts_with('-')
        || branch.ends_with('/')
        || branch.ends_with(".lock")
        || branch.contains("..")
        || branch.contains("@{")
        || branch
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c));
    if bad {
        return Err(WorkspaceError::Validation(format!(
            "invalid branch name {:?}",
            branch
        )));
    }
    Ok(())
}

fn invalid(repo_url: &str, why: &str) -> WorkspaceError {
    WorkspaceError::Validation(format!("invalid repository URL {:?}: {}", repo_url, why))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_forms() {
        for ok in [
            "https://github.com/acme/demo",
            "https://github.com/acme/demo.git",
            "http://git.internal:8080/team/sub/project",
            "ssh://git@github.com/acme/demo.git",
            "git@github.com:acme/demo.git",
        ] {
            assert!(validate_repo_url(ok).is_ok(), "{}", ok);
        }
    }

    #[test]
    fn rejects_malformed() {
        for bad in [
            "",
            "   ",
            "not a url",
            "github.com/acme/demo",
            "ftp://github.com/acme/demo",
            "https://github.com/acme",
            "https:///acme/demo",
            "git@github.com:demo",
            " https://github.com/acme/demo",
        ] {
            assert!(
                matches!(validate_repo_url(bad), Err(WorkspaceError::Validation(_))),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn branch_rules() {
        assert!(validate_branch("main").is_ok());
        assert!(validate_branch("feature/login-v2").is_ok());
        for bad in ["", "-x", "a..b", "has space", "x.lock", "dir/", "a:b"] {
            assert!(validate_branch(bad).is_err(), "{:?}", bad);
        }
    }
}
