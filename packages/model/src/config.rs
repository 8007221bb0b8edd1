//! Repository configuration: known local repositories and git profiles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ConfigError;

/// Profile used when a repository names none, or names a deleted one
pub const DEFAULT_PROFILE: &str = "Default";

/// Identity, remote and credentials used for one set of repositories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitProfile {
    pub profile_name: String,
    #[serde(default)]
    pub cors_proxy_address: String,
    pub author_name: String,
    pub author_email: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default = "default_remote")]
    pub remote_name: String,
    #[serde(default)]
    pub pgp_private_key: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

impl GitProfile {
    /// Trimmed signing key, if one is configured
    pub fn signing_key(&self) -> Option<&str> {
        let key = self.pgp_private_key.trim();
        (!key.is_empty()).then_some(key)
    }

    /// CORS proxy, if one is configured
    pub fn cors_proxy(&self) -> Option<&str> {
        let proxy = self.cors_proxy_address.trim();
        (!proxy.is_empty()).then_some(proxy)
    }
}

impl Default for GitProfile {
    fn default() -> Self {
        Self {
            profile_name: DEFAULT_PROFILE.to_string(),
            cors_proxy_address: "https://cors.gitfeatures.com".to_string(),
            author_name: "Sir Testsalot".to_string(),
            author_email: "sir@testsalot.com".to_string(),
            default_branch: default_branch(),
            remote_name: default_remote(),
            pgp_private_key: String::new(),
            username: "sirtestsalot".to_string(),
            password: String::new(),
        }
    }
}

/// A repository present in local storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LocalRepository {
    pub git_profile_name: String,
    pub current_branch: String,
}

/// Global configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    #[serde(rename = "currentRepositoryURL")]
    pub current_repository_url: String,

    #[serde(default)]
    pub local_repositories: BTreeMap<String, LocalRepository>,

    /// Push right after committing
    #[serde(default)]
    pub is_commit_push_checked: bool,

    #[serde(default)]
    pub git_profiles: BTreeMap<String, GitProfile>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        let profile = GitProfile::default();
        Self {
            current_repository_url: "https://github.com/sengac/gitfeatures-spec.git".to_string(),
            local_repositories: BTreeMap::new(),
            is_commit_push_checked: false,
            git_profiles: BTreeMap::from([(profile.profile_name.clone(), profile)]),
        }
    }
}

impl RepositoryConfig {
    pub fn local_repository(&self, url: &str) -> Result<&LocalRepository, ConfigError> {
        self.local_repositories
            .get(url)
            .ok_or_else(|| ConfigError::UnknownRepository(url.to_string()))
    }

    /// Branch currently checked out for `url`
    pub fn current_branch(&self, url: &str) -> Result<&str, ConfigError> {
        Ok(&self.local_repository(url)?.current_branch)
    }

    /// Profile assigned to `url`, falling back to the `Default` profile
    pub fn current_profile(&self, url: &str) -> Result<&GitProfile, ConfigError> {
        let name = self.local_repository(url)?.git_profile_name.as_str();
        self.git_profiles
            .get(name)
            .or_else(|| self.git_profiles.get(DEFAULT_PROFILE))
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "currentRepositoryURL": "https://example.com/spec.git",
            "localRepositories": {
                "https://example.com/spec.git": {
                    "git-profile-name": "Work",
                    "current-branch": "main"
                }
            },
            "isCommitPushChecked": true,
            "gitProfiles": {
                "Work": {
                    "profile-name": "Work",
                    "cors-proxy-address": "",
                    "author-name": "Ada",
                    "author-email": "ada@example.com",
                    "default-branch": "main",
                    "remote-name": "upstream",
                    "pgp-private-key": "  ",
                    "username": "ada",
                    "password": "secret"
                }
            }
        }"#;

        let config: RepositoryConfig = serde_json::from_str(json).unwrap();
        let url = "https://example.com/spec.git";
        assert_eq!(config.current_branch(url).unwrap(), "main");

        let profile = config.current_profile(url).unwrap();
        assert_eq!(profile.remote_name, "upstream");
        assert_eq!(profile.signing_key(), None);
        assert_eq!(profile.cors_proxy(), None);
    }

    #[test]
    fn test_profile_falls_back_to_default() {
        let mut config = RepositoryConfig::default();
        config.local_repositories.insert(
            "https://example.com/a.git".to_string(),
            LocalRepository {
                git_profile_name: "Deleted".to_string(),
                current_branch: "master".to_string(),
            },
        );

        let profile = config.current_profile("https://example.com/a.git").unwrap();
        assert_eq!(profile.profile_name, DEFAULT_PROFILE);
    }

    #[test]
    fn test_unknown_repository() {
        let config = RepositoryConfig::default();
        assert_eq!(
            config.current_branch("https://example.com/none.git"),
            Err(ConfigError::UnknownRepository("https://example.com/none.git".to_string()))
        );
    }

    #[test]
    fn test_default_config_round_trips() {
        let config = RepositoryConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("currentRepositoryURL"));
        assert!(json.contains("\"author-name\""));
        let parsed: RepositoryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
