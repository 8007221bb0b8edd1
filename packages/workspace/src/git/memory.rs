//! In-memory git engine for tests.
//!
//! Repository metadata is kept as JSON in `/.git/state.json` and file
//! contents as content-addressed blobs under `/.git/objects`. Remotes are
//! entries in a shared [`MemoryRemote`] registry, which lets several images
//! (or several test sessions) clone from and push to the same URL.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use specbook_common::FileSystem;
use tracing::debug;

use super::{Auth, CloneOptions, CommitOptions, GitEngine, PushOptions, Remote};
use crate::error::{GitError, GitResult};

const STATE_FILE: &str = ".git/state.json";
const OBJECTS_DIR: &str = ".git/objects";
const DEFAULT_REMOTE: &str = "origin";

/// Path → blob id
type Tree = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub id: String,
    pub parent: Option<String>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: i64,
    pub signed: bool,
    pub tree: Tree,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoState {
    head: String,
    #[serde(default)]
    remotes: BTreeMap<String, String>,
    #[serde(default)]
    branches: BTreeMap<String, String>,
    #[serde(default)]
    index: Tree,
    #[serde(default)]
    commits: BTreeMap<String, Commit>,
    #[serde(default)]
    shallow: bool,
}

fn hash(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().map(|b| format!("{:02x}", b)).collect()
}

fn object_path(id: &str) -> String {
    format!("{}/{}", OBJECTS_DIR, id)
}

fn read_state(fs: &dyn FileSystem) -> GitResult<RepoState> {
    let raw = fs.read_optional(STATE_FILE)?.ok_or(GitError::NotInitialized)?;
    serde_json::from_str(&raw).map_err(|e| GitError::Corrupt(e.to_string()))
}

fn write_state(fs: &dyn FileSystem, state: &RepoState) -> GitResult<()> {
    let raw = serde_json::to_vec_pretty(state).map_err(|e| GitError::Corrupt(e.to_string()))?;
    fs.write(STATE_FILE, &raw)?;
    Ok(())
}

/// Commits from `tip` back through first parents, newest first
fn ancestry(commits: &BTreeMap<String, Commit>, tip: &str, depth: Option<usize>) -> Vec<Commit> {
    let mut history = Vec::new();
    let mut current = Some(tip.to_string());
    while let Some(id) = current {
        if depth.is_some_and(|d| history.len() >= d) {
            break;
        }
        let Some(commit) = commits.get(&id) else {
            break;
        };
        current = commit.parent.clone();
        history.push(commit.clone());
    }
    history
}

fn is_ancestor(commits: &BTreeMap<String, Commit>, ancestor: &str, tip: &str) -> bool {
    let mut current = Some(tip.to_string());
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        current = commits.get(&id).and_then(|c| c.parent.clone());
    }
    false
}

#[derive(Debug, Clone, Default)]
struct RemoteRepo {
    branches: BTreeMap<String, String>,
    commits: BTreeMap<String, Commit>,
    objects: BTreeMap<String, Vec<u8>>,
    credentials: Option<Auth>,
    offline: bool,
}

impl RemoteRepo {
    fn check_access(&self, url: &str, auth: &Auth) -> GitResult<()> {
        if self.offline {
            return Err(GitError::Network(url.to_string()));
        }
        match &self.credentials {
            Some(required) if required != auth => Err(GitError::Auth(url.to_string())),
            _ => Ok(()),
        }
    }
}

/// Shared registry of remote repositories keyed by URL
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    repos: Arc<Mutex<HashMap<String, RemoteRepo>>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RemoteRepo>> {
        self.repos.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an empty repository at `url`
    pub fn create(&self, url: &str) {
        self.lock().entry(url.to_string()).or_default();
    }

    /// Only accept clones and pushes carrying exactly these credentials
    pub fn require_auth(&self, url: &str, auth: Auth) {
        self.lock().entry(url.to_string()).or_default().credentials = Some(auth);
    }

    /// Make every request to `url` fail as unreachable
    pub fn set_offline(&self, url: &str, offline: bool) {
        self.lock().entry(url.to_string()).or_default().offline = offline;
    }

    /// Commit `files` directly on the remote `branch`, on top of whatever the
    /// branch already holds. Returns the commit id.
    pub fn publish(&self, url: &str, branch: &str, files: &[(&str, &[u8])], message: &str) -> String {
        let mut repos = self.lock();
        let repo = repos.entry(url.to_string()).or_default();

        let parent = repo.branches.get(branch).cloned();
        let mut tree = parent
            .as_ref()
            .and_then(|id| repo.commits.get(id))
            .map(|c| c.tree.clone())
            .unwrap_or_default();
        for (path, contents) in files {
            let blob = hash(contents);
            repo.objects.insert(blob.clone(), contents.to_vec());
            tree.insert(path.trim_start_matches('/').to_string(), blob);
        }

        let commit = new_commit(parent, tree, "Remote", "remote@localhost", message, false);
        let id = commit.id.clone();
        repo.commits.insert(id.clone(), commit);
        repo.branches.insert(branch.to_string(), id.clone());
        id
    }

    pub fn branch_head(&self, url: &str, branch: &str) -> Option<String> {
        self.lock().get(url)?.branches.get(branch).cloned()
    }

    pub fn commit(&self, url: &str, id: &str) -> Option<Commit> {
        self.lock().get(url)?.commits.get(id).cloned()
    }

    /// Contents of `path` at the tip of `branch`
    pub fn read_file(&self, url: &str, branch: &str, path: &str) -> Option<Vec<u8>> {
        let repos = self.lock();
        let repo = repos.get(url)?;
        let head = repo.commits.get(repo.branches.get(branch)?)?;
        let blob = head.tree.get(path.trim_start_matches('/'))?;
        repo.objects.get(blob).cloned()
    }
}

fn new_commit(
    parent: Option<String>,
    tree: Tree,
    author_name: &str,
    author_email: &str,
    message: &str,
    signed: bool,
) -> Commit {
    let timestamp = Utc::now().timestamp_millis();
    let mut header = format!(
        "parent {}\nauthor {} <{}> {}\n",
        parent.as_deref().unwrap_or("-"),
        author_name,
        author_email,
        timestamp
    );
    for (path, blob) in &tree {
        header.push_str(&format!("{} {}\n", blob, path));
    }
    header.push('\n');
    header.push_str(message);

    Commit {
        id: hash(header.as_bytes()),
        parent,
        message: message.to_string(),
        author_name: author_name.to_string(),
        author_email: author_email.to_string(),
        timestamp,
        signed,
        tree,
    }
}

/// Git engine that keeps everything in the filesystem image and a
/// [`MemoryRemote`]
#[derive(Debug, Clone, Default)]
pub struct MemoryGit {
    remote: MemoryRemote,
}

impl MemoryGit {
    pub fn new(remote: MemoryRemote) -> Self {
        Self { remote }
    }

    pub fn remote(&self) -> &MemoryRemote {
        &self.remote
    }

    /// Commits on the current branch, newest first
    pub fn log(&self, fs: &dyn FileSystem) -> GitResult<Vec<Commit>> {
        let state = read_state(fs)?;
        Ok(match state.branches.get(&state.head) {
            Some(tip) => ancestry(&state.commits, tip, None),
            None => Vec::new(),
        })
    }

    /// Paths currently staged
    pub fn tracked_files(&self, fs: &dyn FileSystem) -> GitResult<Vec<String>> {
        Ok(read_state(fs)?.index.into_keys().collect())
    }
}

#[async_trait]
impl GitEngine for MemoryGit {
    async fn init(&self, fs: &dyn FileSystem, default_branch: &str) -> GitResult<()> {
        fs.create_dir(OBJECTS_DIR)?;
        write_state(
            fs,
            &RepoState {
                head: default_branch.to_string(),
                ..RepoState::default()
            },
        )
    }

    async fn add_remote(&self, fs: &dyn FileSystem, name: &str, url: &str) -> GitResult<()> {
        let mut state = read_state(fs)?;
        state.remotes.insert(name.to_string(), url.to_string());
        write_state(fs, &state)
    }

    async fn list_remotes(&self, fs: &dyn FileSystem) -> GitResult<Vec<Remote>> {
        Ok(read_state(fs)?
            .remotes
            .into_iter()
            .map(|(name, url)| Remote { name, url })
            .collect())
    }

    async fn delete_remote(&self, fs: &dyn FileSystem, name: &str) -> GitResult<()> {
        let mut state = read_state(fs)?;
        state.remotes.remove(name);
        write_state(fs, &state)
    }

    async fn clone_repo(&self, fs: &dyn FileSystem, options: &CloneOptions) -> GitResult<()> {
        if let Some(proxy) = &options.cors_proxy {
            debug!(url = %options.url, proxy = %proxy, "cloning through proxy");
        }

        let (branches, commits, objects) = {
            let repos = self.remote.lock();
            let repo = repos
                .get(&options.url)
                .ok_or_else(|| GitError::NotFound(options.url.clone()))?;
            repo.check_access(&options.url, &options.auth)?;
            if !repo.branches.contains_key(&options.branch) {
                return Err(GitError::NotFound(format!("{} branch {}", options.url, options.branch)));
            }

            let branches: BTreeMap<String, String> = repo
                .branches
                .iter()
                .filter(|(name, _)| !options.single_branch || **name == options.branch)
                .map(|(name, id)| (name.clone(), id.clone()))
                .collect();

            let mut commits = BTreeMap::new();
            for tip in branches.values() {
                for commit in ancestry(&repo.commits, tip, options.depth) {
                    commits.insert(commit.id.clone(), commit);
                }
            }

            let mut objects = BTreeMap::new();
            for commit in commits.values() {
                for blob in commit.tree.values() {
                    if let Some(bytes) = repo.objects.get(blob) {
                        objects.insert(blob.clone(), bytes.clone());
                    }
                }
            }
            (branches, commits, objects)
        };

        for (id, bytes) in &objects {
            fs.write(&object_path(id), bytes)?;
        }

        let index = branches
            .get(&options.branch)
            .and_then(|tip| commits.get(tip))
            .map(|c| c.tree.clone())
            .unwrap_or_default();
        for (path, blob) in &index {
            let bytes = objects
                .get(blob)
                .ok_or_else(|| GitError::Corrupt(format!("missing object {}", blob)))?;
            fs.write(path, bytes)?;
        }

        let state = RepoState {
            head: options.branch.clone(),
            remotes: BTreeMap::from([(DEFAULT_REMOTE.to_string(), options.url.clone())]),
            branches,
            index,
            commits,
            shallow: options.depth.is_some(),
        };
        write_state(fs, &state)
    }

    async fn current_branch(&self, fs: &dyn FileSystem) -> GitResult<Option<String>> {
        match read_state(fs) {
            Ok(state) => Ok(Some(state.head)),
            Err(GitError::NotInitialized) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn add(&self, fs: &dyn FileSystem, path: &str) -> GitResult<()> {
        let mut state = read_state(fs)?;
        let path = path.trim_start_matches('/');
        let bytes = fs.read(path).map_err(|e| {
            if e.is_not_found() {
                GitError::NotFound(path.to_string())
            } else {
                GitError::Fs(e)
            }
        })?;

        let blob = hash(&bytes);
        let object = object_path(&blob);
        if !fs.exists(&object) {
            fs.write(&object, &bytes)?;
        }
        state.index.insert(path.to_string(), blob);
        write_state(fs, &state)
    }

    async fn remove(&self, fs: &dyn FileSystem, path: &str) -> GitResult<()> {
        let mut state = read_state(fs)?;
        state.index.remove(path.trim_start_matches('/'));
        write_state(fs, &state)
    }

    async fn commit(&self, fs: &dyn FileSystem, options: &CommitOptions) -> GitResult<String> {
        let mut state = read_state(fs)?;
        let parent = state.branches.get(&state.head).cloned();
        let commit = new_commit(
            parent,
            state.index.clone(),
            &options.author.name,
            &options.author.email,
            &options.message,
            options.signing_key.is_some(),
        );
        let id = commit.id.clone();

        state.commits.insert(id.clone(), commit);
        state.branches.insert(state.head.clone(), id.clone());
        write_state(fs, &state)?;
        Ok(id)
    }

    async fn push(&self, fs: &dyn FileSystem, options: &PushOptions) -> GitResult<()> {
        let state = read_state(fs)?;
        let url = state
            .remotes
            .get(&options.remote)
            .ok_or_else(|| GitError::NotFound(format!("remote {}", options.remote)))?;
        let tip = state
            .branches
            .get(&options.branch)
            .ok_or_else(|| GitError::NotFound(format!("branch {}", options.branch)))?;

        // Everything the remote might be missing is read before it is touched.
        let history = ancestry(&state.commits, tip, None);
        let mut objects = BTreeMap::new();
        for commit in &history {
            for blob in commit.tree.values() {
                if !objects.contains_key(blob) {
                    objects.insert(blob.clone(), fs.read(&object_path(blob))?);
                }
            }
        }

        let mut repos = self.remote.lock();
        let repo = repos
            .get_mut(url)
            .ok_or_else(|| GitError::NotFound(url.clone()))?;
        repo.check_access(url, &options.auth)?;

        if let Some(remote_tip) = repo.branches.get(&options.branch) {
            if !is_ancestor(&state.commits, remote_tip, tip) {
                return Err(GitError::Rejected {
                    remote: url.clone(),
                    reason: "not a fast-forward".to_string(),
                });
            }
        }

        for commit in history {
            repo.commits.entry(commit.id.clone()).or_insert(commit);
        }
        for (blob, bytes) in objects {
            repo.objects.entry(blob).or_insert(bytes);
        }
        repo.branches.insert(options.branch.clone(), tip.clone());
        Ok(())
    }

    async fn branch(&self, fs: &dyn FileSystem, name: &str) -> GitResult<()> {
        let mut state = read_state(fs)?;
        if state.branches.contains_key(name) {
            return Ok(());
        }
        if let Some(head) = state.branches.get(&state.head).cloned() {
            state.branches.insert(name.to_string(), head);
            write_state(fs, &state)?;
        }
        Ok(())
    }

    async fn checkout_head(&self, fs: &dyn FileSystem) -> GitResult<()> {
        let mut state = read_state(fs)?;
        let committed = state
            .branches
            .get(&state.head)
            .and_then(|tip| state.commits.get(tip))
            .map(|commit| commit.tree.clone())
            .unwrap_or_default();

        for path in state.index.keys().filter(|path| !committed.contains_key(*path)) {
            fs.remove_if_exists(path)?;
        }
        for (path, blob) in &committed {
            fs.write(path, &fs.read(&object_path(blob))?)?;
        }
        state.index = committed;
        write_state(fs, &state)
    }
}
