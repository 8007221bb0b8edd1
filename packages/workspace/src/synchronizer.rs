//! # Repository Synchronizer
//!
//! Moves editor state between local storage and git repositories. Every
//! repository URL has its own phase; while an operation is in flight for a
//! URL, further operations on it fail with [`SyncError::Busy`].
//!
//! ```text
//! Uninitialized ─┬─ Cloning ──────┐
//!                └─ Initializing ─┴─ Hydrating ─→ Ready
//! Ready ─→ Committing | Pushing | Reverting ─→ Ready
//! ```
//!
//! A failed operation leaves the URL in the phase it started from.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use specbook_common::{DiskFileSystemProvider, FileSystem, FileSystemProvider};
use specbook_editor::{RenameLedger, SelectionMemory, SelectionValues};
use specbook_model::{GitProfile, NodeType, RepositoryConfig};
use tracing::{error, info};

use crate::archive::archive_repository;
use crate::attachments::{self, Blob};
use crate::error::{LoadError, SyncError, SyncResult};
use crate::git::{Auth, Author, CloneOptions, CommitOptions, GitEngine, NativeGit, PushOptions};
use crate::hydrate::{hydrate, Hydrated};
use crate::serialize::add_changes;
use crate::storage::{self, KeyValueStore};

/// Branch created when a repository is pointed at a new remote
const SWITCHED_BRANCH: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Cloning,
    Initializing,
    Hydrating,
    Ready,
    Committing,
    Pushing,
    Reverting,
}

impl Phase {
    pub fn is_busy(&self) -> bool {
        !matches!(self, Phase::Uninitialized | Phase::Ready)
    }
}

type PhaseTable = Mutex<HashMap<String, Phase>>;

fn lock_phases(phases: &PhaseTable) -> MutexGuard<'_, HashMap<String, Phase>> {
    phases.lock().unwrap_or_else(|e| e.into_inner())
}

/// Holds a URL in a busy phase; dropping it without [`finish`] restores the
/// phase the operation started from.
///
/// [`finish`]: PhaseGuard::finish
struct PhaseGuard<'a> {
    phases: &'a PhaseTable,
    url: String,
    previous: Phase,
    finished: bool,
}

impl PhaseGuard<'_> {
    fn advance(&self, phase: Phase) {
        lock_phases(self.phases).insert(self.url.clone(), phase);
    }

    fn finish(mut self, phase: Phase) {
        self.advance(phase);
        self.finished = true;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            lock_phases(self.phases).insert(self.url.clone(), self.previous);
        }
    }
}

pub struct Synchronizer {
    provider: Arc<dyn FileSystemProvider>,
    git: Arc<dyn GitEngine>,
    store: Arc<dyn KeyValueStore>,
    phases: PhaseTable,
    selection: Mutex<SelectionMemory>,
}

impl Synchronizer {
    pub fn new(
        provider: Arc<dyn FileSystemProvider>,
        git: Arc<dyn GitEngine>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            provider,
            git,
            store,
            phases: Mutex::new(HashMap::new()),
            selection: Mutex::new(SelectionMemory::new()),
        }
    }

    /// Repositories kept in directories under `root`, driven by libgit2
    pub fn on_disk(root: PathBuf, store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(Arc::new(DiskFileSystemProvider::new(root)), Arc::new(NativeGit), store)
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn phase(&self, url: &str) -> Phase {
        lock_phases(&self.phases)
            .get(url)
            .copied()
            .unwrap_or(Phase::Uninitialized)
    }

    fn enter(&self, url: &str, phase: Phase) -> SyncResult<PhaseGuard<'_>> {
        let mut phases = lock_phases(&self.phases);
        let previous = phases.get(url).copied().unwrap_or(Phase::Uninitialized);
        if previous.is_busy() {
            return Err(SyncError::Busy(url.to_string()));
        }
        phases.insert(url.to_string(), phase);
        Ok(PhaseGuard {
            phases: &self.phases,
            url: url.to_string(),
            previous,
            finished: false,
        })
    }

    fn ensure_idle(&self, url: &str) -> SyncResult<()> {
        if self.phase(url).is_busy() {
            return Err(SyncError::Busy(url.to_string()));
        }
        Ok(())
    }

    fn settle<T>(guard: PhaseGuard<'_>, result: SyncResult<T>, done: Phase) -> SyncResult<T> {
        match result {
            Ok(value) => {
                guard.finish(done);
                Ok(value)
            }
            Err(e) => {
                error!(url = %guard.url, phase = ?guard.previous, "Operation failed: {}", e);
                Err(e)
            }
        }
    }

    fn selection(&self) -> MutexGuard<'_, SelectionMemory> {
        self.selection.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_click(&self, url: &str, node_type: NodeType, key: &str) {
        self.selection().record_click(url, node_type, key);
    }

    pub fn selection_values(&self, url: &str) -> SelectionValues {
        self.selection().get(url)
    }

    fn persist_hydrated(&self, url: &str, hydrated: &Hydrated) -> SyncResult<()> {
        let ledger = RenameLedger::new();
        storage::save_spec(self.store.as_ref(), url, &hydrated.spec_tree, None, &ledger)?;
        storage::save_maps(self.store.as_ref(), url, &hydrated.map_trees, None, &ledger)?;
        Ok(())
    }

    /// Replace the local image of `url` with a shallow clone of the
    /// profile's default branch. Returns the checked-out branch.
    pub async fn clone_repo(&self, url: &str, profile: &GitProfile) -> SyncResult<String> {
        let guard = self.enter(url, Phase::Cloning)?;
        let result = self.clone_inner(url, profile, &guard).await;
        Self::settle(guard, result, Phase::Ready)
    }

    async fn clone_inner(&self, url: &str, profile: &GitProfile, guard: &PhaseGuard<'_>) -> SyncResult<String> {
        let fs = self.provider.open_wiped(url)?;
        let options = CloneOptions {
            url: url.to_string(),
            branch: profile.default_branch.clone(),
            cors_proxy: profile.cors_proxy().map(str::to_string),
            depth: Some(1),
            single_branch: true,
            auth: Auth::from_profile(profile),
        };
        self.git.clone_repo(fs.as_ref(), &options).await?;
        let branch = self
            .git
            .current_branch(fs.as_ref())
            .await?
            .unwrap_or_else(|| profile.default_branch.clone());
        info!(url, branch = %branch, "cloned repository");

        guard.advance(Phase::Hydrating);
        let hydrated = hydrate(fs.as_ref());
        self.persist_hydrated(url, &hydrated)?;
        Ok(branch)
    }

    /// Replace the local image of `url` with an empty repository
    pub async fn init_repo(&self, url: &str, branch: &str, remote: &str) -> SyncResult<()> {
        let guard = self.enter(url, Phase::Initializing)?;
        let result = async {
            let fs = self.provider.open_wiped(url)?;
            self.git.init(fs.as_ref(), branch).await?;
            self.git.add_remote(fs.as_ref(), remote, url).await?;
            info!(url, branch, remote, "initialized repository");
            Ok::<_, SyncError>(())
        }
        .await;
        Self::settle(guard, result, Phase::Ready)
    }

    /// Read the trees back from the working tree of `url`
    pub async fn hydrate(&self, url: &str) -> SyncResult<Hydrated> {
        let guard = self.enter(url, Phase::Hydrating)?;
        let result = self.provider.open(url).map(|fs| hydrate(fs.as_ref())).map_err(SyncError::from);
        Self::settle(guard, result, Phase::Ready)
    }

    /// Serialize the persisted state of `url`, commit it, and mark the
    /// persisted state clean. Returns the commit id.
    pub async fn add_commit(&self, url: &str, message: &str, config: &RepositoryConfig) -> SyncResult<String> {
        let guard = self.enter(url, Phase::Committing)?;
        let result = self.commit_inner(url, message, config).await;
        Self::settle(guard, result, Phase::Ready)
    }

    async fn commit_inner(&self, url: &str, message: &str, config: &RepositoryConfig) -> SyncResult<String> {
        let profile = config.current_profile(url)?;
        let store = self.store.as_ref();
        let spec = storage::fetch_spec(store, url)?.ok_or_else(|| SyncError::NoLocalState(url.to_string()))?;
        let maps = storage::fetch_maps(store, url)?.unwrap_or_default();

        let fs = self.provider.open(url)?;
        add_changes(self.git.as_ref(), fs.as_ref(), &spec, &maps).await?;

        let options = CommitOptions {
            author: Author {
                name: profile.author_name.clone(),
                email: profile.author_email.clone(),
            },
            message: message.to_string(),
            signing_key: profile.signing_key().map(str::to_string),
        };
        let commit = self.git.commit(fs.as_ref(), &options).await?;
        info!(url, commit = %commit, signed = options.signing_key.is_some(), "committed changes");

        let ledger = RenameLedger::new();
        storage::save_spec(store, url, &spec.tree, None, &ledger)?;
        storage::save_maps(store, url, &maps.trees, None, &ledger)?;
        Ok(commit)
    }

    /// Push the configured branch of `url` to the profile's remote
    pub async fn push_branch(&self, url: &str, config: &RepositoryConfig) -> SyncResult<()> {
        let guard = self.enter(url, Phase::Pushing)?;
        let result = async {
            let profile = config.current_profile(url)?;
            let branch = config.current_branch(url)?;
            let fs = self.provider.open(url)?;
            let options = PushOptions {
                remote: profile.remote_name.clone(),
                branch: branch.to_string(),
                cors_proxy: profile.cors_proxy().map(str::to_string),
                auth: Auth::from_profile(profile),
            };
            self.git.push(fs.as_ref(), &options).await?;
            info!(url, branch, remote = %options.remote, "pushed branch");
            Ok::<_, SyncError>(())
        }
        .await;
        Self::settle(guard, result, Phase::Ready)
    }

    /// Throw away local edits: the working tree is reset to the last commit
    /// and both trees are read back from it
    pub async fn revert_changes(&self, url: &str) -> SyncResult<Vec<LoadError>> {
        let guard = self.enter(url, Phase::Reverting)?;
        let result = async {
            let fs = self.provider.open(url)?;
            self.git.checkout_head(fs.as_ref()).await?;
            let hydrated = hydrate(fs.as_ref());
            self.persist_hydrated(url, &hydrated)?;
            self.selection().reset(url);
            info!(url, "reverted local changes");
            Ok::<_, SyncError>(hydrated.errors)
        }
        .await;
        Self::settle(guard, result, Phase::Ready)
    }

    /// Point the repository at `url` as `origin` and create branch `main`
    pub async fn change_remotes(&self, url: &str) -> SyncResult<()> {
        self.ensure_idle(url)?;
        let fs = self.provider.open(url)?;
        for remote in self.git.list_remotes(fs.as_ref()).await? {
            self.git.delete_remote(fs.as_ref(), &remote.name).await?;
        }
        self.git.add_remote(fs.as_ref(), "origin", url).await?;
        self.git.branch(fs.as_ref(), SWITCHED_BRANCH).await?;
        info!(url, "remotes replaced");
        Ok(())
    }

    fn open_idle(&self, url: &str) -> SyncResult<Arc<dyn FileSystem>> {
        self.ensure_idle(url)?;
        Ok(self.provider.open(url)?)
    }

    pub async fn list_files_in_repo(&self, url: &str, path: &str) -> SyncResult<Vec<String>> {
        attachments::list_files(self.open_idle(url)?.as_ref(), path)
    }

    pub async fn upload_file_to_repo(&self, url: &str, name: &str, data: &[u8]) -> SyncResult<()> {
        attachments::upload_file(self.open_idle(url)?.as_ref(), name, data)
    }

    pub async fn delete_file_from_repo(&self, url: &str, name: &str) -> SyncResult<()> {
        let fs = self.open_idle(url)?;
        attachments::delete_file(self.git.as_ref(), fs.as_ref(), name).await
    }

    pub async fn fetch_file_as_blob(&self, url: &str, file: &str, guess_mime: bool) -> SyncResult<Option<Blob>> {
        attachments::fetch_file_as_blob(self.open_idle(url)?.as_ref(), file, guess_mime)
    }

    pub async fn is_file_in_repository(&self, url: &str, file: &str) -> SyncResult<bool> {
        Ok(attachments::is_file_in_repository(self.open_idle(url)?.as_ref(), file))
    }

    /// Zip of the whole image, `.git` included
    pub async fn download_local_repository(&self, url: &str) -> SyncResult<Vec<u8>> {
        archive_repository(self.open_idle(url)?.as_ref())
    }

    /// Wipe the image of `url` and forget its persisted trees
    pub async fn delete_local_repository(&self, url: &str) -> SyncResult<()> {
        self.ensure_idle(url)?;
        self.provider.open_wiped(url)?;
        storage::remove_repository(self.store.as_ref(), url)?;
        self.selection().reset(url);
        lock_phases(&self.phases).remove(url);
        info!(url, "deleted local repository");
        Ok(())
    }
}
