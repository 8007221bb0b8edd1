//! libgit2-backed git engine.
//!
//! Works on images that live in a directory on disk (see
//! [`FileSystem::local_root`]). libgit2 is blocking, so every operation runs
//! on tokio's blocking pool. When a CORS proxy is configured, http(s)
//! remotes are reached through it the way browser clients do:
//! `https://host/repo.git` becomes `<proxy>/host/repo.git`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use git2::build::RepoBuilder;
use git2::{
    BranchType, Cred, ErrorClass, ErrorCode, FetchOptions, RemoteCallbacks, Repository,
    RepositoryInitOptions, ResetType, Signature,
};
use pgp::crypto::hash::HashAlgorithm;
use pgp::packet::{SignatureConfig, SignatureType, SignatureVersion, Subpacket, SubpacketData};
use pgp::types::KeyTrait;
use pgp::{ArmorOptions, Deserializable, SignedSecretKey, StandaloneSignature};
use specbook_common::FileSystem;
use tracing::debug;

use super::{Auth, CloneOptions, CommitOptions, GitEngine, PushOptions, Remote};
use crate::error::{GitError, GitResult};

const DEFAULT_REMOTE: &str = "origin";

/// Git engine for directory-backed images
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeGit;

fn root_of(fs: &dyn FileSystem) -> GitResult<PathBuf> {
    fs.local_root().map(Path::to_path_buf).ok_or(GitError::NotOnDisk)
}

async fn blocking<T, F>(task: F) -> GitResult<T>
where
    F: FnOnce() -> GitResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| GitError::Task(e.to_string()))?
}

fn open(root: &Path) -> GitResult<Repository> {
    Repository::open(root).map_err(|e| match e.code() {
        ErrorCode::NotFound => GitError::NotInitialized,
        _ => GitError::Engine(e),
    })
}

fn relative(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

/// `url` rewritten to go through `proxy`; only http(s) remotes are proxied
fn via_proxy(url: &str, proxy: Option<&str>) -> String {
    match (proxy, url.split_once("://")) {
        (Some(proxy), Some((scheme, rest))) if scheme == "http" || scheme == "https" => {
            format!("{}/{}", proxy.trim_end_matches('/'), rest)
        }
        _ => url.to_string(),
    }
}

fn transport_error(url: &str, e: git2::Error) -> GitError {
    match (e.code(), e.class()) {
        (ErrorCode::Auth, _) => GitError::Auth(url.to_string()),
        (ErrorCode::NotFastForward, _) => GitError::Rejected {
            remote: url.to_string(),
            reason: e.message().to_string(),
        },
        (ErrorCode::NotFound, _) => GitError::NotFound(url.to_string()),
        (_, ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssl | ErrorClass::Ssh) => {
            GitError::Network(url.to_string())
        }
        _ => GitError::Engine(e),
    }
}

/// Username/password credentials, offered once. A second request means the
/// remote refused them.
fn callbacks(auth: &Auth) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    let mut offered = false;
    callbacks.credentials(move |_url, username_from_url, _allowed| {
        if offered {
            return Err(git2::Error::new(ErrorCode::Auth, ErrorClass::Http, "credentials rejected"));
        }
        offered = true;
        let username = if auth.username.is_empty() {
            username_from_url.unwrap_or_default()
        } else {
            auth.username.as_str()
        };
        Cred::userpass_plaintext(username, auth.password.as_deref().unwrap_or_default())
    });
    callbacks
}

/// Armored detached OpenPGP signature over `content`
fn sign(content: &str, armored_key: &str) -> GitResult<String> {
    let signing = |e: pgp::errors::Error| GitError::Signing(e.to_string());
    let (key, _headers) = SignedSecretKey::from_string(armored_key).map_err(signing)?;
    let config = SignatureConfig::new_v4(
        SignatureVersion::V4,
        SignatureType::Binary,
        key.algorithm(),
        HashAlgorithm::SHA2_256,
        vec![
            Subpacket::regular(SubpacketData::SignatureCreationTime(Utc::now())),
            Subpacket::regular(SubpacketData::Issuer(key.key_id())),
        ],
        vec![],
    );
    let signature = config
        .sign(&key, String::new, content.as_bytes())
        .map_err(signing)?;
    StandaloneSignature::new(signature)
        .to_armored_string(ArmorOptions::default())
        .map_err(signing)
}

/// Move the branch HEAD points at (or HEAD itself when detached) to `id`
fn advance_head(repo: &Repository, id: git2::Oid, message: &str) -> GitResult<()> {
    let head = repo.find_reference("HEAD")?;
    let branch = head.symbolic_target().map(str::to_string);
    match branch {
        Some(branch) => {
            repo.reference(&branch, id, true, message)?;
        }
        None => repo.set_head_detached(id)?,
    }
    Ok(())
}

fn commit_staged(root: &Path, options: &CommitOptions) -> GitResult<String> {
    let repo = open(root)?;
    let mut index = repo.index()?;
    let tree = repo.find_tree(index.write_tree()?)?;
    let author = Signature::now(&options.author.name, &options.author.email)?;
    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
        Err(e) => return Err(e.into()),
    };
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

    let id = match options.signing_key.as_deref() {
        None => repo.commit(Some("HEAD"), &author, &author, &options.message, &tree, &parents)?,
        Some(key) => {
            let buffer = repo.commit_create_buffer(&author, &author, &options.message, &tree, &parents)?;
            let content = buffer
                .as_str()
                .ok_or_else(|| GitError::Corrupt("commit is not valid UTF-8".to_string()))?;
            let signature = sign(content, key)?;
            let id = repo.commit_signed(content, &signature, None)?;
            advance_head(&repo, id, &options.message)?;
            id
        }
    };
    Ok(id.to_string())
}

#[async_trait]
impl GitEngine for NativeGit {
    async fn init(&self, fs: &dyn FileSystem, default_branch: &str) -> GitResult<()> {
        let root = root_of(fs)?;
        let branch = default_branch.to_string();
        blocking(move || {
            let mut options = RepositoryInitOptions::new();
            options.initial_head(&branch);
            Repository::init_opts(&root, &options)?;
            Ok(())
        })
        .await
    }

    async fn add_remote(&self, fs: &dyn FileSystem, name: &str, url: &str) -> GitResult<()> {
        let root = root_of(fs)?;
        let (name, url) = (name.to_string(), url.to_string());
        blocking(move || {
            open(&root)?.remote(&name, &url)?;
            Ok(())
        })
        .await
    }

    async fn list_remotes(&self, fs: &dyn FileSystem) -> GitResult<Vec<Remote>> {
        let root = root_of(fs)?;
        blocking(move || {
            let repo = open(&root)?;
            let names = repo.remotes()?;
            let mut remotes = Vec::new();
            for name in names.iter().flatten() {
                let remote = repo.find_remote(name)?;
                remotes.push(Remote {
                    name: name.to_string(),
                    url: remote.url().unwrap_or_default().to_string(),
                });
            }
            Ok(remotes)
        })
        .await
    }

    async fn delete_remote(&self, fs: &dyn FileSystem, name: &str) -> GitResult<()> {
        let root = root_of(fs)?;
        let name = name.to_string();
        blocking(move || {
            open(&root)?.remote_delete(&name)?;
            Ok(())
        })
        .await
    }

    async fn clone_repo(&self, fs: &dyn FileSystem, options: &CloneOptions) -> GitResult<()> {
        let root = root_of(fs)?;
        let options = options.clone();
        blocking(move || {
            let source = via_proxy(&options.url, options.cors_proxy.as_deref());
            debug!(url = %options.url, source = %source, depth = ?options.depth, "cloning");

            let mut fetch = FetchOptions::new();
            fetch.remote_callbacks(callbacks(&options.auth));
            if let Some(depth) = options.depth {
                fetch.depth(i32::try_from(depth).unwrap_or(i32::MAX));
            }

            let mut builder = RepoBuilder::new();
            builder.branch(&options.branch).fetch_options(fetch);
            if options.single_branch {
                let branch = options.branch.clone();
                builder.remote_create(move |repo, name, url| {
                    let refspec = format!("+refs/heads/{0}:refs/remotes/{1}/{0}", branch, name);
                    repo.remote_with_fetch(name, url, &refspec)
                });
            }

            let repo = builder
                .clone(&source, &root)
                .map_err(|e| transport_error(&options.url, e))?;
            if source != options.url {
                repo.remote_set_url(DEFAULT_REMOTE, &options.url)?;
            }
            Ok(())
        })
        .await
    }

    async fn current_branch(&self, fs: &dyn FileSystem) -> GitResult<Option<String>> {
        let root = root_of(fs)?;
        blocking(move || {
            let repo = match open(&root) {
                Ok(repo) => repo,
                Err(GitError::NotInitialized) => return Ok(None),
                Err(e) => return Err(e),
            };
            let head = repo.find_reference("HEAD")?;
            let branch = head
                .symbolic_target()
                .and_then(|target| target.strip_prefix("refs/heads/"))
                .map(str::to_string);
            Ok(branch)
        })
        .await
    }

    async fn add(&self, fs: &dyn FileSystem, path: &str) -> GitResult<()> {
        let root = root_of(fs)?;
        let path = relative(path);
        blocking(move || {
            if !root.join(&path).is_file() {
                return Err(GitError::NotFound(path));
            }
            let repo = open(&root)?;
            let mut index = repo.index()?;
            index.add_path(Path::new(&path))?;
            index.write()?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, fs: &dyn FileSystem, path: &str) -> GitResult<()> {
        let root = root_of(fs)?;
        let path = relative(path);
        blocking(move || {
            let repo = open(&root)?;
            let mut index = repo.index()?;
            index.remove_path(Path::new(&path))?;
            index.write()?;
            Ok(())
        })
        .await
    }

    async fn commit(&self, fs: &dyn FileSystem, options: &CommitOptions) -> GitResult<String> {
        let root = root_of(fs)?;
        let options = options.clone();
        blocking(move || commit_staged(&root, &options)).await
    }

    async fn push(&self, fs: &dyn FileSystem, options: &PushOptions) -> GitResult<()> {
        let root = root_of(fs)?;
        let options = options.clone();
        blocking(move || {
            let repo = open(&root)?;
            let configured = repo
                .find_remote(&options.remote)
                .map_err(|_| GitError::NotFound(format!("remote {}", options.remote)))?;
            let url = configured.url().unwrap_or_default().to_string();
            let target = via_proxy(&url, options.cors_proxy.as_deref());
            let mut remote = if target == url {
                configured
            } else {
                repo.remote_anonymous(&target)?
            };

            let mut callbacks = callbacks(&options.auth);
            callbacks.push_update_reference(|refname, status| match status {
                Some(reason) => Err(git2::Error::new(
                    ErrorCode::NotFastForward,
                    ErrorClass::Reference,
                    format!("{}: {}", refname, reason),
                )),
                None => Ok(()),
            });
            let mut push = git2::PushOptions::new();
            push.remote_callbacks(callbacks);

            let refspec = format!("refs/heads/{0}:refs/heads/{0}", options.branch);
            remote
                .push(&[refspec.as_str()], Some(&mut push))
                .map_err(|e| transport_error(&url, e))
        })
        .await
    }

    async fn branch(&self, fs: &dyn FileSystem, name: &str) -> GitResult<()> {
        let root = root_of(fs)?;
        let name = name.to_string();
        blocking(move || {
            let repo = open(&root)?;
            if repo.find_branch(&name, BranchType::Local).is_ok() {
                return Ok(());
            }
            let head = match repo.head() {
                Ok(head) => head.peel_to_commit()?,
                Err(e) if e.code() == ErrorCode::UnbornBranch => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            repo.branch(&name, &head, false)?;
            Ok(())
        })
        .await
    }

    async fn checkout_head(&self, fs: &dyn FileSystem) -> GitResult<()> {
        let root = root_of(fs)?;
        let staged = blocking(move || {
            let repo = open(&root)?;
            let head = repo.head();
            let staged = match head {
                Ok(head) => {
                    let commit = head.peel_to_commit()?;
                    repo.reset(commit.as_object(), ResetType::Hard, None)?;
                    Vec::new()
                }
                // Nothing committed yet: everything staged is dropped.
                Err(e) if e.code() == ErrorCode::UnbornBranch => {
                    let mut index = repo.index()?;
                    let staged: Vec<String> = index
                        .iter()
                        .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
                        .collect();
                    index.clear()?;
                    index.write()?;
                    staged
                }
                Err(e) => return Err(e.into()),
            };
            Ok(staged)
        })
        .await?;

        for path in staged {
            fs.remove_if_exists(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::Author;
    use specbook_common::{DiskFileSystem, MemoryFileSystem};
    use tempfile::TempDir;

    fn image(dir: &TempDir, name: &str) -> DiskFileSystem {
        DiskFileSystem::new(dir.path().join(name)).unwrap()
    }

    fn commit_options(message: &str) -> CommitOptions {
        CommitOptions {
            author: Author {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
            },
            message: message.to_string(),
            signing_key: None,
        }
    }

    fn auth() -> Auth {
        Auth {
            username: "ada".to_string(),
            password: None,
        }
    }

    /// A bare repository with one commit on `master`, reachable by path
    async fn bare_remote(dir: &TempDir) -> String {
        let seed = image(dir, "seed");
        let git = NativeGit;
        git.init(&seed, "master").await.unwrap();
        seed.write("/specification.yml", b"[]\n").unwrap();
        git.add(&seed, "/specification.yml").await.unwrap();
        git.commit(&seed, &commit_options("seed")).await.unwrap();

        let bare = dir.path().join("remote.git");
        Repository::init_bare(&bare).unwrap();
        let url = bare.to_string_lossy().into_owned();
        git.add_remote(&seed, "origin", &url).await.unwrap();
        git.push(
            &seed,
            &PushOptions {
                remote: "origin".to_string(),
                branch: "master".to_string(),
                cors_proxy: None,
                auth: auth(),
            },
        )
        .await
        .unwrap();
        url
    }

    #[test]
    fn test_proxy_rewrites_http_remotes_only() {
        assert_eq!(
            via_proxy("https://github.com/acme/spec.git", Some("https://cors.isomorphic-git.org/")),
            "https://cors.isomorphic-git.org/github.com/acme/spec.git"
        );
        assert_eq!(via_proxy("https://github.com/acme/spec.git", None), "https://github.com/acme/spec.git");
        assert_eq!(via_proxy("/srv/git/spec.git", Some("https://proxy")), "/srv/git/spec.git");
    }

    #[tokio::test]
    async fn test_memory_image_is_refused() {
        let result = NativeGit.init(&MemoryFileSystem::new(), "main").await;
        assert!(matches!(result, Err(GitError::NotOnDisk)));
    }

    #[tokio::test]
    async fn test_init_commit_and_branch() {
        let dir = tempfile::tempdir().unwrap();
        let fs = image(&dir, "work");
        let git = NativeGit;

        assert_eq!(git.current_branch(&fs).await.unwrap(), None);
        git.init(&fs, "main").await.unwrap();
        assert_eq!(git.current_branch(&fs).await.unwrap().as_deref(), Some("main"));

        fs.write("/f1.md", b"# Login").unwrap();
        git.add(&fs, "/f1.md").await.unwrap();
        let id = git.commit(&fs, &commit_options("first")).await.unwrap();

        let repo = Repository::open(fs.local_root().unwrap()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.id().to_string(), id);
        assert_eq!(head.message(), Some("first"));
        assert!(head.tree().unwrap().get_name("f1.md").is_some());

        git.branch(&fs, "feature").await.unwrap();
        assert!(repo.find_branch("feature", BranchType::Local).is_ok());
    }

    #[tokio::test]
    async fn test_remotes_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = image(&dir, "work");
        let git = NativeGit;
        git.init(&fs, "main").await.unwrap();

        git.add_remote(&fs, "origin", "https://example.com/a.git").await.unwrap();
        let remotes = git.list_remotes(&fs).await.unwrap();
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].url, "https://example.com/a.git");

        git.delete_remote(&fs, "origin").await.unwrap();
        assert!(git.list_remotes(&fs).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clone_edit_push() {
        let dir = tempfile::tempdir().unwrap();
        let url = bare_remote(&dir).await;
        let fs = image(&dir, "clone");
        let git = NativeGit;

        git.clone_repo(
            &fs,
            &CloneOptions {
                url: url.clone(),
                branch: "master".to_string(),
                cors_proxy: None,
                depth: None,
                single_branch: true,
                auth: auth(),
            },
        )
        .await
        .unwrap();
        assert_eq!(fs.read_to_string("/specification.yml").unwrap(), "[]\n");
        assert_eq!(git.current_branch(&fs).await.unwrap().as_deref(), Some("master"));

        fs.write("/f1.md", b"# Login").unwrap();
        git.add(&fs, "/f1.md").await.unwrap();
        let id = git.commit(&fs, &commit_options("add login")).await.unwrap();
        git.push(
            &fs,
            &PushOptions {
                remote: "origin".to_string(),
                branch: "master".to_string(),
                cors_proxy: None,
                auth: auth(),
            },
        )
        .await
        .unwrap();

        let remote = Repository::open_bare(&url).unwrap();
        let tip = remote.find_branch("master", BranchType::Local).unwrap();
        assert_eq!(tip.get().target().unwrap().to_string(), id);
    }

    #[tokio::test]
    async fn test_checkout_head_discards_uncommitted_work() {
        let dir = tempfile::tempdir().unwrap();
        let fs = image(&dir, "work");
        let git = NativeGit;
        git.init(&fs, "main").await.unwrap();
        fs.write("/f1.md", b"committed").unwrap();
        git.add(&fs, "/f1.md").await.unwrap();
        git.commit(&fs, &commit_options("first")).await.unwrap();

        fs.write("/f1.md", b"edited").unwrap();
        fs.write("/f2.md", b"new").unwrap();
        git.add(&fs, "/f1.md").await.unwrap();
        git.add(&fs, "/f2.md").await.unwrap();

        git.checkout_head(&fs).await.unwrap();

        assert_eq!(fs.read_to_string("/f1.md").unwrap(), "committed");
        assert!(!fs.exists("/f2.md"));
    }

    #[tokio::test]
    async fn test_checkout_head_before_first_commit() {
        let dir = tempfile::tempdir().unwrap();
        let fs = image(&dir, "work");
        let git = NativeGit;
        git.init(&fs, "main").await.unwrap();
        fs.write("/f1.md", b"draft").unwrap();
        git.add(&fs, "/f1.md").await.unwrap();

        git.checkout_head(&fs).await.unwrap();

        assert!(!fs.exists("/f1.md"));
        let repo = Repository::open(fs.local_root().unwrap()).unwrap();
        assert!(repo.index().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_signing_key_creates_no_commit() {
        let dir = tempfile::tempdir().unwrap();
        let fs = image(&dir, "work");
        let git = NativeGit;
        git.init(&fs, "main").await.unwrap();
        fs.write("/f1.md", b"x").unwrap();
        git.add(&fs, "/f1.md").await.unwrap();

        let mut options = commit_options("signed");
        options.signing_key = Some("not an armored key".to_string());
        let result = git.commit(&fs, &options).await;

        assert!(matches!(result, Err(GitError::Signing(_))));
        let repo = Repository::open(fs.local_root().unwrap()).unwrap();
        assert!(repo.head().is_err());
    }
}
