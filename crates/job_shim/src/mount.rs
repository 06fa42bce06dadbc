//! Mount seam for the versioned filesystem.
//!
//! The lifecycle only consumes the mount contract: ask for the commit
//! mounts under a root, learn that the filesystem is serving (or that the
//! mount failed), and unmount on the way out. The filesystem itself lives
//! in its own service; [`FuseMounter`] drives its client binary as a
//! subprocess.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use river_proto::pod::CommitMount;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info};

/// Default location of the filesystem client binary inside worker images.
pub const DEFAULT_FUSE_CLIENT: &str = "/usr/local/bin/river-fuse";

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READY_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait Mounter: Send + Sync {
    /// Mount `mounts` under `root`. Resolves once the filesystem is serving,
    /// or with the mount error, whichever comes first. `debug` carries the
    /// transform's verbosity request through to the filesystem client.
    async fn mount(
        &self,
        root: &Path,
        mounts: &[CommitMount],
        debug: bool,
    ) -> Result<Box<dyn ActiveMount>>;
}

/// A live mount; dropping it without calling [`unmount`](Self::unmount)
/// leaves teardown to process exit.
#[async_trait]
pub trait ActiveMount: Send {
    async fn unmount(self: Box<Self>) -> Result<()>;
}

/// Mounts by running the filesystem's FUSE client as a child process and
/// waiting for the mount to appear in the mount table.
pub struct FuseMounter {
    client_bin: PathBuf,
    control_addr: String,
}

impl FuseMounter {
    pub fn new(control_addr: impl Into<String>) -> Self {
        FuseMounter {
            client_bin: PathBuf::from(DEFAULT_FUSE_CLIENT),
            control_addr: control_addr.into(),
        }
    }
}

#[async_trait]
impl Mounter for FuseMounter {
    async fn mount(
        &self,
        root: &Path,
        mounts: &[CommitMount],
        debug: bool,
    ) -> Result<Box<dyn ActiveMount>> {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("creating mount root {}", root.display()))?;

        let mut cmd = Command::new(&self.client_bin);
        cmd.arg("mount")
            .arg(root)
            .arg("--address")
            .arg(&self.control_addr);
        if debug {
            cmd.arg("--debug");
        }
        for mount in mounts {
            cmd.arg(format!("{}@{}:{}", mount.repo, mount.commit, mount.path));
        }
        cmd.stdin(Stdio::null());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning fuse client {}", self.client_bin.display()))?;

        let deadline = Instant::now() + READY_TIMEOUT;
        loop {
            if let Some(status) = child.try_wait()? {
                bail!(
                    "fuse client exited before {} was ready: {}",
                    root.display(),
                    status
                );
            }
            if is_mounted(root).await? {
                break;
            }
            if Instant::now() >= deadline {
                child.kill().await.ok();
                bail!("timed out waiting for {} to mount", root.display());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        info!(root = %root.display(), mounts = mounts.len(), "filesystem mounted");
        Ok(Box::new(FuseMount {
            root: root.to_path_buf(),
            child,
        }))
    }
}

async fn is_mounted(root: &Path) -> Result<bool> {
    let Some(root) = root.to_str() else {
        bail!("mount root is not valid utf-8");
    };
    let table = tokio::fs::read_to_string("/proc/self/mounts")
        .await
        .context("reading mount table")?;
    Ok(table
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(root)))
}

struct FuseMount {
    root: PathBuf,
    child: Child,
}

#[async_trait]
impl ActiveMount for FuseMount {
    async fn unmount(mut self: Box<Self>) -> Result<()> {
        debug!(root = %self.root.display(), "unmounting");
        let status = Command::new("fusermount")
            .arg("-u")
            .arg(&self.root)
            .status()
            .await
            .context("running fusermount")?;
        if !status.success() {
            bail!("fusermount -u {} failed: {}", self.root.display(), status);
        }
        self.child.wait().await.context("waiting for fuse client")?;
        Ok(())
    }
}
