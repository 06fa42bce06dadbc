//! Pod lifecycle: claim a chunk, mount, run the user command, heartbeat,
//! and report a terminal status exactly once.
//!
//! The `finished` latch is the single source of truth for whether FinishPod
//! has been delivered; it is set only after the RPC returns. Every exit
//! path that still owns the chunk (panics included) consults it before
//! reporting, so FinishPod is never sent twice and never skipped.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use futures::FutureExt;
use river_proto::pod::{
    ContinuePodRequest, FinishPodRequest, FinishPodResponse, StartPodRequest, StartPodResponse,
    Transform,
};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tonic::Status;
use tracing::{debug, error, info, warn};

use crate::control::ControlPlane;
use crate::mount::Mounter;

/// Where the versioned filesystem is mounted: inputs at
/// `/pfs/<repo>/...`, output at `/pfs/out`.
pub const MOUNT_ROOT: &str = "/pfs";

/// Cadence of ContinuePod heartbeats while the user command runs.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ShimError {
    /// The control plane asked for this pod to be restarted.
    #[error("restarting")]
    Restarting,

    /// A control-plane RPC failed. The pod exits without reporting; the
    /// control plane already knows it is unreachable.
    #[error("control plane rpc failed: {0}")]
    Rpc(#[from] Status),

    /// Everything else. The crash guard reports these as pod failure when
    /// the chunk is still ours.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl ShimError {
    fn reports_failure(&self) -> bool {
        matches!(self, ShimError::Fatal(_))
    }
}

pub struct PodLifecycle<C, M> {
    control: C,
    mounter: M,
    job_id: String,
    pod_name: String,
    mount_root: PathBuf,
    heartbeat_interval: Duration,
}

impl<C: ControlPlane, M: Mounter> PodLifecycle<C, M> {
    pub fn new(
        control: C,
        mounter: M,
        job_id: impl Into<String>,
        pod_name: impl Into<String>,
    ) -> Self {
        PodLifecycle {
            control,
            mounter,
            job_id: job_id.into(),
            pod_name: pod_name.into(),
            mount_root: PathBuf::from(MOUNT_ROOT),
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_mount_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.mount_root = root.into();
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Drive the pod to completion.
    pub async fn run(&self) -> Result<(), ShimError> {
        let start = self
            .control
            .start_pod(StartPodRequest {
                job_id: self.job_id.clone(),
                pod_name: self.pod_name.clone(),
            })
            .await
            .map_err(|status| {
                error!(error = %status, "StartPod failed");
                ShimError::Rpc(status)
            })?;

        let transform = start.transform.clone().unwrap_or_default();
        if transform.debug {
            crate::tracing::enable_debug();
        }
        info!(
            job_id = %self.job_id,
            chunk_id = %start.chunk_id,
            "claimed chunk"
        );

        // From here on the chunk is ours, so every exit path that has not
        // passed the `finished` latch owes the control plane a FinishPod.
        let finished = AtomicBool::new(false);
        let chunk_id = start.chunk_id.clone();
        let outcome = AssertUnwindSafe(self.execute(&start, &transform, &finished))
            .catch_unwind()
            .await;

        match outcome {
            Ok(result) => {
                if let Err(err) = &result {
                    if err.reports_failure() && !finished.load(Ordering::SeqCst) {
                        self.report_failure(&chunk_id).await;
                    }
                }
                result
            }
            Err(panic) => {
                error!("job shim panicked; this is likely a platform bug");
                if !finished.load(Ordering::SeqCst) {
                    self.report_failure(&chunk_id).await;
                }
                Err(ShimError::Fatal(anyhow!(
                    "job shim panicked: {}",
                    panic_message(panic.as_ref())
                )))
            }
        }
    }

    async fn execute(
        &self,
        start: &StartPodResponse,
        transform: &Transform,
        finished: &AtomicBool,
    ) -> Result<(), ShimError> {
        let mount = self
            .mounter
            .mount(&self.mount_root, &start.commit_mounts, transform.debug)
            .await?;

        let result = self.supervise(&start.chunk_id, transform, finished).await;

        if let Err(err) = mount.unmount().await {
            error!(error = %err, "failed to unmount");
            if result.is_ok() {
                return Err(ShimError::Fatal(err));
            }
        }
        result
    }

    /// Runs the user command and owns the RPC lifecycle: heartbeats while
    /// the command runs, and is the sole emitter of FinishPod.
    async fn supervise(
        &self,
        chunk_id: &str,
        transform: &Transform,
        finished: &AtomicBool,
    ) -> Result<(), ShimError> {
        if transform.cmd.is_empty() {
            warn!("unable to run; the transform provides no command");
            self.finish(chunk_id, false, finished).await?;
            return Ok(());
        }

        let (done_tx, mut done_rx) = oneshot::channel();
        let cmd = transform.cmd.clone();
        let stdin = transform.stdin.clone();
        let accept = transform.accept_return_code.clone();
        tokio::spawn(async move {
            let success = run_user_command(cmd, stdin, accept).await;
            let _ = done_tx.send(success);
        });

        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        loop {
            tokio::select! {
                success = &mut done_rx => {
                    // A dropped sender means the waiter task died: failure.
                    let success = success.unwrap_or(false);
                    let response = self.finish(chunk_id, success, finished).await?;
                    if response.fail {
                        return Err(ShimError::Restarting);
                    }
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    let response = self
                        .control
                        .continue_pod(ContinuePodRequest {
                            chunk_id: chunk_id.to_string(),
                            pod_name: self.pod_name.clone(),
                        })
                        .await?;
                    if response.exit {
                        // The chunk was reassigned; it is no longer ours to
                        // report on.
                        info!("control plane requested exit");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn finish(
        &self,
        chunk_id: &str,
        success: bool,
        finished: &AtomicBool,
    ) -> Result<FinishPodResponse, ShimError> {
        let response = self
            .control
            .finish_pod(FinishPodRequest {
                chunk_id: chunk_id.to_string(),
                pod_name: self.pod_name.clone(),
                success,
            })
            .await?;
        finished.store(true, Ordering::SeqCst);
        info!(success, "reported chunk completion");
        Ok(response)
    }

    /// Crash-guard path: best-effort FinishPod(success=false).
    async fn report_failure(&self, chunk_id: &str) {
        let request = FinishPodRequest {
            chunk_id: chunk_id.to_string(),
            pod_name: self.pod_name.clone(),
            success: false,
        };
        if let Err(err) = self.control.finish_pod(request).await {
            error!(error = %err, "failed to report pod failure");
        }
    }
}

/// Run the user command to completion. Exit code 0 is success; a non-zero
/// code is success iff listed in `accept_return_codes`; spawn and wait
/// failures are failures.
async fn run_user_command(
    cmd: Vec<String>,
    stdin_lines: Vec<String>,
    accept_return_codes: Vec<i64>,
) -> bool {
    let mut command = Command::new(&cmd[0]);
    command
        .args(&cmd[1..])
        .stdin(if stdin_lines.is_empty() {
            Stdio::null()
        } else {
            Stdio::piped()
        })
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            error!(error = %err, command = ?cmd, "failed to spawn user command");
            return false;
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            for line in stdin_lines {
                if let Err(err) = stdin.write_all(format!("{line}\n").as_bytes()).await {
                    warn!(error = %err, "failed writing user command stdin");
                    return;
                }
            }
            // Dropping stdin closes the pipe.
        });
    }

    match child.wait().await {
        Ok(status) if status.success() => true,
        Ok(status) => {
            let accepted = status
                .code()
                .is_some_and(|code| accept_return_codes.contains(&i64::from(code)));
            if accepted {
                debug!(status = %status, "user command exit code accepted");
            } else {
                error!(status = %status, "user command failed");
            }
            accepted
        }
        Err(err) => {
            error!(error = %err, "failed waiting for user command");
            false
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use river_proto::pod::{CommitMount, ContinuePodResponse, StartPodResponse};

    use super::*;
    use crate::mount::ActiveMount;

    #[derive(Clone)]
    struct MockControl {
        transform: Transform,
        fail_start: bool,
        continue_exit: bool,
        finish_fail: bool,
        starts: Arc<AtomicUsize>,
        continues: Arc<AtomicUsize>,
        finishes: Arc<Mutex<Vec<FinishPodRequest>>>,
    }

    impl MockControl {
        fn new(transform: Transform) -> Self {
            MockControl {
                transform,
                fail_start: false,
                continue_exit: false,
                finish_fail: false,
                starts: Arc::new(AtomicUsize::new(0)),
                continues: Arc::new(AtomicUsize::new(0)),
                finishes: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn finishes(&self) -> Vec<FinishPodRequest> {
            self.finishes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ControlPlane for MockControl {
        async fn start_pod(&self, _request: StartPodRequest) -> Result<StartPodResponse, Status> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(Status::unavailable("control plane down"));
            }
            Ok(StartPodResponse {
                chunk_id: "chunk-1".to_string(),
                transform: Some(self.transform.clone()),
                commit_mounts: vec![CommitMount {
                    repo: "images".to_string(),
                    commit: "c0".to_string(),
                    path: "images".to_string(),
                }],
            })
        }

        async fn continue_pod(
            &self,
            _request: ContinuePodRequest,
        ) -> Result<ContinuePodResponse, Status> {
            self.continues.fetch_add(1, Ordering::SeqCst);
            Ok(ContinuePodResponse {
                exit: self.continue_exit,
            })
        }

        async fn finish_pod(
            &self,
            request: FinishPodRequest,
        ) -> Result<FinishPodResponse, Status> {
            self.finishes.lock().unwrap().push(request);
            Ok(FinishPodResponse {
                fail: self.finish_fail,
            })
        }
    }

    #[derive(Clone, Default)]
    struct MockMounter {
        fail: bool,
        panic_after_mount: bool,
        mounted: Arc<AtomicUsize>,
        unmounted: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Mounter for MockMounter {
        async fn mount(
            &self,
            _root: &std::path::Path,
            _mounts: &[CommitMount],
            _debug: bool,
        ) -> Result<Box<dyn ActiveMount>> {
            if self.fail {
                bail!("fuse client exited before /pfs was ready");
            }
            self.mounted.fetch_add(1, Ordering::SeqCst);
            if self.panic_after_mount {
                panic!("injected crash between mount and command launch");
            }
            Ok(Box::new(MockActive {
                unmounted: self.unmounted.clone(),
            }))
        }
    }

    struct MockActive {
        unmounted: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ActiveMount for MockActive {
        async fn unmount(self: Box<Self>) -> Result<()> {
            self.unmounted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn transform(cmd: &[&str]) -> Transform {
        Transform {
            cmd: cmd.iter().map(|s| s.to_string()).collect(),
            stdin: vec![],
            accept_return_code: vec![],
            debug: false,
        }
    }

    fn lifecycle(
        control: MockControl,
        mounter: MockMounter,
    ) -> PodLifecycle<MockControl, MockMounter> {
        PodLifecycle::new(control, mounter, "job-1", "pod-1")
            .with_mount_root("/tmp/pfs-test")
            .with_heartbeat_interval(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn happy_path_reports_success_once() {
        let control = MockControl::new(transform(&["true"]));
        let mounter = MockMounter::default();
        lifecycle(control.clone(), mounter.clone()).run().await.unwrap();

        let finishes = control.finishes();
        assert_eq!(finishes.len(), 1);
        assert!(finishes[0].success);
        assert_eq!(finishes[0].chunk_id, "chunk-1");
        assert_eq!(control.starts.load(Ordering::SeqCst), 1);
        assert_eq!(mounter.unmounted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn heartbeats_while_the_command_runs() {
        let control = MockControl::new(transform(&["sleep", "0.5"]));
        let mounter = MockMounter::default();
        let lifecycle = lifecycle(control.clone(), mounter)
            .with_heartbeat_interval(Duration::from_millis(100));
        lifecycle.run().await.unwrap();

        assert!(control.continues.load(Ordering::SeqCst) >= 1);
        let finishes = control.finishes();
        assert_eq!(finishes.len(), 1);
        assert!(finishes[0].success);
    }

    #[tokio::test]
    async fn accepted_return_code_is_success() {
        let mut t = transform(&["sh", "-c", "exit 2"]);
        t.accept_return_code = vec![2];
        let control = MockControl::new(t);
        lifecycle(control.clone(), MockMounter::default())
            .run()
            .await
            .unwrap();

        let finishes = control.finishes();
        assert_eq!(finishes.len(), 1);
        assert!(finishes[0].success);
    }

    #[tokio::test]
    async fn rejected_return_code_is_failure() {
        let mut t = transform(&["sh", "-c", "exit 3"]);
        t.accept_return_code = vec![2];
        let control = MockControl::new(t);
        lifecycle(control.clone(), MockMounter::default())
            .run()
            .await
            .unwrap();

        let finishes = control.finishes();
        assert_eq!(finishes.len(), 1);
        assert!(!finishes[0].success);
    }

    #[tokio::test]
    async fn stdin_lines_reach_the_command() {
        let mut t = transform(&[
            "sh",
            "-c",
            "read a; read b; [ \"$a\" = foo ] && [ \"$b\" = bar ]",
        ]);
        t.stdin = vec!["foo".to_string(), "bar".to_string()];
        let control = MockControl::new(t);
        lifecycle(control.clone(), MockMounter::default())
            .run()
            .await
            .unwrap();

        assert!(control.finishes()[0].success);
    }

    #[tokio::test]
    async fn continue_exit_stops_without_finish() {
        let mut control = MockControl::new(transform(&["sleep", "5"]));
        control.continue_exit = true;
        let mounter = MockMounter::default();
        let lifecycle = lifecycle(control.clone(), mounter.clone())
            .with_heartbeat_interval(Duration::from_millis(50));
        lifecycle.run().await.unwrap();

        assert!(control.finishes().is_empty());
        assert_eq!(mounter.unmounted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn restart_request_surfaces_as_restarting() {
        let mut control = MockControl::new(transform(&["true"]));
        control.finish_fail = true;
        let err = lifecycle(control.clone(), MockMounter::default())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, ShimError::Restarting));
        assert_eq!(err.to_string(), "restarting");
        // FinishPod went out exactly once; the latch is set, so the guard
        // stays quiet even though run() returned an error.
        assert_eq!(control.finishes().len(), 1);
    }

    #[tokio::test]
    async fn empty_command_reports_failure() {
        let control = MockControl::new(transform(&[]));
        lifecycle(control.clone(), MockMounter::default())
            .run()
            .await
            .unwrap();

        let finishes = control.finishes();
        assert_eq!(finishes.len(), 1);
        assert!(!finishes[0].success);
    }

    #[tokio::test]
    async fn missing_binary_reports_failure() {
        let control = MockControl::new(transform(&["/definitely/not/a/binary"]));
        lifecycle(control.clone(), MockMounter::default())
            .run()
            .await
            .unwrap();

        let finishes = control.finishes();
        assert_eq!(finishes.len(), 1);
        assert!(!finishes[0].success);
    }

    #[tokio::test]
    async fn panic_after_mount_reports_failure_once() {
        let control = MockControl::new(transform(&["true"]));
        let mounter = MockMounter {
            panic_after_mount: true,
            ..MockMounter::default()
        };
        let err = lifecycle(control.clone(), mounter).run().await.unwrap_err();

        assert!(matches!(err, ShimError::Fatal(_)));
        let finishes = control.finishes();
        assert_eq!(finishes.len(), 1);
        assert!(!finishes[0].success);
    }

    #[tokio::test]
    async fn mount_failure_reports_failure() {
        let control = MockControl::new(transform(&["true"]));
        let mounter = MockMounter {
            fail: true,
            ..MockMounter::default()
        };
        let err = lifecycle(control.clone(), mounter).run().await.unwrap_err();

        assert!(matches!(err, ShimError::Fatal(_)));
        let finishes = control.finishes();
        assert_eq!(finishes.len(), 1);
        assert!(!finishes[0].success);
    }

    #[tokio::test]
    async fn start_pod_failure_sends_nothing() {
        let mut control = MockControl::new(transform(&["true"]));
        control.fail_start = true;
        let mounter = MockMounter::default();
        let err = lifecycle(control.clone(), mounter.clone())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, ShimError::Rpc(_)));
        assert!(control.finishes().is_empty());
        assert_eq!(mounter.mounted.load(Ordering::SeqCst), 0);
    }
}
