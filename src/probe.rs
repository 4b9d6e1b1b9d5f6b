//! Cancellable streaming reader over an ffprobe subprocess.
//!
//! stdout and stderr share the write end of one pipe, so lines reach the
//! reader in the order the tool wrote them. The caller can stop the process
//! as soon as it has a verdict.

use std::io::{ErrorKind, PipeReader};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::error::{AntiCrashError, Result};

/// Arguments selecting error-level logging and per-frame pixel format and
/// dimensions of the first video stream, as unprefixed CSV. The URL goes last.
pub const PROBE_ARGS: [&str; 8] = [
    "-v",
    "error",
    "-show_entries",
    "frame=pix_fmt,width,height",
    "-select_streams",
    "v:0",
    "-of",
    "csv=p=0",
];

/// How long to wait for a process whose output has ended to exit.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// One running probe. Owns its child process exclusively.
pub struct ProbeSession {
    child: Child,
    lines: mpsc::UnboundedReceiver<String>,
}

impl ProbeSession {
    /// Start the probe tool against `url`.
    pub fn spawn(tool: &Path, url: &str) -> Result<Self> {
        let (output, writer) = std::io::pipe()?;
        let stderr_writer = writer.try_clone()?;

        let mut command = Command::new(tool);
        command
            .args(PROBE_ARGS)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer)
            .kill_on_drop(true);

        let spawned = command.spawn();
        // Close our copies of the write end, or the reader never sees EOF
        drop(command);

        let child = spawned.map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                AntiCrashError::ProbeUnavailable(format!("{}: {}", tool.display(), e))
            }
            _ => AntiCrashError::from(e),
        })?;

        let (line_tx, lines) = mpsc::unbounded_channel::<String>();
        spawn_output_reader(output, line_tx)?;

        Ok(Self { child, lines })
    }

    /// Next non-empty output line, or `None` once the output has ended.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Kill the process and reap it. Failures are ignored.
    pub async fn cancel(mut self) {
        self.lines.close();
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "Failed to kill probe process");
        }
    }

    /// Wait for a process whose output has ended to exit.
    ///
    /// Returns `None` if it does not exit within the grace period, in which
    /// case it is killed on drop.
    pub async fn finish(mut self) -> Option<ExitStatus> {
        match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Failed to wait for probe process");
                None
            }
            Err(_) => {
                tracing::debug!("Probe process did not exit after closing its output");
                None
            }
        }
    }
}

/// Strip the line terminator; `None` for blank lines.
fn decode_line(buf: &mut Vec<u8>) -> Option<String> {
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    (!buf.is_empty()).then(|| String::from_utf8_lossy(buf).into_owned())
}

/// Forward non-empty lines from the merged pipe. A read error ends the stream.
#[cfg(unix)]
fn spawn_output_reader(output: PipeReader, tx: mpsc::UnboundedSender<String>) -> Result<()> {
    use std::os::fd::OwnedFd;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::unix::pipe;

    let stream = pipe::Receiver::from_owned_fd(OwnedFd::from(output))?;

    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::with_capacity(256);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let Some(line) = decode_line(&mut buf) else {
                        continue;
                    };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Probe output read failed");
                    break;
                }
            }
        }
    });

    Ok(())
}

/// Forward non-empty lines from the merged pipe on a blocking thread.
#[cfg(not(unix))]
fn spawn_output_reader(output: PipeReader, tx: mpsc::UnboundedSender<String>) -> Result<()> {
    use std::io::{BufRead, BufReader};

    tokio::task::spawn_blocking(move || {
        let mut reader = BufReader::new(output);
        let mut buf = Vec::with_capacity(256);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let Some(line) = decode_line(&mut buf) else {
                        continue;
                    };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Probe output read failed");
                    break;
                }
            }
        }
    });

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use crate::probe::ProbeSession;
    use crate::test_support::fake_probe;

    #[tokio::test]
    async fn merges_both_streams_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tool = fake_probe(&dir, "echo out\necho err >&2");

        let mut session = ProbeSession::spawn(&tool, "https://x.io/a.mp4").expect("spawn");
        let mut lines = Vec::new();
        while let Some(line) = session.next_line().await {
            lines.push(line);
        }

        assert_eq!(lines, vec!["out", "err"]);
        assert!(session.finish().await.is_some_and(|s| s.success()));
    }

    #[tokio::test]
    async fn keeps_write_order_across_streams() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tool = fake_probe(
            &dir,
            "echo e1 >&2\necho o1\necho e2 >&2\necho o2\necho e3 >&2",
        );

        for _ in 0..20 {
            let mut session = ProbeSession::spawn(&tool, "https://x.io/a.mp4").expect("spawn");
            let mut lines = Vec::new();
            while let Some(line) = session.next_line().await {
                lines.push(line);
            }
            session.finish().await;

            assert_eq!(lines, vec!["e1", "o1", "e2", "o2", "e3"]);
        }
    }

    #[tokio::test]
    async fn skips_blank_lines_and_carriage_returns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tool = fake_probe(&dir, r"printf 'a\r\n\n\nb\n'");

        let mut session = ProbeSession::spawn(&tool, "https://x.io/a.mp4").expect("spawn");
        assert_eq!(session.next_line().await.as_deref(), Some("a"));
        assert_eq!(session.next_line().await.as_deref(), Some("b"));
        assert_eq!(session.next_line().await, None);
    }

    #[tokio::test]
    async fn passes_fixed_arguments_with_url_last() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args_file = dir.path().join("args");
        let tool = fake_probe(&dir, &format!("echo \"$*\" > '{}'", args_file.display()));

        let session = ProbeSession::spawn(&tool, "https://x.io/a.mp4").expect("spawn");
        session.finish().await;

        let args = std::fs::read_to_string(&args_file).expect("args written");
        assert_eq!(
            args.trim(),
            "-v error -show_entries frame=pix_fmt,width,height -select_streams v:0 -of csv=p=0 https://x.io/a.mp4"
        );
    }

    #[tokio::test]
    async fn cancel_stops_a_running_process() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tool = fake_probe(&dir, "echo first\nsleep 30\necho never");

        let mut session = ProbeSession::spawn(&tool, "https://x.io/a.mp4").expect("spawn");
        assert_eq!(session.next_line().await.as_deref(), Some("first"));

        let cancelled =
            tokio::time::timeout(std::time::Duration::from_secs(5), session.cancel()).await;
        assert!(cancelled.is_ok());
    }

    #[test]
    fn missing_tool_is_unavailable() {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        let result = rt.block_on(async {
            ProbeSession::spawn(std::path::Path::new("/no/such/ffprobe"), "https://x.io/a.mp4")
                .map(|_| ())
        });
        assert!(matches!(
            result,
            Err(crate::error::AntiCrashError::ProbeUnavailable(_))
        ));
    }
}
