//! Streaming output pump.
//!
//! Moves bytes from a child's stdout/stderr into [`OutputMessage`]s and
//! relayed keystrokes into its stdin, until the child exits. The loop is
//! driven by pipe readiness rather than a polling interval:
//!
//! 1. output is forwarded as soon as a read completes, stderr marked;
//! 2. relayed stdin is written by a separate task, so a child that is not
//!    reading never stalls the output side;
//! 3. a heartbeat line goes out after `heartbeat` without output;
//! 4. after exit the pipes are drained until EOF or `drain_window`;
//! 5. a dropped receiver counts as a client disconnect and is handled
//!    according to the [`DisconnectPolicy`].

use std::{process::ExitStatus, time::Duration};

use command_group::AsyncGroupChild;
use termbridge_core::{BridgeConfig, DisconnectPolicy, OutputMessage};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::ChildStdin,
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::Instant,
};

use crate::{
    launcher::LaunchedProcess,
    relay::{RelayInput, RelayReceiver},
    utf8::Utf8Chunker,
};

const READ_CHUNK: usize = 8 * 1024;

/// Pump tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpConfig {
    pub heartbeat: Duration,
    pub drain_window: Duration,
    pub on_disconnect: DisconnectPolicy,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for PumpConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            heartbeat: config.heartbeat(),
            drain_window: config.drain_window(),
            on_disconnect: config.on_disconnect,
        }
    }
}

/// How a pumped execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpOutcome {
    pub exit_code: i32,
    /// The receiver went away before the process finished.
    pub disconnected: bool,
    /// The process was killed through the interrupt handle.
    pub interrupted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Stdout,
    Stderr,
}

/// One output pipe plus its decoder.
struct PipeReader<R> {
    pipe: R,
    kind: StreamKind,
    decoder: Utf8Chunker,
    buf: Box<[u8]>,
    done: bool,
}

impl<R: AsyncRead + Unpin> PipeReader<R> {
    fn new(pipe: R, kind: StreamKind) -> Self {
        Self {
            pipe,
            kind,
            decoder: Utf8Chunker::new(),
            buf: vec![0; READ_CHUNK].into_boxed_slice(),
            done: false,
        }
    }

    /// Next decoded chunk; `None` when a read produced no complete text.
    ///
    /// Cancel safe: the only await point is the read itself.
    async fn next_chunk(&mut self) -> Option<OutputMessage> {
        let text = match self.pipe.read(&mut self.buf).await {
            Ok(0) | Err(_) => {
                self.done = true;
                self.decoder.finish()
            }
            Ok(n) => self.decoder.push(&self.buf[..n]),
        };
        if text.is_empty() {
            return None;
        }
        Some(match self.kind {
            StreamKind::Stdout => OutputMessage::output(text),
            StreamKind::Stderr => OutputMessage::stderr(&text),
        })
    }
}

/// Outbound half of the exec stream.
struct Sink<'a> {
    tx: &'a mpsc::Sender<OutputMessage>,
    open: bool,
}

impl Sink<'_> {
    /// Returns false once the receiver is gone.
    async fn emit(&mut self, msg: OutputMessage) -> bool {
        if self.open && self.tx.send(msg).await.is_err() {
            self.open = false;
        }
        self.open
    }
}

/// Pump a launched process until it exits.
///
/// The caller sends the opening and closing `meta` messages; this only emits
/// `output` lines (including heartbeats).
pub async fn pump(
    process: LaunchedProcess,
    relay: RelayReceiver,
    mut interrupt_rx: oneshot::Receiver<()>,
    tx: &mpsc::Sender<OutputMessage>,
    config: PumpConfig,
) -> PumpOutcome {
    let LaunchedProcess {
        mut child,
        stdin,
        stdout,
        stderr,
    } = process;
    let writer = spawn_stdin_writer(stdin, relay);
    let mut out = PipeReader::new(stdout, StreamKind::Stdout);
    let mut err = PipeReader::new(stderr, StreamKind::Stderr);
    let mut sink = Sink { tx, open: true };

    let mut status: Option<ExitStatus> = None;
    let mut wait_failed = false;
    let mut interrupt_armed = true;
    let mut interrupted = false;
    let mut disconnected = false;
    let mut last_output = Instant::now();
    let mut drain_deadline: Option<Instant> = None;

    loop {
        let exited = status.is_some() || wait_failed;
        if exited && out.done && err.done {
            break;
        }
        let heartbeat_at = last_output + config.heartbeat;
        let drain_at = drain_deadline.unwrap_or_else(Instant::now);

        tokio::select! {
            msg = out.next_chunk(), if !out.done => {
                if let Some(msg) = msg {
                    last_output = Instant::now();
                    sink.emit(msg).await;
                }
            }
            msg = err.next_chunk(), if !err.done => {
                if let Some(msg) = msg {
                    last_output = Instant::now();
                    sink.emit(msg).await;
                }
            }
            signal = &mut interrupt_rx, if interrupt_armed => {
                interrupt_armed = false;
                if signal.is_ok() && !exited {
                    interrupted = true;
                    writer.abort();
                    kill_group(&mut child, "interrupt");
                }
            }
            res = child.inner().wait(), if !exited => {
                match res {
                    Ok(exit) => status = Some(exit),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to wait for child");
                        wait_failed = true;
                    }
                }
                writer.abort();
                drain_deadline = Some(Instant::now() + config.drain_window);
            }
            () = tx.closed(), if sink.open => {
                sink.open = false;
            }
            () = tokio::time::sleep_until(heartbeat_at), if sink.open && !exited => {
                last_output = Instant::now();
                sink.emit(OutputMessage::heartbeat()).await;
            }
            () = tokio::time::sleep_until(drain_at), if drain_deadline.is_some() => {
                // Descendants still hold the pipes; the execution is over regardless.
                tracing::debug!("Drain window elapsed with pipes still open");
                kill_group(&mut child, "drain timeout");
                break;
            }
        }

        if !sink.open && !disconnected {
            disconnected = true;
            if status.is_none() {
                tracing::info!(policy = ?config.on_disconnect, "Client disconnected mid-stream");
                if config.on_disconnect == DisconnectPolicy::Kill {
                    writer.abort();
                    kill_group(&mut child, "disconnect");
                }
            }
        }
    }

    writer.abort();
    PumpOutcome {
        exit_code: status.map_or(-1, exit_code),
        disconnected,
        interrupted,
    }
}

/// Feed relayed input to the child until the task is aborted.
///
/// After EOT or a failed write, later input is discarded. Aborting drops the
/// receiver, so relay sends fail from then on.
fn spawn_stdin_writer(stdin: Option<ChildStdin>, mut relay: RelayReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdin = stdin;
        while let Some(input) = relay.recv_pending().await {
            let Some(pipe) = stdin.as_mut() else {
                tracing::debug!("Dropping input, stdin is closed");
                continue;
            };
            match input {
                RelayInput::Eof => {
                    tracing::debug!("Closing child stdin on EOT");
                    stdin = None;
                }
                RelayInput::Data(bytes) => {
                    let res = write_input(pipe, &bytes).await;
                    if let Err(e) = res {
                        tracing::debug!(error = %e, "Child stdin closed");
                        stdin = None;
                    }
                }
            }
        }
    })
}

async fn write_input(pipe: &mut ChildStdin, bytes: &[u8]) -> std::io::Result<()> {
    pipe.write_all(bytes).await?;
    pipe.flush().await
}

fn kill_group(child: &mut AsyncGroupChild, reason: &str) {
    match child.start_kill() {
        Ok(()) => tracing::debug!(pid = ?child.id(), reason, "Killed process group"),
        Err(e) => tracing::debug!(pid = ?child.id(), reason, error = %e, "Process group already gone"),
    }
}

/// Numeric exit status; signal deaths map to `128 + signal` on Unix.
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use std::{path::PathBuf, sync::Arc};

    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        Launcher, ProcessRegistry, Registration,
        shell::{HostShell, SearchPath, UnixShell},
    };

    fn launcher() -> Launcher {
        Launcher::new(
            HostShell::Posix(UnixShell::Sh(PathBuf::from("/bin/sh"))),
            Arc::new(SearchPath::from_parts("/usr/bin:/bin", vec![])),
        )
    }

    fn config() -> PumpConfig {
        PumpConfig {
            heartbeat: Duration::from_secs(30),
            drain_window: Duration::from_millis(200),
            on_disconnect: DisconnectPolicy::Kill,
        }
    }

    async fn run(line: &str, config: PumpConfig) -> (PumpOutcome, Vec<OutputMessage>) {
        let tmp = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::new();
        let reg = registry.register("u", line).await;
        let process = launcher().spawn(line, tmp.path()).unwrap();
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = pump(process, reg.relay, reg.interrupt_rx, &tx, config).await;
        drop(tx);
        let mut msgs = Vec::new();
        while let Some(msg) = rx.recv().await {
            msgs.push(msg);
        }
        (outcome, msgs)
    }

    fn text(msgs: &[OutputMessage]) -> String {
        msgs.iter()
            .filter_map(|m| match m {
                OutputMessage::Output { data } => Some(data.as_str()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn echo_produces_one_output_line() {
        let (outcome, msgs) = run("echo hello", config()).await;
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(msgs, vec![OutputMessage::output("hello\n")]);
    }

    #[tokio::test]
    async fn stderr_is_marked_and_exit_code_kept() {
        let (outcome, msgs) = run("echo oops >&2; exit 3", config()).await;
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(msgs, vec![OutputMessage::stderr("oops\n")]);
    }

    #[tokio::test]
    async fn silent_command_emits_nothing() {
        let (outcome, msgs) = run("true", config()).await;
        assert_eq!(outcome.exit_code, 0);
        assert!(msgs.is_empty());
    }

    #[tokio::test]
    async fn output_written_just_before_exit_is_kept() {
        let (_, msgs) = run("i=0; while [ $i -lt 200 ]; do echo line$i; i=$((i+1)); done", config()).await;
        let all = text(&msgs);
        assert_eq!(all.lines().count(), 200);
        assert!(all.ends_with("line199\n"));
    }

    #[tokio::test]
    async fn heartbeats_fill_silence() {
        let cfg = PumpConfig {
            heartbeat: Duration::from_millis(50),
            ..config()
        };
        let (_, msgs) = run("sleep 0.3; echo done", cfg).await;
        assert!(msgs.iter().any(OutputMessage::is_heartbeat));
        assert_eq!(text(&msgs), "done\n");
    }

    #[tokio::test]
    async fn relayed_stdin_reaches_the_child_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = Arc::new(ProcessRegistry::new());
        let line = "read a; read b; echo \"$a-$b\"";
        let reg = registry.register("u", line).await;
        let id = reg.id.clone();
        let process = launcher().spawn(line, tmp.path()).unwrap();

        registry
            .send_input("u", &id, Bytes::from_static(b"first\n"))
            .await
            .unwrap();
        registry
            .send_input("u", &id, Bytes::from_static(b"second\n"))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        let outcome = pump(process, reg.relay, reg.interrupt_rx, &tx, config()).await;
        drop(tx);
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(rx.recv().await, Some(OutputMessage::output("first-second\n")));
    }

    #[tokio::test]
    async fn eot_after_a_line_ends_input() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::new();
        let reg = registry.register("u", "wc -c").await;
        let process = launcher().spawn("wc -c", tmp.path()).unwrap();

        registry
            .send_input("u", &reg.id, Bytes::from_static(b"abc\n"))
            .await
            .unwrap();
        registry
            .send_input("u", &reg.id, Bytes::from_static(b"\x04"))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            pump(process, reg.relay, reg.interrupt_rx, &tx, config()),
        )
        .await
        .expect("wc should see end of input");
        drop(tx);
        let mut msgs = Vec::new();
        while let Some(msg) = rx.recv().await {
            msgs.push(msg);
        }
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(text(&msgs).trim(), "4");
    }

    #[tokio::test]
    async fn large_paste_into_cat_stays_interruptible() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::new();
        let reg = registry.register("u", "cat").await;
        let id = reg.id.clone();
        let process = launcher().spawn("cat", tmp.path()).unwrap();

        let line = format!("{}\n", "x".repeat(1023));
        let paste = Bytes::from(line.repeat(1024));
        registry.send_input("u", &id, paste.clone()).await.unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        let Registration {
            relay,
            interrupt_rx,
            ..
        } = reg;
        let pumping =
            tokio::spawn(async move { pump(process, relay, interrupt_rx, &tx, config()).await });

        let mut echoed = 0;
        tokio::time::timeout(Duration::from_secs(10), async {
            while echoed < paste.len() {
                match rx.recv().await {
                    Some(OutputMessage::Output { data }) => echoed += data.len(),
                    Some(_) => {}
                    None => break,
                }
            }
        })
        .await
        .expect("cat should echo the whole paste");
        assert_eq!(echoed, paste.len());

        registry.interrupt("u", &id).await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(10), async {
            while rx.recv().await.is_some() {}
            pumping.await.unwrap()
        })
        .await
        .expect("pump should stop after interrupt");
        assert!(outcome.interrupted);
        assert_eq!(outcome.exit_code, 128 + 9);
    }

    #[tokio::test]
    async fn interrupt_kills_the_group() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::new();
        let reg = registry.register("u", "sleep 30").await;
        let process = launcher().spawn("sleep 30", tmp.path()).unwrap();
        registry.interrupt("u", &reg.id).await.unwrap();

        let (tx, _rx) = mpsc::channel(64);
        let started = std::time::Instant::now();
        let outcome = pump(process, reg.relay, reg.interrupt_rx, &tx, config()).await;
        assert!(outcome.interrupted);
        assert_eq!(outcome.exit_code, 128 + 9);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn disconnect_kills_under_kill_policy() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::new();
        let reg = registry.register("u", "sleep 30").await;
        let process = launcher().spawn("sleep 30", tmp.path()).unwrap();

        let (tx, rx) = mpsc::channel(64);
        drop(rx);
        let outcome = pump(process, reg.relay, reg.interrupt_rx, &tx, config()).await;
        assert!(outcome.disconnected);
        assert_ne!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn detached_commands_run_to_completion() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("marker");
        let line = format!("sleep 0.2; touch '{}'", marker.display());
        let registry = ProcessRegistry::new();
        let reg = registry.register("u", &line).await;
        let process = launcher().spawn(&line, tmp.path()).unwrap();

        let (tx, rx) = mpsc::channel(64);
        drop(rx);
        let cfg = PumpConfig {
            on_disconnect: DisconnectPolicy::Detach,
            ..config()
        };
        let outcome = pump(process, reg.relay, reg.interrupt_rx, &tx, cfg).await;
        assert!(outcome.disconnected);
        assert_eq!(outcome.exit_code, 0);
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn background_children_do_not_hold_the_stream_open() {
        let started = std::time::Instant::now();
        let (outcome, msgs) = run("sleep 30 & echo started", config()).await;
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(text(&msgs), "started\n");
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
