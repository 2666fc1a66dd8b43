//! Encoder process supervision
//!
//! One supervisor task owns the child process for its whole life. It watches
//! stderr for fatal diagnostics, carries out stop requests and waits for the
//! exit, so nothing else ever signals or writes to the process.

use super::classifier::DiagnosticScanner;
use crate::capture::CapturePlatform;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, timeout, Instant};
use uuid::Uuid;

/// Command understood by FFmpeg on stdin as "finish the file and exit"
const QUIT_COMMAND: &[u8] = b"q\n";

/// How long to keep reading stderr after the exit for late diagnostics
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Requests from the manager to the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlMessage {
    Stop,
}

pub(crate) struct SupervisorContext {
    pub session_id: Uuid,
    pub platform: CapturePlatform,
    pub grace_period: Duration,
}

/// What the supervisor learned by the time the process was gone
#[derive(Debug)]
pub(crate) struct ProcessExit {
    /// Exit code and terminating signal
    pub status: std::io::Result<(Option<i32>, Option<i32>)>,
    /// Tail of the encoder's stderr
    pub diagnostics: String,
    /// Instructions for the fatal diagnostic that got the encoder killed
    pub live_failure: Option<&'static str>,
}

/// Spawn the encoder with all three standard streams piped
pub(crate) fn spawn_encoder(encoder_path: &Path, args: &[String]) -> std::io::Result<Child> {
    let mut command = Command::new(encoder_path);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Keep a terminal Ctrl+C away from the encoder; stopping is ours to do
    #[cfg(unix)]
    command.process_group(0);

    command.spawn()
}

/// Drive the encoder until it exits
///
/// Stopping is two-phase: the quit command is written to stdin and stdin is
/// closed, then the interrupt signal follows if the process is still alive
/// after the grace period. The pending escalation lives only inside this
/// loop, so an exit before the deadline discards it without a signal.
pub(crate) async fn supervise(
    mut child: Child,
    ctx: SupervisorContext,
    mut control_rx: mpsc::UnboundedReceiver<ControlMessage>,
) -> ProcessExit {
    let mut stdin = child.stdin.take();
    let mut stderr = child.stderr.take();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(log_stdout(stdout, ctx.session_id));
    }

    let mut scanner = DiagnosticScanner::new(ctx.platform.clone());
    let mut decoder = Utf8Decoder::default();
    let mut buf = vec![0u8; 4096];
    let mut live_failure: Option<&'static str> = None;
    let mut stop_requested = false;
    let mut control_open = true;
    let mut escalation: Option<Instant> = None;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,

            read = read_chunk(&mut stderr, &mut buf), if stderr.is_some() => match read {
                Ok(0) => stderr = None,
                Ok(n) => {
                    let text = decoder.decode(&buf[..n]);
                    tracing::debug!("FFmpeg: {}", text.trim_end());

                    if stop_requested || live_failure.is_some() {
                        scanner.capture(&text);
                        continue;
                    }

                    if let Some(signature) = scanner.feed(&text) {
                        tracing::error!(
                            "Session {}: FFmpeg reported \"{}\", killing the encoder",
                            ctx.session_id,
                            signature.pattern
                        );
                        live_failure = Some(signature.message);
                        escalation = None;
                        if let Err(e) = child.start_kill() {
                            tracing::warn!("Failed to kill FFmpeg: {}", e);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read FFmpeg stderr: {}", e);
                    stderr = None;
                }
            },

            message = control_rx.recv(), if control_open => match message {
                Some(ControlMessage::Stop) => {
                    if stop_requested || live_failure.is_some() {
                        continue;
                    }
                    stop_requested = true;

                    match stdin.take() {
                        Some(pipe) => match send_quit(pipe).await {
                            Ok(()) => {
                                tracing::info!(
                                    "Session {}: quit command sent, waiting up to {:?}",
                                    ctx.session_id,
                                    ctx.grace_period
                                );
                                escalation = Some(Instant::now() + ctx.grace_period);
                            }
                            Err(e) => {
                                tracing::warn!("Could not send quit command ({}), interrupting", e);
                                send_interrupt(&mut child);
                            }
                        },
                        None => send_interrupt(&mut child),
                    }
                }
                None => control_open = false,
            },

            _ = sleep_until(escalation.unwrap_or_else(Instant::now)), if escalation.is_some() => {
                escalation = None;
                tracing::info!(
                    "Session {}: FFmpeg still running after {:?}, interrupting",
                    ctx.session_id,
                    ctx.grace_period
                );
                send_interrupt(&mut child);
            }
        }
    };

    // A fatal diagnostic printed right before the exit may still be in the
    // pipe; it counts as seen while recording unless a stop was requested
    let scan_drained = !stop_requested && live_failure.is_none();

    if let Some(mut pipe) = stderr {
        let drained = timeout(STDERR_DRAIN_TIMEOUT, async {
            loop {
                match pipe.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let text = decoder.decode(&buf[..n]);
                        if scan_drained && live_failure.is_none() {
                            if let Some(signature) = scanner.feed(&text) {
                                tracing::error!(
                                    "Session {}: FFmpeg reported \"{}\" before exiting",
                                    ctx.session_id,
                                    signature.pattern
                                );
                                live_failure = Some(signature.message);
                            }
                        } else {
                            scanner.capture(&text);
                        }
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::debug!("Stopped draining FFmpeg stderr after {:?}", STDERR_DRAIN_TIMEOUT);
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        scanner.capture(&rest);
    }

    ProcessExit {
        status: status.map(|status| exit_parts(&status)),
        diagnostics: scanner.captured().to_string(),
        live_failure,
    }
}

/// Decodes stderr reads, holding back a multibyte character cut off at the
/// end of a read until the rest of it arrives
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let split = self.pending.len() - incomplete_tail(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        text
    }

    /// Whatever is still held back, decoded lossily
    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Length of a truncated UTF-8 sequence at the end of `bytes`
fn incomplete_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }

        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}

async fn read_chunk(stderr: &mut Option<ChildStderr>, buf: &mut [u8]) -> std::io::Result<usize> {
    match stderr {
        Some(pipe) => pipe.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn send_quit(mut stdin: ChildStdin) -> std::io::Result<()> {
    stdin.write_all(QUIT_COMMAND).await?;
    stdin.flush().await?;
    // Dropping the handle closes the pipe
    Ok(())
}

async fn log_stdout(stdout: ChildStdout, session_id: Uuid) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!("Session {} stdout: {}", session_id, line);
    }
}

/// Ask the encoder to stop as if Ctrl+C was pressed
fn send_interrupt(child: &mut Child) {
    #[cfg(unix)]
    {
        // None once the exit has been collected; the pid may belong to
        // another process by then
        let Some(pid) = child.id() else {
            return;
        };

        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
        if rc != 0 {
            tracing::warn!(
                "Failed to interrupt FFmpeg (pid {}): {}",
                pid,
                std::io::Error::last_os_error()
            );
        }
    }

    #[cfg(not(unix))]
    {
        // No console interrupt for a detached child; terminate instead and
        // let the ambiguous exit code be resolved from the file
        if let Err(e) = child.start_kill() {
            tracing::warn!("Failed to stop FFmpeg: {}", e);
        }
    }
}

fn exit_parts(status: &ExitStatus) -> (Option<i32>, Option<i32>) {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        (status.code(), status.signal())
    }

    #[cfg(not(unix))]
    {
        (status.code(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_character_is_held_until_complete() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "[0] Haut-parleurs intégrés".as_bytes();
        let cut = bytes.len() - "égrés".len() + 1;

        let first = decoder.decode(&bytes[..cut]);
        let second = decoder.decode(&bytes[cut..]);

        assert_eq!(first, "[0] Haut-parleurs int");
        assert_eq!(second, "égrés");
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_four_byte_character_across_three_reads() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "a🎧b".as_bytes();

        let mut text = decoder.decode(&bytes[..2]);
        text.push_str(&decoder.decode(&bytes[2..4]));
        text.push_str(&decoder.decode(&bytes[4..]));

        assert_eq!(text, "a🎧b");
    }

    #[test]
    fn test_invalid_bytes_are_not_held_back() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"ok\xff"), "ok\u{FFFD}");
        assert_eq!(decoder.decode(b"\xe2\x82"), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
