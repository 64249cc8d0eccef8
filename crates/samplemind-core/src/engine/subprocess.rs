//! Out-of-process analysis engine
//!
//! Runs an external analysis program as a child process and talks to it over
//! stdin/stdout, one JSON object per line. A crashing or hanging analyzer
//! surfaces to the worker only as an error.
//!
//! # Wire format
//!
//! ```text
//! → {"id":7,"sample_rate":48000,"channels":[[0.0,0.1,...],[0.0,0.1,...]]}
//! ← {"id":7,"tempo_bpm":124.0,"key":"A minor","primary_genre":"house",...}
//! ← {"id":7,"error":"not enough signal"}
//! ```
//!
//! Requests are written by a dedicated writer thread and responses read by a
//! dedicated reader thread, both talking to the caller through channels, so
//! no call ever blocks on a pipe: each waits with `recv_timeout` until its
//! deadline. A response that arrives after its call timed out carries an old
//! id and is discarded.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use serde_json::Value;

use super::{AnalysisEngine, AnalysisRequest, EngineConnector, EngineError, EngineResult};
use crate::types::Sample;

/// How long the child gets to exit on its own after stdin closes, and how
/// long the pipe threads get to finish afterwards
const EXIT_GRACE_PERIOD: Duration = Duration::from_millis(250);

#[derive(Serialize)]
struct WireRequest<'a> {
    id: u64,
    sample_rate: u32,
    channels: Vec<&'a [Sample]>,
}

/// Connector that launches a fresh analysis process per pipeline run
#[derive(Debug, Clone)]
pub struct SubprocessConnector {
    program: PathBuf,
    args: Vec<String>,
}

impl SubprocessConnector {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl EngineConnector for SubprocessConnector {
    fn connect(&self) -> EngineResult<Box<dyn AnalysisEngine>> {
        let engine = SubprocessEngine::spawn(&self.program, &self.args)?;
        Ok(Box::new(engine))
    }
}

/// One serialized request line on its way to the child's stdin
struct OutgoingLine {
    id: u64,
    bytes: Vec<u8>,
}

/// Handle to a running analysis process
pub struct SubprocessEngine {
    label: String,
    child: Child,
    requests: Option<Sender<OutgoingLine>>,
    responses: Receiver<String>,
    /// Id of the last request fully written to the child's stdin
    written: Arc<AtomicU64>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    next_id: u64,
    /// Set once the child stopped reading requests and was killed
    wedged: bool,
    stopped: bool,
}

impl SubprocessEngine {
    /// Launch `program` with `args` and start its reader and writer threads
    pub fn spawn(program: &Path, args: &[String]) -> EngineResult<Self> {
        let label = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                EngineError::Unavailable(format!("failed to launch '{}': {}", program.display(), e))
            })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (stdin, stdout) = match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                kill_child(&mut child);
                return Err(EngineError::Unavailable(format!(
                    "'{}' started without piped stdio",
                    label
                )));
            }
        };

        let (line_tx, line_rx) = channel::unbounded();
        let reader_label = label.clone();
        let reader = thread::Builder::new()
            .name("analysis-engine-reader".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    match line {
                        Ok(line) if line.trim().is_empty() => continue,
                        Ok(line) => {
                            if line_tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            log::warn!("[{}] stdout read failed: {}", reader_label, e);
                            break;
                        }
                    }
                }
                log::debug!("[{}] stdout closed", reader_label);
            });

        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                kill_child(&mut child);
                return Err(EngineError::Unavailable(format!(
                    "failed to spawn reader thread: {}",
                    e
                )));
            }
        };

        let (request_tx, request_rx) = channel::unbounded::<OutgoingLine>();
        let written = Arc::new(AtomicU64::new(0));
        let writer_written = Arc::clone(&written);
        let writer_label = label.clone();
        let writer = thread::Builder::new()
            .name("analysis-engine-writer".to_string())
            .spawn(move || {
                let mut stdin = stdin;
                for line in request_rx.iter() {
                    if let Err(e) = stdin.write_all(&line.bytes).and_then(|_| stdin.flush()) {
                        log::warn!("[{}] stdin write failed: {}", writer_label, e);
                        break;
                    }
                    writer_written.store(line.id, Ordering::Release);
                }
                log::debug!("[{}] stdin closed", writer_label);
            });

        let writer = match writer {
            Ok(handle) => handle,
            Err(e) => {
                // The reader ends by itself once the killed child's stdout closes
                kill_child(&mut child);
                return Err(EngineError::Unavailable(format!(
                    "failed to spawn writer thread: {}",
                    e
                )));
            }
        };

        log::info!("Analysis engine process '{}' started (pid {})", label, child.id());

        Ok(Self {
            label,
            child,
            requests: Some(request_tx),
            responses: line_rx,
            written,
            reader: Some(reader),
            writer: Some(writer),
            next_id: 1,
            wedged: false,
            stopped: false,
        })
    }

    /// Hand a request line to the writer thread (never blocks)
    fn send_request(&mut self, id: u64, request: &AnalysisRequest<'_>) -> EngineResult<()> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| EngineError::Unavailable("engine already shut down".to_string()))?;

        let wire = WireRequest {
            id,
            sample_rate: request.sample_rate(),
            channels: request.channels(),
        };
        let mut bytes = serde_json::to_vec(&wire)
            .map_err(|e| EngineError::CallFailed(format!("failed to encode request: {}", e)))?;
        bytes.push(b'\n');

        requests.send(OutgoingLine { id, bytes }).map_err(|_| {
            EngineError::Unavailable(format!("engine process '{}' stopped accepting requests", self.label))
        })
    }

    /// Wait until `deadline` for the response tagged `id`, discarding stale ones
    fn await_response(&mut self, id: u64, deadline: Instant, timeout: Duration) -> EngineResult<Value> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(EngineError::Timeout(timeout));
            }

            let line = match self.responses.recv_timeout(remaining) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => return Err(EngineError::Timeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(EngineError::Unavailable(format!(
                        "engine process '{}' exited",
                        self.label
                    )))
                }
            };

            let mut response: Value = serde_json::from_str(&line)
                .map_err(|e| EngineError::Malformed(format!("invalid JSON: {}", e)))?;

            let object = response
                .as_object_mut()
                .ok_or_else(|| EngineError::Malformed("response is not an object".to_string()))?;

            let response_id = object
                .remove("id")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| EngineError::Malformed("response has no numeric id".to_string()))?;

            if response_id < id {
                log::debug!(
                    "[{}] discarding stale response {} (waiting for {})",
                    self.label,
                    response_id,
                    id
                );
                continue;
            }
            if response_id > id {
                return Err(EngineError::Malformed(format!(
                    "response id {} does not match request {}",
                    response_id, id
                )));
            }

            if let Some(error) = object.remove("error") {
                let reason = error
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string());
                return Err(EngineError::CallFailed(reason));
            }

            return Ok(response);
        }
    }
}

impl AnalysisEngine for SubprocessEngine {
    fn name(&self) -> &str {
        &self.label
    }

    /// Send one block and wait for its answer
    ///
    /// The whole call, sending included, is bounded by the request timeout.
    /// If the request could not even be written in that time the child has
    /// stopped reading; it is killed and every later call fails at once.
    fn analyze(&mut self, request: &AnalysisRequest<'_>) -> EngineResult<Value> {
        if self.wedged {
            return Err(EngineError::Unavailable(format!(
                "engine process '{}' was killed after it stopped reading requests",
                self.label
            )));
        }

        let deadline = Instant::now() + request.timeout();
        let id = self.next_id;
        self.next_id += 1;

        self.send_request(id, request)?;
        match self.await_response(id, deadline, request.timeout()) {
            Err(EngineError::Timeout(limit)) if self.written.load(Ordering::Acquire) < id => {
                log::error!(
                    "[{}] engine did not read request {} within {:?}, killing it",
                    self.label,
                    id,
                    limit
                );
                self.wedged = true;
                kill_child(&mut self.child);
                Err(EngineError::Timeout(limit))
            }
            other => other,
        }
    }

    fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        // Closing stdin is the polite stop signal; the writer drops it once
        // its queue is empty
        drop(self.requests.take());

        let deadline = Instant::now() + EXIT_GRACE_PERIOD;
        let exited = loop {
            match self.child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(5)),
                Ok(None) => break None,
                Err(e) => {
                    log::warn!("[{}] failed to poll engine process: {}", self.label, e);
                    break None;
                }
            }
        };

        match exited {
            Some(status) => log::info!("Analysis engine '{}' exited ({})", self.label, status),
            None => {
                log::warn!("Analysis engine '{}' did not exit, killing it", self.label);
                kill_child(&mut self.child);
            }
        }

        let deadline = Instant::now() + EXIT_GRACE_PERIOD;
        if let Some(writer) = self.writer.take() {
            join_until(&self.label, "writer", writer, deadline);
        }
        if let Some(reader) = self.reader.take() {
            join_until(&self.label, "reader", reader, deadline);
        }
    }
}

impl Drop for SubprocessEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn kill_child(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Join a pipe thread, detaching it if it is still blocked at `deadline`
///
/// A grandchild that inherited the pipes can keep them open after the child
/// itself is gone.
fn join_until(label: &str, role: &str, handle: JoinHandle<()>, deadline: Instant) {
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    if handle.is_finished() {
        let _ = handle.join();
    } else {
        log::warn!("[{}] {} thread still blocked on the pipe, detaching it", label, role);
    }
}
