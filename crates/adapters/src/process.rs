// SPDX-License-Identifier: MIT

//! pty-backed child process supervision (§4.E).
//!
//! Spawns the child behind a pty, owns its Sanitizer/RotatingLineLogger/
//! Extractor/Broadcaster exclusively, and exposes the control surface
//! (`pause`/`resume`/`send_signal`/`send_input`/`stop`/`wait`) callable
//! concurrently with the reader fiber. Cancellation follows the same
//! oneshot-shutdown-channel shape `agent::watcher::start_watcher` uses.

use crate::broadcaster::Broadcaster;
use crate::error::ProcessError;
use crate::logger::RotatingLineLogger;
use crate::policy::PolicyCheck;
use corral_core::{
    Agent, AgentId, AgentState, Clock, Event, EventPayload, Extracted, Extractor, PatternSet,
    Sanitizer, SessionId, Stream as ExtractStream,
};
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex as AsyncMutex};

/// A spawn request: everything `ProcessWrapper::start` needs that the caller
/// (daemon's create-agent operation) controls.
pub struct SpawnRequest {
    pub agent_id: AgentId,
    pub command: String,
    pub args: Vec<String>,
    pub environment: String,
    pub working_dir: PathBuf,
    pub env_vars: HashMap<String, String>,
    pub patterns: PatternSet,
    pub log_path: PathBuf,
    pub broadcaster_capacity: usize,
}

/// Observes lifecycle/storage side effects a `ProcessWrapper` produces.
/// Kept as a trait (rather than a direct dependency on `corral-storage`) so
/// this crate stays free of the persistence stack, matching the teacher's
/// `SessionAdapter`/`AgentAdapter` trait-at-the-seam style.
pub trait SessionRecorder: Send + Sync {
    fn create(&self, agent_name: &str, session_id: &SessionId, environment: &str, start_ms: u64);
    fn record_state(&self, session_id: &SessionId, state: AgentState, timestamp_ms: u64);
    fn complete(&self, session_id: &SessionId, exit_code: Option<i32>, lines_processed: u64, timestamp_ms: u64);
}

pub trait ExtractionSink: Send + Sync {
    fn save(&self, item: Extracted);
}

const CONTROL_GRACE_PERIOD: Duration = Duration::from_secs(5);
const LOG_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

impl<C: Clock> std::fmt::Debug for ProcessWrapper<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessWrapper")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

pub struct ProcessWrapper<C: Clock> {
    clock: C,
    agent: AsyncMutex<Agent>,
    session_id: SessionId,
    pty_master: AsyncMutex<Box<dyn portable_pty::MasterPty + Send>>,
    writer: AsyncMutex<Box<dyn Write + Send>>,
    child: AsyncMutex<Box<dyn portable_pty::Child + Send + Sync>>,
    logger: AsyncMutex<RotatingLineLogger>,
    extractor: AsyncMutex<Extractor>,
    broadcaster: Arc<Broadcaster>,
    recorder: Arc<dyn SessionRecorder>,
    lines_processed: AtomicU64,
    exit_code: AtomicI32,
    has_exited: AtomicBool,
    cancel_tx: AsyncMutex<Option<oneshot::Sender<()>>>,
}

impl<C: Clock> ProcessWrapper<C> {
    /// Allocates a pty, forks the child, records session-start, and spawns
    /// the reader fiber. Transitions `created -> starting -> running`.
    pub fn start(
        clock: C,
        req: SpawnRequest,
        policy: &PolicyCheck,
        recorder: Arc<dyn SessionRecorder>,
        sink: Arc<dyn ExtractionSink>,
    ) -> Result<Arc<Self>, ProcessError>
    where
        C: 'static,
    {
        policy.check(&req.command, &req.working_dir)?;

        let now = clock.now_ms();
        let mut agent = Agent::new(
            req.agent_id.clone(),
            req.command.clone(),
            req.args.clone(),
            req.environment.clone(),
            req.working_dir.clone(),
            now,
        );
        agent
            .transition(AgentState::Starting)
            .map_err(|e| ProcessError::Spawn(e))?;

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: 40,
                cols: 120,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ProcessError::PtyAlloc(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&req.command);
        cmd.args(&req.args);
        cmd.cwd(&req.working_dir);
        for (k, v) in &req.env_vars {
            cmd.env(k, v);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ProcessError::Spawn(e.to_string()))?;
        let pid = child.process_id();

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| ProcessError::PtyAlloc(e.to_string()))?;
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ProcessError::PtyAlloc(e.to_string()))?;

        agent.pid = pid;
        agent
            .transition(AgentState::Running)
            .map_err(|e| ProcessError::Spawn(e))?;

        let session_id = SessionId::for_agent_at(req.agent_id.as_str(), now);
        recorder.create(req.agent_id.as_str(), &session_id, &req.environment, now);
        recorder.record_state(&session_id, AgentState::Running, now);

        let logger = RotatingLineLogger::open(&req.log_path)?;
        let extractor = Extractor::new(req.patterns, session_id.clone(), req.agent_id.as_str().to_string());
        let broadcaster = Arc::new(Broadcaster::new(req.broadcaster_capacity));
        broadcaster.publish(Event::new(
            req.agent_id.as_str(),
            now,
            EventPayload::Connected {
                session_id: session_id.clone(),
            },
        ));

        let (cancel_tx, cancel_rx) = oneshot::channel();

        let wrapper = Arc::new(Self {
            clock,
            agent: AsyncMutex::new(agent),
            session_id,
            pty_master: AsyncMutex::new(pair.master),
            writer: AsyncMutex::new(writer),
            child: AsyncMutex::new(child),
            logger: AsyncMutex::new(logger),
            extractor: AsyncMutex::new(extractor),
            broadcaster,
            recorder: Arc::clone(&recorder),
            lines_processed: AtomicU64::new(0),
            exit_code: AtomicI32::new(i32::MIN),
            has_exited: AtomicBool::new(false),
            cancel_tx: AsyncMutex::new(Some(cancel_tx)),
        });

        spawn_reader_fiber(Arc::clone(&wrapper), reader, recorder, sink, cancel_rx);
        spawn_flush_fiber(Arc::clone(&wrapper));

        Ok(wrapper)
    }

    pub async fn agent_id(&self) -> AgentId {
        self.agent.lock().await.id.clone()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        Arc::clone(&self.broadcaster)
    }

    pub async fn state(&self) -> AgentState {
        self.agent.lock().await.state
    }

    /// A snapshot of the supervised-process record, for callers (the
    /// listener's `GetAgent`/`ListAgents` handlers) that need `pid`,
    /// `spawn_time_ms`, or `exit_code` alongside `state`.
    pub async fn snapshot(&self) -> Agent {
        self.agent.lock().await.clone()
    }

    /// Lines processed so far; updated live by the reader fiber, readable
    /// without contending the `agent` lock.
    pub fn lines_processed(&self) -> u64 {
        self.lines_processed.load(Ordering::SeqCst)
    }

    pub async fn log_path(&self) -> PathBuf {
        self.logger.lock().await.path().to_path_buf()
    }

    /// Sends `SIGSTOP`. Legal only in `running`.
    pub async fn pause(&self) -> Result<(), ProcessError> {
        let mut agent = self.agent.lock().await;
        if agent.state != AgentState::Running {
            return Err(ProcessError::IllegalOperation(agent.state.to_string(), "pause"));
        }
        let pid = agent.pid.ok_or_else(|| ProcessError::Signal("no pid".into()))?;
        send_unix_signal(pid, nix::sys::signal::Signal::SIGSTOP)?;
        agent.transition(AgentState::Paused).map_err(ProcessError::Spawn)?;
        self.announce_state(AgentState::Paused, self.clock.now_ms());
        Ok(())
    }

    /// Sends `SIGCONT`. Legal only in `paused`.
    pub async fn resume(&self) -> Result<(), ProcessError> {
        let mut agent = self.agent.lock().await;
        if agent.state != AgentState::Paused {
            return Err(ProcessError::IllegalOperation(agent.state.to_string(), "resume"));
        }
        let pid = agent.pid.ok_or_else(|| ProcessError::Signal("no pid".into()))?;
        send_unix_signal(pid, nix::sys::signal::Signal::SIGCONT)?;
        agent.transition(AgentState::Running).map_err(ProcessError::Spawn)?;
        self.announce_state(AgentState::Running, self.clock.now_ms());
        Ok(())
    }

    /// Forwards a signal without changing state (unless the child exits).
    pub async fn send_signal(&self, sig: nix::sys::signal::Signal) -> Result<(), ProcessError> {
        let agent = self.agent.lock().await;
        let pid = agent.pid.ok_or_else(|| ProcessError::Signal("no pid".into()))?;
        send_unix_signal(pid, sig)
    }

    /// Writes to the pty master. Legal only in `running`.
    pub async fn send_input(&self, bytes: &[u8]) -> Result<(), ProcessError> {
        {
            let agent = self.agent.lock().await;
            if agent.state != AgentState::Running {
                return Err(ProcessError::IllegalOperation(agent.state.to_string(), "send_input"));
            }
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// SIGTERM, escalating to SIGKILL after the grace period. Transitions to
    /// `completed` or `killed` based on exit status.
    pub async fn stop(&self) -> Result<(), ProcessError> {
        let pid = {
            let agent = self.agent.lock().await;
            agent.pid
        };
        if let Some(pid) = pid {
            let _ = send_unix_signal(pid, nix::sys::signal::Signal::SIGTERM);
        }

        let exited = tokio::time::timeout(CONTROL_GRACE_PERIOD, self.wait_internal()).await;
        let now = self.clock.now_ms();
        if exited.is_err() {
            if let Some(pid) = pid {
                let _ = send_unix_signal(pid, nix::sys::signal::Signal::SIGKILL);
            }
            self.wait_internal().await;
            let mut agent = self.agent.lock().await;
            let transitioned = agent.transition(AgentState::Killed).is_ok();
            drop(agent);
            if transitioned {
                self.announce_state(AgentState::Killed, now);
            }
        } else {
            let mut agent = self.agent.lock().await;
            let transitioned = !agent.state.is_terminal() && agent.transition(AgentState::Completed).is_ok();
            drop(agent);
            if transitioned {
                self.announce_state(AgentState::Completed, now);
            }
        }
        if let Some(tx) = self.cancel_tx.lock().await.take() {
            let _ = tx.send(());
        }
        Ok(())
    }

    /// Blocks until the child exits; returns the exit code.
    pub async fn wait(&self) -> Option<i32> {
        self.wait_internal().await;
        let code = self.exit_code.load(Ordering::SeqCst);
        if code == i32::MIN {
            None
        } else {
            Some(code)
        }
    }

    async fn wait_internal(&self) {
        if self.has_exited.load(Ordering::SeqCst) {
            return;
        }
        let mut child = self.child.lock().await;
        if let Ok(Some(status)) = child.try_wait() {
            self.exit_code.store(status.exit_code() as i32, Ordering::SeqCst);
            self.has_exited.store(true, Ordering::SeqCst);
            return;
        }
        // portable-pty's Child::wait is blocking; run it off the async
        // executor rather than stalling a worker thread's scheduler.
        drop(child);
        loop {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut child = self.child.lock().await;
            if let Ok(Some(status)) = child.try_wait() {
                self.exit_code.store(status.exit_code() as i32, Ordering::SeqCst);
                self.has_exited.store(true, Ordering::SeqCst);
                return;
            }
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Persists a `StateChange` row and broadcasts the new state, in that
    /// order — every caller here already holds the lock that made the
    /// in-memory transition legal.
    fn announce_state(&self, state: AgentState, now: u64) {
        self.recorder.record_state(&self.session_id, state, now);
        self.broadcaster.publish(Event::new(
            self.session_id.as_str(),
            now,
            EventPayload::State { session_id: self.session_id.clone(), state: state.to_string() },
        ));
    }

    /// Resize the pty. Safe to call at any point in the child's lifetime;
    /// a dead child simply ignores it.
    pub async fn resize(&self, rows: u16, cols: u16) -> Result<(), ProcessError> {
        let master = self.pty_master.lock().await;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ProcessError::PtyAlloc(e.to_string()))
    }
}

fn send_unix_signal(pid: u32, sig: nix::sys::signal::Signal) -> Result<(), ProcessError> {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), sig)
        .map_err(|e| ProcessError::Signal(e.to_string()))
}

/// Whether the process is still alive, cross-checked against pty-EOF
/// detection via `kill(pid, 0)` — the same redundancy
/// `watcher::is_alive`/`is_process_running` uses to avoid false "running"
/// reads when a process has been reparented.
pub fn is_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

fn spawn_reader_fiber<C: Clock + 'static>(
    wrapper: Arc<ProcessWrapper<C>>,
    mut reader: Box<dyn Read + Send>,
    recorder: Arc<dyn SessionRecorder>,
    sink: Arc<dyn ExtractionSink>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let (chunk_tx, mut chunk_rx) = tokio::sync::mpsc::channel::<Vec<u8>>(64);

    // Blocking pty reads happen on a dedicated thread; decoded chunks are
    // handed to the async pipeline over a channel.
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if chunk_tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    tokio::spawn(async move {
        let mut sanitizer = Sanitizer::new();
        let mut pending = Vec::new();
        let mut line_number: u64 = 0;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => break,
                chunk = chunk_rx.recv() => {
                    let Some(chunk) = chunk else { break };
                    let clean = sanitizer.process(&chunk);
                    pending.extend_from_slice(&clean);
                    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                        let line_bytes: Vec<u8> = pending.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1]).to_string();
                        line_number += 1;
                        wrapper.lines_processed.fetch_add(1, Ordering::SeqCst);
                        let now = wrapper.clock.now_ms();

                        {
                            let mut logger = wrapper.logger.lock().await;
                            let _ = logger.write_line(&line);
                        }
                        wrapper.broadcaster.publish(Event::new(
                            wrapper.session_id.as_str(),
                            now,
                            EventPayload::Log { stream: "combined".into(), line_number, line: line.clone() },
                        ));

                        let extracted = {
                            let mut extractor = wrapper.extractor.lock().await;
                            extractor.process(&line, line_number, now, ExtractStream::Combined)
                        };
                        for item in extracted {
                            publish_extracted(&wrapper, &sink, now, item);
                        }
                    }
                }
            }
        }

        // EOF or cancellation: flush remaining buffers and close out.
        let final_line_number = line_number;
        let now = wrapper.clock.now_ms();
        let unclosed = {
            let mut extractor = wrapper.extractor.lock().await;
            extractor.flush_eof(final_line_number, now)
        };
        if let Some(block) = unclosed {
            publish_extracted(&wrapper, &sink, now, Extracted::Block(block));
        }
        {
            let mut logger = wrapper.logger.lock().await;
            let _ = logger.close();
        }
        wrapper.wait_internal().await;
        let exit_code = wrapper.wait().await;
        {
            let mut agent = wrapper.agent.lock().await;
            agent.exit_code = exit_code;
            let transitioned = !agent.state.is_terminal() && agent.transition(AgentState::Completed).is_ok();
            let state = agent.state;
            drop(agent);
            if transitioned {
                recorder.record_state(&wrapper.session_id, state, now);
                wrapper.broadcaster.publish(Event::new(
                    wrapper.session_id.as_str(),
                    now,
                    EventPayload::State { session_id: wrapper.session_id.clone(), state: state.to_string() },
                ));
            }
        }
        recorder.complete(
            &wrapper.session_id,
            exit_code,
            wrapper.lines_processed.load(Ordering::SeqCst),
            now,
        );
    });
}

/// Commits the logger's write buffer every `LOG_FLUSH_INTERVAL` regardless of
/// line/byte thresholds, so a low-throughput agent's output still lands on
/// disk promptly (§4.B, §5's "one logger flush fiber"). Stops once the
/// reader fiber has observed the child exit.
fn spawn_flush_fiber<C: Clock + 'static>(wrapper: Arc<ProcessWrapper<C>>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LOG_FLUSH_INTERVAL);
        loop {
            interval.tick().await;
            if wrapper.has_exited.load(Ordering::SeqCst) {
                break;
            }
            let mut logger = wrapper.logger.lock().await;
            let _ = logger.flush();
        }
    });
}

fn publish_extracted<C: Clock>(
    wrapper: &Arc<ProcessWrapper<C>>,
    sink: &Arc<dyn ExtractionSink>,
    now: u64,
    item: Extracted,
) {
    let payload = match &item {
        Extracted::Event(e) => EventPayload::Extraction(e.clone()),
        Extracted::Block(b) => EventPayload::CodeBlock(b.clone()),
    };
    wrapper
        .broadcaster
        .publish(Event::new(wrapper.session_id.as_str(), now, payload));
    sink.save(item);
}
