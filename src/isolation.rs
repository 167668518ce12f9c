//! Isolated execution contexts for leaf tests.
//!
//! Three mechanisms, in order of preference:
//!
//! 1. **Process**: the current executable is launched again with the `TRELLIS_CHILD_*`
//!    variables set. The child rebuilds the same suite, walks the index path to one leaf, runs
//!    it, prints its completion line and exits. Crashes, aborts and hangs stay in the child.
//! 2. **Thread**: the leaf runs on a scoped thread; a panic ends the thread, not the run.
//! 3. **Inline**: the leaf runs on the coordinator's own stack. Nothing is contained.
//!
//! The coordinator never shares memory with a process context. Everything it learns about the
//! leaf arrives through [`messaging`](crate::messaging).

use std::env;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::IsolationMode;
use crate::error::{RunError, RunResult};
use crate::messaging::{self, Inbox, Outbox, Tag};
use crate::reporter::Tally;

pub const CHILD_TAG_ENV: &str = "TRELLIS_CHILD_TAG";
pub const CHILD_PATH_ENV: &str = "TRELLIS_CHILD_PATH";
pub const CHILD_SUITE_ENV: &str = "TRELLIS_CHILD_SUITE";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

static CHILD_ROLE_CLAIMED: AtomicBool = AtomicBool::new(false);
static DEADLINE_GENERATION: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mechanism {
    Process(PathBuf),
    Thread,
    Inline,
}

impl Mechanism {
    pub(crate) fn resolve(mode: IsolationMode) -> RunResult<Self> {
        match mode {
            IsolationMode::Process => env::current_exe()
                .map(Mechanism::Process)
                .map_err(RunError::CurrentExe),
            IsolationMode::Auto => match env::current_exe() {
                Ok(exe) => Ok(Mechanism::Process(exe)),
                Err(err) => {
                    tracing::debug!(error = %err, "current executable unavailable, isolating with threads");
                    Ok(Mechanism::Thread)
                }
            },
            IsolationMode::Thread => Ok(Mechanism::Thread),
            IsolationMode::Inline => Ok(Mechanism::Inline),
        }
    }
}

/// What a freshly launched process should do with the suite it is about to run.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Role {
    /// Run the suite normally.
    Coordinator,
    /// Run the single leaf at `path` and exit.
    Child { tag: Tag, path: Vec<usize> },
    /// A child process launched for a different suite; skip this one.
    Bystander,
}

impl Role {
    /// Decide this process's role for `suite`.
    ///
    /// The child role is claimed at most once per process, so a suite run from inside a leaf
    /// test coordinates normally.
    pub(crate) fn for_suite(suite: &str) -> Self {
        if CHILD_ROLE_CLAIMED.load(Ordering::SeqCst) {
            return Role::Coordinator;
        }
        Self::from_lookup(suite, |key| env::var(key).ok())
    }

    fn from_lookup(suite: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let (Some(tag), Some(path), Some(target)) = (
            lookup(CHILD_TAG_ENV),
            lookup(CHILD_PATH_ENV),
            lookup(CHILD_SUITE_ENV),
        ) else {
            return Role::Coordinator;
        };
        if target != suite {
            return Role::Bystander;
        }
        let (Ok(tag), Some(path)) = (tag.parse::<Tag>(), parse_path(&path)) else {
            tracing::warn!(%tag, %path, "ignoring malformed child role");
            return Role::Coordinator;
        };
        CHILD_ROLE_CLAIMED.store(true, Ordering::SeqCst);
        Role::Child { tag, path }
    }
}

fn format_path(path: &[usize]) -> String {
    path.iter().map(usize::to_string).collect::<Vec<_>>().join(".")
}

fn parse_path(text: &str) -> Option<Vec<usize>> {
    text.split('.').map(|index| index.parse().ok()).collect()
}

/// Where a process context should go once it has rebuilt the suite.
pub(crate) struct ChildLaunch<'a> {
    pub exe: &'a PathBuf,
    pub suite: &'a str,
    pub test: &'a str,
    pub path: &'a [usize],
    pub timeout: Option<Duration>,
}

/// Run one leaf in a child process and return its completion message, if it sent one.
#[tracing::instrument(skip_all, fields(test = launch.test, path = %format_path(launch.path)))]
pub(crate) fn run_in_process(launch: &ChildLaunch<'_>) -> RunResult<Option<Tally>> {
    let tag = Tag::unique();
    let mut child = Command::new(launch.exe)
        .args(env::args_os().skip(1))
        .env(CHILD_TAG_ENV, tag.to_string())
        .env(CHILD_PATH_ENV, format_path(launch.path))
        .env(CHILD_SUITE_ENV, launch.suite)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|source| RunError::Spawn {
            test: launch.test.to_owned(),
            source,
        })?;
    tracing::debug!(pid = child.id(), %tag, "launched child");

    let interrupts = InterruptGuard::ignore();
    let relay = child.stdout.take().map(|stdout| {
        let inbox = messaging::open_pipe(tag);
        thread::spawn(move || relay_output(stdout, inbox))
    });

    let status = wait_for(&mut child, launch.timeout);
    drop(interrupts);
    let status = status.map_err(|source| RunError::Wait {
        test: launch.test.to_owned(),
        source,
    })?;
    tracing::debug!(%status, "child exited");

    let mut inbox = match relay.map(thread::JoinHandle::join) {
        Some(Ok(inbox)) => inbox,
        _ => return Ok(None),
    };
    Ok(inbox.try_receive())
}

/// Forward the child's output line by line, keeping back its completion message.
fn relay_output(stdout: impl io::Read, mut inbox: Inbox) -> Inbox {
    let reader = BufReader::new(stdout);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        let forward = match inbox.absorb(&line) {
            None => line.as_str(),
            Some(printed) => printed,
        };
        if !forward.is_empty() {
            let mut out = io::stdout().lock();
            let _ = writeln!(out, "{}", forward);
            let _ = out.flush();
        }
    }
    inbox
}

fn wait_for(child: &mut Child, timeout: Option<Duration>) -> io::Result<ExitStatus> {
    let Some(timeout) = timeout else {
        return child.wait();
    };
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            tracing::warn!(pid = child.id(), ?timeout, "test timed out, killing it");
            if let Err(err) = child.kill() {
                tracing::debug!(error = %err, "kill after timeout failed");
            }
            return child.wait();
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Run one leaf on its own thread. A panic is contained and reads as no message.
pub(crate) fn run_in_thread<F>(test: &str, body: F) -> RunResult<Option<Tally>>
where
    F: FnOnce(Outbox) + Send,
{
    let (outbox, mut inbox) = messaging::open(Tag::unique());
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name(format!("trellis:{}", test))
            .spawn_scoped(scope, move || body(outbox))
            .map_err(|source| RunError::Spawn {
                test: test.to_owned(),
                source,
            })?;
        if handle.join().is_err() {
            tracing::debug!(test, "test thread panicked");
        }
        Ok::<_, RunError>(())
    })?;
    Ok(inbox.try_receive())
}

/// Run one leaf directly.
pub(crate) fn run_inline<F>(body: F) -> Option<Tally>
where
    F: FnOnce(Outbox),
{
    let (outbox, mut inbox) = messaging::open(Tag::unique());
    body(outbox);
    inbox.try_receive()
}

/// Hard deadline for the current process.
///
/// After `after` has elapsed the process exits with status 0, whatever it is doing. Calling
/// again replaces the previous deadline.
pub fn die_in(after: Duration) {
    let generation = DEADLINE_GENERATION.fetch_add(1, Ordering::SeqCst) + 1;
    let watchdog = thread::Builder::new().name("trellis:die-in".to_owned()).spawn(move || {
        thread::sleep(after);
        if DEADLINE_GENERATION.load(Ordering::SeqCst) == generation {
            tracing::warn!(?after, "deadline reached, exiting");
            let _ = io::stdout().flush();
            std::process::exit(0);
        }
    });
    if let Err(err) = watchdog {
        tracing::warn!(error = %err, "could not arm deadline");
    }
}

/// Ignores SIGINT while a child process runs; the previous disposition comes back on drop.
#[cfg(unix)]
struct InterruptGuard {
    previous: Option<nix::sys::signal::SigHandler>,
}

#[cfg(unix)]
impl InterruptGuard {
    fn ignore() -> Self {
        use nix::sys::signal::{SigHandler, Signal, signal};

        // SAFETY: SigIgn runs no code in the handler; nothing else in the crate installs one.
        #[allow(unsafe_code)]
        let previous = unsafe { signal(Signal::SIGINT, SigHandler::SigIgn) };
        match previous {
            Ok(previous) => Self {
                previous: Some(previous),
            },
            Err(err) => {
                tracing::warn!(error = %err, "could not ignore interrupts while waiting");
                Self { previous: None }
            }
        }
    }
}

#[cfg(unix)]
impl Drop for InterruptGuard {
    fn drop(&mut self) {
        use nix::sys::signal::{Signal, signal};

        if let Some(previous) = self.previous.take() {
            // SAFETY: restores the disposition that was in place before `ignore`.
            #[allow(unsafe_code)]
            let restored = unsafe { signal(Signal::SIGINT, previous) };
            if let Err(err) = restored {
                tracing::warn!(error = %err, "could not restore interrupt handling");
            }
        }
    }
}

#[cfg(not(unix))]
struct InterruptGuard;

#[cfg(not(unix))]
impl InterruptGuard {
    fn ignore() -> Self {
        InterruptGuard
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&'static str, String)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<&str, String> = pairs.iter().cloned().collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn paths_round_trip() {
        assert_eq!(format_path(&[1, 0, 12]), "1.0.12");
        assert_eq!(parse_path("1.0.12"), Some(vec![1, 0, 12]));
        assert_eq!(parse_path("1..2"), None);
    }

    #[test]
    fn role_without_variables_is_coordinator() {
        assert_eq!(Role::from_lookup("all", lookup(&[])), Role::Coordinator);
    }

    #[test]
    fn role_for_another_suite_is_bystander() {
        let vars = [
            (CHILD_TAG_ENV, "10.3".to_owned()),
            (CHILD_PATH_ENV, "0".to_owned()),
            (CHILD_SUITE_ENV, "other".to_owned()),
        ];
        assert_eq!(Role::from_lookup("all", lookup(&vars)), Role::Bystander);
    }

    #[test]
    fn role_for_this_suite_is_child() {
        let vars = [
            (CHILD_TAG_ENV, "10.3".to_owned()),
            (CHILD_PATH_ENV, "1.0".to_owned()),
            (CHILD_SUITE_ENV, "all".to_owned()),
        ];
        match Role::from_lookup("all", lookup(&vars)) {
            Role::Child { tag, path } => {
                assert_eq!(tag.to_string(), "10.3");
                assert_eq!(path, [1, 0]);
            }
            other => panic!("unexpected role {:?}", other),
        }
        // Claimed once; later suites in this process coordinate.
        assert_eq!(Role::for_suite("all"), Role::Coordinator);
    }

    #[test]
    fn inline_body_reports_through_the_channel() {
        let delta = Tally {
            passes: 2,
            failures: 0,
            exceptions: 0,
        };
        assert_eq!(run_inline(|outbox| outbox.send(delta).unwrap()), Some(delta));
        assert_eq!(run_inline(drop), None);
    }

    #[test]
    fn thread_panic_is_contained() {
        let received = run_in_thread("explodes", |_outbox| panic!("boom")).unwrap();
        assert_eq!(received, None);
    }

    #[test]
    fn thread_body_can_borrow_from_the_caller() {
        let mut seen = Vec::new();
        let received = run_in_thread("borrows", |outbox| {
            seen.push("ran");
            outbox.send(Tally::ZERO).unwrap();
        })
        .unwrap();
        assert_eq!(received, Some(Tally::ZERO));
        assert_eq!(seen, ["ran"]);
    }
}
