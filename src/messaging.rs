//! Completion channel between an isolated test and the coordinator.
//!
//! Each leaf test sends exactly one [`Tally`] through an [`Outbox`] just before its context
//! ends. The coordinator polls the matching [`Inbox`] without blocking; `None` means the context
//! never got that far.
//!
//! Two transports share the same shape:
//!
//! - local: a bounded in-memory channel, for thread and inline contexts
//! - pipe: one tagged JSON line on the child process's stdout, picked out of the stream by the
//!   coordinator while it forwards everything else

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};

use crate::reporter::Tally;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Addresses one completion message: the coordinator's process id plus a per-process sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    pid: u32,
    sequence: u64,
}

impl Tag {
    /// A tag no other context of this coordinator has used.
    pub fn unique() -> Self {
        Self {
            pid: std::process::id(),
            sequence: SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn marker(&self) -> String {
        format!("@@trellis:{}:{}@@ ", self.pid, self.sequence)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pid, self.sequence)
    }
}

impl FromStr for Tag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pid, sequence) = s.split_once('.').ok_or(())?;
        Ok(Self {
            pid: pid.parse().map_err(|_| ())?,
            sequence: sequence.parse().map_err(|_| ())?,
        })
    }
}

/// Open an in-memory channel for a context living in this process.
pub fn open(tag: Tag) -> (Outbox, Inbox) {
    let (sender, receiver) = mpsc::sync_channel(1);
    tracing::trace!(%tag, "opened local completion channel");
    (Outbox::Local(sender), Inbox::Local(receiver))
}

/// Open the receiving end for a child process's stdout.
pub fn open_pipe(tag: Tag) -> Inbox {
    Inbox::Pipe {
        marker: tag.marker(),
        pending: VecDeque::new(),
    }
}

/// Sending end. Consumed by [`Outbox::send`], so a context sends at most once.
#[derive(Debug)]
pub enum Outbox {
    Local(SyncSender<Tally>),
    Pipe(Tag),
}

impl Outbox {
    /// The sending end inside a child process, writing to its own stdout.
    pub fn to_stdout(tag: Tag) -> Self {
        Outbox::Pipe(tag)
    }

    pub fn send(self, tally: Tally) -> io::Result<()> {
        match self {
            // A full or closed channel means nobody is waiting any more.
            Outbox::Local(sender) => {
                let _ = sender.try_send(tally);
                Ok(())
            }
            Outbox::Pipe(tag) => {
                let line = encode(&tag.marker(), tally)?;
                let stdout = io::stdout();
                let mut out = stdout.lock();
                writeln!(out, "{}", line)?;
                out.flush()
            }
        }
    }
}

#[derive(Debug)]
pub enum Inbox {
    Local(Receiver<Tally>),
    Pipe { marker: String, pending: VecDeque<Tally> },
}

impl Inbox {
    /// Offer one line of child output.
    ///
    /// Returns `None` when the line carries no completion message and must be forwarded as is.
    /// Otherwise the message is taken and whatever the test printed ahead of it on the same
    /// line, without a trailing newline, is returned for forwarding.
    pub fn absorb<'l>(&mut self, line: &'l str) -> Option<&'l str> {
        let Inbox::Pipe { marker, pending } = self else {
            return None;
        };
        let start = line.find(marker.as_str())?;
        let (printed, message) = line.split_at(start);
        match serde_json::from_str::<Tally>(&message[marker.len()..]) {
            Ok(tally) => pending.push_back(tally),
            Err(err) => tracing::warn!(error = %err, "discarding malformed completion message"),
        }
        Some(printed)
    }

    pub fn try_receive(&mut self) -> Option<Tally> {
        match self {
            Inbox::Local(receiver) => match receiver.try_recv() {
                Ok(tally) => Some(tally),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
            },
            Inbox::Pipe { pending, .. } => pending.pop_front(),
        }
    }
}

fn encode(marker: &str, tally: Tally) -> io::Result<String> {
    let payload = serde_json::to_string(&tally).map_err(io::Error::other)?;
    Ok(format!("{}{}", marker, payload))
}
