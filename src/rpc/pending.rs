//! Correlation table for outstanding commands.
//!
//! Ids are allocated strictly increasing, so the `BTreeMap` order is the
//! registration order and the first entry is always the oldest command.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use serde_json::Value;

use crate::error::{ClientError, Result};

/// Single-assignment completion slot of one command.
pub(crate) type CommandSlot = Signal<NoopRawMutex, Result<Value>>;

/// Outstanding commands keyed by correlation id.
#[derive(Default)]
pub(crate) struct PendingTable {
    entries: BTreeMap<u64, Rc<CommandSlot>>,
}

impl PendingTable {
    pub fn insert(&mut self, id: u64) -> Rc<CommandSlot> {
        let slot = Rc::new(CommandSlot::new());
        self.entries.insert(id, Rc::clone(&slot));
        slot
    }

    pub fn take(&mut self, id: u64) -> Option<Rc<CommandSlot>> {
        self.entries.remove(&id)
    }

    pub fn take_oldest(&mut self) -> Option<(u64, Rc<CommandSlot>)> {
        self.entries.pop_first()
    }

    pub fn drain(&mut self) -> Vec<(u64, Rc<CommandSlot>)> {
        core::mem::take(&mut self.entries).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Future of one command's result.
///
/// Registration and transmission already happened when this value was
/// created; polling only waits for the settlement.  Dropping it does not
/// cancel anything on the remote side.
#[must_use = "the command result is only observable by awaiting it"]
pub struct PendingCommand {
    state: PendingState,
}

enum PendingState {
    Waiting { id: u64, slot: Rc<CommandSlot> },
    Settled(Option<Result<Value>>),
    Done,
}

impl PendingCommand {
    pub(crate) fn waiting(id: u64, slot: Rc<CommandSlot>) -> Self {
        Self {
            state: PendingState::Waiting { id, slot },
        }
    }

    pub(crate) fn settled(result: Result<Value>) -> Self {
        Self {
            state: PendingState::Settled(Some(result)),
        }
    }

    /// Correlation id, or `None` if the command never reached the channel.
    pub fn id(&self) -> Option<u64> {
        match self.state {
            PendingState::Waiting { id, .. } => Some(id),
            _ => None,
        }
    }
}

impl Future for PendingCommand {
    type Output = Result<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let ready = match &mut this.state {
            // `Signal::wait` keeps no state of its own, so a fresh waiter
            // per poll is equivalent to holding one.
            PendingState::Waiting { slot, .. } => match core::pin::pin!(slot.wait()).poll(cx) {
                Poll::Ready(result) => result,
                Poll::Pending => return Poll::Pending,
            },
            PendingState::Settled(result) => result.take().unwrap_or(Err(ClientError::Closed)),
            PendingState::Done => panic!("PendingCommand polled after completion"),
        };
        this.state = PendingState::Done;
        Poll::Ready(ready)
    }
}

impl core::fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PendingCommand")
            .field("id", &self.id())
            .finish()
    }
}
