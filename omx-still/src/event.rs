// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Per-component event notification.
//!
//! Components complete commands asynchronously: the backend signals an
//! [`EventChannel`] from whatever thread the hardware calls back on, and the
//! pipeline blocks on [`EventChannel::wait`] for the kinds it expects.

use std::sync::{Condvar, Mutex, MutexGuard};

use tracing::trace;

use crate::{Error, Result};

/// A set of asynchronous event kinds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventFlags(u32);

impl EventFlags {
    pub const NONE: EventFlags = EventFlags(0);
    /// A state-set command completed.
    pub const STATE_SET: EventFlags = EventFlags(1 << 0);
    /// A port-enable command completed.
    pub const PORT_ENABLE: EventFlags = EventFlags(1 << 1);
    /// A port-disable command completed.
    pub const PORT_DISABLE: EventFlags = EventFlags(1 << 2);
    /// An output port renegotiated its format.
    pub const PORT_SETTINGS_CHANGED: EventFlags = EventFlags(1 << 3);
    /// A parameter or config the caller asked to be notified about changed.
    pub const PARAM_OR_CONFIG_CHANGED: EventFlags = EventFlags(1 << 4);
    /// A buffer carried a flag (end of stream on the capture path).
    pub const BUFFER_FLAG: EventFlags = EventFlags(1 << 5);
    /// An output buffer was filled and handed back.
    pub const FILL_BUFFER_DONE: EventFlags = EventFlags(1 << 6);
    /// An input buffer was consumed and handed back.
    pub const EMPTY_BUFFER_DONE: EventFlags = EventFlags(1 << 7);

    const NAMES: [(EventFlags, &'static str); 8] = [
        (Self::STATE_SET, "STATE_SET"),
        (Self::PORT_ENABLE, "PORT_ENABLE"),
        (Self::PORT_DISABLE, "PORT_DISABLE"),
        (Self::PORT_SETTINGS_CHANGED, "PORT_SETTINGS_CHANGED"),
        (Self::PARAM_OR_CONFIG_CHANGED, "PARAM_OR_CONFIG_CHANGED"),
        (Self::BUFFER_FLAG, "BUFFER_FLAG"),
        (Self::FILL_BUFFER_DONE, "FILL_BUFFER_DONE"),
        (Self::EMPTY_BUFFER_DONE, "EMPTY_BUFFER_DONE"),
    ];

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every kind in `other` is set.
    pub const fn contains(self, other: EventFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if at least one kind in `other` is set.
    pub const fn intersects(self, other: EventFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn without(self, other: EventFlags) -> EventFlags {
        EventFlags(self.0 & !other.0)
    }
}

impl std::ops::BitOr for EventFlags {
    type Output = EventFlags;

    fn bitor(self, rhs: EventFlags) -> EventFlags {
        EventFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for EventFlags {
    fn bitor_assign(&mut self, rhs: EventFlags) {
        self.0 |= rhs.0;
    }
}

impl std::fmt::Debug for EventFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut set = f.debug_set();
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

#[derive(Default)]
struct Pending {
    flags: EventFlags,
    error: Option<u32>,
}

/// Event flag group owned by one component.
///
/// Signals accumulate until consumed. A wait returns as soon as any of the
/// requested kinds is pending, clears only those kinds, and reports the full
/// pending set as it was at wake-up. Waits never time out.
pub struct EventChannel {
    name: String,
    pending: Mutex<Pending>,
    cond: Condvar,
}

impl EventChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pending: Mutex::new(Pending::default()),
            cond: Condvar::new(),
        }
    }

    /// Name of the owning component, used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records `flags` and wakes any waiter.
    pub fn signal(&self, flags: EventFlags) {
        match self.pending.lock() {
            Ok(mut pending) => pending.flags |= flags,
            Err(poisoned) => poisoned.into_inner().flags |= flags,
        }
        trace!(component = %self.name, ?flags, "event signalled");
        self.cond.notify_all();
    }

    /// Records an error event. The next wait fails with [`Error::ComponentEvent`].
    pub fn signal_error(&self, code: u32) {
        match self.pending.lock() {
            Ok(mut pending) => pending.error = Some(code),
            Err(poisoned) => poisoned.into_inner().error = Some(code),
        }
        trace!(component = %self.name, code, "error event signalled");
        self.cond.notify_all();
    }

    /// Returns the currently pending kinds without consuming anything.
    pub fn pending(&self) -> Result<EventFlags> {
        Ok(self.lock()?.flags)
    }

    /// Blocks until any of `kinds` is pending.
    ///
    /// # Returns
    ///
    /// Every kind that was pending when the wait returned, including kinds that
    /// were not requested and therefore stay pending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ComponentEvent`] if the component reported an error
    /// event before the requested kinds arrived.
    pub fn wait(&self, kinds: EventFlags) -> Result<EventFlags> {
        let mut pending = self.lock()?;
        loop {
            if let Some(code) = pending.error.take() {
                return Err(Error::ComponentEvent {
                    component: self.name.clone(),
                    code,
                });
            }
            if pending.flags.intersects(kinds) {
                let retrieved = pending.flags;
                pending.flags = retrieved.without(kinds);
                return Ok(retrieved);
            }
            pending = self
                .cond
                .wait(pending)
                .map_err(|_| Error::Other(format!("event channel {} poisoned", self.name)))?;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Pending>> {
        self.pending
            .lock()
            .map_err(|_| Error::Other(format!("event channel {} poisoned", self.name)))
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
