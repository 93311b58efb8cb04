use std::ops::{BitOr, BitOrAssign};
use std::os::fd::RawFd;

use crate::client::Burrow;
use crate::command::Command;
use crate::error::{Error, Result};

pub mod dummy;
pub mod http;
pub mod memory;

/// What a backend call accomplished.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Progress {
    /// The current command is finished; the handle may return to idle.
    Complete,
    /// More I/O is required. The backend has registered the file
    /// descriptors it is waiting on via [`Burrow::watch_fd`].
    Blocked,
}

/// I/O interest bits carried by fd registrations and event notifications.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IoEvent {
    read: bool,
    write: bool,
}

impl IoEvent {
    pub const NONE: IoEvent = IoEvent { read: false, write: false };
    pub const READ: IoEvent = IoEvent { read: true, write: false };
    pub const WRITE: IoEvent = IoEvent { read: false, write: true };

    pub fn is_none(self) -> bool {
        !self.read && !self.write
    }

    pub fn read(self) -> bool {
        self.read
    }

    pub fn write(self) -> bool {
        self.write
    }
}

impl BitOr for IoEvent {
    type Output = IoEvent;

    fn bitor(self, rhs: IoEvent) -> IoEvent {
        IoEvent {
            read: self.read || rhs.read,
            write: self.write || rhs.write,
        }
    }
}

impl BitOrAssign for IoEvent {
    fn bitor_assign(&mut self, rhs: IoEvent) {
        *self = *self | rhs;
    }
}

/// A command-set implementation the front-end can drive.
///
/// The front-end is the sole caller. It invokes exactly one command entry
/// point per issued command, passing itself as the hook surface: backends
/// report elements through [`Burrow::emit_message`] / [`Burrow::emit_queue`]
/// / [`Burrow::emit_account`], log through [`Burrow::log`], and register
/// I/O interest through [`Burrow::watch_fd`].
///
/// A backend must never block. When a call cannot finish without waiting it
/// registers the fds it needs and returns [`Progress::Blocked`]; the
/// front-end calls [`Backend::event_raised`] once a watched fd is live and
/// [`Backend::process`] to continue the work.
///
/// The default `process`/`event_raised` implementations complete
/// immediately, which is correct for backends whose commands never block
/// (see [`dummy`] and [`memory`]).
pub trait Backend {
    /// Short name, as accepted by [`create_backend`].
    fn name(&self) -> &'static str;

    /// Applies one string option. Unknown keys are rejected with
    /// [`Error::InvalidArgument`].
    fn set_option(&mut self, key: &str, _value: &str) -> Result<()> {
        let _ = key;
        Err(Error::InvalidArgument("option"))
    }

    /// Abandons the current command. The backend must be idle and reusable
    /// afterwards; any fds it registered are forgotten by the front-end.
    fn cancel(&mut self, _fe: &mut Burrow) {}

    /// Continues whichever command last returned [`Progress::Blocked`].
    fn process(&mut self, _fe: &mut Burrow) -> Result<Progress> {
        Ok(Progress::Complete)
    }

    /// Notification that a watched fd came live. Work should happen in
    /// [`Backend::process`], not here.
    fn event_raised(
        &mut self,
        _fe: &mut Burrow,
        _fd: RawFd,
        _event: IoEvent,
    ) -> Result<Progress> {
        Ok(Progress::Complete)
    }

    fn create_message(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress>;

    fn get_message(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress>;

    fn update_message(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress>;

    fn delete_message(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress>;

    fn get_messages(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress>;

    fn update_messages(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress>;

    fn delete_messages(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress>;

    fn get_queues(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress>;

    fn delete_queues(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress>;

    fn get_accounts(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress>;

    fn delete_accounts(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress>;
}

/// Instantiates one of the built-in backends by name.
///
/// Out-of-tree backends skip this and hand a box straight to
/// [`Burrow::with_backend`].
pub fn create_backend(name: &str) -> Result<Box<dyn Backend>> {
    match name {
        "memory" => Ok(Box::new(memory::MemoryBackend::new())),
        "http" => Ok(Box::new(http::HttpBackend::new())),
        "dummy" => Ok(Box::new(dummy::DummyBackend::new())),
        _ => Err(Error::InvalidArgument("backend")),
    }
}
