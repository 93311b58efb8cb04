//! The client handle and its command state machine.
//!
//! A [`Burrow`] accepts one command at a time and drives its backend
//! through start → wait-on-I/O → ready → finish. Waiting happens either in
//! an internal `poll(2)` (the default) or in the caller's event loop when a
//! watch-fd callback is installed, in which case [`Burrow::process`]
//! returns [`Progress::Blocked`] and the caller is expected to report live
//! fds through [`Burrow::event_raised`].

use std::any::Any;
use std::fmt;
use std::io::ErrorKind;
use std::ops::BitOr;
use std::os::fd::RawFd;
use std::time::Duration;

use bytes::Bytes;

use crate::attributes::Attributes;
use crate::backend::{create_backend, Backend, IoEvent, Progress};
use crate::command::{Command, CommandKind};
use crate::error::{Error, Result};
use crate::filters::Filters;

/// Severity attached to log records, lowest to highest.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Verbosity {
    All,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    None,
}

impl Verbosity {
    pub fn name(self) -> &'static str {
        match self {
            Verbosity::All => "ALL",
            Verbosity::Debug => "DEBUG",
            Verbosity::Info => "INFO",
            Verbosity::Warn => "WARN",
            Verbosity::Error => "ERROR",
            Verbosity::Fatal => "FATAL",
            Verbosity::None => "NONE",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle options, composed with `|`.
///
/// `copy_strings` is accepted for surface compatibility but has no effect:
/// every command owns copies of its strings by construction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Options {
    pub autoprocess: bool,
    pub copy_strings: bool,
}

impl Options {
    pub const NONE: Options =
        Options { autoprocess: false, copy_strings: false };
    /// Drive [`Burrow::process`] from inside every issue call, so
    /// callbacks fire before the call returns.
    pub const AUTOPROCESS: Options =
        Options { autoprocess: true, copy_strings: false };
    pub const COPY_STRINGS: Options =
        Options { autoprocess: false, copy_strings: true };
}

impl BitOr for Options {
    type Output = Options;

    fn bitor(self, rhs: Options) -> Options {
        Options {
            autoprocess: self.autoprocess || rhs.autoprocess,
            copy_strings: self.copy_strings || rhs.copy_strings,
        }
    }
}

/// One received message, borrowed for the duration of the callback.
///
/// Any part can be absent: a raw-body response has no id, a listing at
/// detail=id has no body.
#[derive(Clone, Copy, Debug)]
pub struct MessageEvent<'a> {
    pub id: Option<&'a str>,
    pub body: Option<&'a [u8]>,
    pub attributes: Option<&'a Attributes>,
}

type MessageFn = Box<dyn FnMut(&mut Burrow, MessageEvent<'_>)>;
type NameFn = Box<dyn FnMut(&mut Burrow, &str)>;
type LogFn = Box<dyn FnMut(&mut Burrow, Verbosity, &str)>;
type CompleteFn = Box<dyn FnMut(&mut Burrow)>;
type WatchFdFn = Box<dyn FnMut(&mut Burrow, RawFd, IoEvent)>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Idle,
    Start,
    Waiting,
    Ready,
    Finish,
}

const DEFAULT_TIMEOUT_MS: i32 = 10_000;

/// A Burrow client handle. See the crate docs for the driving model.
pub struct Burrow {
    backend: Option<Box<dyn Backend>>,
    state: State,
    command: Option<Command>,
    options: Options,
    verbosity: Verbosity,
    timeout_ms: i32,
    processing: bool,
    watch: Vec<(RawFd, IoEvent)>,
    context: Option<Box<dyn Any>>,

    message_fn: Option<MessageFn>,
    queue_fn: Option<NameFn>,
    account_fn: Option<NameFn>,
    log_fn: Option<LogFn>,
    complete_fn: Option<CompleteFn>,
    watch_fd_fn: Option<WatchFdFn>,
}

impl Burrow {
    /// Creates a handle over one of the built-in backends: `"memory"`,
    /// `"http"`, or `"dummy"`.
    pub fn create(backend: &str) -> Result<Self> {
        Ok(Self::with_backend(create_backend(backend)?))
    }

    /// Creates a handle over a caller-provided backend.
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Burrow {
            backend: Some(backend),
            state: State::Idle,
            command: None,
            options: Options::NONE,
            verbosity: Verbosity::All,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            processing: false,
            watch: Vec::new(),
            context: None,
            message_fn: None,
            queue_fn: None,
            account_fn: None,
            log_fn: None,
            complete_fn: None,
            watch_fd_fn: None,
        }
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|b| b.name())
    }

    // ------------------------------------------------------- configuration

    pub fn set_options(&mut self, options: Options) {
        self.options = options;
    }

    pub fn add_options(&mut self, options: Options) {
        self.options = self.options | options;
    }

    pub fn remove_options(&mut self, options: Options) {
        if options.autoprocess {
            self.options.autoprocess = false;
        }
        if options.copy_strings {
            self.options.copy_strings = false;
        }
    }

    pub fn options(&self) -> Options {
        self.options
    }

    /// Log records below this level are discarded before reaching the log
    /// callback.
    pub fn set_verbosity(&mut self, verbosity: Verbosity) {
        self.verbosity = verbosity;
    }

    /// How long the internal poll waits before canceling the command.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout_ms =
            timeout.as_millis().min(i32::MAX as u128) as i32;
    }

    /// Forwards one string option to the backend.
    pub fn set_backend_option(&mut self, key: &str, value: &str) -> Result<()> {
        self.backend
            .as_mut()
            .ok_or(Error::InProgress)?
            .set_option(key, value)
    }

    /// Stores an arbitrary user value on the handle, retrievable from any
    /// callback via [`Burrow::context`].
    pub fn set_context<T: Any>(&mut self, context: T) {
        self.context = Some(Box::new(context));
    }

    pub fn context<T: Any>(&self) -> Option<&T> {
        self.context.as_deref().and_then(|c| c.downcast_ref())
    }

    pub fn context_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.context.as_deref_mut().and_then(|c| c.downcast_mut())
    }

    // ------------------------------------------------- callback registration

    pub fn set_message_fn(
        &mut self,
        callback: impl FnMut(&mut Burrow, MessageEvent<'_>) + 'static,
    ) {
        self.message_fn = Some(Box::new(callback));
    }

    pub fn set_queue_fn(
        &mut self,
        callback: impl FnMut(&mut Burrow, &str) + 'static,
    ) {
        self.queue_fn = Some(Box::new(callback));
    }

    pub fn set_account_fn(
        &mut self,
        callback: impl FnMut(&mut Burrow, &str) + 'static,
    ) {
        self.account_fn = Some(Box::new(callback));
    }

    /// Records are filtered by the verbosity threshold before reaching the
    /// callback. Without one, records go to `tracing` at the mapped level.
    pub fn set_log_fn(
        &mut self,
        callback: impl FnMut(&mut Burrow, Verbosity, &str) + 'static,
    ) {
        self.log_fn = Some(Box::new(callback));
    }

    /// Called exactly once per command, after its element callbacks, on
    /// success and on error alike, but not after [`Burrow::cancel`]. The
    /// handle is idle again, so the callback may issue the next command.
    pub fn set_complete_fn(
        &mut self,
        callback: impl FnMut(&mut Burrow) + 'static,
    ) {
        self.complete_fn = Some(Box::new(callback));
    }

    /// Hands fd-interest registrations to the caller's event loop instead
    /// of the internal poll. Once installed, [`Burrow::process`] never
    /// blocks: it returns [`Progress::Blocked`] and expects
    /// [`Burrow::event_raised`] when a registered fd fires.
    pub fn set_watch_fd_fn(
        &mut self,
        callback: impl FnMut(&mut Burrow, RawFd, IoEvent) + 'static,
    ) {
        self.watch_fd_fn = Some(Box::new(callback));
    }

    // ------------------------------------------------------------ commands

    pub fn create_message(
        &mut self,
        account: &str,
        queue: &str,
        message_id: &str,
        body: &[u8],
        attributes: Option<&Attributes>,
    ) -> Result<Progress> {
        self.check_idle("create_message")?;
        self.require("create_message", "account", account)?;
        self.require("create_message", "queue", queue)?;
        self.require("create_message", "message_id", message_id)?;
        self.issue(Command::CreateMessage {
            account: account.to_string(),
            queue: queue.to_string(),
            message_id: message_id.to_string(),
            body: Bytes::copy_from_slice(body),
            attributes: attributes.cloned(),
        })
    }

    pub fn get_message(
        &mut self,
        account: &str,
        queue: &str,
        message_id: &str,
        filters: Option<&Filters>,
    ) -> Result<Progress> {
        self.check_idle("get_message")?;
        self.require("get_message", "account", account)?;
        self.require("get_message", "queue", queue)?;
        self.require("get_message", "message_id", message_id)?;
        self.issue(Command::GetMessage {
            account: account.to_string(),
            queue: queue.to_string(),
            message_id: message_id.to_string(),
            filters: filters.cloned(),
        })
    }

    pub fn update_message(
        &mut self,
        account: &str,
        queue: &str,
        message_id: &str,
        attributes: &Attributes,
        filters: Option<&Filters>,
    ) -> Result<Progress> {
        self.check_idle("update_message")?;
        self.require("update_message", "account", account)?;
        self.require("update_message", "queue", queue)?;
        self.require("update_message", "message_id", message_id)?;
        self.issue(Command::UpdateMessage {
            account: account.to_string(),
            queue: queue.to_string(),
            message_id: message_id.to_string(),
            attributes: attributes.clone(),
            filters: filters.cloned(),
        })
    }

    pub fn delete_message(
        &mut self,
        account: &str,
        queue: &str,
        message_id: &str,
        filters: Option<&Filters>,
    ) -> Result<Progress> {
        self.check_idle("delete_message")?;
        self.require("delete_message", "account", account)?;
        self.require("delete_message", "queue", queue)?;
        self.require("delete_message", "message_id", message_id)?;
        self.issue(Command::DeleteMessage {
            account: account.to_string(),
            queue: queue.to_string(),
            message_id: message_id.to_string(),
            filters: filters.cloned(),
        })
    }

    pub fn get_messages(
        &mut self,
        account: &str,
        queue: &str,
        filters: Option<&Filters>,
    ) -> Result<Progress> {
        self.check_idle("get_messages")?;
        self.require("get_messages", "account", account)?;
        self.require("get_messages", "queue", queue)?;
        self.issue(Command::GetMessages {
            account: account.to_string(),
            queue: queue.to_string(),
            filters: filters.cloned(),
        })
    }

    pub fn update_messages(
        &mut self,
        account: &str,
        queue: &str,
        attributes: &Attributes,
        filters: Option<&Filters>,
    ) -> Result<Progress> {
        self.check_idle("update_messages")?;
        self.require("update_messages", "account", account)?;
        self.require("update_messages", "queue", queue)?;
        self.issue(Command::UpdateMessages {
            account: account.to_string(),
            queue: queue.to_string(),
            attributes: attributes.clone(),
            filters: filters.cloned(),
        })
    }

    pub fn delete_messages(
        &mut self,
        account: &str,
        queue: &str,
        filters: Option<&Filters>,
    ) -> Result<Progress> {
        self.check_idle("delete_messages")?;
        self.require("delete_messages", "account", account)?;
        self.require("delete_messages", "queue", queue)?;
        self.issue(Command::DeleteMessages {
            account: account.to_string(),
            queue: queue.to_string(),
            filters: filters.cloned(),
        })
    }

    pub fn get_queues(
        &mut self,
        account: &str,
        filters: Option<&Filters>,
    ) -> Result<Progress> {
        self.check_idle("get_queues")?;
        self.require("get_queues", "account", account)?;
        self.issue(Command::GetQueues {
            account: account.to_string(),
            filters: filters.cloned(),
        })
    }

    pub fn delete_queues(
        &mut self,
        account: &str,
        filters: Option<&Filters>,
    ) -> Result<Progress> {
        self.check_idle("delete_queues")?;
        self.require("delete_queues", "account", account)?;
        self.issue(Command::DeleteQueues {
            account: account.to_string(),
            filters: filters.cloned(),
        })
    }

    pub fn get_accounts(
        &mut self,
        filters: Option<&Filters>,
    ) -> Result<Progress> {
        self.check_idle("get_accounts")?;
        self.issue(Command::GetAccounts { filters: filters.cloned() })
    }

    pub fn delete_accounts(
        &mut self,
        filters: Option<&Filters>,
    ) -> Result<Progress> {
        self.check_idle("delete_accounts")?;
        self.issue(Command::DeleteAccounts { filters: filters.cloned() })
    }

    // -------------------------------------------------------------- driver

    /// Begins or continues the current command.
    ///
    /// Returns [`Progress::Complete`] once the handle is idle again,
    /// [`Progress::Blocked`] when waiting is the caller's job (a watch-fd
    /// callback is installed, or this is a recursive call from inside a
    /// callback), and an error when the command failed. The complete
    /// callback has already fired by the time an error is returned.
    pub fn process(&mut self) -> Result<Progress> {
        if self.processing {
            // A callback is issuing commands mid-flight; the outer loop
            // picks the new command up on its next iteration.
            return Ok(Progress::Blocked);
        }
        self.processing = true;
        let result = self.run_machine();
        self.processing = false;
        result
    }

    fn run_machine(&mut self) -> Result<Progress> {
        let mut failure: Option<Error> = None;

        while self.state != State::Idle {
            match self.state {
                State::Start => match self.dispatch_command() {
                    Ok(Progress::Blocked) => self.state = State::Waiting,
                    Ok(Progress::Complete) => self.state = State::Finish,
                    Err(e) => {
                        self.log_error(&format!("process: {e}"));
                        failure = Some(e);
                        self.state = State::Finish;
                    },
                },
                State::Ready => match self.dispatch_process() {
                    Ok(Progress::Blocked) => self.state = State::Waiting,
                    Ok(Progress::Complete) => self.state = State::Finish,
                    Err(e) => {
                        self.log_error(&format!("process: {e}"));
                        failure = Some(e);
                        self.state = State::Finish;
                    },
                },
                State::Waiting => {
                    if self.watch.is_empty() {
                        // Waiting is performed by the caller's event loop.
                        return Ok(Progress::Blocked);
                    }
                    self.poll_watched(&mut failure)?;
                },
                State::Finish => {
                    if !self.watch.is_empty() {
                        self.log_error(
                            "process: command finished with fds still watched",
                        );
                        self.watch.clear();
                    }
                    self.state = State::Idle;
                    self.command = None;
                    // May issue the next command, putting us back in Start.
                    self.fire_complete();
                },
                State::Idle => unreachable!("loop condition"),
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(Progress::Complete),
        }
    }

    /// Reports that a watched fd came live. With a caller-run event loop
    /// this is the caller's half of the contract; internally the poll loop
    /// funnels through here too.
    pub fn event_raised(
        &mut self,
        fd: RawFd,
        event: IoEvent,
    ) -> Result<Progress> {
        if self.state != State::Waiting {
            self.log_warn(&format!(
                "event_raised: unexpected event on fd {fd}"
            ));
        }

        let Some(mut backend) = self.backend.take() else {
            self.log_warn("event_raised: backend unavailable");
            return Err(Error::Internal);
        };
        let result = backend.event_raised(self, fd, event);
        self.backend = Some(backend);

        match result {
            Ok(Progress::Complete) => {
                self.state = State::Ready;
                if self.options.autoprocess {
                    self.process()
                } else {
                    Ok(Progress::Complete)
                }
            },
            Ok(Progress::Blocked) => Ok(Progress::Blocked),
            Err(e) => {
                self.log_error(&format!("event_raised: {e}"));
                self.state = State::Finish;
                Err(e)
            },
        }
    }

    /// Abandons the current command: the watch list is cleared, the
    /// backend's cancel hook runs, and the handle is idle again. No
    /// complete callback fires for a canceled command.
    pub fn cancel(&mut self) {
        if self.state == State::Idle {
            return;
        }
        self.watch.clear();
        if let Some(mut backend) = self.backend.take() {
            backend.cancel(self);
            self.backend = Some(backend);
        }
        self.command = None;
        self.state = State::Idle;
    }

    // ------------------------------------------------------ backend hooks

    /// Registers I/O interest for the current command. With a watch-fd
    /// callback installed the registration is handed to the caller;
    /// otherwise it lands on the internal poll list.
    pub fn watch_fd(&mut self, fd: RawFd, event: IoEvent) {
        if event.is_none() {
            return;
        }
        match self.watch_fd_fn.take() {
            Some(mut cb) => {
                cb(self, fd, event);
                if self.watch_fd_fn.is_none() {
                    self.watch_fd_fn = Some(cb);
                }
            },
            None => self.watch.push((fd, event)),
        }
    }

    /// Delivers one message to the user's message callback.
    pub fn emit_message(
        &mut self,
        id: Option<&str>,
        body: Option<&[u8]>,
        attributes: Option<&Attributes>,
    ) {
        if let Some(mut cb) = self.message_fn.take() {
            cb(self, MessageEvent { id, body, attributes });
            if self.message_fn.is_none() {
                self.message_fn = Some(cb);
            }
        }
    }

    /// Delivers one queue name to the user's queue callback.
    pub fn emit_queue(&mut self, queue: &str) {
        if let Some(mut cb) = self.queue_fn.take() {
            cb(self, queue);
            if self.queue_fn.is_none() {
                self.queue_fn = Some(cb);
            }
        }
    }

    /// Delivers one account name to the user's account callback.
    pub fn emit_account(&mut self, account: &str) {
        if let Some(mut cb) = self.account_fn.take() {
            cb(self, account);
            if self.account_fn.is_none() {
                self.account_fn = Some(cb);
            }
        }
    }

    /// Routes one log record through the verbosity filter to the log
    /// callback, or to `tracing` when none is installed.
    pub fn log(&mut self, level: Verbosity, msg: &str) {
        if level < self.verbosity {
            return;
        }
        match self.log_fn.take() {
            Some(mut cb) => {
                cb(self, level, msg);
                if self.log_fn.is_none() {
                    self.log_fn = Some(cb);
                }
            },
            None => match level {
                Verbosity::All | Verbosity::Debug => {
                    tracing::debug!("{msg}");
                },
                Verbosity::Info => tracing::info!("{msg}"),
                Verbosity::Warn => tracing::warn!("{msg}"),
                Verbosity::Error | Verbosity::Fatal => {
                    tracing::error!("{msg}");
                },
                Verbosity::None => {},
            },
        }
    }

    pub fn log_debug(&mut self, msg: &str) {
        self.log(Verbosity::Debug, msg);
    }

    pub fn log_info(&mut self, msg: &str) {
        self.log(Verbosity::Info, msg);
    }

    pub fn log_warn(&mut self, msg: &str) {
        self.log(Verbosity::Warn, msg);
    }

    pub fn log_error(&mut self, msg: &str) {
        self.log(Verbosity::Error, msg);
    }

    // ------------------------------------------------------------ internals

    fn check_idle(&mut self, op: &str) -> Result<()> {
        if self.state != State::Idle {
            self.log_error(&format!("{op}: a command is already in progress"));
            return Err(Error::InProgress);
        }
        Ok(())
    }

    fn require(
        &mut self,
        op: &str,
        name: &'static str,
        value: &str,
    ) -> Result<()> {
        if value.is_empty() {
            self.log_error(&format!("{op}: {name} must not be empty"));
            return Err(Error::InvalidArgument(name));
        }
        Ok(())
    }

    fn issue(&mut self, cmd: Command) -> Result<Progress> {
        self.command = Some(cmd);
        self.state = State::Start;
        if self.options.autoprocess {
            self.process()
        } else {
            Ok(Progress::Blocked)
        }
    }

    /// Runs the backend entry point matching the current command. The
    /// backend and command both leave the handle for the duration of the
    /// call, so the backend can use the handle as its hook surface.
    fn dispatch_command(&mut self) -> Result<Progress> {
        let Some(mut backend) = self.backend.take() else {
            self.log_error("process: backend unavailable");
            return Err(Error::Internal);
        };
        let Some(cmd) = self.command.take() else {
            self.backend = Some(backend);
            self.log_warn("process: start state with no command");
            return Ok(Progress::Complete);
        };

        let result = match cmd.kind() {
            CommandKind::CreateMessage => backend.create_message(self, &cmd),
            CommandKind::GetMessage => backend.get_message(self, &cmd),
            CommandKind::UpdateMessage => backend.update_message(self, &cmd),
            CommandKind::DeleteMessage => backend.delete_message(self, &cmd),
            CommandKind::GetMessages => backend.get_messages(self, &cmd),
            CommandKind::UpdateMessages => {
                backend.update_messages(self, &cmd)
            },
            CommandKind::DeleteMessages => {
                backend.delete_messages(self, &cmd)
            },
            CommandKind::GetQueues => backend.get_queues(self, &cmd),
            CommandKind::DeleteQueues => backend.delete_queues(self, &cmd),
            CommandKind::GetAccounts => backend.get_accounts(self, &cmd),
            CommandKind::DeleteAccounts => {
                backend.delete_accounts(self, &cmd)
            },
        };

        self.command = Some(cmd);
        self.backend = Some(backend);
        result
    }

    fn dispatch_process(&mut self) -> Result<Progress> {
        let Some(mut backend) = self.backend.take() else {
            self.log_error("process: backend unavailable");
            return Err(Error::Internal);
        };
        let result = backend.process(self);
        self.backend = Some(backend);
        result
    }

    /// Blocks in `poll(2)` over the watch list for up to the configured
    /// timeout, then reports each fired fd to the backend. Fired entries
    /// leave the list; the backend re-registers whatever it still needs.
    fn poll_watched(&mut self, failure: &mut Option<Error>) -> Result<()> {
        let mut pfds: Vec<libc::pollfd> = self
            .watch
            .iter()
            .map(|&(fd, interest)| {
                let mut events: libc::c_short = 0;
                if interest.read() {
                    events |= libc::POLLIN;
                }
                if interest.write() {
                    events |= libc::POLLOUT;
                }
                libc::pollfd { fd, events, revents: 0 }
            })
            .collect();

        let count = unsafe {
            libc::poll(
                pfds.as_mut_ptr(),
                pfds.len() as libc::nfds_t,
                self.timeout_ms,
            )
        };
        if count < 0 {
            let errno = std::io::Error::last_os_error();
            if errno.kind() == ErrorKind::Interrupted {
                return Ok(());
            }
            self.log_error(&format!("process: poll failed: {errno}"));
            return Err(Error::Internal);
        }
        if count == 0 {
            self.log_info(&format!(
                "process: timeout {} ms reached",
                self.timeout_ms
            ));
            self.cancel();
            return Err(Error::TimedOut);
        }

        let fired: Vec<(RawFd, IoEvent)> = pfds
            .iter()
            .filter(|p| p.revents != 0)
            .map(|p| {
                let mut event = IoEvent::NONE;
                if p.revents & libc::POLLIN != 0 {
                    event |= IoEvent::READ;
                }
                if p.revents & libc::POLLOUT != 0 {
                    event |= IoEvent::WRITE;
                }
                // Socket-level failures must reach the backend so the
                // transfer can observe them instead of spinning.
                let hangup =
                    libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;
                if p.revents & hangup != 0 {
                    event |= IoEvent::READ | IoEvent::WRITE;
                }
                (p.fd, event)
            })
            .collect();

        self.watch
            .retain(|&(fd, _)| !fired.iter().any(|&(f, _)| f == fd));

        for (fd, event) in fired {
            if let Err(e) = self.event_raised(fd, event) {
                // The machine is parked in Finish; remember the error for
                // the outermost process return.
                *failure = Some(e);
            }
        }
        Ok(())
    }

    fn fire_complete(&mut self) {
        if let Some(mut cb) = self.complete_fn.take() {
            cb(self);
            if self.complete_fn.is_none() {
                self.complete_fn = Some(cb);
            }
        }
    }
}
