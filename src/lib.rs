//! Client library for Burrow, a queue service organizing messages into
//! accounts → queues → messages, each message carrying a ttl and a
//! hide-until instant.
//!
//! A [`Burrow`] handle owns one backend (the in-process [`memory`] store,
//! the [`http`] client speaking Burrow's JSON protocol, or anything else
//! implementing [`Backend`]) and runs one command at a time through it,
//! delivering results via callbacks registered on the handle.
//!
//! The simplest arrangement is fully synchronous: turn on
//! [`Options::AUTOPROCESS`] and every issue call drives the command to
//! completion before returning, blocking in an internal poll when the
//! backend needs I/O.
//!
//! ```
//! use burrow_rs::{Burrow, Options};
//!
//! let mut burrow = Burrow::create("memory").unwrap();
//! burrow.add_options(Options::AUTOPROCESS);
//! burrow.set_message_fn(|_, msg| {
//!     println!("{:?}: {:?}", msg.id, msg.body);
//! });
//!
//! burrow.create_message("acct", "jobs", "job-1", b"payload", None).unwrap();
//! burrow.get_message("acct", "jobs", "job-1", None).unwrap();
//! ```
//!
//! For a caller-owned event loop, install a watch-fd callback instead:
//! the handle then never blocks, [`Burrow::process`] returns
//! [`Progress::Blocked`] whenever the backend is waiting on I/O, and the
//! event loop reports live fds back through [`Burrow::event_raised`].
//!
//! [`memory`]: backend::memory
//! [`http`]: backend::http

pub mod attributes;
pub mod backend;
pub mod client;
pub mod command;
pub mod error;
pub mod filters;

pub use attributes::Attributes;
pub use backend::{Backend, IoEvent, Progress};
pub use client::{Burrow, MessageEvent, Options, Verbosity};
pub use command::{Command, CommandKind};
pub use error::{Error, Result};
pub use filters::{Detail, Filters};
