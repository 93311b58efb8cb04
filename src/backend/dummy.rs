use crate::backend::{Backend, Progress};
use crate::client::Burrow;
use crate::command::Command;
use crate::error::Result;

/// A backend that accepts every command and does nothing.
///
/// Useful for exercising the front-end without real storage or I/O, and as
/// the smallest possible template for an out-of-tree backend.
#[derive(Debug, Default)]
pub struct DummyBackend;

impl DummyBackend {
    pub fn new() -> Self {
        Self
    }

    fn done(&self, fe: &mut Burrow, what: &str) -> Result<Progress> {
        fe.log_debug(&format!("dummy: {what} completed"));
        Ok(Progress::Complete)
    }
}

impl Backend for DummyBackend {
    fn name(&self) -> &'static str {
        "dummy"
    }

    fn create_message(
        &mut self,
        fe: &mut Burrow,
        _cmd: &Command,
    ) -> Result<Progress> {
        self.done(fe, "create_message")
    }

    fn get_message(
        &mut self,
        fe: &mut Burrow,
        _cmd: &Command,
    ) -> Result<Progress> {
        self.done(fe, "get_message")
    }

    fn update_message(
        &mut self,
        fe: &mut Burrow,
        _cmd: &Command,
    ) -> Result<Progress> {
        self.done(fe, "update_message")
    }

    fn delete_message(
        &mut self,
        fe: &mut Burrow,
        _cmd: &Command,
    ) -> Result<Progress> {
        self.done(fe, "delete_message")
    }

    fn get_messages(
        &mut self,
        fe: &mut Burrow,
        _cmd: &Command,
    ) -> Result<Progress> {
        self.done(fe, "get_messages")
    }

    fn update_messages(
        &mut self,
        fe: &mut Burrow,
        _cmd: &Command,
    ) -> Result<Progress> {
        self.done(fe, "update_messages")
    }

    fn delete_messages(
        &mut self,
        fe: &mut Burrow,
        _cmd: &Command,
    ) -> Result<Progress> {
        self.done(fe, "delete_messages")
    }

    fn get_queues(
        &mut self,
        fe: &mut Burrow,
        _cmd: &Command,
    ) -> Result<Progress> {
        self.done(fe, "get_queues")
    }

    fn delete_queues(
        &mut self,
        fe: &mut Burrow,
        _cmd: &Command,
    ) -> Result<Progress> {
        self.done(fe, "delete_queues")
    }

    fn get_accounts(
        &mut self,
        fe: &mut Burrow,
        _cmd: &Command,
    ) -> Result<Progress> {
        self.done(fe, "get_accounts")
    }

    fn delete_accounts(
        &mut self,
        fe: &mut Burrow,
        _cmd: &Command,
    ) -> Result<Progress> {
        self.done(fe, "delete_accounts")
    }
}
