//! Backend speaking Burrow's HTTP/JSON protocol.
//!
//! Each command becomes one REST request against
//! `<scheme>://<server>:<port>/<version>/...`; the response streams through
//! the JSON tokenizer into the front-end's callbacks. One transfer exists
//! at a time; issuing a new command tears down the previous one, socket and
//! all.

use std::os::fd::RawFd;

use bytes::Bytes;

use crate::backend::{Backend, IoEvent, Progress};
use crate::client::Burrow;
use crate::command::{Command, CommandKind};
use crate::error::{Error, Result};
use crate::filters::Detail;

mod json;
mod response;
mod transfer;
mod url;

use transfer::{Request, Step, Transfer};

const DEFAULT_SCHEME: &str = "http";
const DEFAULT_VERSION: &str = "v1.0";

/// What the in-flight transfer is for, kept until dispatch.
struct Pending {
    kind: CommandKind,
    body_only: bool,
}

pub struct HttpBackend {
    scheme: String,
    server: Option<String>,
    port: Option<u16>,
    version: String,
    transfer: Option<Transfer>,
    current: Option<Pending>,
}

impl Default for HttpBackend {
    fn default() -> Self {
        HttpBackend {
            scheme: DEFAULT_SCHEME.to_string(),
            server: None,
            port: None,
            version: DEFAULT_VERSION.to_string(),
            transfer: None,
            current: None,
        }
    }
}

/// detail=body asks for the raw body of one named message, skipping JSON.
fn wants_body_only(cmd: &Command) -> bool {
    cmd.kind().is_singular_message()
        && cmd
            .filters()
            .is_some_and(|f| f.detail_isset() && f.detail() == Detail::Body)
}

impl HttpBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The configured server and port; both must be set before the first
    /// command.
    fn endpoint(&self) -> Result<(String, u16)> {
        let server = self
            .server
            .clone()
            .ok_or(Error::InvalidArgument("server"))?;
        let port = self.port.ok_or(Error::InvalidArgument("port"))?;
        Ok((server, port))
    }

    fn build_request(&self, cmd: &Command) -> Result<Request> {
        let (server, port) = self.endpoint()?;
        let kind = cmd.kind();

        let (method, with_attributes, body): (&'static str, bool, Option<Bytes>) =
            match kind {
                CommandKind::CreateMessage => {
                    let body =
                        cmd.body().cloned().ok_or(Error::Internal)?;
                    ("PUT", true, Some(body))
                },
                CommandKind::GetMessage
                | CommandKind::GetMessages
                | CommandKind::GetQueues
                | CommandKind::GetAccounts => ("GET", false, None),
                CommandKind::UpdateMessage | CommandKind::UpdateMessages => {
                    ("POST", true, Some(Bytes::new()))
                },
                CommandKind::DeleteMessage
                | CommandKind::DeleteMessages
                | CommandKind::DeleteQueues
                | CommandKind::DeleteAccounts => ("DELETE", false, None),
            };

        let query = url::query_string(
            cmd.filters(),
            if with_attributes { cmd.attributes() } else { None },
        );

        let mut segments: Vec<&str> = Vec::with_capacity(3);
        if let Some(account) = cmd.account() {
            segments.push(account);
        }
        if let Some(queue) = cmd.queue() {
            segments.push(queue);
        }
        if let Some(id) = cmd.message_id() {
            segments.push(id);
        }

        Ok(Request {
            method,
            path: url::path(&self.version, &segments, query.as_deref()),
            host: format!("{server}:{port}"),
            body,
        })
    }

    /// Starts the transfer for `cmd` and drives it as far as it will go.
    fn begin(&mut self, fe: &mut Burrow, cmd: &Command) -> Result<Progress> {
        let request = self.build_request(cmd)?;
        fe.log_debug(&format!(
            "http: {} {}://{}{}",
            request.method, self.scheme, request.host, request.path
        ));

        let (server, port) = self.endpoint()?;
        // Replacing the slot drops any transfer left over from a previous
        // command, closing its socket.
        self.transfer = Some(Transfer::start(&server, port, &request)?);
        self.current = Some(Pending {
            kind: cmd.kind(),
            body_only: wants_body_only(cmd),
        });
        self.process(fe)
    }
}

impl Backend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "server" => self.server = Some(value.to_string()),
            "port" => {
                self.port = Some(
                    value
                        .parse()
                        .map_err(|_| Error::InvalidArgument("port"))?,
                );
            },
            "scheme" => {
                if value != "http" {
                    tracing::warn!(scheme = value, "unsupported scheme");
                    return Err(Error::InvalidArgument("scheme"));
                }
                self.scheme = value.to_string();
            },
            "version" => self.version = value.to_string(),
            _ => {
                tracing::warn!(key, "unknown http backend option");
                return Err(Error::InvalidArgument("option"));
            },
        }
        Ok(())
    }

    fn cancel(&mut self, _fe: &mut Burrow) {
        self.transfer = None;
        self.current = None;
    }

    fn process(&mut self, fe: &mut Burrow) -> Result<Progress> {
        let Some(transfer) = self.transfer.as_mut() else {
            fe.log_warn("http: process called with no transfer in flight");
            return Ok(Progress::Complete);
        };

        match transfer.perform() {
            Ok(Step::Blocked(interest)) => {
                let fd = transfer.fd();
                fe.watch_fd(fd, interest);
                Ok(Progress::Blocked)
            },
            Ok(Step::Done) => {
                // Panic safety: as_mut above proved the slot is occupied.
                let transfer = self.transfer.take().unwrap();
                let pending =
                    self.current.take().ok_or(Error::Internal)?;

                let status = transfer.status();
                if status == 404 {
                    fe.log_info("http: server answered 404");
                    return Err(Error::NotFound);
                }
                if status >= 400 {
                    let msg = format!("server answered {status}");
                    fe.log_error(&format!("http: {msg}"));
                    return Err(Error::Server(msg));
                }

                response::dispatch(
                    fe,
                    pending.kind,
                    pending.body_only,
                    transfer.body(),
                )?;
                Ok(Progress::Complete)
            },
            Err(e) => {
                self.transfer = None;
                self.current = None;
                fe.log_error(&format!("http: transfer failed: {e}"));
                Err(e)
            },
        }
    }

    fn event_raised(
        &mut self,
        _fe: &mut Burrow,
        _fd: RawFd,
        _event: IoEvent,
    ) -> Result<Progress> {
        // Nothing to record: the next process call re-runs the transfer,
        // which discovers for itself what the socket can do now.
        Ok(Progress::Complete)
    }

    fn create_message(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        self.begin(fe, cmd)
    }

    fn get_message(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        self.begin(fe, cmd)
    }

    fn update_message(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        self.begin(fe, cmd)
    }

    fn delete_message(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        self.begin(fe, cmd)
    }

    fn get_messages(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        self.begin(fe, cmd)
    }

    fn update_messages(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        self.begin(fe, cmd)
    }

    fn delete_messages(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        self.begin(fe, cmd)
    }

    fn get_queues(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        self.begin(fe, cmd)
    }

    fn delete_queues(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        self.begin(fe, cmd)
    }

    fn get_accounts(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        self.begin(fe, cmd)
    }

    fn delete_accounts(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        self.begin(fe, cmd)
    }
}
