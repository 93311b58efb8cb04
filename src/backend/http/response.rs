//! Folds a response body into front-end callbacks.
//!
//! Two schemas exist on the wire: an array of message objects with keys
//! `id`, `body`, `ttl`, `hide` (singular commands may answer with a bare
//! object), and an
//! array of URL-escaped name strings for account and queue listings.
//! Anything else is a malformed response and aborts with a server error.

use bytes::Bytes;

use crate::attributes::Attributes;
use crate::backend::http::json::{Event, Tokenizer};
use crate::backend::http::url;
use crate::client::Burrow;
use crate::command::CommandKind;
use crate::error::{Error, Result};

/// Routes a completed response body to the right fold for `kind`.
///
/// `body_only` short-circuits everything: the raw bytes are one message
/// body, delivered without id or attributes.
pub(crate) fn dispatch(
    fe: &mut Burrow,
    kind: CommandKind,
    body_only: bool,
    body: &[u8],
) -> Result<()> {
    if !kind.returns_elements() {
        return Ok(());
    }

    if body_only && kind.is_singular_message() {
        fe.emit_message(None, Some(body), None);
        return Ok(());
    }

    if body.is_empty() {
        return Ok(());
    }

    match kind {
        CommandKind::GetMessage
        | CommandKind::UpdateMessage
        | CommandKind::DeleteMessage
        | CommandKind::GetMessages
        | CommandKind::UpdateMessages
        | CommandKind::DeleteMessages => fold_messages(fe, body),
        CommandKind::GetAccounts | CommandKind::DeleteAccounts => {
            fold_names(fe, body, Name::Account)
        },
        CommandKind::GetQueues | CommandKind::DeleteQueues => {
            fold_names(fe, body, Name::Queue)
        },
        CommandKind::CreateMessage => Ok(()),
    }
}

fn server_error(fe: &mut Burrow, what: &str) -> Error {
    fe.log_error(&format!("http: bad response: {what}"));
    Error::Server(what.to_string())
}

/// The message-object schema. One object = one message; the callback fires
/// at each object end so a long listing streams out in arrival order.
fn fold_messages(fe: &mut Burrow, body: &[u8]) -> Result<()> {
    let mut tokens = Tokenizer::new(body);
    let mut depth = 0u32;
    let mut key: Option<String> = None;
    let mut message_id: Option<String> = None;
    let mut message_body: Option<Bytes> = None;
    let mut attributes = Attributes::new();

    loop {
        let event = match tokens.next_event() {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(()),
            Err(e) => return Err(server_error(fe, &e.to_string())),
        };

        match event {
            Event::ArrayBegin | Event::ArrayEnd if depth == 0 => {},
            Event::ObjectBegin if depth == 0 => {
                depth = 1;
                message_id = None;
                message_body = None;
                attributes.unset_all();
            },
            Event::ObjectEnd => {
                depth = 0;
                fe.emit_message(
                    message_id.as_deref(),
                    message_body.as_deref(),
                    Some(&attributes),
                );
                message_id = None;
                message_body = None;
            },
            Event::Key(k) => key = Some(k),
            Event::Str(value) if depth == 1 => match key.take().as_deref() {
                Some("id") => message_id = Some(url::unescape(&value)),
                Some("body") => {
                    message_body = Some(Bytes::from(value.into_bytes()));
                },
                _ => return Err(server_error(fe, "unrecognized string key")),
            },
            Event::Int(value) if depth == 1 => {
                let seconds = value.clamp(0, i64::from(u32::MAX)) as u32;
                match key.take().as_deref() {
                    Some("ttl") => {
                        attributes.set_ttl(seconds);
                    },
                    Some("hide") => {
                        attributes.set_hide(seconds);
                    },
                    _ => {
                        return Err(server_error(
                            fe,
                            "unrecognized integer key",
                        ));
                    },
                }
            },
            _ => return Err(server_error(fe, "unexpected value in message")),
        }
    }
}

#[derive(Clone, Copy)]
enum Name {
    Account,
    Queue,
}

/// The string-list schema: a flat array of URL-escaped names.
fn fold_names(fe: &mut Burrow, body: &[u8], which: Name) -> Result<()> {
    let mut tokens = Tokenizer::new(body);
    loop {
        let event = match tokens.next_event() {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(()),
            Err(e) => return Err(server_error(fe, &e.to_string())),
        };

        match event {
            Event::ArrayBegin | Event::ArrayEnd => {},
            Event::Str(value) => {
                let name = url::unescape(&value);
                match which {
                    Name::Account => fe.emit_account(&name),
                    Name::Queue => fe.emit_queue(&name),
                }
            },
            _ => return Err(server_error(fe, "unexpected value in listing")),
        }
    }
}
