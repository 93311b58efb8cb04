use bytes::Bytes;

use crate::attributes::Attributes;
use crate::filters::Filters;

/// The operation currently in flight on a handle.
///
/// Built by the front-end from an issue call, then handed by reference to
/// the backend's matching entry point. All strings are owned copies taken at
/// issue time and dropped when the command leaves the slot.
#[derive(Clone, Debug)]
pub enum Command {
    /// Inserts or replaces one message.
    ///
    /// Over HTTP: `PUT /<version>/<account>/<queue>/<id>`, request body =
    /// message body.
    CreateMessage {
        account: String,
        queue: String,
        message_id: String,
        body: Bytes,
        attributes: Option<Attributes>,
    },
    /// Fetches one message by id, hidden or not.
    ///
    /// Over HTTP: `GET /<version>/<account>/<queue>/<id>`.
    GetMessage {
        account: String,
        queue: String,
        message_id: String,
        filters: Option<Filters>,
    },
    /// Rewrites the timing attributes of one message by id.
    ///
    /// Over HTTP: `POST /<version>/<account>/<queue>/<id>` with an empty
    /// body; the attributes ride the query string.
    UpdateMessage {
        account: String,
        queue: String,
        message_id: String,
        attributes: Attributes,
        filters: Option<Filters>,
    },
    /// Removes one message by id, reporting it if it was live.
    ///
    /// Over HTTP: `DELETE /<version>/<account>/<queue>/<id>`.
    DeleteMessage {
        account: String,
        queue: String,
        message_id: String,
        filters: Option<Filters>,
    },
    /// Lists a queue's messages in insertion order.
    ///
    /// Over HTTP: `GET /<version>/<account>/<queue>`.
    GetMessages {
        account: String,
        queue: String,
        filters: Option<Filters>,
    },
    /// Rewrites the timing attributes of a range of messages.
    ///
    /// Over HTTP: `POST /<version>/<account>/<queue>` with an empty body.
    UpdateMessages {
        account: String,
        queue: String,
        attributes: Attributes,
        filters: Option<Filters>,
    },
    /// Removes a range of messages, reporting each.
    ///
    /// Over HTTP: `DELETE /<version>/<account>/<queue>`.
    DeleteMessages {
        account: String,
        queue: String,
        filters: Option<Filters>,
    },
    /// Lists an account's queues in insertion order.
    ///
    /// Over HTTP: `GET /<version>/<account>`.
    GetQueues {
        account: String,
        filters: Option<Filters>,
    },
    /// Removes a range of queues and every message in them.
    ///
    /// Over HTTP: `DELETE /<version>/<account>`.
    DeleteQueues {
        account: String,
        filters: Option<Filters>,
    },
    /// Lists accounts in insertion order.
    ///
    /// Over HTTP: `GET /<version>`.
    GetAccounts { filters: Option<Filters> },
    /// Removes a range of accounts and everything under them.
    ///
    /// Over HTTP: `DELETE /<version>`.
    DeleteAccounts { filters: Option<Filters> },
}

/// Discriminant of [`Command`], used where only the kind matters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandKind {
    CreateMessage,
    GetMessage,
    UpdateMessage,
    DeleteMessage,
    GetMessages,
    UpdateMessages,
    DeleteMessages,
    GetQueues,
    DeleteQueues,
    GetAccounts,
    DeleteAccounts,
}

impl CommandKind {
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::CreateMessage => "create_message",
            CommandKind::GetMessage => "get_message",
            CommandKind::UpdateMessage => "update_message",
            CommandKind::DeleteMessage => "delete_message",
            CommandKind::GetMessages => "get_messages",
            CommandKind::UpdateMessages => "update_messages",
            CommandKind::DeleteMessages => "delete_messages",
            CommandKind::GetQueues => "get_queues",
            CommandKind::DeleteQueues => "delete_queues",
            CommandKind::GetAccounts => "get_accounts",
            CommandKind::DeleteAccounts => "delete_accounts",
        }
    }

    /// Whether a response to this command carries elements to report
    /// through the per-element callbacks.
    pub fn returns_elements(self) -> bool {
        !matches!(self, CommandKind::CreateMessage)
    }

    /// The three commands that name a single message by id.
    pub fn is_singular_message(self) -> bool {
        matches!(
            self,
            CommandKind::GetMessage
                | CommandKind::UpdateMessage
                | CommandKind::DeleteMessage
        )
    }
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CreateMessage { .. } => CommandKind::CreateMessage,
            Command::GetMessage { .. } => CommandKind::GetMessage,
            Command::UpdateMessage { .. } => CommandKind::UpdateMessage,
            Command::DeleteMessage { .. } => CommandKind::DeleteMessage,
            Command::GetMessages { .. } => CommandKind::GetMessages,
            Command::UpdateMessages { .. } => CommandKind::UpdateMessages,
            Command::DeleteMessages { .. } => CommandKind::DeleteMessages,
            Command::GetQueues { .. } => CommandKind::GetQueues,
            Command::DeleteQueues { .. } => CommandKind::DeleteQueues,
            Command::GetAccounts { .. } => CommandKind::GetAccounts,
            Command::DeleteAccounts { .. } => CommandKind::DeleteAccounts,
        }
    }

    pub fn account(&self) -> Option<&str> {
        match self {
            Command::CreateMessage { account, .. }
            | Command::GetMessage { account, .. }
            | Command::UpdateMessage { account, .. }
            | Command::DeleteMessage { account, .. }
            | Command::GetMessages { account, .. }
            | Command::UpdateMessages { account, .. }
            | Command::DeleteMessages { account, .. }
            | Command::GetQueues { account, .. }
            | Command::DeleteQueues { account, .. } => Some(account),
            Command::GetAccounts { .. } | Command::DeleteAccounts { .. } => {
                None
            },
        }
    }

    pub fn queue(&self) -> Option<&str> {
        match self {
            Command::CreateMessage { queue, .. }
            | Command::GetMessage { queue, .. }
            | Command::UpdateMessage { queue, .. }
            | Command::DeleteMessage { queue, .. }
            | Command::GetMessages { queue, .. }
            | Command::UpdateMessages { queue, .. }
            | Command::DeleteMessages { queue, .. } => Some(queue),
            _ => None,
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        match self {
            Command::CreateMessage { message_id, .. }
            | Command::GetMessage { message_id, .. }
            | Command::UpdateMessage { message_id, .. }
            | Command::DeleteMessage { message_id, .. } => Some(message_id),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&Bytes> {
        match self {
            Command::CreateMessage { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Command::CreateMessage { attributes, .. } => attributes.as_ref(),
            Command::UpdateMessage { attributes, .. }
            | Command::UpdateMessages { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn filters(&self) -> Option<&Filters> {
        match self {
            Command::GetMessage { filters, .. }
            | Command::UpdateMessage { filters, .. }
            | Command::DeleteMessage { filters, .. }
            | Command::GetMessages { filters, .. }
            | Command::UpdateMessages { filters, .. }
            | Command::DeleteMessages { filters, .. }
            | Command::GetQueues { filters, .. }
            | Command::DeleteQueues { filters, .. }
            | Command::GetAccounts { filters }
            | Command::DeleteAccounts { filters } => filters.as_ref(),
            Command::CreateMessage { .. } => None,
        }
    }
}
