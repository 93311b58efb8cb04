//! In-process backend over insertion-ordered containers.
//!
//! Everything lives in this process and dies with the backend; the point of
//! this backend is predictable ordering and exact ttl/hide semantics, not
//! performance.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::attributes::Attributes;
use crate::backend::{Backend, Progress};
use crate::client::Burrow;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::filters::Filters;

mod store;

use store::{window_keys, Accounts, MessageRecord};

/// Message ttl applied when create carries no ttl attribute, in seconds.
const DEFAULT_TTL: u32 = 300;

/// What a queue scan does to each message it visits.
#[derive(Clone, Copy, Eq, PartialEq)]
enum ScanAction {
    Update,
    Get,
    Delete,
}

/// Whether a deleting scan still reports each message it removes.
#[derive(Clone, Copy, Eq, PartialEq)]
enum Deleted {
    Report,
    Ignore,
}

/// The filter fields a scan actually consumes, with defaults applied:
/// start at the head, no limit, skip hidden.
struct Window<'a> {
    marker: Option<&'a str>,
    limit: Option<u32>,
    match_hidden: bool,
}

impl<'a> Window<'a> {
    fn from(filters: Option<&'a Filters>) -> Self {
        Window {
            marker: filters.and_then(|f| f.marker()),
            limit: filters.and_then(|f| {
                f.limit_isset().then(|| f.limit())
            }),
            match_hidden: filters.is_some_and(|f| f.match_hidden()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    accounts: Accounts,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Attributes reported with a message: remaining ttl and remaining hide,
/// both relative to `now` and both marked set.
fn remaining(msg: &MessageRecord, now: u64) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.set_ttl(msg.ttl_left(now)).set_hide(msg.hide_left(now));
    attrs
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the queue node if it emptied, then the account node if that
    /// emptied in turn.
    fn prune(&mut self, account: &str, queue: &str) {
        if let Some(acct) = self.accounts.get_mut(account) {
            if acct.get(queue).is_some_and(|q| q.is_empty()) {
                acct.shift_remove(queue);
            }
        }
        if self.accounts.get(account).is_some_and(|a| a.is_empty()) {
            self.accounts.shift_remove(account);
        }
    }

    /// The routine behind every message-range command.
    ///
    /// Walks the filter window over one queue, sweeping expired messages as
    /// it goes, skipping hidden ones unless the filters match them, then
    /// updating, reporting, or deleting each survivor. A missing account or
    /// queue is simply an empty result.
    fn scan_queue(
        &mut self,
        fe: &mut Burrow,
        account: &str,
        queue: &str,
        action: ScanAction,
        deleted: Deleted,
        filters: Option<&Filters>,
        attributes: Option<&Attributes>,
    ) {
        let now = unix_now();
        let window = Window::from(filters);

        let keys = {
            let Some(q) =
                self.accounts.get(account).and_then(|a| a.get(queue))
            else {
                return;
            };
            window_keys(q, window.marker, window.limit)
        };

        // Update durations become absolute up front. A ttl that is set but
        // not positive is ignored; hide 0 unhides.
        let new_ttl_at = attributes
            .filter(|a| a.ttl_isset() && a.ttl() > 0)
            .map(|a| now + u64::from(a.ttl()));
        let new_hide_until = attributes
            .filter(|a| a.hide_isset())
            .map(|a| match a.hide() {
                0 => 0,
                h => now + u64::from(h),
            });

        for key in keys {
            let Some(q) =
                self.accounts.get_mut(account).and_then(|a| a.get_mut(queue))
            else {
                break;
            };
            let Some(msg) = q.get_mut(&key) else { continue };

            if msg.expired(now) {
                q.shift_remove(&key);
                continue;
            }
            if msg.hidden(now) && !window.match_hidden {
                continue;
            }

            if action == ScanAction::Update {
                if let Some(ttl_at) = new_ttl_at {
                    msg.ttl_at = ttl_at;
                }
                if let Some(hide_until) = new_hide_until {
                    msg.hide_until = hide_until;
                }
            }

            match action {
                ScanAction::Get | ScanAction::Update => {
                    let attrs = remaining(msg, now);
                    let body = msg.body.clone();
                    fe.emit_message(Some(&key), Some(&body), Some(&attrs));
                },
                ScanAction::Delete => {
                    // Panic safety: the key was just looked up above.
                    let msg = q.shift_remove(&key).unwrap();
                    if deleted == Deleted::Report {
                        let attrs = remaining(&msg, now);
                        fe.emit_message(
                            Some(&key),
                            Some(&msg.body),
                            Some(&attrs),
                        );
                    }
                },
            }
        }

        self.prune(account, queue);
    }

    /// Looks up one message by id, sweeping it if it expired. `Ok` holds
    /// the queue position of a live message.
    fn find_live(
        &mut self,
        account: &str,
        queue: &str,
        message_id: &str,
        now: u64,
    ) -> Result<()> {
        let Some(msg) = self
            .accounts
            .get_mut(account)
            .and_then(|a| a.get_mut(queue))
            .and_then(|q| q.get_mut(message_id))
        else {
            return Err(Error::NotFound);
        };

        if msg.expired(now) {
            // Panic safety: the surrounding lookup just succeeded.
            self.accounts
                .get_mut(account)
                .and_then(|a| a.get_mut(queue))
                .unwrap()
                .shift_remove(message_id);
            self.prune(account, queue);
            return Err(Error::NotFound);
        }

        Ok(())
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn create_message(
        &mut self,
        _fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        let Command::CreateMessage {
            account,
            queue,
            message_id,
            body,
            attributes,
        } = cmd
        else {
            return Err(Error::Internal);
        };

        let now = unix_now();
        let attrs = attributes.as_ref();
        let ttl = attrs
            .filter(|a| a.ttl_isset())
            .map_or(DEFAULT_TTL, |a| a.ttl());
        let hide = attrs.filter(|a| a.hide_isset()).map_or(0, |a| a.hide());

        let record = MessageRecord {
            body: Bytes::clone(body),
            ttl_at: now + u64::from(ttl),
            hide_until: match hide {
                0 => 0,
                h => now + u64::from(h),
            },
        };

        // Inserting over an existing id replaces the record in place,
        // keeping its position in the queue.
        self.accounts
            .entry(account.clone())
            .or_default()
            .entry(queue.clone())
            .or_default()
            .insert(message_id.clone(), record);

        Ok(Progress::Complete)
    }

    fn get_message(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        let Command::GetMessage { account, queue, message_id, .. } = cmd
        else {
            return Err(Error::Internal);
        };

        let now = unix_now();
        self.find_live(account, queue, message_id, now)?;

        // Panic safety: find_live left the message in place.
        let msg = self.accounts[account.as_str()][queue.as_str()]
            .get(message_id.as_str())
            .unwrap();
        let attrs = remaining(msg, now);
        let body = msg.body.clone();
        fe.emit_message(Some(message_id), Some(&body), Some(&attrs));
        Ok(Progress::Complete)
    }

    fn update_message(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        let Command::UpdateMessage {
            account,
            queue,
            message_id,
            attributes,
            ..
        } = cmd
        else {
            return Err(Error::Internal);
        };

        let now = unix_now();
        self.find_live(account, queue, message_id, now)?;

        // Panic safety: find_live left the message in place.
        let msg = self
            .accounts
            .get_mut(account.as_str())
            .and_then(|a| a.get_mut(queue.as_str()))
            .and_then(|q| q.get_mut(message_id.as_str()))
            .unwrap();

        // The singular form names its message, so hidden state is ignored.
        // A ttl that is set but not positive is ignored; hide 0 unhides.
        if attributes.ttl_isset() && attributes.ttl() > 0 {
            msg.ttl_at = now + u64::from(attributes.ttl());
        }
        if attributes.hide_isset() {
            msg.hide_until = match attributes.hide() {
                0 => 0,
                h => now + u64::from(h),
            };
        }

        let attrs = remaining(msg, now);
        let body = msg.body.clone();
        fe.emit_message(Some(message_id), Some(&body), Some(&attrs));
        Ok(Progress::Complete)
    }

    fn delete_message(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        let Command::DeleteMessage { account, queue, message_id, .. } = cmd
        else {
            return Err(Error::Internal);
        };

        let now = unix_now();
        let Some(msg) = self
            .accounts
            .get_mut(account.as_str())
            .and_then(|a| a.get_mut(queue.as_str()))
            .and_then(|q| q.shift_remove(message_id.as_str()))
        else {
            // Deleting an absent message is a success with no callbacks.
            return Ok(Progress::Complete);
        };
        self.prune(account, queue);

        if !msg.expired(now) {
            let attrs = remaining(&msg, now);
            fe.emit_message(Some(message_id), Some(&msg.body), Some(&attrs));
        }
        Ok(Progress::Complete)
    }

    fn get_messages(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        let Command::GetMessages { account, queue, filters } = cmd else {
            return Err(Error::Internal);
        };
        self.scan_queue(
            fe,
            account,
            queue,
            ScanAction::Get,
            Deleted::Report,
            filters.as_ref(),
            None,
        );
        Ok(Progress::Complete)
    }

    fn update_messages(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        let Command::UpdateMessages { account, queue, attributes, filters } =
            cmd
        else {
            return Err(Error::Internal);
        };
        self.scan_queue(
            fe,
            account,
            queue,
            ScanAction::Update,
            Deleted::Report,
            filters.as_ref(),
            Some(attributes),
        );
        Ok(Progress::Complete)
    }

    fn delete_messages(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        let Command::DeleteMessages { account, queue, filters } = cmd else {
            return Err(Error::Internal);
        };
        self.scan_queue(
            fe,
            account,
            queue,
            ScanAction::Delete,
            Deleted::Report,
            filters.as_ref(),
            None,
        );
        Ok(Progress::Complete)
    }

    fn get_queues(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        let Command::GetQueues { account, filters } = cmd else {
            return Err(Error::Internal);
        };

        let window = Window::from(filters.as_ref());
        let Some(acct) = self.accounts.get(account.as_str()) else {
            return Ok(Progress::Complete);
        };
        for name in window_keys(acct, window.marker, window.limit) {
            fe.emit_queue(&name);
        }
        Ok(Progress::Complete)
    }

    fn delete_queues(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        let Command::DeleteQueues { account, filters } = cmd else {
            return Err(Error::Internal);
        };

        let window = Window::from(filters.as_ref());
        let Some(acct) = self.accounts.get(account.as_str()) else {
            return Ok(Progress::Complete);
        };
        // Each per-queue erase scan prunes emptied nodes itself.
        for name in window_keys(acct, window.marker, window.limit) {
            self.scan_queue(
                fe,
                account,
                &name,
                ScanAction::Delete,
                Deleted::Ignore,
                None,
                None,
            );
        }
        Ok(Progress::Complete)
    }

    fn get_accounts(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        let Command::GetAccounts { filters } = cmd else {
            return Err(Error::Internal);
        };

        let window = Window::from(filters.as_ref());
        for name in window_keys(&self.accounts, window.marker, window.limit) {
            fe.emit_account(&name);
        }
        Ok(Progress::Complete)
    }

    fn delete_accounts(
        &mut self,
        fe: &mut Burrow,
        cmd: &Command,
    ) -> Result<Progress> {
        let Command::DeleteAccounts { filters } = cmd else {
            return Err(Error::Internal);
        };

        let window = Window::from(filters.as_ref());
        for account in
            window_keys(&self.accounts, window.marker, window.limit)
        {
            let queues = match self.accounts.get(&account) {
                Some(acct) => window_keys(acct, None, None),
                None => continue,
            };
            for queue in queues {
                self.scan_queue(
                    fe,
                    &account,
                    &queue,
                    ScanAction::Delete,
                    Deleted::Ignore,
                    None,
                    None,
                );
            }
        }
        Ok(Progress::Complete)
    }
}
