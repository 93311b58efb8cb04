//! Shared recorder harness: counts and captures every callback a command
//! fires so tests can assert exact traces.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use burrow_rs::{Burrow, Verbosity};

/// One message callback, with owned copies of everything it carried.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GotMessage {
    pub id: Option<String>,
    pub body: Option<Vec<u8>>,
    pub ttl: Option<u32>,
    pub hide: Option<u32>,
}

#[derive(Debug, Default)]
pub struct Recorder {
    pub messages: Vec<GotMessage>,
    pub queues: Vec<String>,
    pub accounts: Vec<String>,
    pub completes: usize,
    pub error_logs: Vec<String>,
}

impl Recorder {
    pub fn clear(&mut self) {
        *self = Recorder::default();
    }

    pub fn message_ids(&self) -> Vec<&str> {
        self.messages
            .iter()
            .map(|m| m.id.as_deref().unwrap_or("-"))
            .collect()
    }
}

pub type SharedRecorder = Rc<RefCell<Recorder>>;

/// Installs recording callbacks on the handle and returns the shared log.
pub fn install(burrow: &mut Burrow) -> SharedRecorder {
    let recorder: SharedRecorder = Rc::default();

    let rec = Rc::clone(&recorder);
    burrow.set_message_fn(move |_, msg| {
        rec.borrow_mut().messages.push(GotMessage {
            id: msg.id.map(str::to_string),
            body: msg.body.map(<[u8]>::to_vec),
            ttl: msg
                .attributes
                .filter(|a| a.ttl_isset())
                .map(|a| a.ttl()),
            hide: msg
                .attributes
                .filter(|a| a.hide_isset())
                .map(|a| a.hide()),
        });
    });

    let rec = Rc::clone(&recorder);
    burrow.set_queue_fn(move |_, queue| {
        rec.borrow_mut().queues.push(queue.to_string());
    });

    let rec = Rc::clone(&recorder);
    burrow.set_account_fn(move |_, account| {
        rec.borrow_mut().accounts.push(account.to_string());
    });

    let rec = Rc::clone(&recorder);
    burrow.set_complete_fn(move |_| {
        rec.borrow_mut().completes += 1;
    });

    let rec = Rc::clone(&recorder);
    burrow.set_log_fn(move |_, level, msg| {
        if level >= Verbosity::Error {
            rec.borrow_mut().error_logs.push(msg.to_string());
        }
    });

    recorder
}
