//! Behavior of the memory backend through the public command surface.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use burrow_rs::{
    Attributes, Burrow, Error, Filters, Options, Progress,
};

use common::install;

fn burrow() -> Burrow {
    let mut burrow = Burrow::create("memory").unwrap();
    burrow.add_options(Options::AUTOPROCESS);
    burrow
}

fn create(
    burrow: &mut Burrow,
    account: &str,
    queue: &str,
    id: &str,
    body: &[u8],
    ttl: Option<u32>,
    hide: Option<u32>,
) {
    let mut attrs = Attributes::new();
    if let Some(ttl) = ttl {
        attrs.set_ttl(ttl);
    }
    if let Some(hide) = hide {
        attrs.set_hide(hide);
    }
    let attrs =
        (ttl.is_some() || hide.is_some()).then_some(&attrs);
    burrow.create_message(account, queue, id, body, attrs).unwrap();
}

#[test]
fn created_message_round_trips() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "a", "q", "m1", b"hello", Some(100), Some(0));
    burrow.get_message("a", "q", "m1", None).unwrap();

    let rec = rec.borrow();
    assert_eq!(rec.messages.len(), 1);
    let msg = &rec.messages[0];
    assert_eq!(msg.id.as_deref(), Some("m1"));
    assert_eq!(msg.body.as_deref(), Some(&b"hello"[..]));
    // One second of slack for the clock ticking between create and get.
    assert!((99..=100).contains(&msg.ttl.unwrap()));
    assert_eq!(msg.hide, Some(0));
    assert_eq!(rec.completes, 2);
}

#[test]
fn default_ttl_is_five_minutes() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "a", "q", "m1", b"x", None, None);
    burrow.get_message("a", "q", "m1", None).unwrap();

    let ttl = rec.borrow().messages[0].ttl.unwrap();
    assert!((299..=300).contains(&ttl));
}

#[test]
fn hidden_messages_skip_range_scans_but_not_singular_reads() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "a", "q", "m1", b"secret", None, Some(10));

    burrow.get_messages("a", "q", None).unwrap();
    assert!(rec.borrow().messages.is_empty());

    burrow.get_message("a", "q", "m1", None).unwrap();
    assert_eq!(rec.borrow().messages.len(), 1);
    assert!(rec.borrow().messages[0].hide.unwrap() > 0);

    // match_hidden=true brings it back into range scans.
    let mut filters = Filters::new();
    filters.set_match_hidden(true);
    burrow.get_messages("a", "q", Some(&filters)).unwrap();
    assert_eq!(rec.borrow().messages.len(), 2);

    // Unhiding via update makes the plain scan see it.
    let mut unhide = Attributes::new();
    unhide.set_hide(0);
    burrow.update_message("a", "q", "m1", &unhide, None).unwrap();
    rec.borrow_mut().clear();
    burrow.get_messages("a", "q", None).unwrap();
    assert_eq!(rec.borrow().messages.len(), 1);
    assert_eq!(rec.borrow().messages[0].hide, Some(0));
}

#[test]
fn delete_messages_reports_and_cascades() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "a", "q", "m1", b"one", None, None);
    create(&mut burrow, "a", "q", "m2", b"two", None, None);

    burrow.delete_messages("a", "q", None).unwrap();
    assert_eq!(rec.borrow().message_ids(), ["m1", "m2"]);

    burrow.get_messages("a", "q", None).unwrap();
    burrow.get_queues("a", None).unwrap();
    burrow.get_accounts(None).unwrap();
    let rec = rec.borrow();
    assert_eq!(rec.messages.len(), 2);
    assert!(rec.queues.is_empty());
    assert!(rec.accounts.is_empty());
}

#[test]
fn delete_accounts_is_silent_and_total() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "a1", "q1", "m1", b"x", None, None);
    create(&mut burrow, "a2", "q1", "m1", b"y", None, None);

    burrow.delete_accounts(None).unwrap();
    assert!(rec.borrow().messages.is_empty());

    burrow.get_accounts(None).unwrap();
    assert!(rec.borrow().accounts.is_empty());
}

#[test]
fn singular_get_of_absent_message_is_not_found() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    assert!(matches!(
        burrow.get_message("a", "q", "missing", None),
        Err(Error::NotFound)
    ));
    // The command still completed (with an error), exactly once.
    assert_eq!(rec.borrow().completes, 1);
    assert!(rec.borrow().messages.is_empty());
}

#[test]
fn expired_messages_are_swept_lazily() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    // ttl=0 expires immediately.
    create(&mut burrow, "a", "q", "m1", b"gone", Some(0), None);
    create(&mut burrow, "a", "q", "m2", b"kept", Some(100), None);

    burrow.get_messages("a", "q", None).unwrap();
    assert_eq!(rec.borrow().message_ids(), ["m2"]);

    // The sweep removed m1; a singular get agrees.
    assert!(matches!(
        burrow.get_message("a", "q", "m1", None),
        Err(Error::NotFound)
    ));
}

#[test]
fn expiring_the_last_message_cascades_on_singular_get() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "a", "q", "m1", b"x", Some(0), None);
    assert!(matches!(
        burrow.get_message("a", "q", "m1", None),
        Err(Error::NotFound)
    ));

    burrow.get_queues("a", None).unwrap();
    burrow.get_accounts(None).unwrap();
    assert!(rec.borrow().queues.is_empty());
    assert!(rec.borrow().accounts.is_empty());
}

#[test]
fn deletes_are_idempotent() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    assert!(matches!(
        burrow.delete_message("a", "q", "never", None),
        Ok(Progress::Complete)
    ));
    assert!(matches!(
        burrow.delete_messages("a", "q", None),
        Ok(Progress::Complete)
    ));
    assert!(matches!(
        burrow.delete_queues("a", None),
        Ok(Progress::Complete)
    ));
    assert!(matches!(
        burrow.delete_accounts(None),
        Ok(Progress::Complete)
    ));
    let rec = rec.borrow();
    assert!(rec.messages.is_empty());
    assert_eq!(rec.completes, 4);
}

#[test]
fn create_over_an_existing_id_replaces_in_place() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "a", "q", "m1", b"first", None, None);
    create(&mut burrow, "a", "q", "m2", b"second", None, None);
    create(&mut burrow, "a", "q", "m1", b"rewritten", None, None);

    burrow.get_messages("a", "q", None).unwrap();
    let rec = rec.borrow();
    assert_eq!(rec.message_ids(), ["m1", "m2"]);
    assert_eq!(rec.messages[0].body.as_deref(), Some(&b"rewritten"[..]));
}

#[test]
fn marker_and_limit_select_a_contiguous_window() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    for id in ["m1", "m2", "m3", "m4"] {
        create(&mut burrow, "a", "q", id, id.as_bytes(), None, None);
    }

    let mut filters = Filters::new();
    filters.set_marker("m2").set_limit(2);
    burrow.get_messages("a", "q", Some(&filters)).unwrap();
    assert_eq!(rec.borrow().message_ids(), ["m2", "m3"]);

    // A marker matching nothing falls back to the head.
    rec.borrow_mut().clear();
    let mut filters = Filters::new();
    filters.set_marker("zzz").set_limit(1);
    burrow.get_messages("a", "q", Some(&filters)).unwrap();
    assert_eq!(rec.borrow().message_ids(), ["m1"]);
}

#[test]
fn update_messages_applies_ttl_and_reports() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "a", "q", "m1", b"x", Some(50), None);
    create(&mut burrow, "a", "q", "m2", b"y", Some(50), None);

    let mut attrs = Attributes::new();
    attrs.set_ttl(500);
    burrow.update_messages("a", "q", &attrs, None).unwrap();

    let rec = rec.borrow();
    assert_eq!(rec.messages.len(), 2);
    for msg in &rec.messages {
        assert!((499..=500).contains(&msg.ttl.unwrap()));
    }
}

#[test]
fn update_with_zero_ttl_is_ignored() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "a", "q", "m1", b"x", Some(100), None);

    let mut attrs = Attributes::new();
    attrs.set_ttl(0);
    burrow.update_message("a", "q", "m1", &attrs, None).unwrap();
    let ttl = rec.borrow().messages[0].ttl.unwrap();
    assert!((99..=100).contains(&ttl));

    // Same rule for the range form.
    rec.borrow_mut().clear();
    burrow.update_messages("a", "q", &attrs, None).unwrap();
    let ttl = rec.borrow().messages[0].ttl.unwrap();
    assert!((99..=100).contains(&ttl));
}

#[test]
fn auto_created_containers_are_listed() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "acct", "jobs", "m1", b"x", None, None);
    burrow.get_accounts(None).unwrap();
    burrow.get_queues("acct", None).unwrap();

    let rec = rec.borrow();
    assert_eq!(rec.accounts, ["acct"]);
    assert_eq!(rec.queues, ["jobs"]);
}

#[test]
fn round_trip_bounds_hold_for_ttl_and_hide() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "a", "q", "m1", b"x", Some(120), Some(30));
    burrow.get_message("a", "q", "m1", None).unwrap();

    let rec = rec.borrow();
    let msg = &rec.messages[0];
    assert!((119..=120).contains(&msg.ttl.unwrap()));
    assert!((29..=30).contains(&msg.hide.unwrap()));
}

#[test]
fn singular_delete_reports_the_live_message() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "a", "q", "m1", b"x", None, Some(10));
    // Hidden state does not shield a message named by id.
    burrow.delete_message("a", "q", "m1", None).unwrap();
    assert_eq!(rec.borrow().message_ids(), ["m1"]);

    rec.borrow_mut().clear();
    burrow.get_queues("a", None).unwrap();
    assert!(rec.borrow().queues.is_empty());
}

#[test]
fn commands_issued_from_callbacks_respect_the_state_machine() {
    let mut burrow = burrow();

    create(&mut burrow, "a", "q", "m1", b"x", None, None);

    // Issuing from a message callback must fail with in-progress; issuing
    // from the complete callback (handle idle again) must succeed.
    let mid_command: Rc<RefCell<Vec<Result<Progress, Error>>>> =
        Rc::default();
    let from_complete: Rc<RefCell<Vec<Result<Progress, Error>>>> =
        Rc::default();

    let seen = Rc::clone(&mid_command);
    burrow.set_message_fn(move |b, _| {
        seen.borrow_mut().push(b.get_message("a", "q", "m1", None));
    });

    let seen = Rc::clone(&from_complete);
    let reissued = Rc::new(RefCell::new(false));
    let once = Rc::clone(&reissued);
    burrow.set_complete_fn(move |b| {
        if !*once.borrow() {
            *once.borrow_mut() = true;
            seen.borrow_mut().push(b.get_message("a", "q", "m1", None));
        }
    });

    burrow.get_messages("a", "q", None).unwrap();

    let mid = mid_command.borrow();
    assert!(matches!(mid[0], Err(Error::InProgress)));
    // The second command (issued in complete) ran: its own message
    // callback also tried to issue and was refused, so two attempts.
    assert_eq!(mid.len(), 2);
    assert!(matches!(
        from_complete.borrow()[0],
        Ok(Progress::Blocked)
    ));
    assert!(*reissued.borrow());
}

#[test]
fn account_listings_honor_the_window() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    for acct in ["a1", "a2", "a3"] {
        create(&mut burrow, acct, "q", "m", b"x", None, None);
    }

    let mut filters = Filters::new();
    filters.set_marker("a2");
    burrow.get_accounts(Some(&filters)).unwrap();
    assert_eq!(rec.borrow().accounts, ["a2", "a3"]);

    rec.borrow_mut().clear();
    let mut filters = Filters::new();
    filters.set_limit(1);
    burrow.get_accounts(Some(&filters)).unwrap();
    assert_eq!(rec.borrow().accounts, ["a1"]);
}

#[test]
fn wait_and_detail_filters_are_accepted_and_ignored() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "a", "q", "m1", b"x", None, None);

    let mut filters = Filters::new();
    filters.set_wait(30).set_detail(burrow_rs::Detail::Id);
    burrow.get_messages("a", "q", Some(&filters)).unwrap();

    // The memory backend always returns full messages immediately.
    let rec = rec.borrow();
    assert_eq!(rec.messages.len(), 1);
    assert_eq!(rec.messages[0].body.as_deref(), Some(&b"x"[..]));
}

#[test]
fn range_update_hides_and_unhides() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "a", "q", "m1", b"x", None, None);
    create(&mut burrow, "a", "q", "m2", b"y", None, None);

    // Hide everything in range.
    let mut attrs = Attributes::new();
    attrs.set_hide(60);
    burrow.update_messages("a", "q", &attrs, None).unwrap();
    assert_eq!(rec.borrow().messages.len(), 2);

    rec.borrow_mut().clear();
    burrow.get_messages("a", "q", None).unwrap();
    assert!(rec.borrow().messages.is_empty());

    // Unhide them again; the update itself must match hidden to reach
    // them.
    let mut unhide = Attributes::new();
    unhide.set_hide(0);
    let mut filters = Filters::new();
    filters.set_match_hidden(true);
    burrow
        .update_messages("a", "q", &unhide, Some(&filters))
        .unwrap();

    rec.borrow_mut().clear();
    burrow.get_messages("a", "q", None).unwrap();
    assert_eq!(rec.borrow().message_ids(), ["m1", "m2"]);
}

#[test]
fn delete_queues_honors_the_window() {
    let mut burrow = burrow();
    let rec = install(&mut burrow);

    create(&mut burrow, "a", "q1", "m1", b"x", None, None);
    create(&mut burrow, "a", "q2", "m1", b"x", None, None);
    create(&mut burrow, "a", "q3", "m1", b"x", None, None);

    let mut filters = Filters::new();
    filters.set_limit(2);
    burrow.delete_queues("a", Some(&filters)).unwrap();
    // Queue deletion never reports messages.
    assert!(rec.borrow().messages.is_empty());

    burrow.get_queues("a", None).unwrap();
    assert_eq!(rec.borrow().queues, ["q3"]);
}
