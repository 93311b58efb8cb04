mod args;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{error, Level};

use burrow_rs::{Burrow, MessageEvent, Options};

use crate::args::{Args, Cmd};

#[derive(Serialize)]
struct JsonMessage<'a> {
    id: Option<&'a str>,
    body: Option<String>,
    ttl: Option<u32>,
    hide: Option<u32>,
}

fn print_message(json: bool, msg: &MessageEvent<'_>) {
    if json {
        let out = JsonMessage {
            id: msg.id,
            body: msg
                .body
                .map(|b| String::from_utf8_lossy(b).into_owned()),
            ttl: msg.attributes.map(|a| a.ttl()),
            hide: msg.attributes.map(|a| a.hide()),
        };
        // Panic safety: JsonMessage has no non-string keys or maps.
        println!("{}", serde_json::to_string(&out).unwrap());
    } else {
        let id = msg.id.unwrap_or("-");
        let body = msg
            .body
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        match msg.attributes {
            Some(attrs) => println!(
                "{id}\tttl={}\thide={}\t{body}",
                attrs.ttl(),
                attrs.hide()
            ),
            None => println!("{id}\t{body}"),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.debug {
        tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .init();
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_max_level(Level::WARN)
            .init();
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "command failed");
            ExitCode::FAILURE
        },
    }
}

fn run(args: Args) -> Result<()> {
    let mut burrow = Burrow::create(&args.backend)
        .with_context(|| format!("creating backend {:?}", args.backend))?;
    burrow.add_options(Options::AUTOPROCESS);

    if let Some(server) = &args.server {
        burrow
            .set_backend_option("server", server)
            .context("setting server")?;
    }
    if let Some(port) = args.port {
        burrow
            .set_backend_option("port", &port.to_string())
            .context("setting port")?;
    }

    let json = args.json;
    burrow.set_message_fn(move |_, msg| print_message(json, &msg));
    burrow.set_queue_fn(|_, queue| println!("{queue}"));
    burrow.set_account_fn(|_, account| println!("{account}"));

    match &args.command {
        Cmd::Create { account, queue, message_id, body, attrs } => {
            burrow.create_message(
                account,
                queue,
                message_id,
                body.as_bytes(),
                attrs.to_attributes().as_ref(),
            )?;
        },
        Cmd::Get { account, queue, message_id, filters } => {
            burrow.get_message(
                account,
                queue,
                message_id,
                filters.to_filters()?.as_ref(),
            )?;
        },
        Cmd::Update { account, queue, message_id, attrs, filters } => {
            let attrs = attrs
                .to_attributes()
                .context("update requires --ttl and/or --hide")?;
            burrow.update_message(
                account,
                queue,
                message_id,
                &attrs,
                filters.to_filters()?.as_ref(),
            )?;
        },
        Cmd::Delete { account, queue, message_id, filters } => {
            burrow.delete_message(
                account,
                queue,
                message_id,
                filters.to_filters()?.as_ref(),
            )?;
        },
        Cmd::GetMessages { account, queue, filters } => {
            burrow.get_messages(
                account,
                queue,
                filters.to_filters()?.as_ref(),
            )?;
        },
        Cmd::UpdateMessages { account, queue, attrs, filters } => {
            let attrs = attrs
                .to_attributes()
                .context("update requires --ttl and/or --hide")?;
            burrow.update_messages(
                account,
                queue,
                &attrs,
                filters.to_filters()?.as_ref(),
            )?;
        },
        Cmd::DeleteMessages { account, queue, filters } => {
            burrow.delete_messages(
                account,
                queue,
                filters.to_filters()?.as_ref(),
            )?;
        },
        Cmd::GetQueues { account, filters } => {
            burrow.get_queues(account, filters.to_filters()?.as_ref())?;
        },
        Cmd::DeleteQueues { account, filters } => {
            burrow.delete_queues(account, filters.to_filters()?.as_ref())?;
        },
        Cmd::GetAccounts { filters } => {
            burrow.get_accounts(filters.to_filters()?.as_ref())?;
        },
        Cmd::DeleteAccounts { filters } => {
            burrow.delete_accounts(filters.to_filters()?.as_ref())?;
        },
    }

    Ok(())
}
