use clap::{Args as ClapArgs, Parser, Subcommand};

use burrow_rs::{Attributes, Detail, Filters};

#[derive(Parser, Debug)]
#[command(about, long_about = None, version)]
pub struct Args {
    /// Backend to drive: memory, http, or dummy.
    #[arg(short, long, default_value = "memory")]
    pub backend: String,
    /// Burrow server host (http backend).
    #[arg(short, long)]
    pub server: Option<String>,
    /// Burrow server port (http backend).
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Prints received elements as JSON lines.
    #[arg(short, long, default_value_t)]
    pub json: bool,
    /// Enables human-friendly logging.
    #[arg(short, long, default_value_t)]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Cmd,
}

#[derive(ClapArgs, Debug, Default)]
pub struct FilterArgs {
    /// Includes hidden messages in range scans.
    #[arg(long)]
    pub match_hidden: bool,
    /// Caps the number of elements returned.
    #[arg(long)]
    pub limit: Option<u32>,
    /// Key to start the range scan from.
    #[arg(long)]
    pub marker: Option<String>,
    /// Requested detail level: none, id, attributes, body, or all.
    #[arg(long)]
    pub detail: Option<String>,
    /// Long-poll for up to this many seconds.
    #[arg(long)]
    pub wait: Option<u32>,
}

impl FilterArgs {
    pub fn to_filters(&self) -> anyhow::Result<Option<Filters>> {
        let mut filters = Filters::new();
        let mut any = false;
        if self.match_hidden {
            filters.set_match_hidden(true);
            any = true;
        }
        if let Some(limit) = self.limit {
            filters.set_limit(limit);
            any = true;
        }
        if let Some(marker) = &self.marker {
            filters.set_marker(marker.clone());
            any = true;
        }
        if let Some(detail) = &self.detail {
            filters.set_detail(match detail.as_str() {
                "none" => Detail::None,
                "id" => Detail::Id,
                "attributes" => Detail::Attributes,
                "body" => Detail::Body,
                "all" => Detail::All,
                other => anyhow::bail!("unknown detail level: {other}"),
            });
            any = true;
        }
        if let Some(wait) = self.wait {
            filters.set_wait(wait);
            any = true;
        }
        Ok(any.then_some(filters))
    }
}

#[derive(ClapArgs, Debug, Default)]
pub struct AttrArgs {
    /// Seconds until the message expires.
    #[arg(long)]
    pub ttl: Option<u32>,
    /// Seconds the message stays hidden; 0 unhides.
    #[arg(long)]
    pub hide: Option<u32>,
}

impl AttrArgs {
    pub fn to_attributes(&self) -> Option<Attributes> {
        let mut attrs = Attributes::new();
        let mut any = false;
        if let Some(ttl) = self.ttl {
            attrs.set_ttl(ttl);
            any = true;
        }
        if let Some(hide) = self.hide {
            attrs.set_hide(hide);
            any = true;
        }
        any.then_some(attrs)
    }
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Creates or replaces one message.
    Create {
        account: String,
        queue: String,
        message_id: String,
        body: String,
        #[command(flatten)]
        attrs: AttrArgs,
    },
    /// Fetches one message by id.
    Get {
        account: String,
        queue: String,
        message_id: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Rewrites one message's ttl/hide.
    Update {
        account: String,
        queue: String,
        message_id: String,
        #[command(flatten)]
        attrs: AttrArgs,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Deletes one message by id.
    Delete {
        account: String,
        queue: String,
        message_id: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Lists a queue's messages.
    GetMessages {
        account: String,
        queue: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Rewrites ttl/hide across a range of messages.
    UpdateMessages {
        account: String,
        queue: String,
        #[command(flatten)]
        attrs: AttrArgs,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Deletes a range of messages.
    DeleteMessages {
        account: String,
        queue: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Lists an account's queues.
    GetQueues {
        account: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Deletes a range of queues.
    DeleteQueues {
        account: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Lists accounts.
    GetAccounts {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Deletes a range of accounts.
    DeleteAccounts {
        #[command(flatten)]
        filters: FilterArgs,
    },
}
