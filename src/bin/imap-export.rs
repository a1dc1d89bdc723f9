#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for exporting mail from an IMAP account (read-only)

use anyhow::Context;
use clap::{Parser, Subcommand};
use imap_export_client::{
    Config, FetchAttribute, FetchAttributes, Flag, IdKind, IdSet, MailboxDescriptor, MessageRecord,
    Provider,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imap-export")]
#[command(about = "Read-only IMAP export that survives flaky connections")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List mailboxes
    Mailboxes,

    /// Select a mailbox and show its status
    Status {
        /// Mailbox name
        mailbox: String,
    },

    /// Fetch messages from a mailbox
    Fetch {
        /// Mailbox name
        mailbox: String,

        /// Message set, e.g. "1:10,15" or "1:*"
        #[arg(long, default_value = "1:*")]
        ids: IdSet,

        /// Interpret --ids as UIDs instead of sequence numbers
        #[arg(long)]
        uid: bool,

        /// Fetch headers only, not full messages
        #[arg(long)]
        headers: bool,

        /// Write one .eml file per message into this directory
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let mut provider = Provider::new(config.endpoint, config.credentials);

    match &args.command {
        Command::Mailboxes => cmd_mailboxes(&mut provider, &args).await?,
        Command::Status { mailbox } => cmd_status(&mut provider, &args, mailbox).await?,
        Command::Fetch {
            mailbox,
            ids,
            uid,
            headers,
            out,
        } => {
            let kind = if *uid { IdKind::Uid } else { IdKind::Sequence };
            let attributes = if *headers {
                FetchAttributes::metadata().with(FetchAttribute::Header)
            } else {
                FetchAttributes::full()
            };
            cmd_fetch(
                &mut provider,
                &args,
                mailbox,
                ids,
                kind,
                &attributes,
                out.as_deref(),
            )
            .await?;
        }
    }

    if let Err(e) = provider.logout().await {
        tracing::debug!(error = %e, "Logout failed");
    }
    Ok(())
}

async fn cmd_mailboxes(provider: &mut Provider, args: &Args) -> anyhow::Result<()> {
    let mailboxes = provider.list_mailboxes().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&mailboxes)?);
    } else {
        print_mailboxes(&mailboxes);
    }

    Ok(())
}

async fn cmd_status(provider: &mut Provider, args: &Args, mailbox: &str) -> anyhow::Result<()> {
    let status = provider.select_mailbox(mailbox).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Mailbox:      {}", status.name);
        println!("Exists:       {}", status.exists);
        println!("Recent:       {}", status.recent);
        println!("Unseen:       {}", display_opt(status.unseen));
        println!("UIDVALIDITY:  {}", display_opt(status.uid_validity));
        println!("UIDNEXT:      {}", display_opt(status.uid_next));
        println!("Flags:        {}", join_flags(&status.flags));
    }

    Ok(())
}

async fn cmd_fetch(
    provider: &mut Provider,
    args: &Args,
    mailbox: &str,
    ids: &IdSet,
    kind: IdKind,
    attributes: &FetchAttributes,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let messages = provider
        .fetch_collect(mailbox, ids, kind, attributes)
        .await?;

    if let Some(dir) = out {
        write_messages(dir, &messages, kind)?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
    } else {
        print_message_table(&messages);
    }

    Ok(())
}

fn write_messages(dir: &Path, messages: &[MessageRecord], kind: IdKind) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    for message in messages {
        let Some(raw) = message.body.as_ref().or(message.header.as_ref()) else {
            continue;
        };
        let id = message.id(kind).unwrap_or(message.seq);
        let path = dir.join(format!("{id}.eml"));
        std::fs::write(&path, raw)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(())
}

fn print_mailboxes(mailboxes: &[MailboxDescriptor]) {
    for mailbox in mailboxes {
        if mailbox.attributes.is_empty() {
            println!("{}", mailbox.name);
        } else {
            println!("{}  ({})", mailbox.name, mailbox.attributes.join(" "));
        }
    }
}

fn print_message_table(messages: &[MessageRecord]) {
    if messages.is_empty() {
        println!("No messages found.");
        return;
    }

    println!("{:<8} {:<8} {:<10} {}", "SEQ", "UID", "SIZE", "FLAGS");
    println!("{}", "-".repeat(60));

    for message in messages {
        println!(
            "{:<8} {:<8} {:<10} {}",
            message.seq,
            display_opt(message.uid),
            display_opt(message.size),
            join_flags(&message.flags),
        );
    }

    println!("\n{} message(s)", messages.len());
}

fn join_flags(flags: &[Flag]) -> String {
    flags
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn display_opt<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}
