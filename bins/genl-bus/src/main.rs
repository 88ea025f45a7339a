//! genl-bus - subscribe to or send messages on the generic netlink bus.

use std::ops::ControlFlow;

use clap::{CommandFactory, Parser};
use genlbus::bus::{self, ClientConfig, GlobalGroupId, MessageText, Mode, SubscriptionSet};
use genlbus::netlink::genl::GenlConnection;

#[derive(Parser)]
#[command(
    name = "genl-bus",
    version,
    about = "Generic netlink bus client",
    long_about = "Subscribe to bus multicast groups and print every message, \
                  or send one message to the bus."
)]
struct Cli {
    /// Groups to listen on, comma separated (0-499).
    #[arg(short = 'l', value_name = "GROUPS")]
    groups: Vec<String>,

    /// Message to send (used with -s).
    #[arg(short = 'm', value_name = "MESSAGE")]
    message: Option<String>,

    /// Send the message given with -m.
    #[arg(short = 's')]
    send: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Mode is settled before any socket is opened
    let config = match parse_groups(&cli.groups)
        .and_then(|groups| ClientConfig::from_args(groups, cli.send, cli.message))
    {
        Ok(Some(config)) => config,
        Ok(None) => {
            eprintln!("Nothing to do!");
            eprintln!("{}", Cli::command().render_usage());
            return Ok(());
        }
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", Cli::command().render_usage());
            std::process::exit(1);
        }
    };

    let result = match config.mode {
        Mode::Send(text) => send(config.target_family, &text).await,
        Mode::Subscribe(groups) => listen(&groups).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn parse_groups(lists: &[String]) -> genlbus::Result<Vec<GlobalGroupId>> {
    let mut groups = Vec::new();
    for list in lists {
        groups.extend(GlobalGroupId::parse_list(list)?);
    }
    Ok(groups)
}

async fn send(family: usize, text: &MessageText) -> genlbus::Result<()> {
    let conn = GenlConnection::new()?;
    bus::send_command(&conn, family, text).await?;
    tracing::info!(family, "message sent");
    Ok(())
}

async fn listen(groups: &SubscriptionSet) -> genlbus::Result<()> {
    let conn = GenlConnection::new()?;
    let mut subscriber = bus::subscribe(conn, groups).await?;
    tracing::info!(groups = subscriber.groups().len(), "listening");

    tokio::select! {
        result = subscriber.run(|notification| {
            println!("{}", notification);
            ControlFlow::Continue(())
        }) => result,
        _ = tokio::signal::ctrl_c() => Ok(()),
    }
}
