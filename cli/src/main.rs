use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use ripple::{
    proto::{EventKind, RowFilter},
    realtime::RealtimeClient,
    Affordance, BackendConfig, ChangeFeed, NotifierOptions, RefreshSignal, SubscriptionOptions,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Watch a table for new content")]
struct Args {
    /// Table to watch
    table: String,

    #[arg(long, default_value = "public")]
    schema: String,

    /// Mutations to listen for
    #[arg(long, value_enum, default_value_t = Event::Any)]
    event: Event,

    /// Row filter such as `author_id=eq.15` or `category=in.(a,b)`
    #[arg(long)]
    filter: Option<RowFilter>,

    /// Column holding the record identifier
    #[arg(long, default_value = "id")]
    id_column: String,

    /// Singular noun used in summaries
    #[arg(long, default_value = "item")]
    noun: String,

    /// Project url. Defaults to SUPABASE_URL, then NEXT_PUBLIC_SUPABASE_URL
    #[arg(long, requires = "key")]
    url: Option<String>,

    /// Anon key. Defaults to SUPABASE_ANON_KEY, then NEXT_PUBLIC_SUPABASE_ANON_KEY
    #[arg(long, requires = "url")]
    key: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Event {
    Insert,
    Update,
    Delete,
    Any,
}

impl From<Event> for EventKind {
    fn from(event: Event) -> Self {
        match event {
            Event::Insert => EventKind::Insert,
            Event::Update => EventKind::Update,
            Event::Delete => EventKind::Delete,
            Event::Any => EventKind::Any,
        }
    }
}

impl Args {
    fn subscription_options(&self) -> SubscriptionOptions {
        let options = SubscriptionOptions::table(&self.table).schema(&self.schema).event(self.event.into()).id_column(&self.id_column);
        match &self.filter {
            Some(filter) => options.filter(filter.clone()),
            None => options,
        }
    }

    fn feed(&self) -> Result<Option<Arc<dyn ChangeFeed>>> {
        let client = match (&self.url, &self.key) {
            (Some(url), Some(key)) => RealtimeClient::connect(Some(&BackendConfig::new(url, key.as_str())?)),
            _ => RealtimeClient::from_env(),
        };
        Ok(client.map(|client| Arc::new(client) as Arc<dyn ChangeFeed>))
    }
}

fn render(affordance: &Affordance) {
    match affordance {
        Affordance::Hidden => println!("(up to date)"),
        Affordance::NewContent { message, .. } => println!("{message}  [r to refresh]"),
        Affordance::Reconnect { message } => println!("{message}  [c to reconnect]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let options = args.subscription_options();
    info!("Watching {}", options);

    let signal = RefreshSignal::new();
    let notifier = ripple::watch(args.feed()?, NotifierOptions::new(options).noun(args.noun.as_str()), signal.clone())?;

    let mut status = notifier.status();
    let mut changes = notifier.changes();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("status: {}", status.get());
    let mut shown = notifier.affordance();
    render(&shown);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if !changed {
                    break;
                }
                println!("status: {}", status.get());
            }
            changed = changes.changed() => {
                if !changed {
                    break;
                }
            }
            _ = signal.requested() => println!("refresh requested ({} so far)", signal.requests()),
            line = lines.next_line() => match line? {
                None => break,
                Some(line) => match line.trim() {
                    "r" => notifier.refresh(),
                    "c" => {
                        if let Err(e) = notifier.reconnect() {
                            warn!("Cannot reconnect: {}", e);
                        }
                    }
                    "q" => break,
                    "" => {}
                    other => println!("unknown command {other:?}: r = refresh, c = reconnect, q = quit"),
                },
            },
        }

        let affordance = notifier.affordance();
        if affordance != shown {
            render(&affordance);
            shown = affordance;
        }
    }

    notifier.unmount();
    Ok(())
}
