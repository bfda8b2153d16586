use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    decide, load_settings, GateDecision, OrderSearch, PanelStatus, ProductSearch, ResultsPanel,
    SearchCoordinator, SearchHandle, StorefrontApi,
};
use serde_json::json;
use shared::{
    domain::{AccountStatus, Session, UserId},
    protocol::{Order, Product},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Overrides the configured API base url.
    #[arg(long)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reads search box input from stdin, one value per line. `:focus`,
    /// `:close` and `:page <n>` stand for the matching box events.
    Search {
        #[arg(long)]
        orders: bool,
        #[arg(long, requires = "user_id")]
        email: Option<String>,
        #[arg(long, requires = "email")]
        user_id: Option<String>,
    },
    Gate {
        #[arg(long, default_value = "active")]
        status: String,
        #[arg(long, default_value = "/")]
        location: String,
        /// Evaluate with no session at all.
        #[arg(long)]
        absent: bool,
    },
    /// Prints the seller onboarding link shown in the storefront footer.
    SellerLink,
}

struct TerminalPanel<F> {
    describe: F,
}

impl<T, F> ResultsPanel<T> for TerminalPanel<F>
where
    F: Fn(&T) -> String + Send,
{
    fn show(&mut self, items: &[T], status: PanelStatus) {
        if status.is_loading {
            println!("[loading]");
        } else if status.is_error {
            println!("[error] search failed");
        } else if items.is_empty() {
            println!("[empty] nothing found");
        } else {
            for item in items {
                println!("  {}", (self.describe)(item));
            }
        }
    }

    fn hide(&mut self) {
        println!("[closed]");
    }

    fn paginate(&mut self, page: u32, page_count: u64) {
        println!("[page {page} of {page_count}]");
    }
}

fn describe_product(product: &Product) -> String {
    format!("{} ({:.2})", product.title, product.price)
}

fn describe_order(order: &Order) -> String {
    format!("{} {} {:.2}", order.id, order.order_status, order.total)
}

async fn feed_stdin<P: Send + 'static>(handle: SearchHandle<P>) -> Result<P> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.as_str() {
            ":focus" => handle.focus(),
            ":close" => handle.close(),
            value => match value.strip_prefix(":page ").map(|n| n.trim().parse::<u32>()) {
                Some(Ok(page)) => handle.go_to_page(page),
                Some(Err(err)) => warn!(%err, "ignoring malformed page command"),
                None => handle.on_change(value),
            },
        }
    }
    handle.finish().await
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(api_url) = cli.api_url {
        settings.api_base_url = api_url;
    }

    match cli.command {
        Command::Search {
            orders,
            email,
            user_id,
        } => {
            info!(api = %settings.api_base_url, orders, "starting search session");
            let api = Arc::new(StorefrontApi::new(&settings)?);
            if orders {
                let (Some(user_id), Some(email)) = (user_id, email) else {
                    bail!("order search needs --user-id and --email");
                };
                let backend = OrderSearch::new(api, UserId::from(user_id.as_str()), email);
                let coordinator = SearchCoordinator::new(
                    Arc::new(backend),
                    TerminalPanel {
                        describe: describe_order,
                    },
                    settings.quiet_period(),
                    settings.order_page_size,
                );
                feed_stdin(SearchHandle::spawn(coordinator)).await?;
            } else {
                let coordinator = SearchCoordinator::new(
                    Arc::new(ProductSearch::new(api)),
                    TerminalPanel {
                        describe: describe_product,
                    },
                    settings.quiet_period(),
                    settings.product_search_limit,
                );
                feed_stdin(SearchHandle::spawn(coordinator)).await?;
            }
        }
        Command::Gate {
            status,
            location,
            absent,
        } => {
            let session = (!absent).then(|| Session {
                id: UserId::from("cli-user"),
                email: String::new(),
                status: AccountStatus::from(status),
                first_name: String::new(),
                last_name: String::new(),
                photo: None,
                expires_at: None,
            });
            let decision = match decide(session.as_ref(), &location) {
                GateDecision::Allow => json!({ "decision": "allow" }),
                GateDecision::Redirect { destination, memo } => json!({
                    "decision": "redirect",
                    "to": destination.path(),
                    "return_to": memo.map(|memo| memo.into_path()),
                }),
            };
            println!("{}", serde_json::to_string(&decision)?);
        }
        Command::SellerLink => println!("{}", settings.seller_center_url),
    }

    Ok(())
}
