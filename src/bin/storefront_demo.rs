//! storefront-demo 商品目录客户端演示：列表、详情、分类与故障模拟
//!
//! Usage:
//!   storefront-demo list [limit]                     List products through the cache
//!   storefront-demo get <id>                         Show one product
//!   storefront-demo categories                       List categories
//!   storefront-demo simulate <kind> [count] <id>     Arm a fault, then read a product

use anyhow::{bail, Context};
use std::time::Instant;
use storefront_client::facade::Catalog;
use storefront_client::resilience::{shared_injector, FaultKind, DEFAULT_FAULT_COUNT};
use storefront_client::{CatalogClient, ErrorRecord, Product};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("storefront_client=info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        std::process::exit(1);
    };

    let client = CatalogClient::builder()
        .fault_injector(shared_injector())
        .build()
        .context("building catalog client")?;
    let catalog = Catalog::from_client(client);

    match command.as_str() {
        "list" => cmd_list(&catalog, &args[1..]).await,
        "get" => cmd_get(&catalog, &args[1..]).await,
        "categories" => cmd_categories(&catalog).await,
        "simulate" => cmd_simulate(&catalog, &args[1..]).await,
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"storefront-demo: resilient catalog client demo

USAGE:
    storefront-demo <COMMAND> [ARGS]

COMMANDS:
    list [limit]                    List products (falls back to demo data)
    get <id>                        Show one product
    categories                      List categories
    simulate <kind> [count] <id>    Fail the next [count] requests, then read product <id>
                                    kinds: 500, 404, timeout, network, empty, invalid
    help                            Show this help message

ENVIRONMENT:
    STOREFRONT_API_URL              Catalog base URL (default https://fakestoreapi.com)
    STOREFRONT_HTTP_TIMEOUT_MS      Per-attempt timeout (default 10000)
    STOREFRONT_MAX_RETRIES          Transport retries (default 3)
    STOREFRONT_PROXY_URL            Optional HTTP proxy
    RUST_LOG                        Log filter (default storefront_client=info)"#
    );
}

fn parse_id(arg: Option<&String>) -> anyhow::Result<i64> {
    let raw = arg.context("missing product id")?;
    raw.parse::<i64>()
        .with_context(|| format!("invalid product id: {raw}"))
}

fn print_product(p: &Product) {
    println!(
        "#{:<4} {:<50} {:>9.2}  {:<16} ★{:.1} ({})",
        p.id,
        truncate(&p.title, 50),
        p.price,
        p.category,
        p.rating.rate,
        p.rating.count
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn print_error(err: &ErrorRecord) {
    eprintln!("error: {}", err.message);
    eprintln!(
        "       kind={} status={} retryable={}",
        err.code(),
        err.http_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string()),
        err.retryable
    );
}

async fn cmd_list(catalog: &Catalog, args: &[String]) -> anyhow::Result<()> {
    let limit = match args.first() {
        Some(raw) => Some(
            raw.parse::<u32>()
                .with_context(|| format!("invalid limit: {raw}"))?,
        ),
        None => None,
    };
    let out = catalog.products_or_fallback(limit).await;
    if out.using_fallback {
        println!("(catalog unreachable, showing demo products)");
        if let Some(err) = &out.state.error {
            print_error(err);
        }
    }
    for p in out.state.data.iter().flatten() {
        print_product(p);
    }
    Ok(())
}

async fn cmd_get(catalog: &Catalog, args: &[String]) -> anyhow::Result<()> {
    let id = parse_id(args.first())?;
    let state = catalog.product(id).await;
    if let Some(p) = &state.data {
        print_product(p);
        println!();
        println!("{}", p.description);
        println!("{}", p.image);
    }
    match &state.error {
        Some(err) => {
            print_error(err);
            bail!("request failed after {} attempt(s)", state.failure_count)
        }
        None if state.is_idle() => bail!("product ids start at 1"),
        None => Ok(()),
    }
}

async fn cmd_categories(catalog: &Catalog) -> anyhow::Result<()> {
    let state = catalog.categories().await;
    if let Some(err) = &state.error {
        print_error(err);
        bail!("could not load categories");
    }
    for c in state.data.unwrap_or_default() {
        println!("{c}");
    }
    Ok(())
}

async fn cmd_simulate(catalog: &Catalog, args: &[String]) -> anyhow::Result<()> {
    let kind: FaultKind = args.first().context("missing fault kind")?.parse()?;
    let (count, id) = match args.len() {
        2 => (DEFAULT_FAULT_COUNT, parse_id(args.get(1))?),
        n if n >= 3 => (
            args[1]
                .parse::<u32>()
                .with_context(|| format!("invalid count: {}", args[1]))?,
            parse_id(args.get(2))?,
        ),
        _ => bail!("usage: simulate <kind> [count] <id>"),
    };

    let injector = shared_injector();
    let _subscription = injector.subscribe(|s| match s.active {
        Some(kind) => println!("[fault] {} armed, {} remaining", kind.label(), s.remaining),
        None => println!("[fault] cleared"),
    });
    println!("Simulating: {} ({})", kind.label(), kind.description());
    injector.arm(kind, count);

    let started = Instant::now();
    let state = catalog.product(id).await;
    let elapsed = started.elapsed();

    match (&state.data, &state.error) {
        (Some(p), _) => {
            println!("recovered in {:.1}s", elapsed.as_secs_f64());
            print_product(p);
        }
        (None, Some(err)) => {
            println!("gave up after {:.1}s", elapsed.as_secs_f64());
            print_error(err);
        }
        (None, None) => println!("nothing loaded"),
    }
    let left = injector.state();
    if left.remaining > 0 {
        println!("{} simulated failure(s) left unused", left.remaining);
    }
    injector.clear();
    Ok(())
}
