use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use document_store::{AppwriteStore, CollectionRef, Credentials, DocumentStore, MemoryStore};
use query_cache::{QueryClient, QueryClientConfig, QueryMetrics};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use comment_service::config::Config;
use comment_service::services::ChannelNotifier;
use comment_service::ui::{CommentSection, Dispatch, SectionEvent};
use comment_service::{CommentQueries, CommentRepository, Session};

const USAGE: &str = "usage: comment-service [--memory] <post_id> [user_id] [name]";

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,comment_service=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn build_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    let credentials = match (&config.store.api_key, &config.store.jwt) {
        (Some(key), _) => Credentials::ApiKey(key.clone()),
        (None, Some(jwt)) => Credentials::Jwt(jwt.clone()),
        (None, None) => Credentials::None,
    };

    let store = AppwriteStore::builder(&config.store.endpoint, &config.store.project_id)
        .credentials(credentials)
        .timeout(Duration::from_secs(config.store.timeout_secs))
        .build()
        .context("Failed to build document store client")?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let use_memory = args.iter().any(|a| a == "--memory");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let post_id = positional
        .first()
        .map(|s| s.to_string())
        .context(USAGE)?;
    let session = positional.get(1).map(|user_id| {
        let name = positional.get(2).map(|s| s.as_str()).unwrap_or("");
        Session::new(user_id.as_str(), name)
    });

    info!("Starting comment-service v{}", env!("CARGO_PKG_VERSION"));

    let (config, store): (Config, Arc<dyn DocumentStore>) = if use_memory {
        info!("Using in-memory document store");
        (Config::in_memory(), Arc::new(MemoryStore::new()))
    } else {
        let config = Config::from_env().context("Failed to load configuration")?;
        let store = build_store(&config)?;
        (config, store)
    };
    info!(env = %config.app.env, post_id = %post_id, "Configuration loaded");

    let registry = prometheus::Registry::new();
    QueryMetrics::register(&registry).context("Failed to register query metrics")?;

    let client = QueryClient::with_config(QueryClientConfig {
        gc_time: Duration::from_secs(config.cache.gc_secs),
    });
    let gc_task = client.spawn_gc(Duration::from_secs(config.cache.gc_secs.max(1)));

    let repository = CommentRepository::new(
        store,
        CollectionRef::new(
            config.store.database_id.clone(),
            config.store.comments_collection_id.clone(),
        ),
    )
    .with_page_size(config.comments.page_size);
    let queries = CommentQueries::new(client.clone(), repository);

    let (notifier, mut toasts) = ChannelNotifier::channel();
    let mut section = CommentSection::new(&queries, post_id, session, Arc::new(notifier))
        .with_preview_limit(config.comments.preview_limit);

    if section.session().is_none() {
        warn!("No user given; comments are read-only");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", section.render());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let line = line.trim_end();

                if line == "/quit" {
                    break;
                }
                if let Some(comment_id) = line.strip_prefix("/delete ") {
                    if section.request_delete(comment_id.trim()) == Dispatch::Ignored {
                        println!("! nothing to delete");
                    }
                } else {
                    match section.submit_line(line) {
                        Dispatch::Rejected(reason) => info!(reason = %reason, "Comment rejected"),
                        Dispatch::Ignored if section.is_creating() => {
                            println!("! still posting the previous comment, line dropped")
                        }
                        Dispatch::Ignored if section.session().is_none() => {
                            println!("! read-only, line dropped")
                        }
                        _ => {}
                    }
                }
            }
            update = section.next_update() => {
                if let Some(SectionEvent::Created(Err(err))) = update? {
                    warn!(error = %err, "Comment was not added");
                }
            }
            Some(toast) = toasts.recv() => {
                println!("* {}", toast);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
        println!("{}", section.render());
    }

    gc_task.abort();
    let stats = client.stats();
    info!(
        fetches = stats.fetches,
        fetch_errors = stats.fetch_errors,
        invalidations = stats.invalidations,
        "comment-service stopped"
    );
    Ok(())
}
