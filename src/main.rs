use portal_client::{
    ApiClient, AuthScope, AuthTokens, MemoryTokenStore, PaginationParams, TokenState,
    config::{ClientConfig, Env},
    query::to_wire,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: portal-client <admin|public> <path> [query]";

/// main
///
/// Issues one scoped GET against the configured backend and prints the body.
/// Tokens are seeded from `PORTAL_ACCESS_TOKEN` / `PORTAL_REFRESH_TOKEN`; the query is
/// given in UI terms (`page=2&status=in:a,b`) and converted to the wire form.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = ClientConfig::load();

    // 2. Logging Filter Setup
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "portal_client=debug,reqwest=info".into());

    // 3. Log format follows the environment: pretty locally, JSON in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    // 4. Arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (scope, path) = match (args.first(), args.get(1)) {
        (Some(scope), Some(path)) => match scope.parse::<AuthScope>() {
            Ok(scope) => (scope, path.clone()),
            Err(e) => {
                eprintln!("{}\n{}", e, USAGE);
                std::process::exit(2);
            }
        },
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };
    let params = PaginationParams::from_query_str(args.get(2).map(String::as_str).unwrap_or(""));
    let query = to_wire(&params, config.default_limit).to_query_string();
    let target = if query.is_empty() {
        path
    } else {
        format!("{}?{}", path, query)
    };

    // 5. Token Store
    let store = match (
        std::env::var("PORTAL_ACCESS_TOKEN"),
        std::env::var("PORTAL_REFRESH_TOKEN"),
    ) {
        (Ok(access), Ok(refresh)) => {
            MemoryTokenStore::with_tokens(scope, AuthTokens::new(access, refresh))
        }
        _ => MemoryTokenStore::new(),
    };
    let tokens = Arc::new(store) as TokenState;

    // 6. Client
    let client = match ApiClient::new(&config, scope, tokens) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "failed to build client");
            std::process::exit(1);
        }
    };

    tracing::info!(scope = %scope, target = %target, base = %config.api_base_url, "issuing request");

    match client.get_text(&target).await {
        Ok(body) => println!("{}", body),
        Err(e) => {
            tracing::error!(kind = %e.kind(), error = %e, "request failed");
            eprintln!("{}: {}", e.kind(), e);
            std::process::exit(1);
        }
    }
}
