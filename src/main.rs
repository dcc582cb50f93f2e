use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;
use storefront_access::{
    AppState,
    auth::SessionUser,
    authz::{lint, storefront_predicates},
    build_app,
    config::StorefrontConfig,
    observability,
};

/// Config file picked up from the working directory when `--config` is absent.
const LOCAL_CONFIG_FILE: &str = "storefront-access.toml";

#[derive(Parser, Debug)]
#[command(version, about = "Storefront route access control", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./storefront-access.toml if it exists,
    /// otherwise the built-in storefront table)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the access guard server (default)
    Serve,
    /// Show which pattern and policy a path resolves to
    Resolve {
        /// Navigation path, optionally with a query string
        path: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Evaluate a navigation for a given session
    Check {
        /// Navigation path, optionally with a query string
        path: String,
        /// Signed-in user ID (omit for a signed-out visitor)
        #[arg(long)]
        user: Option<String>,
        /// Role held by the user (repeatable)
        #[arg(long = "role", requires = "user")]
        roles: Vec<String>,
        /// Subscription plan of the user
        #[arg(long, requires = "user")]
        plan: Option<String>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List the route table grouped by access rule
    Routes {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Check the route table for ties, unreachable and malformed patterns,
    /// and unknown access rules. Exits non-zero on errors.
    Lint {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Write a starter configuration file
    Init {
        /// Path to create the config file (defaults to ./storefront-access.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Starter configuration: the storefront route table.
fn default_config_toml() -> &'static str {
    r#"# Storefront access control
#
# Access rules: public, guest, authenticated, role:<name>, plan:<name>,
# custom:<name>. Unmatched paths use [policy].default.

[policy]
default = "authenticated"
default_title = "Protected Page"
lint = "warn"

[pages]
sign_in = "/login"
forbidden = "/error?message=insufficient_permissions"
upgrade = "/upgrade"
landing = "/"

[server]
host = "127.0.0.1"
port = 8080

# Serve the built storefront behind the guard
# [server.assets]
# path = "${STOREFRONT_DIST}"

# Trust identity headers from an authenticating reverse proxy
# [server.identity]
# identity_header = "x-forwarded-user"
# roles_header = "x-forwarded-groups"
# plan_header = "x-forwarded-plan"

[observability.logging]
level = "info"
format = "compact"

# Public pages
[[routes]]
pattern = "/"
access = "public"
title = "Home"

[[routes]]
pattern = "/product/:id"
access = "public"
title = "Product"

[[routes]]
pattern = "/category/:category"
access = "public"
title = "Category"

[[routes]]
pattern = "/callback"
access = "public"

[[routes]]
pattern = "/error"
access = "public"
title = "Error"

# Sign-in pages, only for signed-out visitors
[[routes]]
pattern = "/login"
access = "guest"
title = "Sign In"

[[routes]]
pattern = "/signup"
access = "guest"
title = "Sign Up"

# Account pages
[[routes]]
pattern = "/search"
access = "authenticated"

[[routes]]
pattern = "/wishlist"
access = "authenticated"
title = "Wishlist"

[[routes]]
pattern = "/deals"
access = "authenticated"
title = "Deals"

[[routes]]
pattern = "/orders"
access = "authenticated"
title = "Orders"

[[routes]]
pattern = "/checkout"
access = "authenticated"
title = "Checkout"

[[routes]]
pattern = "/checkout/*"
access = "authenticated"
title = "Checkout"

# Administration
[[routes]]
pattern = "/admin"
access = "role:admin"
title = "Admin"

[[routes]]
pattern = "/admin/*"
access = "role:admin"
title = "Admin"

[[routes]]
pattern = "/admin/**/*"
access = "role:admin"
title = "Admin"

# Premium features
[[routes]]
pattern = "/premium/*"
access = "plan:premium"
title = "Premium"

# Executive dashboards
[[routes]]
pattern = "/executive/*"
access = "custom:is_ceo"
title = "Executive"
redirect_on_deny = "/"
"#
}

/// Load the config from `--config`, the working directory, or the built-in
/// table, in that order.
fn load_config(explicit_path: Option<&str>) -> Result<(StorefrontConfig, String), String> {
    let path = match explicit_path {
        Some(path) => {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(format!("Config file not found: {}", path.display()));
            }
            Some(path)
        }
        None => Some(PathBuf::from(LOCAL_CONFIG_FILE)).filter(|p| p.exists()),
    };

    match path {
        Some(path) => StorefrontConfig::from_file(&path)
            .map(|config| (config, path.display().to_string()))
            .map_err(|e| format!("Failed to load config from {}: {e}", path.display())),
        None => StorefrontConfig::from_str(default_config_toml())
            .map(|config| (config, "(built-in)".to_string()))
            .map_err(|e| format!("Failed to load built-in config: {e}")),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to serialize output: {e}");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Some(Command::Init { output, force }) = &args.command {
        run_init(output.clone(), *force);
        return;
    }

    let (config, source) = match load_config(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    tracing::debug!(config_file = %source, routes = config.routes.len(), "Configuration loaded");

    // Lint separately so the report covers errors that `lint = "deny"` would
    // refuse at startup
    if let Some(Command::Lint { json }) = &args.command {
        run_lint(&config, *json);
        return;
    }

    let state = match AppState::new(config, storefront_predicates()) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    match args.command {
        Some(Command::Resolve { path, json }) => run_resolve(&state, &path, json),
        Some(Command::Check {
            path,
            user,
            roles,
            plan,
            json,
        }) => {
            let session = user.map(|id| {
                let user = SessionUser::new().with_id(id).with_roles(roles);
                match plan {
                    Some(plan) => user.with_plan(plan),
                    None => user,
                }
            });
            run_check(&state, &path, session.as_ref(), json);
        }
        Some(Command::Routes { json }) => run_routes(&state, json),
        Some(Command::Serve) | None => run_server(state, &source).await,
        Some(Command::Lint { .. }) | Some(Command::Init { .. }) => {}
    }
}

/// Write a starter configuration file.
fn run_init(output: Option<String>, force: bool) {
    let output_path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG_FILE));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, default_config_toml()) {
        eprintln!("Failed to write config file: {e}");
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("To start the access guard, run:");
    println!("  storefront-access serve --config {}", output_path.display());
}

fn run_resolve(state: &AppState, path: &str, json: bool) {
    let table = state.access.table();
    let resolution = table.resolve_match(path);

    if json {
        print_json(&serde_json::json!({
            "path": path,
            "pattern": resolution.pattern,
            "kind": resolution.kind,
            "policy": resolution.descriptor,
            "candidates": table.candidates(path),
        }));
        return;
    }

    match (resolution.pattern, resolution.kind) {
        (Some(pattern), Some(kind)) => println!("{path} -> {pattern} ({kind})"),
        _ => println!("{path} -> (default)"),
    }
    println!("  access: {}", resolution.descriptor.access);
    if let Some(title) = &resolution.descriptor.title {
        println!("  title:  {title}");
    }
    let candidates = table.candidates(path);
    if candidates.len() > 1 {
        println!("  candidates:");
        for candidate in candidates {
            println!(
                "    {:<32} {:<16} score {}",
                candidate.pattern,
                candidate.kind,
                candidate.specificity.score()
            );
        }
    }
}

fn run_check(state: &AppState, path: &str, user: Option<&SessionUser>, json: bool) {
    let check = state.access.check(path, user);

    if json {
        print_json(&serde_json::json!({
            "path": path,
            "pattern": check.resolution.pattern,
            "access": check.resolution.descriptor.access,
            "decision": check.decision,
        }));
        return;
    }

    let pattern = check.resolution.pattern.unwrap_or("(default)");
    if check.decision.allowed {
        println!("ALLOW {path} ({pattern}: {})", check.resolution.descriptor.access);
    } else {
        println!(
            "DENY  {path} ({pattern}: {})",
            check.resolution.descriptor.access
        );
        if let Some(target) = &check.decision.redirect_target {
            println!("  redirect: {target}");
        }
        if !check.decision.failed.is_empty() {
            println!("  failed:   {}", check.decision.failed.join(", "));
        }
    }
}

fn run_routes(state: &AppState, json: bool) {
    let table = state.access.table();
    let groups = table.routes_by_access();

    if json {
        print_json(&serde_json::json!({
            "routes": groups,
            "default": table.default_descriptor(),
        }));
        return;
    }

    for (access, patterns) in &groups {
        println!("{access} ({})", patterns.len());
        for pattern in patterns {
            println!("  {pattern}");
        }
    }
    println!("(default) {}", table.default_descriptor().access);
}

fn run_lint(config: &StorefrontConfig, json: bool) {
    let table = config.policy_table();
    let findings = lint(&table, &storefront_predicates());
    let errors = findings.iter().filter(|f| f.is_error()).count();

    if json {
        print_json(&findings);
    } else if findings.is_empty() {
        println!("No issues in {} route(s)", table.len());
    } else {
        for finding in &findings {
            println!("{finding}");
        }
        println!();
        println!(
            "{} finding(s), {errors} error(s) in {} route(s)",
            findings.len(),
            table.len()
        );
    }

    if errors > 0 {
        std::process::exit(1);
    }
}

async fn run_server(state: AppState, source: &str) {
    let bind_addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    tracing::info!(
        config_file = %source,
        routes = state.access.table().len(),
        "Starting storefront access guard"
    );
    if state.config.server.identity.is_some() && !state.config.server.host.is_loopback() {
        tracing::warn!(
            "Identity headers are trusted from any client. Make sure the storefront is only \
             reachable through the authenticating proxy."
        );
    }

    let app = build_app(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind to {bind_addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!("Server listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
