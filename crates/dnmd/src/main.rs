// # dnmd - Domain Manager Daemon
//
// Thin integration layer over dnm-core. All extraction, retry and queueing
// logic lives in the library; this binary only:
// 1. Reads configuration from environment variables
// 2. Initializes logging and the runtime
// 3. Registers providers and builds the Docker event source
// 4. Runs the event listener until a signal arrives or ingestion gives up
//
// ## Configuration
//
// ### Provider
// - `DNM_PROVIDER`: Provider name (ovh, cloudflare). Default: ovh
// - `DNM_DOMAIN_NAME`: Base domain (zone) to manage
// - `DNM_TARGET`: CNAME target. Default: the base domain
// - `DNM_<PROVIDER>_<KEY>`: Provider credentials, e.g. `DNM_OVH_APPLICATION_KEY`
// - `DNM_MODE`: `live` or `dry-run`. Default: live
//
// ### Runtime
// - `DNM_DOCKER_BASE_URL`: Docker endpoint. Default: unix:///var/run/docker.sock
// - `DNM_RULE_LABEL`: Label holding the routing rule.
//   Default: traefik.http.routers.web.rule
// - `DNM_RECONNECT_ATTEMPTS`: Event stream reconnect attempts (0 disables)
// - `DNM_POLL_INTERVAL_MS`: Processing dequeue timeout
//
// ### Manager
// - `DNM_MAX_RETRIES`: Retries for transient provider errors
// - `DNM_RETRY_DELAY_SECS`: Delay between retries
//
// ## Example
//
// ```bash
// export DNM_PROVIDER=cloudflare
// export DNM_DOMAIN_NAME=example.com
// export DNM_TARGET=proxy.example.com
// export DNM_CLOUDFLARE_API_TOKEN=your_token
//
// dnmd
// ```

use anyhow::Result;
use dnm_core::{
    EventListener, ListenerConfig, ProcessEnv, ProviderRegistry, ReconnectPolicy, RetryPolicy,
    SubdomainManager, VariableSource,
};
use dnm_docker::{DEFAULT_DOCKER_ENDPOINT, DockerEventSource};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown after SIGTERM/SIGINT
/// - 1: Configuration error or provider construction failure
/// - 2: Runtime failure (event ingestion gave up)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DnmExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DnmExitCode> for ExitCode {
    fn from(code: DnmExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    provider: String,
    docker_base_url: String,
    rule_label: String,
    mode: String,
    max_retries: usize,
    retry_delay_secs: u64,
    reconnect_attempts: u32,
    poll_interval_ms: u64,
    log_level: String,
}

impl Config {
    /// Load configuration from the process environment
    fn from_env() -> Result<Self> {
        Self::from_vars(&ProcessEnv)
    }

    /// Load configuration from a variable source
    ///
    /// Provider credentials and domain details are not read here; the
    /// provider registry resolves those so it can report every missing
    /// variable at once.
    fn from_vars(vars: &dyn VariableSource) -> Result<Self> {
        Ok(Self {
            provider: vars.get("DNM_PROVIDER").unwrap_or_else(|| "ovh".to_string()),
            docker_base_url: vars
                .get("DNM_DOCKER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_DOCKER_ENDPOINT.to_string()),
            rule_label: vars
                .get("DNM_RULE_LABEL")
                .unwrap_or_else(|| dnm_core::config::DEFAULT_RULE_LABEL.to_string()),
            mode: vars.get("DNM_MODE").unwrap_or_else(|| "live".to_string()),
            max_retries: parse_var(vars, "DNM_MAX_RETRIES", 2)?,
            retry_delay_secs: parse_var(vars, "DNM_RETRY_DELAY_SECS", 2)?,
            reconnect_attempts: parse_var(vars, "DNM_RECONNECT_ATTEMPTS", 5)?,
            poll_interval_ms: parse_var(vars, "DNM_POLL_INTERVAL_MS", 1000)?,
            log_level: vars.get("DNM_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Checks value formats and numeric ranges. Credentials and the domain
    /// are validated later by the provider factory.
    fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            anyhow::bail!(
                "DNM_PROVIDER cannot be empty. \
                Set it via: export DNM_PROVIDER=ovh"
            );
        }

        if self.docker_base_url.trim().is_empty() {
            anyhow::bail!(
                "DNM_DOCKER_BASE_URL cannot be empty. \
                Default: {}",
                DEFAULT_DOCKER_ENDPOINT
            );
        }

        if self.rule_label.trim().is_empty() {
            anyhow::bail!("DNM_RULE_LABEL cannot be empty");
        }

        match self.mode.to_lowercase().as_str() {
            "live" | "dry-run" => {}
            _ => anyhow::bail!(
                "DNM_MODE '{}' is not valid. Valid modes: live, dry-run",
                self.mode
            ),
        }

        if self.max_retries > 10 {
            anyhow::bail!(
                "DNM_MAX_RETRIES must be between 0 and 10. Got: {}",
                self.max_retries
            );
        }

        if !(1..=300).contains(&self.retry_delay_secs) {
            anyhow::bail!(
                "DNM_RETRY_DELAY_SECS must be between 1 and 300 seconds. Got: {}",
                self.retry_delay_secs
            );
        }

        if self.reconnect_attempts > 100 {
            anyhow::bail!(
                "DNM_RECONNECT_ATTEMPTS must be between 0 and 100. Got: {}",
                self.reconnect_attempts
            );
        }

        if !(10..=60_000).contains(&self.poll_interval_ms) {
            anyhow::bail!(
                "DNM_POLL_INTERVAL_MS must be between 10 and 60000. Got: {}",
                self.poll_interval_ms
            );
        }

        self.log_level()?;

        Ok(())
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "DNM_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_secs * 1000,
        }
    }

    fn listener_config(&self) -> ListenerConfig {
        ListenerConfig::default()
            .with_rule_label(self.rule_label.trim())
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_reconnect(ReconnectPolicy {
                max_attempts: self.reconnect_attempts,
                ..ReconnectPolicy::default()
            })
    }
}

fn parse_var<T: FromStr>(vars: &dyn VariableSource, name: &str, default: T) -> Result<T> {
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer. Got: '{}'", name, raw)),
    }
}

/// Register every provider compiled into this binary
fn build_registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "ovh")]
    dnm_provider_ovh::register(&registry);

    #[cfg(feature = "cloudflare")]
    dnm_provider_cloudflare::register(&registry);

    registry
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DnmExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DnmExitCode::ConfigError.into();
    }

    let log_level = config.log_level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DnmExitCode::ConfigError.into();
    }

    info!(provider = %config.provider, docker = %config.docker_base_url, "Starting dnmd");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DnmExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config)).into()
}

/// Run the daemon until shutdown
async fn run_daemon(config: Config) -> DnmExitCode {
    let registry = build_registry();
    info!(providers = ?registry.list(), "Providers registered");

    let provider = match registry.create_provider(&config.provider, &ProcessEnv).await {
        Ok(provider) => provider,
        Err(e) => {
            error!(provider = %config.provider, "Failed to construct provider: {}", e);
            return DnmExitCode::ConfigError;
        }
    };

    let manager = match SubdomainManager::new(provider, config.retry_policy()) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!("Failed to create subdomain manager: {}", e);
            return DnmExitCode::ConfigError;
        }
    };

    let source = match DockerEventSource::new(&config.docker_base_url) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            error!("Failed to create Docker event source: {}", e);
            return DnmExitCode::ConfigError;
        }
    };

    let mut listener = EventListener::new(source, manager, config.listener_config());
    if let Err(e) = listener.start() {
        error!("Failed to start event listener: {}", e);
        return DnmExitCode::ConfigError;
    }

    let exit_code = tokio::select! {
        signal = wait_for_shutdown() => match signal {
            Ok(name) => {
                info!("Received shutdown signal: {}", name);
                DnmExitCode::CleanShutdown
            }
            Err(e) => {
                error!("Shutdown error: {}", e);
                DnmExitCode::RuntimeError
            }
        },
        _ = listener.ingestion_closed() => {
            error!("Event ingestion ended; exiting so a supervisor can restart the daemon");
            DnmExitCode::RuntimeError
        }
    };

    info!("Stopping event listener");
    let report = listener.stop().await;

    if report.actions_discarded > 0 {
        warn!(discarded = report.actions_discarded, "Queued actions were not processed");
    }
    info!(
        received = report.events_received,
        enqueued = report.actions_enqueued,
        processed = report.actions_processed,
        failed = report.actions_failed,
        reconnects = report.reconnects,
        "dnmd stopped"
    );

    exit_code
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
