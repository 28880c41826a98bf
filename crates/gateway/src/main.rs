use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;

use pl_domain::config::ObservabilityConfig;
use pl_gateway::cli::{self, Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to an interactive chat when no subcommand is given.
        None => {
            let (config, _) = cli::load_config()?;
            let tracer_provider = init_tracing(&config.observability);
            let result = cli::chat::chat(Arc::new(config), "cli:chat".into()).await;
            shutdown_tracing(tracer_provider);
            result
        }
        Some(Command::Chat { conversation }) => {
            let (config, _) = cli::load_config()?;
            let tracer_provider = init_tracing(&config.observability);
            let result = cli::chat::chat(Arc::new(config), conversation).await;
            shutdown_tracing(tracer_provider);
            result
        }
        Some(Command::Run {
            message,
            conversation,
            model,
            json,
        }) => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            let ok = cli::run::run(Arc::new(config), message, conversation, model, json).await?;
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::History { conversation, json }) => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            cli::history::history(Arc::new(config), &conversation, json).await
        }
        Some(Command::Reset { conversation }) => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            cli::history::reset(Arc::new(config), &conversation).await
        }
        Some(Command::Audit {
            conversation,
            limit,
        }) => {
            init_cli_tracing();
            let (config, _) = cli::load_config()?;
            cli::history::audit(Arc::new(config), conversation.as_deref(), limit)
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config()?;
            if !cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _) = cli::load_config()?;
            cli::config::show(&config)
        }
        Some(Command::Version) => {
            println!("parley {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing to stderr for the long-running
/// chat session.
///
/// When an OTLP endpoint is configured, an OpenTelemetry layer is added
/// so that every `tracing` span is also exported as an OTel span via
/// OTLP/gRPC. The returned [`SdkTracerProvider`] handle must be shut
/// down on exit to flush pending spans.
///
/// [`SdkTracerProvider`]: opentelemetry_sdk::trace::SdkTracerProvider
fn init_tracing(obs: &ObservabilityConfig) -> Option<opentelemetry_sdk::trace::SdkTracerProvider> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pl_gateway=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr);

    match obs.export_endpoint() {
        Some(endpoint) => {
            let exporter = match opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()
            {
                Ok(e) => e,
                Err(e) => {
                    eprintln!(
                        "WARNING: failed to create OTLP exporter for {endpoint}: {e}, \
                         starting without OpenTelemetry"
                    );
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt_layer)
                        .init();
                    return None;
                }
            };

            let resource = opentelemetry_sdk::Resource::builder()
                .with_service_name(obs.service_name.clone())
                .build();

            let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(
                    obs.sampler_ratio(),
                ))
                .with_resource(resource)
                .build();

            let otel_layer =
                tracing_opentelemetry::layer().with_tracer(tracer_provider.tracer("parley"));

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .with(otel_layer)
                .init();

            Some(tracer_provider)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .init();

            None
        }
    }
}

/// Flush and shut down the OTel tracer provider so pending spans are
/// exported before the process exits.
fn shutdown_tracing(provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>) {
    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = ?e, "OpenTelemetry tracer provider shutdown failed");
        }
    }
}

/// Initialize compact stderr-only tracing for CLI one-shot commands.
///
/// Defaults to `warn` level so diagnostic output does not pollute stdout.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
