use anyhow::Result;
use app::{App, read_lines};
use clap::Parser;
use config::Config;
use dotenvy::dotenv;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use services::session_store::MemorySessionStore;
use std::io::{BufReader, stdin, stdout};
use std::time::Duration;
use tokio::select;
use tokio::signal::ctrl_c;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

mod api;
mod app;
mod config;
mod error;
mod model;
mod render;
mod services;
mod session;
mod utils;

const SERVICE_NAME: &str = "kmb_nearby_eta";

fn tracer_provider(endpoint: &str) -> Result<SdkTracerProvider> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_millis(1000))
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(Resource::builder().with_service_name(SERVICE_NAME).build())
        .build())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    _ = dotenv();
    let config = Config::parse();

    let provider = config
        .otlp_endpoint
        .as_deref()
        .map(tracer_provider)
        .transpose()?;

    let telemetry_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(SERVICE_NAME)));

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    // stdout belongs to the UI, so logs only go to rolling files
    let appender = tracing_appender::rolling::daily(&config.log_dir, "kmb_nearby_eta.log");
    let (non_blocking_appender, _guard) = tracing_appender::non_blocking(appender);

    let file_log = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false)
        .pretty();

    Registry::default()
        .with(telemetry_layer)
        .with(file_log)
        .with(env_filter)
        .init();

    info!("starting with radius {}", config.radius);

    let locator = config.locator()?;
    let api = api::HttpKmbApi::new(&config.stop_url, &config.eta_url);
    let store = MemorySessionStore::default();
    let mut app = App::new(&api, &store, config.radius, config.timezone, stdout());

    let session = async {
        if app.start(&locator).await? {
            app.run(read_lines(BufReader::new(stdin()))).await?;
        }
        Ok::<(), anyhow::Error>(())
    };

    select! {
        res = session => {
            if let Err(err) = &res {
                error!("{:?}", err);
            }
            res?;
        }
        _ = ctrl_c() => info!("interrupted"),
    }

    if let Some(provider) = provider {
        if let Err(err) = provider.shutdown() {
            error!("{:?}", err);
        }
    }

    Ok(())
}
