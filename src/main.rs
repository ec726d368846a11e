use actix_web::{middleware, web, App, HttpServer};
use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use std::sync::Arc;
use tubee::channels::renewal::SweepMode;
use tubee::channels::ChannelService;
use tubee::config::AppConfig;
use tubee::hub::WebSubHub;
use tubee::observability::{init_logging, Metrics};
use tubee::tasks::orchestrator::EventOrchestrator;
use tubee::tasks::queue::{LocalTaskQueue, TaskQueue};
use tubee::tasks::types::Task;
use tubee::tasks::worker;
use tubee::youtube::YouTubeDataApi;
use tubee::{api, db};

const CATCHUP_TASK_ID: &str = "catchup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StartupSweep {
    Immediate,
    Scheduled,
    Jittered,
    None,
}

impl StartupSweep {
    fn mode(self) -> Option<SweepMode> {
        match self {
            StartupSweep::Immediate => Some(SweepMode::Immediate),
            StartupSweep::Scheduled => Some(SweepMode::Scheduled),
            StartupSweep::Jittered => Some(SweepMode::Jittered),
            StartupSweep::None => None,
        }
    }
}

/// CLI options
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Renewal sweep to queue at startup
    #[clap(long, value_enum, default_value_t = StartupSweep::Scheduled)]
    startup_sweep: StartupSweep,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    init_logging();
    let args = Args::parse();

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    tracing::info!(db_path = %config.db_path, "Opening database");
    let db_pool = db::initialize_db_pool(&config.db_path).map_err(io_error)?;
    db::run_migrations(&db_pool).map_err(io_error)?;

    let hub = WebSubHub::new(&config.hub).map_err(io_error)?;
    let content = YouTubeDataApi::new(config.content.clone()).map_err(io_error)?;
    let (queue, receiver) = LocalTaskQueue::new();
    let queue: Arc<dyn TaskQueue> = Arc::new(queue);

    let orchestrator =
        EventOrchestrator::new(queue.clone(), config.renewal, config.hub_info_delay);
    let service = Arc::new(ChannelService::new(
        db_pool.clone(),
        Arc::new(hub),
        Arc::new(content),
        orchestrator,
        config.hub.clone(),
    ));

    tokio::spawn(worker::start(receiver, service.clone()));

    if let Some(mode) = args.startup_sweep.mode() {
        match service.renew_all(mode) {
            Ok(handles) => tracing::info!(?mode, tasks = handles.len(), "Startup renewal sweep queued"),
            Err(e) => tracing::error!("Startup renewal sweep failed: {}", e),
        }
    }
    if let Err(e) = queue.submit(
        Task::FetchAllVideos,
        config.catchup_interval,
        Some(config.catchup_interval),
        Some(CATCHUP_TASK_ID.to_string()),
    ) {
        tracing::error!("Could not schedule catch-up fetch: {}", e);
    }

    tracing::info!(
        "Starting server at http://{}:{}",
        config.bind_address,
        config.port
    );

    let service_data = web::Data::from(service);
    let metrics = web::Data::new(Metrics::new());

    HttpServer::new(move || {
        App::new()
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(service_data.clone())
            .app_data(metrics.clone())
            .service(api::health::routes())
            .service(api::routes::routes())
    })
    .bind((config.bind_address.as_str(), config.port))?
    .run()
    .await
}

fn io_error<E: std::fmt::Display>(err: E) -> std::io::Error {
    tracing::error!("Startup failed: {}", err);
    std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
}
