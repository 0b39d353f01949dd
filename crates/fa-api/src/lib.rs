use std::env;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    extract::State,
    extract::connect_info::ConnectInfo,
    http::Method,
    http::Request,
    http::header::{CONTENT_TYPE, HeaderName, HeaderValue},
    middleware,
    middleware::Next,
    response::Response,
    routing::{get, post},
};
use chrono::FixedOffset;
use clap::Parser;
use dotenvy::dotenv;
use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware,
    state::keyed::DashMapStateStore,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use fa_common::attendance::{AttendanceCoordinator, InMemoryAttendanceLog, SystemClock};
use fa_common::db::{PgAttendanceRepository, create_pool_from_url};
use fa_common::embedding::{EmbeddingStore, PopulateReport, RecognitionConfig};
use fa_common::logging::{init_tracing_subscriber, install_tracing_panic_hook};
use fa_common::matching::{Matcher, TopKRanker};
use fa_common::run_id;
use fa_common::timezone::{DEFAULT_ATTENDANCE_UTC_OFFSET_MINUTES, attendance_offset};

pub mod backend;
pub mod error;
pub mod handlers;

use backend::AttendanceBackend;
use error::ApiError;
use handlers::{attendance, health, identities, lookalikes, organizations};

const SHUTDOWN_DRAIN_GRACE: Duration = Duration::from_millis(200);
const DEFAULT_METRICS_PORT: u16 = 9101;
/// 512 次元 f32 の JSON を数枚分受けられる大きさ
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Parser)]
#[command(name = "fa-api", about = "Face recognition attendance API")]
struct Cli {
    /// PostgreSQL connection string; the in-memory log is used when absent
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Server port
    #[arg(long, env = "PORT", default_value_t = 3001)]
    port: u16,

    /// Comma separated list of allowed CORS origins
    #[arg(long, env = "FA_CORS_ORIGINS", default_value = "http://localhost:3000")]
    cors_origins: String,

    /// Organization treated as in-house; everyone else is enrolled as a vendor
    #[arg(long, env = "FA_HOST_ORGANIZATION")]
    host_organization: Option<String>,

    /// Minutes east of UTC used to decide the attendance calendar day
    #[arg(
        long,
        env = "FA_ATTENDANCE_UTC_OFFSET_MINUTES",
        default_value_t = DEFAULT_ATTENDANCE_UTC_OFFSET_MINUTES,
        allow_hyphen_values = true
    )]
    attendance_utc_offset_minutes: i32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub host_organization: Option<String>,
    pub attendance_offset: FixedOffset,
}

impl AppConfig {
    fn from_cli(cli: Cli) -> Result<Self, ApiError> {
        let cors_origins = cli
            .cors_origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect::<Vec<_>>();

        if cors_origins.iter().any(|origin| origin == "*") {
            return Err(ApiError::BadRequest(
                "FA_CORS_ORIGINS must list explicit origins".into(),
            ));
        }

        let attendance_offset = attendance_offset(cli.attendance_utc_offset_minutes)
            .ok_or_else(|| {
                ApiError::BadRequest(
                    "FA_ATTENDANCE_UTC_OFFSET_MINUTES must be within one day of UTC".into(),
                )
            })?;

        let host_organization = cli
            .host_organization
            .map(|org| org.trim().to_string())
            .filter(|org| !org.is_empty());

        Ok(Self {
            database_url: cli.database_url.filter(|url| !url.trim().is_empty()),
            port: cli.port,
            cors_origins,
            host_organization,
            attendance_offset,
        })
    }

    pub fn for_tests() -> Self {
        Self {
            database_url: None,
            port: 3001,
            cors_origins: vec!["http://localhost:3000".into()],
            host_organization: Some("Acme".into()),
            attendance_offset: fa_common::timezone::utc_offset(),
        }
    }
}

type IpRateLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock, NoOpMiddleware>;

#[derive(Clone)]
pub struct RateLimits {
    global: Arc<IpRateLimiter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub global_per_sec: u64,
    pub global_burst: u32,
}

impl RateLimitConfig {
    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let positive_u64 = |name: &str| {
            lookup(name)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|value| *value > 0)
        };
        let positive_u32 = |name: &str| {
            lookup(name)
                .and_then(|value| value.trim().parse::<u32>().ok())
                .filter(|value| *value > 0)
        };

        Self {
            global_per_sec: positive_u64("FA_RATE_LIMIT_GLOBAL_PER_SEC").unwrap_or(20),
            global_burst: positive_u32("FA_RATE_LIMIT_GLOBAL_BURST").unwrap_or(40),
        }
    }

    fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }
}

pub struct AppState {
    pub backend: Arc<AttendanceBackend>,
    pub store: Arc<EmbeddingStore>,
    pub coordinator: AttendanceCoordinator<AttendanceBackend, SystemClock>,
    pub ranker: TopKRanker,
    pub config: AppConfig,
    pub recognition: RecognitionConfig,
    pub(crate) rate_limits: RateLimits,
    pub readiness: Arc<AtomicBool>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// キャッシュ・照合器・トグル台帳を 1 つのバックエンドに束ねる
    pub fn new(
        backend: AttendanceBackend,
        config: AppConfig,
        recognition: RecognitionConfig,
        rate_limits: RateLimits,
    ) -> Self {
        let backend = Arc::new(backend);
        let store = Arc::new(EmbeddingStore::new(recognition.dimension));
        let matcher = Matcher::new(Arc::clone(&store), recognition.match_threshold);
        let coordinator = AttendanceCoordinator::new(
            matcher,
            Arc::clone(&backend),
            SystemClock,
            config.attendance_offset,
        );
        let ranker = TopKRanker::from_config(Arc::clone(&store), &recognition);

        Self {
            backend,
            store,
            coordinator,
            ranker,
            config,
            recognition,
            rate_limits,
            readiness: Arc::new(AtomicBool::new(true)),
        }
    }

    /// 起動時に 1 回だけ登録済み人物をキャッシュへ載せる
    pub async fn warm_cache(&self) -> Result<PopulateReport, ApiError> {
        let report = self.store.warm_from(self.backend.as_ref()).await?;
        fa_metrics::set_cached_identities(self.store.len());
        Ok(report)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct MakeRequestUlid;

impl MakeRequestId for MakeRequestUlid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&run_id::generate())
            .ok()
            .map(RequestId::new)
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static("x-request-id")])
}

fn build_ip_limiter(per_second: u64, burst_size: u32) -> Arc<IpRateLimiter> {
    let nanos_per_token = (1_000_000_000u64 / per_second.max(1)).max(1);
    let burst = NonZeroU32::new(burst_size).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::with_period(Duration::from_nanos(nanos_per_token))
        .map(|quota| quota.allow_burst(burst))
        .unwrap_or_else(|| Quota::per_second(burst));

    Arc::new(RateLimiter::keyed(quota))
}

pub fn default_rate_limits() -> RateLimits {
    let cfg = RateLimitConfig::from_env();
    RateLimits {
        global: build_ip_limiter(cfg.global_per_sec, cfg.global_burst),
    }
}

fn request_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

fn enforce_rate_limit(limiter: &IpRateLimiter, ip: Option<IpAddr>) -> Result<(), ApiError> {
    if let Some(client_ip) = ip {
        if limiter.check_key(&client_ip).is_err() {
            return Err(ApiError::TooManyRequests("rate limit exceeded".into()));
        }
    }

    Ok(())
}

async fn global_rate_limit(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    enforce_rate_limit(&state.rate_limits.global, request_ip(&req))?;
    Ok(next.run(req).await)
}

async fn attach_request_id_context(req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    Ok(error::with_request_id(request_id, next.run(req)).await)
}

pub fn create_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let request_id_header = HeaderName::from_static("x-request-id");
    let trace_header = request_id_header.clone();

    let trace = TraceLayer::new_for_http().make_span_with(move |request: &Request<Body>| {
        let request_id = request
            .headers()
            .get(&trace_header)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
            status = tracing::field::Empty,
        )
    });

    let api_routes = Router::new()
        .route("/attendance/mark", post(attendance::mark))
        .route("/attendance/mark-face", post(attendance::mark_face))
        .route("/attendance/wave-mark", post(attendance::wave_mark))
        .route("/lookalikes", post(lookalikes::find_lookalikes))
        .route("/identities", post(identities::enroll_identity))
        .route(
            "/organizations",
            get(organizations::list_organizations).post(organizations::create_organization),
        );

    Router::new()
        .route("/health", get(health::readyz))
        .route("/livez", get(health::livez))
        .route("/readyz", get(health::readyz))
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            global_rate_limit,
        ))
        .layer(middleware::from_fn(attach_request_id_context))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(trace)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUlid))
        .layer(cors)
        .with_state(state)
}

/// メモリバックエンドで組み立てた状態（埋め込み次元だけ指定できる）
pub fn test_state_with_dimension(dimension: usize) -> SharedState {
    let recognition = RecognitionConfig {
        dimension,
        ..RecognitionConfig::default()
    };

    Arc::new(AppState::new(
        AttendanceBackend::Memory(InMemoryAttendanceLog::default()),
        AppConfig::for_tests(),
        recognition,
        default_rate_limits(),
    ))
}

pub fn test_state() -> SharedState {
    test_state_with_dimension(RecognitionConfig::default().dimension)
}

async fn connect_backend(config: &AppConfig) -> Result<AttendanceBackend, ApiError> {
    let Some(database_url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set; attendance is kept in memory only");
        return Ok(AttendanceBackend::Memory(InMemoryAttendanceLog::default()));
    };

    let pool = create_pool_from_url(database_url)
        .map_err(|err| ApiError::Database(format!("failed to create pool: {err}")))?;
    let repo = PgAttendanceRepository::new(pool);
    repo.ping().await?;
    repo.migrate()
        .await
        .map_err(|err| ApiError::Database(format!("failed to run migrations: {err}")))?;

    Ok(AttendanceBackend::Postgres(repo))
}

pub async fn run() -> Result<(), ApiError> {
    dotenv().ok();
    init_tracing_subscriber(env!("CARGO_PKG_NAME"));
    install_tracing_panic_hook(env!("CARGO_PKG_NAME"));
    fa_metrics::init_metrics("FA_METRICS_PORT", DEFAULT_METRICS_PORT);

    let cli = Cli::parse();
    let config = AppConfig::from_cli(cli)?;
    let recognition = fa_common::embedding::load_config_from_env();
    let backend = connect_backend(&config).await?;

    let state = Arc::new(AppState::new(
        backend,
        config.clone(),
        recognition,
        default_rate_limits(),
    ));
    let report = state.warm_cache().await?;

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let app = create_router(state.clone());

    info!(
        %addr,
        run_id = run_id::get(),
        backend = state.backend.kind(),
        cached_identities = report.loaded,
        skipped_identities = report.skipped,
        dimension = state.recognition.dimension,
        match_threshold = state.recognition.match_threshold,
        "fa-api listening"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let service = app.into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    Ok(())
}

async fn shutdown_signal(state: SharedState) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    state.readiness.store(false, Ordering::SeqCst);
    info!("shutdown requested; draining");

    // /readyz が not ready を返す猶予
    tokio::time::sleep(SHUTDOWN_DRAIN_GRACE).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["fa-api"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn sets_ulid_request_id_when_missing() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(SetRequestIdLayer::new(
                HeaderName::from_static("x-request-id"),
                MakeRequestUlid,
            ));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let request_id = response.headers()["x-request-id"].to_str().unwrap();
        assert!(run_id::is_valid(request_id));
    }

    #[test]
    fn rate_limit_config_reads_overrides_and_ignores_zero() {
        let vars: HashMap<&str, &str> = [
            ("FA_RATE_LIMIT_GLOBAL_PER_SEC", "10"),
            ("FA_RATE_LIMIT_GLOBAL_BURST", "0"),
        ]
        .into_iter()
        .collect();

        let cfg = RateLimitConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(
            cfg,
            RateLimitConfig {
                global_per_sec: 10,
                global_burst: 40,
            }
        );
    }

    #[test]
    fn config_rejects_wildcard_cors_and_bad_offsets() {
        assert!(AppConfig::from_cli(cli(&["--cors-origins", "*"])).is_err());
        assert!(
            AppConfig::from_cli(cli(&["--attendance-utc-offset-minutes", "1440"])).is_err()
        );
    }

    #[test]
    fn config_parses_offset_and_host_organization() {
        let config = AppConfig::from_cli(cli(&[
            "--attendance-utc-offset-minutes",
            "-300",
            "--host-organization",
            "  Acme ",
            "--cors-origins",
            "http://a.test, http://b.test",
        ]))
        .unwrap();

        assert_eq!(config.attendance_offset.local_minus_utc(), -18_000);
        assert_eq!(config.host_organization.as_deref(), Some("Acme"));
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn limiter_throttles_after_burst() {
        let limiter = build_ip_limiter(1, 2);
        let ip: IpAddr = [10, 0, 0, 1].into();

        assert!(enforce_rate_limit(&limiter, Some(ip)).is_ok());
        assert!(enforce_rate_limit(&limiter, Some(ip)).is_ok());
        assert!(enforce_rate_limit(&limiter, Some(ip)).is_err());
        assert!(enforce_rate_limit(&limiter, None).is_ok());
    }
}
