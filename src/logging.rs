use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rocket::{
    fairing::{Fairing, Info, Kind},
    http::StatusClass,
    Data, Orbit, Request, Response, Rocket,
};

/// A unique identifier for a particular request, used to correlate log lines.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct RequestId(pub usize);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RequestId {
    /// Atomically get the next ID. Wraps around to zero on overflow.
    fn next() -> RequestId {
        static REQUEST_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
        RequestId(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Per-request bookkeeping, created the first time anything asks for it.
struct RequestTrace {
    id: RequestId,
    received: Instant,
}

impl RequestTrace {
    fn of<'r>(req: &'r Request<'_>) -> &'r Self {
        req.local_cache(|| RequestTrace {
            id: RequestId::next(),
            received: Instant::now(),
        })
    }

    fn elapsed(&self) -> Duration {
        self.received.elapsed()
    }
}

/// The ID under which this request's log lines are written.
pub fn request_id(req: &Request<'_>) -> RequestId {
    RequestTrace::of(req).id
}

/// Logs server liftoff and shutdown, plus one line per request and response.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let protocol = if rocket.config().tls_enabled() {
            "https"
        } else {
            "http"
        };
        let ip = &rocket.config().address;
        let port = &rocket.config().port;
        info!("Voting server listening on {protocol}://{ip}:{port}");
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let trace = RequestTrace::of(req);
        let client = req
            .client_ip()
            .map_or_else(|| "unknown client".to_string(), |ip| ip.to_string());
        info!("->req{} {} {} from {client}", trace.id, req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let trace = RequestTrace::of(req);
        let code = res.status();
        let route = req
            .route()
            .map_or_else(|| "unmatched".to_string(), |r| r.uri.to_string());
        let log_msg = format!(
            "<-rsp{} {code} {route} in {}ms",
            trace.id,
            trace.elapsed().as_millis()
        );
        match code.class() {
            StatusClass::ServerError => error!("{log_msg}"),
            StatusClass::ClientError => warn!("{log_msg}"),
            _ => info!("{log_msg}"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("Shutdown requested, finishing in-flight votes...");
    }
}
