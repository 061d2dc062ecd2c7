use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use hyper::{
    header::CONTENT_TYPE,
    http::HeaderValue,
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server, StatusCode,
};
use lazy_static::lazy_static;
use log::{error, info};
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Encoder, Histogram, IntCounter,
    IntGauge, TextEncoder, TEXT_FORMAT,
};

lazy_static! {
    pub static ref COUNTER_COMMITTER_ELECTIONS: IntCounter = register_int_counter!(
        "completion_committer_elections_total",
        "Number of committer arbitrations performed"
    )
    .unwrap();
    pub static ref COUNTER_SEGMENTS_COMMITTED: IntCounter = register_int_counter!(
        "completion_segments_committed_total",
        "Number of segments that reached DONE"
    )
    .unwrap();
    pub static ref COUNTER_COMMIT_CONFLICTS: IntCounter = register_int_counter!(
        "completion_commit_conflicts_total",
        "Metadata-store version conflicts rolled back"
    )
    .unwrap();
    pub static ref COUNTER_STRAGGLER_REPAIRS: IntCounter = register_int_counter!(
        "completion_straggler_repairs_total",
        "Committer decisions discarded after the commit timeout"
    )
    .unwrap();
    pub static ref COUNTER_SEGMENTS_ABORTED: IntCounter = register_int_counter!(
        "completion_segments_aborted_total",
        "Committing segments the supervisor marked repair-pending"
    )
    .unwrap();
    pub static ref COUNTER_PROTOCOL_VIOLATIONS: IntCounter = register_int_counter!(
        "completion_protocol_violations_total",
        "Requests answered with FAILED"
    )
    .unwrap();
    pub static ref GAUGE_LIVE_STATE_MACHINES: IntGauge = register_int_gauge!(
        "completion_live_state_machines",
        "Segment commit state machines currently registered"
    )
    .unwrap();
    pub static ref HISTOGRAM_COMMIT_SECONDS: Histogram = register_histogram!(
        "completion_commit_duration_seconds",
        "Wall time from committer election to DONE",
        vec![1.0, 5.0, 15.0, 60.0, 180.0, 600.0]
    )
    .unwrap();
}

pub fn record_commit_duration(seconds: f64) {
    HISTOGRAM_COMMIT_SECONDS.observe(seconds);
}

pub fn dump() -> String {
    let mut buffer = vec![];
    dump_to(&mut buffer);
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn dump_to(w: &mut impl Write) {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    if let Err(e) = encoder.encode(&metric_families, w) {
        error!("prometheus encoding error. error: {}", e);
    }
}

pub async fn http_serve(host: &str, port: u16) {
    let ip = host
        .parse::<IpAddr>()
        .unwrap_or(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
    let socket_addr = SocketAddr::new(ip, port);
    info!("Metrics listening on http://{}", socket_addr);

    let serve_future = Server::bind(&socket_addr).serve(make_service_fn(|_| async {
        Ok::<_, hyper::Error>(service_fn(http_serve_req))
    }));

    if let Err(err) = serve_future.await {
        error!("metrics server error: {}", err);
    }
}

async fn http_serve_req(req: Request<Body>) -> Result<Response<Body>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let metrics = dump().into_bytes();
            let mut resp = Response::new(metrics.into());
            resp.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT));
            Ok(resp)
        }
        _ => {
            let response = Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Body::from("path not found"))
                .unwrap();
            Ok(response)
        }
    }
}
