use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use config::Configuration;
use hyper::{
    header::CONTENT_TYPE,
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server, StatusCode,
};
use log::{info, warn};
use metastore::SegmentStore;
use model::CompletionResponse;
use tokio::sync::broadcast;

use crate::completion::SegmentCompletionManager;
use crate::error::ServiceError;
use crate::handler::Command;
use crate::leadership::{watch_leadership, StandaloneElection};

/// Boot the coordinator: build the runtime, acquire standalone leadership,
/// and serve the completion protocol until the shutdown signal fires.
pub fn launch<S>(
    config: Configuration,
    store: Arc<S>,
    shutdown: broadcast::Sender<()>,
) -> anyhow::Result<()>
where
    S: SegmentStore,
{
    let config = Arc::new(config);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.worker_threads)
        .enable_all()
        .build()?;
    runtime.block_on(serve(config, store, shutdown))
}

async fn serve<S>(
    config: Arc<Configuration>,
    store: Arc<S>,
    shutdown: broadcast::Sender<()>,
) -> anyhow::Result<()>
where
    S: SegmentStore,
{
    let manager = Arc::new(SegmentCompletionManager::new(Arc::clone(&config), store));
    let election = StandaloneElection::new();
    let _leadership = watch_leadership(Arc::clone(&manager), &election);

    {
        let host = config.server.host.clone();
        let port = config.server.metrics_port;
        tokio::spawn(async move {
            observation::metrics::http_serve(&host, port).await;
        });
    }

    let ip = config
        .server
        .host
        .parse::<IpAddr>()
        .unwrap_or(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
    let addr = SocketAddr::new(ip, config.server.port);

    let make_service = make_service_fn(move |_| {
        let manager = Arc::clone(&manager);
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                let manager = Arc::clone(&manager);
                async move { handle(manager, req).await }
            }))
        }
    });

    let server = Server::bind(&addr).serve(make_service);
    info!("Segment completion coordinator listening on http://{}", addr);

    let mut shutdown_rx = shutdown.subscribe();
    let graceful = server.with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
        info!("Received shutdown signal");
    });
    graceful.await?;
    info!("Segment completion coordinator stopped");
    Ok(())
}

async fn handle<S>(
    manager: Arc<SegmentCompletionManager<S>>,
    req: Request<Body>,
) -> Result<Response<Body>, hyper::Error>
where
    S: SegmentStore,
{
    if req.method() != Method::GET {
        let response = Response::builder()
            .status(StatusCode::METHOD_NOT_ALLOWED)
            .body(Body::from("only GET is supported"))
            .unwrap();
        return Ok(response);
    }

    let path = req.uri().path().to_owned();
    let params = parse_query(req.uri().query().unwrap_or(""));
    let command = match Command::from_path(&path, &params) {
        Ok(command) => command,
        Err(ServiceError::Unsupported(path)) => {
            let response = Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Body::from(format!("path `{}` not found", path)))
                .unwrap();
            return Ok(response);
        }
        Err(e) => {
            warn!("Bad completion request on `{}`: {}", path, e);
            observation::metrics::COUNTER_PROTOCOL_VIOLATIONS.inc();
            return json(&CompletionResponse::Failed);
        }
    };

    info!("Request: {}", command);
    let response = command.apply(&manager).await;
    info!("Response: {} -> {}", command, response);
    json(&response)
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

fn json(response: &CompletionResponse) -> Result<Response<Body>, hyper::Error> {
    let body = serde_json::to_string(response)
        .unwrap_or_else(|_| r#"{"status":"FAILED"}"#.to_owned());
    let response = Response::builder()
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    Ok(response)
}
