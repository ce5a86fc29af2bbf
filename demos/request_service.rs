//! A request controller calling a flaky downstream service through the full
//! policy stack: 5 retries one second apart, a breaker opening after 2 failed
//! calls for 10 seconds, a 5 second attempt timeout, a bulkhead of 1 and a
//! fallback response.
//!
//! Run with `RUST_LOG=resilience_rs=debug,request_service=info` for policy logs.

use resilience_rs::prelude::*;
use resilience_rs::DEFAULT_OPEN_DURATION;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// What the downstream service sent back.
#[derive(Debug, Clone)]
struct Response {
    status: Option<u16>,
    body: String,
}

impl Response {
    fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }
}

#[derive(Debug)]
enum ServiceError {
    Status(u16),
    Cancelled,
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Status(code) => write!(f, "service returned {}", code),
            ServiceError::Cancelled => write!(f, "request cancelled"),
        }
    }
}

impl Error for ServiceError {}

/// Downstream service that fails its first ten requests and hangs on the
/// eleventh before recovering.
struct FlakyService {
    calls: AtomicU32,
}

impl FlakyService {
    fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }

    async fn get(&self, path: &str, token: CancellationToken) -> Result<Response, ServiceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(call = n, path, "sending request");

        let latency = if n == 11 {
            Duration::from_secs(30)
        } else {
            Duration::from_millis(50)
        };

        tokio::select! {
            _ = token.cancelled() => Err(ServiceError::Cancelled),
            _ = tokio::time::sleep(latency) => {
                if n <= 10 {
                    Err(ServiceError::Status(500))
                } else {
                    Ok(Response {
                        status: Some(200),
                        body: format!("payload for {}", path),
                    })
                }
            }
        }
    }
}

struct RequestController {
    service: FlakyService,
    pipeline: Pipeline<Response, ServiceError>,
}

impl RequestController {
    fn new() -> Self {
        let hooks = std::sync::Arc::new(HookRegistry::new());
        hooks.set_on_retry(|attempt| println!("Retrying: {}", attempt - 1));
        hooks.set_on_open(|| println!("Breaker Hit"));

        let pipeline = PipelineBuilder::with_defaults()
            .name("response-service")
            .fallback_value(Response {
                status: None,
                body: "Fallback response".to_string(),
            })
            .shared_event_sink(hooks)
            .build();

        Self {
            service: FlakyService::new(),
            pipeline,
        }
    }

    /// Returns the HTTP status the controller answers with.
    async fn make_request(&self) -> u16 {
        let response = self
            .pipeline
            .execute(|token| self.service.get("/Response/100", token))
            .await;

        match response {
            Ok(response) if response.is_success() => {
                println!("--> ResponseService returned a Success");
                200
            }
            Ok(response) => {
                tracing::info!(body = %response.body, "served fallback");
                println!("--> ResponseService returned a FAILURE");
                500
            }
            Err(err) => {
                tracing::error!(error = %err, "request failed without fallback");
                println!("--> ResponseService returned a FAILURE");
                500
            }
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let controller = RequestController::new();

    for request in 1..=3 {
        let status = controller.make_request().await;
        println!("request {} -> {}", request, status);
        if let Some(breaker) = controller.pipeline.breaker() {
            println!("breaker state: {:?}", breaker.current_state());
        }
    }

    println!("waiting for the breaker to half-open...");
    tokio::time::sleep(DEFAULT_OPEN_DURATION).await;

    // The trial times out once, is retried, and closes the breaker.
    let status = controller.make_request().await;
    println!("request 4 -> {}", status);
    if let Some(breaker) = controller.pipeline.breaker() {
        println!("breaker state: {:?}", breaker.current_state());
    }
}
