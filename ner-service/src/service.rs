//! The request/reply service loop.
//!
//! One request is received, processed and answered before the next is
//! accepted. Shutdown is only honoured while waiting for a request, so an
//! exchange in flight always gets its reply.

use ner_bridge::SidecarRecognizer;
use ner_core::{find_first_organization, EntityRecognizer, GazetteerRecognizer, ModelLoadError};
use ner_proto::{MalformedRequest, Reply, Request, EXTRACTION_FAILED, MALFORMED_REQUEST};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{Backend, ServiceConfig};
use crate::endpoint::{EndpointError, ReplyEndpoint};
use crate::error::ServiceError;
use crate::shutdown;

/// Position of the service in the request/reply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    AwaitingRequest,
    Processing,
    SendingReply,
    Shutdown,
}

impl ServiceState {
    /// Whether the cycle allows moving from `self` to `next`.
    ///
    /// A malformed request goes straight from `AwaitingRequest` to
    /// `SendingReply`: there is nothing to process but a reply is owed.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::AwaitingRequest, Self::Processing | Self::SendingReply | Self::Shutdown)
                | (Self::Processing, Self::SendingReply)
                | (Self::SendingReply, Self::AwaitingRequest)
        )
    }
}

/// Result of handling one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Company(String),
    NoOrganization,
    Malformed,
    ExtractionFailed,
}

impl Outcome {
    pub fn into_reply(self) -> Reply {
        match self {
            Self::Company(name) => Reply::company(name),
            Self::NoOrganization => Reply::empty(),
            Self::Malformed => Reply::error(MALFORMED_REQUEST),
            Self::ExtractionFailed => Reply::error(EXTRACTION_FAILED),
        }
    }
}

/// Counters reported when the service stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub requests: u64,
    pub organizations_found: u64,
    pub malformed_requests: u64,
    pub extraction_failures: u64,
    pub failed_replies: u64,
}

impl ServiceStats {
    fn record(&mut self, outcome: &Outcome) {
        self.requests += 1;
        match outcome {
            Outcome::Company(_) => self.organizations_found += 1,
            Outcome::NoOrganization => {}
            Outcome::Malformed => self.malformed_requests += 1,
            Outcome::ExtractionFailed => self.extraction_failures += 1,
        }
    }
}

/// Run one well-formed request through the recognizer.
pub async fn process_request(recognizer: &mut dyn EntityRecognizer, request: &Request) -> Outcome {
    let started = Instant::now();

    match recognizer.extract(&request.body).await {
        Ok(spans) => {
            debug!(
                entities = spans.len(),
                elapsed_ms = started.elapsed().as_millis(),
                "Extraction complete"
            );
            match find_first_organization(&spans) {
                Some(company) => {
                    info!(company = %company, "Found company");
                    Outcome::Company(company)
                }
                None => Outcome::NoOrganization,
            }
        }
        Err(e) => {
            error!(error = %e, backend = recognizer.name(), "Extraction failed");
            Outcome::ExtractionFailed
        }
    }
}

/// Load the configured model backend.
pub async fn load_recognizer(
    config: &ServiceConfig,
) -> Result<Box<dyn EntityRecognizer>, ModelLoadError> {
    let started = Instant::now();
    let recognizer: Box<dyn EntityRecognizer> = match config.backend {
        Backend::Gazetteer => Box::new(GazetteerRecognizer::load(&config.gazetteer_path)?),
        Backend::Sidecar => Box::new(SidecarRecognizer::load(config.sidecar.clone()).await?),
    };

    info!(
        backend = recognizer.name(),
        elapsed_ms = started.elapsed().as_millis(),
        "Model loaded"
    );
    Ok(recognizer)
}

enum Wake {
    Signal,
    Received(Result<Result<Request, MalformedRequest>, EndpointError>),
}

/// The service: a bound endpoint plus a loaded model, owned together.
pub struct NerService {
    endpoint: ReplyEndpoint,
    recognizer: Box<dyn EntityRecognizer>,
    state: ServiceState,
    stats: ServiceStats,
}

impl NerService {
    pub fn new(endpoint: ReplyEndpoint, recognizer: Box<dyn EntityRecognizer>) -> Self {
        Self {
            endpoint,
            recognizer,
            state: ServiceState::AwaitingRequest,
            stats: ServiceStats::default(),
        }
    }

    /// Bind the endpoint, then load the model.
    ///
    /// If the model fails to load the endpoint is closed before returning.
    /// Returns `Ok(None)` when shutdown is requested before the model is
    /// ready; a sidecar worker still starting up is killed with its load.
    pub async fn start(
        config: &ServiceConfig,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<Self>, ServiceError> {
        if *shutdown.borrow() {
            info!("Shutdown requested before startup");
            return Ok(None);
        }

        let mut endpoint = ReplyEndpoint::bind(&config.bind_address).await?;

        let loaded = tokio::select! {
            loaded = load_recognizer(config) => loaded,
            () = shutdown::requested(shutdown) => {
                info!("Shutdown requested while loading model, abandoning startup");
                endpoint.close().await;
                return Ok(None);
            }
        };

        match loaded {
            Ok(recognizer) => Ok(Some(Self::new(endpoint, recognizer))),
            Err(e) => {
                endpoint.close().await;
                Err(e.into())
            }
        }
    }

    pub fn local_endpoint(&self) -> &str {
        self.endpoint.local_endpoint()
    }

    fn transition(&mut self, next: ServiceState) -> Result<(), ServiceError> {
        if !self.state.can_transition_to(next) {
            return Err(ServiceError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(from = ?self.state, to = ?next, "State transition");
        self.state = next;
        Ok(())
    }

    /// Serve until `shutdown` turns true (or its sender goes away), then
    /// close the endpoint and release the model.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ServiceStats, ServiceError> {
        info!(
            address = %self.endpoint.local_endpoint(),
            backend = self.recognizer.name(),
            "Service ready"
        );

        let result = self.serve(&mut shutdown).await;
        self.close().await;

        match &result {
            Ok(()) => info!(stats = ?self.stats, "Service stopped"),
            Err(e) => error!(error = %e, stats = ?self.stats, "Service stopped on error"),
        }
        result.map(|()| self.stats)
    }

    async fn serve(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<(), ServiceError> {
        loop {
            if *shutdown.borrow_and_update() {
                info!("Shutdown requested");
                return self.transition(ServiceState::Shutdown);
            }

            let wake = tokio::select! {
                biased;
                changed = shutdown.changed() => match changed {
                    Ok(()) => Wake::Signal,
                    Err(_) => {
                        info!("Shutdown channel closed");
                        return self.transition(ServiceState::Shutdown);
                    }
                },
                received = self.endpoint.receive() => Wake::Received(received),
            };

            let incoming = match wake {
                Wake::Signal => continue,
                Wake::Received(received) => received?,
            };

            self.exchange(incoming).await?;
        }
    }

    /// Process one received message and answer it.
    async fn exchange(
        &mut self,
        incoming: Result<Request, MalformedRequest>,
    ) -> Result<(), ServiceError> {
        let outcome = match incoming {
            Ok(request) => {
                self.transition(ServiceState::Processing)?;
                info!(body_len = request.body.len(), "Request received");
                process_request(self.recognizer.as_mut(), &request).await
            }
            Err(malformed) => {
                warn!(reason = %malformed, "Malformed request");
                Outcome::Malformed
            }
        };

        self.transition(ServiceState::SendingReply)?;
        self.stats.record(&outcome);

        match self.endpoint.send(&outcome.into_reply()).await {
            Ok(()) => {}
            Err(EndpointError::Transport(e)) => {
                warn!(error = %e, "Failed to deliver reply");
                self.stats.failed_replies += 1;
            }
            Err(e) => return Err(e.into()),
        }

        self.transition(ServiceState::AwaitingRequest)
    }

    async fn close(&mut self) {
        self.state = ServiceState::Shutdown;
        self.endpoint.close().await;
        self.recognizer.shutdown().await;
    }
}
