//! Common test utilities for ogc-client tests
//!
//! Provides mock transports:
//! - `ScriptedTransport` answers with a fixed queue of responses
//! - `RouteTransport` answers through a handler closure

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use ogc_client::{ClientConfig, HttpTransport, ServiceRequest, ServiceResponse};
use ogc_common::OgcResult;

/// Config with near-zero backoff so retry tests run fast.
pub fn fast_config() -> ClientConfig {
    ClientConfig {
        initial_backoff_ms: 1,
        max_backoff_secs: 1,
        ..Default::default()
    }
}

/// Value of `key` in a request's parameters.
pub fn param<'a>(request: &'a ServiceRequest, key: &str) -> Option<&'a str> {
    request
        .params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Replays queued results, then answers `200 {}`.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<OgcResult<ServiceResponse>>>,
    calls: Mutex<Vec<ServiceRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<OgcResult<ServiceResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ServiceRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &ServiceRequest) -> OgcResult<ServiceResponse> {
        self.calls.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ServiceResponse::new(200, "{}")))
    }
}

/// Answers every request through `handler`.
pub struct RouteTransport<F> {
    handler: F,
    calls: Mutex<Vec<ServiceRequest>>,
}

impl<F> RouteTransport<F>
where
    F: Fn(&ServiceRequest) -> ServiceResponse + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ServiceRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl<F> HttpTransport for RouteTransport<F>
where
    F: Fn(&ServiceRequest) -> ServiceResponse + Send + Sync,
{
    async fn send(&self, request: &ServiceRequest) -> OgcResult<ServiceResponse> {
        self.calls.lock().unwrap().push(request.clone());
        Ok((self.handler)(request))
    }
}
