// src/server/handler.rs
use hyper::{Body, Request, Response};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

use crate::relay::Relay;

#[derive(Clone)]
pub struct RequestHandler {
    relay: Arc<Relay>,
}

impl RequestHandler {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    // The relay answers every request itself, failures included.
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let relay = self.relay.clone();
        Box::pin(async move { Ok(relay.handle(req).await) })
    }
}
