//! Path-based forwarding of browser-originated service calls to the upstream origin.
//!
//! [`proxy_middleware`] runs before axum's own routing. A request whose path matches a
//! [`ServiceRoute`] is forwarded with the same method, headers and body, except that `Origin`
//! and `Referer` are rewritten to the upstream so it treats the call as same-origin. The inbound
//! `Host` is dropped and the client sets it from the target URL, also after a redirect to
//! another host. The upstream response is returned as-is and its body streamed
//! through. Anything else goes to the next handler untouched.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        HeaderMap, HeaderName,
        header::{CONTENT_LENGTH, HOST, ORIGIN, REFERER},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::table::{RouteTable, ServiceRoute};
use crate::{
    errors::Error,
    outbound::{self, CallError},
};

/// Headers that describe a single connection and must not be copied across a proxy hop.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Copy inbound headers for the upstream call, overwriting `Origin` and `Referer`.
fn forwarded_headers(original: &HeaderMap, route: &ServiceRoute) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(original.len() + 2);
    for (name, value) in original {
        // The body is re-sent from a buffer, so the client recomputes its length.
        // Host comes from the request URL and must follow redirects.
        if is_hop_by_hop(name) || name == CONTENT_LENGTH || name == HOST {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers.insert(ORIGIN, route.origin_header().clone());
    headers.insert(REFERER, route.referer_header().clone());
    headers
}

/// Render a transport error with its causes, without the request URL.
fn describe(error: CallError) -> String {
    let error = match error {
        CallError::Transport(e) => anyhow::Error::from(e.without_url()),
        other => anyhow::Error::from(other),
    };
    format!("{error:#}")
}

/// Stateless per-request forwarder over a fixed [`RouteTable`].
pub struct ProxyRouter {
    table: RouteTable,
    client: Client,
    request_timeout: Duration,
    max_body_bytes: usize,
    shutdown: CancellationToken,
}

impl ProxyRouter {
    pub fn new(table: RouteTable, client: Client, request_timeout: Duration, max_body_bytes: usize, shutdown: CancellationToken) -> Self {
        Self {
            table,
            client,
            request_timeout,
            max_body_bytes,
            shutdown,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.table
    }

    /// Forward `request` along `route` and hand back the upstream response.
    #[instrument(skip_all, fields(route = %route.prefix, method = %request.method(), path = %request.uri().path()))]
    pub async fn forward(&self, route: &ServiceRoute, request: Request) -> Result<Response, Error> {
        let (parts, body) = request.into_parts();
        let target = route.target_url(parts.uri.path(), parts.uri.query());

        let body = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| Error::BadRequest {
                message: format!("Failed to read request body: {e}"),
            })?;

        let upstream_request = self
            .client
            .request(parts.method, &target)
            .headers(forwarded_headers(&parts.headers, route))
            .body(body);

        debug!("Forwarding to {}", target);
        let upstream = outbound::bounded(self.request_timeout, &self.shutdown, async {
            Ok(upstream_request.send().await?)
        })
        .await
        .map_err(|e| {
            metrics::counter!("clusterscope_proxy_requests_total", "route" => route.prefix.clone(), "outcome" => "error")
                .increment(1);
            Error::Proxy { message: describe(e) }
        })?;

        metrics::counter!("clusterscope_proxy_requests_total", "route" => route.prefix.clone(), "outcome" => "forwarded")
            .increment(1);

        let mut response = Response::builder().status(upstream.status());
        if let Some(headers) = response.headers_mut() {
            for (name, value) in upstream.headers() {
                if !is_hop_by_hop(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
        }

        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| Error::Internal {
                operation: format!("build proxied response: {e}"),
            })
    }
}

/// Forward requests for known service prefixes; pass every other request to `next` unchanged.
pub async fn proxy_middleware(State(proxy): State<Arc<ProxyRouter>>, request: Request, next: Next) -> Response {
    let Some(route) = proxy.routes().resolve(request.uri().path()).cloned() else {
        return next.run(request).await;
    };

    match proxy.forward(&route, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
