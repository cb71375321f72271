//! Static mapping of service path prefixes to the upstream origin.

use anyhow::Context;
use axum::http::HeaderValue;
use url::Url;

use crate::config::UpstreamConfig;

/// One forwardable path prefix and the origin it is forwarded to.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRoute {
    pub prefix: String,
    pub upstream: Url,
    origin: HeaderValue,
    referer: HeaderValue,
}

impl ServiceRoute {
    pub fn new(prefix: impl Into<String>, upstream: Url) -> anyhow::Result<Self> {
        let prefix = prefix.into();
        if !prefix.starts_with('/') {
            anyhow::bail!("route prefix '{prefix}' must start with '/'");
        }
        if upstream.host_str().is_none() {
            anyhow::bail!("upstream origin '{upstream}' has no host");
        }
        let origin = upstream.origin().ascii_serialization();
        let referer = format!("{origin}/");

        Ok(Self {
            origin: HeaderValue::from_str(&origin).with_context(|| format!("invalid Origin value '{origin}'"))?,
            referer: HeaderValue::from_str(&referer).with_context(|| format!("invalid Referer value '{referer}'"))?,
            prefix,
            upstream,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }

    /// Upstream URL for an inbound path and query: `{origin}{path}{?query}`.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> String {
        let base = self.upstream.as_str().trim_end_matches('/');
        match query {
            Some(q) => format!("{base}{path}?{q}"),
            None => format!("{base}{path}"),
        }
    }

    /// `Origin` value naming the upstream itself.
    pub fn origin_header(&self) -> &HeaderValue {
        &self.origin
    }

    /// `Referer` value pointing at the upstream root.
    pub fn referer_header(&self) -> &HeaderValue {
        &self.referer
    }
}

/// Ordered set of non-overlapping routes. Lookup is first match wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<ServiceRoute>,
}

impl RouteTable {
    pub fn new(routes: Vec<ServiceRoute>) -> anyhow::Result<Self> {
        for (i, a) in routes.iter().enumerate() {
            for b in routes.iter().skip(i + 1) {
                if a.prefix.starts_with(&b.prefix) || b.prefix.starts_with(&a.prefix) {
                    anyhow::bail!("route prefixes '{}' and '{}' overlap", a.prefix, b.prefix);
                }
            }
        }
        Ok(Self { routes })
    }

    pub fn from_config(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let routes = config
            .prefixes
            .iter()
            .map(|prefix| ServiceRoute::new(prefix.clone(), config.origin.clone()))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Self::new(routes)
    }

    pub fn resolve(&self, path: &str) -> Option<&ServiceRoute> {
        self.routes.iter().find(|route| route.matches(path))
    }

    pub fn routes(&self) -> &[ServiceRoute] {
        &self.routes
    }
}
