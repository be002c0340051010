use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;

use crate::error::ApiError;
use crate::model::SessionId;

/// Session-lifecycle and route-lookup endpoints, treated as opaque
/// request/response contracts.
pub trait TrackingApi: Send + Sync {
    /// `POST {base}/tracking/start/`. A 2xx response carrying a session id
    /// is required; anything else is a start failure.
    fn start_session(&self) -> BoxFuture<'static, Result<SessionId, ApiError>>;

    /// `GET {base}/tracking/stop/{id}/`. Best-effort; callers log failures
    /// and move on.
    fn stop_session(&self, session_id: SessionId) -> BoxFuture<'static, Result<(), ApiError>>;

    /// `POST {base}/tracking/get-route/`. Returns the route as (lat, lng)
    /// pairs, or `None` when the response has no usable feature.
    fn fetch_route(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        profile: &'static str,
    ) -> BoxFuture<'static, Result<Option<Vec<(f64, f64)>>, ApiError>>;
}

#[derive(Deserialize)]
struct StartResponse {
    session_id: Option<SessionId>,
}

#[derive(Deserialize)]
struct RouteResponse {
    #[serde(default)]
    features: Vec<RouteFeature>,
}

#[derive(Deserialize)]
struct RouteFeature {
    geometry: RouteGeometry,
}

#[derive(Deserialize)]
struct RouteGeometry {
    /// (lng, lat) pairs, the GeoJSON axis order.
    #[serde(default)]
    coordinates: Vec<[f64; 2]>,
}

/// First feature's coordinate list, reversed from (lng, lat) to the
/// (lat, lng) order used everywhere else in the pipeline.
fn route_points(response: RouteResponse) -> Option<Vec<(f64, f64)>> {
    let feature = response.features.into_iter().next()?;
    if feature.geometry.coordinates.is_empty() {
        return None;
    }
    Some(
        feature
            .geometry
            .coordinates
            .into_iter()
            .map(|c| (c[1], c[0]))
            .collect(),
    )
}

/// HTTP implementation over a pooled reqwest client.
pub struct HttpTrackingApi {
    client: reqwest::Client,
    base_url: String,
    csrf_token: Option<String>,
}

impl HttpTrackingApi {
    pub fn new(base_url: &str, csrf_token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        HttpTrackingApi {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            csrf_token,
        }
    }

    fn with_csrf(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.csrf_token {
            Some(token) => request.header("X-CSRFToken", token),
            None => request,
        }
    }
}

impl TrackingApi for HttpTrackingApi {
    fn start_session(&self) -> BoxFuture<'static, Result<SessionId, ApiError>> {
        let request = self.with_csrf(
            self.client
                .post(format!("{}/tracking/start/", self.base_url)),
        );

        Box::pin(async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ApiError::Status(status.as_u16()));
            }
            let body: StartResponse = response
                .json()
                .await
                .map_err(|e| ApiError::Decode(e.to_string()))?;
            body.session_id.ok_or(ApiError::MissingSessionId)
        })
    }

    fn stop_session(&self, session_id: SessionId) -> BoxFuture<'static, Result<(), ApiError>> {
        let request = self
            .client
            .get(format!("{}/tracking/stop/{}/", self.base_url, session_id));

        Box::pin(async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ApiError::Status(status.as_u16()));
            }
            Ok(())
        })
    }

    fn fetch_route(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        profile: &'static str,
    ) -> BoxFuture<'static, Result<Option<Vec<(f64, f64)>>, ApiError>> {
        // The route endpoint speaks GeoJSON axis order: (lng, lat).
        let body = serde_json::json!({
            "coordinates": [[from.1, from.0], [to.1, to.0]],
            "profile": profile,
        });
        let request = self.with_csrf(
            self.client
                .post(format!("{}/tracking/get-route/", self.base_url))
                .json(&body),
        );

        Box::pin(async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                log::warn!("route lookup failed with status {}", status);
                return Err(ApiError::Status(status.as_u16()));
            }
            let body: RouteResponse = response
                .json()
                .await
                .map_err(|e| ApiError::Decode(e.to_string()))?;
            Ok(route_points(body))
        })
    }
}
