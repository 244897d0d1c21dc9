//! Backend REST client
//!
//! Wraps the travel backend's JSON API. Every request carries the session
//! token when one is present; a 401 on an authenticated request ends the
//! session so guards fall back to their unauthenticated state.

mod types;

pub use types::{
    Booking, BookingStatus, Envelope, LoginResponse, NewBooking, NewPlace, NewReview, Page,
    Pagination, Place, PlaceQuery, PlaceStatus, Review,
};

use crate::auth::{SessionError, SessionProvider};
use crate::config::ApiConfig;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use types::{ErrorBody, LoginBody};

/// API errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Session is no longer valid")]
    Unauthorized,

    #[error("Request failed ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Response had no data")]
    EmptyBody,

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl ApiError {
    /// Whether the failure came from the transport rather than the backend
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

/// Decode a response body by status
///
/// 204 yields `None`. Non-2xx statuses become errors carrying the body's
/// `message` when it has one.
pub fn decode_response<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
) -> Result<Option<Envelope<T>>, ApiError> {
    if status == StatusCode::NO_CONTENT {
        return Ok(None);
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }

    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        });
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ApiError::Decode(e.to_string()))
}

/// Client for the travel backend
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<SessionProvider>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, session: Arc<SessionProvider>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("wayfarer/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionProvider> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> (RequestBuilder, bool) {
        let builder = self.client.request(method, self.url(path));
        match self.session.token() {
            Some(token) => (builder.header(AUTHORIZATION, format!("Bearer {}", token)), true),
            None => (builder, false),
        }
    }

    /// Send a request and decode the envelope
    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        authenticated: bool,
    ) -> Result<Option<Envelope<T>>, ApiError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        debug!(status = status.as_u16(), bytes = body.len(), "API response");

        let result = decode_response(status, &body);
        if authenticated && matches!(result, Err(ApiError::Unauthorized)) {
            self.session.expire();
        }
        result
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Envelope<T>>, ApiError> {
        let (builder, authenticated) = self.request(Method::GET, path);
        self.send(builder.query(query), authenticated).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<Envelope<T>>, ApiError> {
        let (builder, authenticated) = self.request(Method::POST, path);
        self.send(builder.json(body), authenticated).await
    }

    /// Exchange credentials for a token and start the session
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({
                "email": email.trim(),
                "password": password.expose_secret(),
            }))
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            // A 401 here means bad credentials, not an expired session
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| "invalid email or password".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let login = serde_json::from_slice::<LoginBody>(&body)
            .map_err(|e| ApiError::Decode(e.to_string()))?
            .into_inner();
        self.accept_login(login)
    }

    fn accept_login(&self, login: LoginResponse) -> Result<LoginResponse, ApiError> {
        self.session.login(login.token.clone(), Some(login.user.clone()))?;
        Ok(login)
    }

    pub fn logout(&self) {
        self.session.logout();
    }

    pub async fn list_places(&self, query: &PlaceQuery) -> Result<Page<Place>, ApiError> {
        let envelope = self
            .get::<Vec<Place>>("/places", &query.params())
            .await?
            .ok_or(ApiError::EmptyBody)?;
        Ok(Page {
            items: envelope.data.unwrap_or_default(),
            pagination: envelope.pagination,
        })
    }

    pub async fn get_place(&self, id: &str) -> Result<Place, ApiError> {
        let path = format!("/places/{}", urlencoding::encode(id));
        required(self.get(&path, &[]).await?)
    }

    /// Submit a place for moderation
    pub async fn submit_place(&self, place: &NewPlace) -> Result<Place, ApiError> {
        if place.name.trim().is_empty() {
            return Err(ApiError::Invalid("place name is required".to_string()));
        }
        required(self.post("/places", place).await?)
    }

    pub async fn create_booking(&self, booking: &NewBooking) -> Result<Booking, ApiError> {
        if booking.guests == 0 {
            return Err(ApiError::Invalid("at least one guest is required".to_string()));
        }
        required(self.post("/bookings", booking).await?)
    }

    pub async fn my_bookings(&self) -> Result<Vec<Booking>, ApiError> {
        Ok(self
            .get::<Vec<Booking>>("/bookings/me", &[])
            .await?
            .and_then(|e| e.data)
            .unwrap_or_default())
    }

    pub async fn list_reviews(&self, place_id: &str) -> Result<Page<Review>, ApiError> {
        let path = format!("/places/{}/reviews", urlencoding::encode(place_id));
        let envelope = self
            .get::<Vec<Review>>(&path, &[])
            .await?
            .ok_or(ApiError::EmptyBody)?;
        Ok(Page {
            items: envelope.data.unwrap_or_default(),
            pagination: envelope.pagination,
        })
    }

    pub async fn create_review(&self, review: &NewReview) -> Result<Review, ApiError> {
        review.validate().map_err(ApiError::Invalid)?;
        required(self.post("/reviews", review).await?)
    }

    /// Record that the current user visited a place
    pub async fn record_visit(&self, place_id: &str) -> Result<(), ApiError> {
        let path = format!("/places/{}/visit", urlencoding::encode(place_id));
        match self.post::<_, serde_json::Value>(&path, &serde_json::json!({})).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(place = %place_id, error = %e, "Failed to record visit");
                Err(e)
            }
        }
    }
}

fn required<T>(envelope: Option<Envelope<T>>) -> Result<T, ApiError> {
    envelope.and_then(|e| e.data).ok_or(ApiError::EmptyBody)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{encode_test_token, MemoryCredentialStore, Role, SessionStatus, UserProfile};
    use chrono::Utc;
    use serde_json::json;

    fn token(role: &str, exp_in: i64) -> String {
        encode_test_token(&json!({
            "sub": "u1",
            "role": role,
            "exp": Utc::now().timestamp() + exp_in,
        }))
    }

    #[test]
    fn test_decode_success() {
        let body = r#"{"status":"success","data":[{"id":1,"name":"Chợ Bến Thành"}],
            "pagination":{"page":1,"limit":10,"total":1,"totalPages":1}}"#
            .as_bytes();
        let envelope = decode_response::<Vec<Place>>(StatusCode::OK, body)
            .unwrap()
            .unwrap();
        assert_eq!(envelope.status, "success");
        assert_eq!(envelope.data.unwrap()[0].id, "1");
        assert_eq!(envelope.pagination.unwrap().total, 1);
    }

    #[test]
    fn test_decode_envelope_without_data() {
        let envelope = decode_response::<Place>(StatusCode::CREATED, br#"{"status":"success"}"#)
            .unwrap()
            .unwrap();
        assert!(envelope.data.is_none());
        assert!(envelope.pagination.is_none());
        assert!(matches!(required(Some(envelope)), Err(ApiError::EmptyBody)));
    }

    #[test]
    fn test_decode_no_content() {
        assert!(decode_response::<Place>(StatusCode::NO_CONTENT, b"")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decode_error_message() {
        let err = decode_response::<Place>(
            StatusCode::NOT_FOUND,
            br#"{"status":"error","message":"Place not found"}"#,
        )
        .unwrap_err();
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Place not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_error_without_json() {
        let err = decode_response::<Place>(StatusCode::BAD_GATEWAY, b"<html>").unwrap_err();
        assert!(matches!(
            err,
            ApiError::Status { status: 502, ref message } if message == "Bad Gateway"
        ));
    }

    #[test]
    fn test_decode_unauthorized() {
        assert!(matches!(
            decode_response::<Place>(StatusCode::UNAUTHORIZED, b"{}"),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode_response::<Place>(StatusCode::OK, b"not json"),
            Err(ApiError::Decode(_))
        ));
    }

    #[test]
    fn test_accept_login_starts_session() {
        let session = SessionProvider::with_store(Arc::new(MemoryCredentialStore::new()));
        let client = ApiClient::new(&ApiConfig::default(), session.clone()).unwrap();

        let user: UserProfile =
            serde_json::from_value(json!({"id":"u1","email":"an@test.vn","role":"PARTNER"})).unwrap();
        client
            .accept_login(LoginResponse {
                token: token("PARTNER", 3600),
                user,
            })
            .unwrap();

        assert!(matches!(
            session.status(),
            SessionStatus::Active { role: Role::Partner, .. }
        ));
        assert_eq!(session.user().unwrap().email, "an@test.vn");

        client.logout();
        assert_eq!(session.status(), SessionStatus::Anonymous);
    }

    #[test]
    fn test_accept_login_rejects_expired_token() {
        let session = SessionProvider::with_store(Arc::new(MemoryCredentialStore::new()));
        let client = ApiClient::new(&ApiConfig::default(), session.clone()).unwrap();
        let user: UserProfile = serde_json::from_value(json!({"id":"u1","role":"USER"})).unwrap();

        let result = client.accept_login(LoginResponse {
            token: token("USER", -10),
            user,
        });
        assert!(matches!(result, Err(ApiError::Session(SessionError::Expired))));
        assert!(session.token().is_none());
    }

    #[test]
    fn test_url_joining() {
        let session = SessionProvider::with_store(Arc::new(MemoryCredentialStore::new()));
        let config = ApiConfig {
            base_url: "https://api.test/api/".to_string(),
            ..ApiConfig::default()
        };
        let client = ApiClient::new(&config, session).unwrap();
        assert_eq!(client.url("/places"), "https://api.test/api/places");
        assert_eq!(client.url("bookings/me"), "https://api.test/api/bookings/me");
    }

    #[tokio::test]
    async fn test_invalid_review_skips_request() {
        let session = SessionProvider::with_store(Arc::new(MemoryCredentialStore::new()));
        let config = ApiConfig {
            // Nothing listens here; reaching the network would fail differently
            base_url: "http://127.0.0.1:9".to_string(),
            ..ApiConfig::default()
        };
        let client = ApiClient::new(&config, session).unwrap();
        let result = client
            .create_review(&NewReview {
                place_id: "p1".to_string(),
                rating: 9,
                comment: None,
            })
            .await;
        assert!(matches!(result, Err(ApiError::Invalid(_))));
    }
}
