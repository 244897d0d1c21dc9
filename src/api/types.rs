//! Backend payload types

use crate::auth::{string_or_number, UserProfile};
use crate::geo::Coordinates;
use crate::images::ImageResolver;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Standard response wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: String,
    pub data: Option<T>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

/// Page information for list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    #[serde(default)]
    pub total_pages: u32,
}

impl Pagination {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

/// One page of a list endpoint
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Option<Pagination>,
}

/// Error body
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// Login result
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Login responses come bare or wrapped
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum LoginBody {
    Wrapped { data: LoginResponse },
    Plain(LoginResponse),
}

impl LoginBody {
    pub fn into_inner(self) -> LoginResponse {
        match self {
            LoginBody::Wrapped { data } => data,
            LoginBody::Plain(response) => response,
        }
    }
}

/// Moderation state of a place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlaceStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// A place as listed by the backend
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Stored image reference: bare key or legacy absolute URL
    #[serde(default, alias = "imageUrl")]
    pub image: Option<String>,
    #[serde(default)]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u32>,
    #[serde(default)]
    pub status: PlaceStatus,
}

impl Place {
    /// Map position, when the place has a valid one
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)).filter(Coordinates::is_valid),
            _ => None,
        }
    }

    /// Displayable image URL
    pub fn image_url(&self, resolver: &ImageResolver) -> String {
        resolver.resolve(self.image.as_deref())
    }
}

/// Filters for the place list
#[derive(Debug, Clone, Default)]
pub struct PlaceQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub city: Option<String>,
}

impl PlaceQuery {
    /// Query-string pairs, skipping unset and blank values
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(page) = self.page {
            params.push(("page", page.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        let text = [
            ("search", &self.search),
            ("category", &self.category),
            ("city", &self.city),
        ];
        for (name, value) in text {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                params.push((name, v.to_string()));
            }
        }
        params
    }
}

/// A place submitted by a contributor or partner
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlace {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Storage key returned by the upload pipeline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Booking state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

/// A booking
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub place_id: String,
    pub date: NaiveDate,
    pub guests: u32,
    pub status: BookingStatus,
    #[serde(default)]
    pub note: Option<String>,
}

/// Booking request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub place_id: String,
    pub date: NaiveDate,
    pub guests: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A review
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub place_id: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, alias = "userName")]
    pub author_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Review submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub place_id: String,
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl NewReview {
    /// Ratings run from 1 to 5
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=5).contains(&self.rating) {
            return Err(format!("rating must be between 1 and 5, got {}", self.rating));
        }
        if self.place_id.trim().is_empty() {
            return Err("place id is required".to_string());
        }
        Ok(())
    }
}
