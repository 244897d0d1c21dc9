//! Geographic helpers
//!
//! Great-circle distance, human-readable distance labels and map links for
//! places.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point on the map, in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude", alias = "lon")]
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and within [-90, 90] x [-180, 180]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// Great-circle distance in kilometres (Haversine)
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = lat2 - lat1;
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push h slightly past 1 for antipodal points
    2.0 * EARTH_RADIUS_KM * h.clamp(0.0, 1.0).sqrt().asin()
}

/// "850 m" under a kilometre, "1.6 km" otherwise
///
/// The unit is chosen after rounding, so 999.6 m reads "1.0 km".
pub fn format_distance(km: f64) -> String {
    if !km.is_finite() || km < 0.0 {
        return String::new();
    }
    let metres = (km * 1000.0).round();
    if metres < 1000.0 {
        return format!("{} m", metres as u64);
    }
    let tenths = (km * 10.0).round() / 10.0;
    if tenths < 100.0 {
        format!("{:.1} km", tenths)
    } else {
        format!("{} km", km.round() as u64)
    }
}

/// Google Maps search link for a point
pub fn maps_search_url(at: Coordinates) -> String {
    format!(
        "https://www.google.com/maps/search/?api=1&query={},{}",
        at.lat, at.lng
    )
}

/// Google Maps search link for a free-text address
pub fn maps_address_url(address: &str) -> String {
    format!(
        "https://www.google.com/maps/search/?api=1&query={}",
        urlencoding::encode(address.trim())
    )
}

/// Google Maps directions link; without an origin the user's location is used
pub fn maps_directions_url(from: Option<Coordinates>, to: Coordinates) -> String {
    let mut url = format!(
        "https://www.google.com/maps/dir/?api=1&destination={},{}",
        to.lat, to.lng
    );
    if let Some(from) = from {
        url.push_str(&format!("&origin={},{}", from.lat, from.lng));
    }
    url
}

/// Embeddable map iframe source centred on a point
pub fn maps_embed_url(at: Coordinates, zoom: u8) -> String {
    format!(
        "https://maps.google.com/maps?q={},{}&z={}&output=embed",
        at.lat,
        at.lng,
        zoom.clamp(1, 21)
    )
}

/// Sort items nearest-first from `origin`; items without a position go last
pub fn sort_by_distance<T, F>(items: &mut [T], origin: Coordinates, position: F)
where
    F: Fn(&T) -> Option<Coordinates>,
{
    let distance = |item: &T| {
        position(item)
            .filter(Coordinates::is_valid)
            .map(|p| haversine_km(origin, p))
            .unwrap_or(f64::INFINITY)
    };
    items.sort_by(|a, b| distance(a).total_cmp(&distance(b)));
}
