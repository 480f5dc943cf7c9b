//! Radius queries over a presence snapshot.
//!
//! Distance is great-circle (haversine). Queries are a linear scan over the
//! currently connected population, which is small by construction; a grid
//! bucket index would slot in behind `near` if that ever stops being true.

use crate::store::UserPresence;

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A presence together with its distance from the query point.
#[derive(Debug, Clone)]
pub struct Nearby {
    pub presence: UserPresence,
    pub distance_km: f64,
}

/// Great-circle distance between two WGS84 points, in kilometers.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Presences within `radius_km` of the query point, ordered ascending by
/// distance with ties broken by `user_id` so results are deterministic.
/// `excluding` removes the requester's own presence.
#[must_use]
pub fn near(presences: &[UserPresence], latitude: f64, longitude: f64, radius_km: f64, excluding: Option<&str>) -> Vec<Nearby> {
    let mut hits: Vec<Nearby> = presences
        .iter()
        .filter(|p| excluding != Some(p.user_id.as_str()))
        .filter_map(|p| {
            let distance_km = haversine_km(latitude, longitude, p.latitude, p.longitude);
            (distance_km <= radius_km).then(|| Nearby { presence: p.clone(), distance_km })
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.presence.user_id.cmp(&b.presence.user_id))
    });
    hits
}

#[cfg(test)]
#[path = "proximity_test.rs"]
mod tests;
