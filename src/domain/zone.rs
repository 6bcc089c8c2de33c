use uuid::Uuid;

/// A geographic catchment used to bound trainer search radius (C15).
#[derive(Clone, Debug)]
pub struct ServiceCluster {
    pub cluster_id: Uuid,
    pub city_id: Uuid,
    pub centre_lat: f64,
    pub centre_lng: f64,
    pub radius_km: f64,
    pub active: bool,
}
