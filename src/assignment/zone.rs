use crate::domain::ServiceCluster;

/// Great-circle distance between two points in kilometres (§4.7).
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0088;

    let (lat1_r, lat2_r) = (lat1.to_radians(), lat2.to_radians());
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Active clusters covering `(lat, lng)`, sorted nearest-first (§4.7).
/// An empty result means `SERVICE_NOT_AVAILABLE` — the caller waitlists.
pub fn lookup_zone(clusters: &[ServiceCluster], lat: f64, lng: f64) -> Vec<(ServiceCluster, f64)> {
    let mut matches: Vec<(ServiceCluster, f64)> = clusters
        .iter()
        .filter(|c| c.active)
        .map(|c| (c.clone(), haversine_km(c.centre_lat, c.centre_lng, lat, lng)))
        .filter(|(c, distance)| *distance <= c.radius_km)
        .collect();

    matches.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn cluster(centre_lat: f64, centre_lng: f64, radius_km: f64) -> ServiceCluster {
        ServiceCluster {
            cluster_id: Uuid::new_v4(),
            city_id: Uuid::new_v4(),
            centre_lat,
            centre_lng,
            radius_km,
            active: true,
        }
    }

    #[test]
    fn same_point_is_zero_distance() {
        assert!((haversine_km(12.9716, 77.5946, 12.9716, 77.5946)).abs() < 1e-9);
    }

    #[test]
    fn out_of_radius_point_is_excluded() {
        let clusters = vec![cluster(12.9716, 77.5946, 5.0)];
        let matches = lookup_zone(&clusters, 13.2, 77.9);
        assert!(matches.is_empty());
    }

    #[test]
    fn nearest_zone_sorts_first() {
        let far = cluster(12.9716, 77.5946, 200.0);
        let near = cluster(12.95, 77.60, 200.0);
        let matches = lookup_zone(&[far.clone(), near.clone()], 12.951, 77.601);
        assert_eq!(matches[0].0.cluster_id, near.cluster_id);
    }

    #[test]
    fn inactive_cluster_is_excluded() {
        let mut c = cluster(12.9716, 77.5946, 200.0);
        c.active = false;
        assert!(lookup_zone(&[c], 12.9716, 77.5946).is_empty());
    }
}
