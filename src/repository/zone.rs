use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::domain::ServiceCluster;

#[async_trait]
pub trait ZoneRepository: Send + Sync + 'static {
    /// All active clusters for a city, or all active clusters if `city_id`
    /// is `None` (§4.7).
    async fn active_clusters(&self, city_id: Option<Uuid>) -> anyhow::Result<Vec<ServiceCluster>>;
}

pub struct SqlxZoneRepository {
    pool: AnyPool,
}

impl SqlxZoneRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ZoneRepository for SqlxZoneRepository {
    async fn active_clusters(&self, city_id: Option<Uuid>) -> anyhow::Result<Vec<ServiceCluster>> {
        let rows = match city_id {
            Some(city_id) => {
                sqlx::query(
                    r#"SELECT id, city_id, centre_lat, centre_lng, radius_km, active
                       FROM service_clusters WHERE active = TRUE AND city_id = ?;"#,
                )
                .bind(city_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"SELECT id, city_id, centre_lat, centre_lng, radius_km, active
                       FROM service_clusters WHERE active = TRUE;"#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter()
            .map(|r| {
                let id: String = r.try_get("id")?;
                let city_id: String = r.try_get("city_id")?;
                Ok(ServiceCluster {
                    cluster_id: Uuid::parse_str(&id)?,
                    city_id: Uuid::parse_str(&city_id)?,
                    centre_lat: r.try_get("centre_lat")?,
                    centre_lng: r.try_get("centre_lng")?,
                    radius_km: r.try_get("radius_km")?,
                    active: true,
                })
            })
            .collect()
    }
}
