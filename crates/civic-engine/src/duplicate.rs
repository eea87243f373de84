//! Duplicate detection at intake: nearest active issue of the same category.

use civic_types::{
    Category, GeoPoint, Issue, IssueStatus, IssueStore, IssueStoreError, NearbyQuery,
};

/// Proximity threshold for treating two reports as the same issue.
pub const DUPLICATE_RADIUS_M: f64 = 50.0;

pub const UPVOTE_SUGGESTION: &str = "Would you like to upvote the existing issue instead?";

#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    radius_m: f64,
}

impl DuplicateDetector {
    pub fn new(radius_m: f64) -> Self {
        Self { radius_m }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Nearest active issue of `category` within the radius, if any.
    pub async fn find_duplicate(
        &self,
        store: &dyn IssueStore,
        village: &str,
        category: Category,
        point: GeoPoint,
    ) -> Result<Option<Issue>, IssueStoreError> {
        let query = NearbyQuery {
            village: village.to_string(),
            category,
            point,
            radius_m: self.radius_m,
            statuses: IssueStatus::ACTIVE.to_vec(),
        };
        let hits = store.find_nearby(&query).await?;
        Ok(hits.into_iter().next().map(|hit| {
            tracing::debug!(
                duplicate_id = %hit.issue.id,
                distance_m = hit.distance_m,
                "duplicate candidate found"
            );
            hit.issue
        }))
    }
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(DUPLICATE_RADIUS_M)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{issue_at, offset_north};
    use civic_store::InMemoryIssueStore;

    #[tokio::test]
    async fn same_category_within_radius_matches() {
        let store = InMemoryIssueStore::new();
        let origin = GeoPoint::new(79.0882, 21.1458);
        store
            .insert(issue_at("roads-1", "v1", Category::Roads, offset_north(&origin, 30.0)))
            .await
            .unwrap();
        let detector = DuplicateDetector::default();

        let hit = detector
            .find_duplicate(&store, "v1", Category::Roads, origin)
            .await
            .unwrap();
        assert_eq!(hit.map(|i| i.id), Some("roads-1".to_string()));

        let miss = detector
            .find_duplicate(&store, "v1", Category::Water, origin)
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn nearest_of_several_wins() {
        let store = InMemoryIssueStore::new();
        let origin = GeoPoint::new(79.0882, 21.1458);
        for (id, d) in [("a", 45.0), ("b", 12.0), ("c", 30.0)] {
            store
                .insert(issue_at(id, "v1", Category::Roads, offset_north(&origin, d)))
                .await
                .unwrap();
        }
        let hit = DuplicateDetector::default()
            .find_duplicate(&store, "v1", Category::Roads, origin)
            .await
            .unwrap();
        assert_eq!(hit.map(|i| i.id), Some("b".to_string()));
    }

    #[tokio::test]
    async fn beyond_radius_or_inactive_is_no_match() {
        let store = InMemoryIssueStore::new();
        let origin = GeoPoint::new(79.0882, 21.1458);
        store
            .insert(issue_at("far", "v1", Category::Roads, offset_north(&origin, 60.0)))
            .await
            .unwrap();
        let mut verified = issue_at("done", "v1", Category::Roads, origin);
        verified.status = IssueStatus::Verified;
        store.insert(verified).await.unwrap();

        let hit = DuplicateDetector::default()
            .find_duplicate(&store, "v1", Category::Roads, origin)
            .await
            .unwrap();
        assert!(hit.is_none());
    }
}
