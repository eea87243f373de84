use crate::geo::EARTH_RADIUS_M;
use chrono::{Duration, Utc};
use civic_types::{
    Category, GeoPoint, Issue, IssueLocation, IssueStatus, VerificationVotes,
};
use std::collections::BTreeSet;

pub(crate) fn issue_at(id: &str, village: &str, category: Category, point: GeoPoint) -> Issue {
    let now = Utc::now();
    Issue {
        id: id.to_string(),
        reporter_id: "reporter".to_string(),
        village: village.to_string(),
        title: format!("issue {}", id),
        description: "test issue".to_string(),
        category,
        images: Vec::new(),
        location: IssueLocation {
            point,
            address: None,
        },
        status: IssueStatus::Submitted,
        sla_deadline: now + Duration::hours(24),
        is_red_flagged: false,
        assigned_authority: None,
        upvotes: BTreeSet::new(),
        verification_votes: VerificationVotes::default(),
        comment_count: 0,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn offset_north(origin: &GeoPoint, meters: f64) -> GeoPoint {
    GeoPoint::new(
        origin.longitude,
        origin.latitude + (meters / EARTH_RADIUS_M).to_degrees(),
    )
}
