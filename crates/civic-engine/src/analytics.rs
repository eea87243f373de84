//! Village dashboard aggregation.

use civic_types::{AnalyticsSummary, Category, CategoryCount, Issue, IssueStatus, VillageAnalytics};
use std::collections::BTreeMap;

pub fn summarize(issues: &[Issue]) -> VillageAnalytics {
    let mut summary = AnalyticsSummary::default();
    let mut by_category: BTreeMap<Category, usize> = BTreeMap::new();
    for issue in issues {
        summary.total_issues += 1;
        if issue.status == IssueStatus::Resolved {
            summary.resolved_issues += 1;
        }
        if issue.status.is_active() {
            summary.pending_issues += 1;
        }
        if issue.is_red_flagged {
            summary.red_flagged_issues += 1;
        }
        *by_category.entry(issue.category).or_default() += 1;
    }
    VillageAnalytics {
        summary,
        by_category: by_category
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_issue;

    #[test]
    fn counts_by_status_flag_and_category() {
        let mut a = sample_issue();
        a.category = Category::Water;
        let mut b = sample_issue();
        b.category = Category::Water;
        b.status = IssueStatus::Resolved;
        let mut c = sample_issue();
        c.category = Category::Roads;
        c.status = IssueStatus::InProgress;
        c.is_red_flagged = true;

        let out = summarize(&[a, b, c]);
        assert_eq!(
            out.summary,
            AnalyticsSummary {
                total_issues: 3,
                resolved_issues: 1,
                pending_issues: 2,
                red_flagged_issues: 1,
            }
        );
        assert_eq!(
            out.by_category,
            vec![
                CategoryCount {
                    category: Category::Water,
                    count: 2
                },
                CategoryCount {
                    category: Category::Roads,
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn empty_village() {
        assert_eq!(summarize(&[]), VillageAnalytics::default());
    }
}
