//! SLA table: per-category response-time budget.

use chrono::{DateTime, Duration, Utc};
use civic_types::Category;
use std::collections::HashMap;

/// Budget used when a category has no entry in the table.
pub const DEFAULT_BUDGET_HOURS: i64 = 72;

/// Category -> response-time budget.
#[derive(Debug, Clone)]
pub struct SlaTable {
    budgets: HashMap<Category, Duration>,
    default_budget: Duration,
}

impl SlaTable {
    /// Empty table; every category gets the default budget.
    pub fn empty() -> Self {
        Self {
            budgets: HashMap::new(),
            default_budget: Duration::hours(DEFAULT_BUDGET_HOURS),
        }
    }

    pub fn with_budget(mut self, category: Category, budget: Duration) -> Self {
        self.budgets.insert(category, budget);
        self
    }

    /// Budget for `category`. A missing entry is a configuration gap, not a failure.
    pub fn budget_for(&self, category: Category) -> Duration {
        match self.budgets.get(&category) {
            Some(b) => *b,
            None => {
                tracing::warn!(
                    category = %category,
                    default_hours = self.default_budget.num_hours(),
                    "no SLA budget configured for category, using default"
                );
                self.default_budget
            }
        }
    }

    pub fn deadline_for(&self, category: Category, created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + self.budget_for(category)
    }
}

impl Default for SlaTable {
    fn default() -> Self {
        Self::empty()
            .with_budget(Category::Water, Duration::hours(24))
            .with_budget(Category::Electricity, Duration::hours(4))
            .with_budget(Category::Sanitation, Duration::hours(48))
            .with_budget(Category::Health, Duration::hours(24))
            .with_budget(Category::Roads, Duration::hours(168))
            .with_budget(Category::Education, Duration::hours(72))
            .with_budget(Category::Other, Duration::hours(120))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_covers_every_category() {
        let table = SlaTable::default();
        assert_eq!(table.budget_for(Category::Electricity), Duration::hours(4));
        assert_eq!(table.budget_for(Category::Roads), Duration::hours(168));
        for c in Category::ALL {
            assert!(table.budgets.contains_key(&c), "missing {}", c);
        }
    }

    #[test]
    fn missing_category_falls_back_to_default() {
        let table = SlaTable::empty().with_budget(Category::Water, Duration::hours(1));
        assert_eq!(table.budget_for(Category::Health), Duration::hours(72));
        let t0 = Utc::now();
        assert_eq!(table.deadline_for(Category::Water, t0), t0 + Duration::hours(1));
    }
}
