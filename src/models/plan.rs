//! Plan model: a purchasable item with a stablecoin price and an optional
//! renewal period.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::schema::plans;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Identifiable)]
#[diesel(table_name = plans)]
pub struct Plan {
    pub id: String,
    pub tenant_id: String,
    pub plan_key: String,
    pub name: String,
    pub description: Option<String>,
    /// Canonical decimal string, at most 6 fractional digits.
    pub price: String,
    pub currency: String,
    pub period_days: Option<i32>,
    /// JSON array of feature strings.
    pub features: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = plans)]
pub struct NewPlan {
    pub id: String,
    pub tenant_id: String,
    pub plan_key: String,
    pub name: String,
    pub description: Option<String>,
    pub price: String,
    pub currency: String,
    pub period_days: Option<i32>,
    pub features: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Plan {
    pub fn find_by_id(conn: &mut SqliteConnection, plan_id: &str) -> Result<Option<Plan>> {
        use crate::schema::plans::dsl::*;
        plans
            .find(plan_id)
            .first::<Plan>(conn)
            .optional()
            .context("Failed to load plan")
    }

    pub fn find_for_tenant(
        conn: &mut SqliteConnection,
        plan_id: &str,
        tenant: &str,
    ) -> Result<Option<Plan>> {
        use crate::schema::plans::dsl::*;
        plans
            .find(plan_id)
            .filter(tenant_id.eq(tenant))
            .first::<Plan>(conn)
            .optional()
            .context("Failed to load plan for tenant")
    }

    pub fn find_by_key(
        conn: &mut SqliteConnection,
        tenant: &str,
        key: &str,
    ) -> Result<Option<Plan>> {
        use crate::schema::plans::dsl::*;
        plans
            .filter(tenant_id.eq(tenant))
            .filter(plan_key.eq(key))
            .first::<Plan>(conn)
            .optional()
            .context("Failed to load plan by key")
    }

    pub fn list_active(conn: &mut SqliteConnection, tenant: &str) -> Result<Vec<Plan>> {
        use crate::schema::plans::dsl::*;
        plans
            .filter(tenant_id.eq(tenant))
            .filter(is_active.eq(true))
            .order(created_at.asc())
            .load::<Plan>(conn)
            .context("Failed to list plans")
    }

    pub fn create(conn: &mut SqliteConnection, row: NewPlan) -> Result<Plan> {
        diesel::insert_into(plans::table)
            .values(&row)
            .execute(conn)
            .context("Failed to insert plan")?;
        Self::find_by_id(conn, &row.id)?.context("plan missing immediately after insert")
    }

    /// Price as an exact decimal. The column always holds a value this
    /// process wrote, so a parse failure is data corruption.
    pub fn price_decimal(&self) -> Result<Decimal> {
        self.price
            .parse::<Decimal>()
            .with_context(|| format!("corrupt price on plan {}: {}", self.id, self.price))
    }

    pub fn feature_list(&self) -> Vec<String> {
        serde_json::from_str(&self.features).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{now, Tenant};

    fn seeded_plan(key: &str) -> NewPlan {
        let ts = now();
        NewPlan {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: "default".to_string(),
            plan_key: key.to_string(),
            name: "Pro Monthly".to_string(),
            description: None,
            price: "19.99".to_string(),
            currency: "USDC".to_string(),
            period_days: Some(30),
            features: r#"["priority-support"]"#.to_string(),
            is_active: true,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn duplicate_plan_key_rejected_by_unique_index() {
        let pool = create_test_pool();
        let mut conn = pool.get().unwrap();
        Tenant::ensure_default(&mut conn, None, None, None, None).unwrap();

        Plan::create(&mut conn, seeded_plan("pro-monthly")).unwrap();
        let err = Plan::create(&mut conn, seeded_plan("pro-monthly")).unwrap_err();
        assert!(err.to_string().contains("Failed to insert plan"));
    }

    #[test]
    fn price_parses_as_decimal() {
        let pool = create_test_pool();
        let mut conn = pool.get().unwrap();
        Tenant::ensure_default(&mut conn, None, None, None, None).unwrap();
        let plan = Plan::create(&mut conn, seeded_plan("pro")).unwrap();
        assert_eq!(plan.price_decimal().unwrap().to_string(), "19.99");
        assert_eq!(plan.feature_list(), vec!["priority-support".to_string()]);
    }
}
