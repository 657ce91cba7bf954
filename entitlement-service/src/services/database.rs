//! Database service for entitlement-service.
//!
//! The only module that speaks SQL. The two operations with a real
//! concurrency contract live here: subscription creation (atomic
//! check-and-insert under a partial unique index) and the bounded usage
//! increment (single-statement conditional upsert).

use crate::models::{
    CreatePlan, CreateSubscription, Plan, PlanFeature, ProductLine, Subscription,
    SubscriptionStatus, UsageCounter,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "entitlement-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Plan Operations
    // =========================================================================

    /// Create a plan with its feature ceilings. This is the admin-tooling
    /// seam; the entitlement components themselves only ever read plans.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_plan(&self, input: &CreatePlan) -> Result<Plan, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_plan"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let plan_id = Uuid::new_v4();
        let plan = sqlx::query_as::<_, Plan>(
            r#"
            INSERT INTO plans (plan_id, product_line, name, category, description, price, currency, validity_days)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING plan_id, product_line, name, category, description, price, currency, validity_days, is_active, created_utc, updated_utc
            "#,
        )
        .bind(plan_id)
        .bind(input.product_line.as_str())
        .bind(&input.name)
        .bind(input.category.as_str())
        .bind(&input.description)
        .bind(input.price)
        .bind(&input.currency)
        .bind(input.validity_days)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create plan: {}", e)))?;

        for feature in &input.features {
            sqlx::query(
                r#"
                INSERT INTO plan_features (plan_id, feature, ceiling)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(plan_id)
            .bind(&feature.feature)
            .bind(feature.ceiling.to_db())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to create plan feature: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit plan: {}", e))
        })?;

        timer.observe_duration();
        info!(plan_id = %plan.plan_id, name = %plan.name, "Plan created");

        Ok(plan)
    }

    /// Get a plan by ID.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn get_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_plan"])
            .start_timer();

        let plan = sqlx::query_as::<_, Plan>(
            r#"
            SELECT plan_id, product_line, name, category, description, price, currency, validity_days, is_active, created_utc, updated_utc
            FROM plans
            WHERE plan_id = $1
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get plan: {}", e)))?;

        timer.observe_duration();

        Ok(plan)
    }

    /// Get the feature ceilings of a plan.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn get_plan_features(&self, plan_id: Uuid) -> Result<Vec<PlanFeature>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_plan_features"])
            .start_timer();

        let features = sqlx::query_as::<_, PlanFeature>(
            r#"
            SELECT plan_id, feature, ceiling
            FROM plan_features
            WHERE plan_id = $1
            ORDER BY feature
            "#,
        )
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get plan features: {}", e))
        })?;

        timer.observe_duration();

        Ok(features)
    }

    /// List plans currently offered for new subscriptions, cheapest first.
    #[instrument(skip(self))]
    pub async fn list_active_plans(
        &self,
        product_line: ProductLine,
    ) -> Result<Vec<Plan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_plans"])
            .start_timer();

        let plans = sqlx::query_as::<_, Plan>(
            r#"
            SELECT plan_id, product_line, name, category, description, price, currency, validity_days, is_active, created_utc, updated_utc
            FROM plans
            WHERE product_line = $1 AND is_active = TRUE
            ORDER BY price, name
            "#,
        )
        .bind(product_line.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list plans: {}", e)))?;

        timer.observe_duration();

        Ok(plans)
    }

    /// Withdraw a plan from sale. Existing subscriptions keep resolving it.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn deactivate_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["deactivate_plan"])
            .start_timer();

        let plan = sqlx::query_as::<_, Plan>(
            r#"
            UPDATE plans
            SET is_active = FALSE, updated_utc = now()
            WHERE plan_id = $1 AND is_active = TRUE
            RETURNING plan_id, product_line, name, category, description, price, currency, validity_days, is_active, created_utc, updated_utc
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to deactivate plan: {}", e)))?;

        timer.observe_duration();

        if let Some(ref p) = plan {
            info!(plan_id = %p.plan_id, "Plan deactivated");
        }

        Ok(plan)
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Create a subscription and seed its usage counters in one transaction.
    ///
    /// A stored `active` row whose window already closed is expired first so
    /// it cannot block a legitimate renewal; a genuinely live duplicate then
    /// loses to the partial unique index and surfaces as `Conflict`.
    #[instrument(skip(self, input, plan_features), fields(user_id = %input.user_id, plan_id = %input.plan_id))]
    pub async fn create_subscription(
        &self,
        input: &CreateSubscription,
        product_line: ProductLine,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
        plan_features: &[PlanFeature],
    ) -> Result<Subscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_subscription"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'expired', updated_utc = now()
            WHERE user_id = $1 AND product_line = $2 AND status = 'active' AND end_utc < $3
            "#,
        )
        .bind(input.user_id)
        .bind(product_line.as_str())
        .bind(start_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to expire stale subscription: {}", e))
        })?;

        let subscription_id = Uuid::new_v4();
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (subscription_id, user_id, plan_id, product_line, status, start_utc, end_utc, auto_renew)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING subscription_id, user_id, plan_id, product_line, status, start_utc, end_utc, auto_renew, created_utc, updated_utc
            "#,
        )
        .bind(subscription_id)
        .bind(input.user_id)
        .bind(input.plan_id)
        .bind(product_line.as_str())
        .bind(SubscriptionStatus::Active.as_str())
        .bind(start_utc)
        .bind(end_utc)
        .bind(input.auto_renew)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                // Race condition: another request created the subscription
                AppError::Conflict(anyhow::anyhow!(
                    "An active subscription already exists for this product line"
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create subscription: {}", e)),
        })?;

        for feature in plan_features {
            sqlx::query(
                r#"
                INSERT INTO usage_counters (subscription_id, feature, count)
                VALUES ($1, $2, 0)
                ON CONFLICT (subscription_id, feature) DO NOTHING
                "#,
            )
            .bind(subscription_id)
            .bind(&feature.feature)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to seed usage counter: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit subscription: {}", e))
        })?;

        timer.observe_duration();
        info!(subscription_id = %subscription.subscription_id, "Subscription created");

        Ok(subscription)
    }

    /// Get a subscription by ID.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn get_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT subscription_id, user_id, plan_id, product_line, status, start_utc, end_utc, auto_renew, created_utc, updated_utc
            FROM subscriptions
            WHERE subscription_id = $1
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get subscription: {}", e)))?;

        timer.observe_duration();

        Ok(subscription)
    }

    /// Find the subscription stored as `active` for a user and product line.
    ///
    /// Returns the raw row; the ledger applies the lazy-expiry law on top.
    /// At most one row can match thanks to the partial unique index.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn find_active_subscription(
        &self,
        user_id: Uuid,
        product_line: ProductLine,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_active_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT subscription_id, user_id, plan_id, product_line, status, start_utc, end_utc, auto_renew, created_utc, updated_utc
            FROM subscriptions
            WHERE user_id = $1 AND product_line = $2 AND status = 'active'
            "#,
        )
        .bind(user_id)
        .bind(product_line.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to find active subscription: {}", e))
        })?;

        timer.observe_duration();

        Ok(subscription)
    }

    /// Write back `expired` on a subscription whose window has closed.
    /// Best-effort: callers never depend on this write for correctness.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn mark_subscription_expired(&self, subscription_id: Uuid) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_subscription_expired"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'expired', updated_utc = now()
            WHERE subscription_id = $1 AND status = 'active' AND end_utc < now()
            "#,
        )
        .bind(subscription_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark subscription expired: {}", e))
        })?;

        timer.observe_duration();

        Ok(result.rows_affected())
    }

    /// Cancel a subscription. Only an `active` row transitions; a terminal
    /// row is returned unchanged so cancellation stays idempotent.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn cancel_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["cancel_subscription"])
            .start_timer();

        let cancelled = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions
            SET status = 'cancelled', updated_utc = now()
            WHERE subscription_id = $1 AND status = 'active'
            RETURNING subscription_id, user_id, plan_id, product_line, status, start_utc, end_utc, auto_renew, created_utc, updated_utc
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to cancel subscription: {}", e))
        })?;

        let subscription = match cancelled {
            Some(subscription) => {
                info!(subscription_id = %subscription.subscription_id, "Subscription cancelled");
                Some(subscription)
            }
            None => self.get_subscription(subscription_id).await?,
        };

        timer.observe_duration();

        Ok(subscription)
    }

    // =========================================================================
    // Usage Counter Operations
    // =========================================================================

    /// Current count for a feature; a missing counter row reads as 0.
    #[instrument(skip(self), fields(subscription_id = %subscription_id, feature = feature))]
    pub async fn get_usage(&self, subscription_id: Uuid, feature: &str) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_usage"])
            .start_timer();

        let count: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT count
            FROM usage_counters
            WHERE subscription_id = $1 AND feature = $2
            "#,
        )
        .bind(subscription_id)
        .bind(feature)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get usage: {}", e)))?;

        timer.observe_duration();

        Ok(count.unwrap_or(0))
    }

    /// Unconditional atomic increment, used for unlimited ceilings.
    /// Lazily creates the counter row on first use.
    #[instrument(skip(self), fields(subscription_id = %subscription_id, feature = feature))]
    pub async fn increment_usage(
        &self,
        subscription_id: Uuid,
        feature: &str,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["increment_usage"])
            .start_timer();

        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO usage_counters (subscription_id, feature, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (subscription_id, feature)
            DO UPDATE SET count = usage_counters.count + 1, updated_utc = now()
            RETURNING count
            "#,
        )
        .bind(subscription_id)
        .bind(feature)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to increment usage: {}", e)))?;

        timer.observe_duration();

        Ok(count)
    }

    /// Atomic check-and-spend against a bounded ceiling.
    ///
    /// The quota comparison and the increment are one statement, so two
    /// racing spenders can never both take the last unit: the conditional
    /// update re-evaluates against the winner's committed row. Returns the
    /// new count, or `None` when the ceiling is already fully consumed
    /// (nothing is spent in that case).
    #[instrument(skip(self), fields(subscription_id = %subscription_id, feature = feature))]
    pub async fn increment_usage_bounded(
        &self,
        subscription_id: Uuid,
        feature: &str,
        ceiling: i64,
    ) -> Result<Option<i64>, AppError> {
        // A zero ceiling has nothing to spend; the insert arm below could
        // not express that, so short-circuit before touching the store.
        if ceiling <= 0 {
            return Ok(None);
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["increment_usage_bounded"])
            .start_timer();

        let count: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO usage_counters (subscription_id, feature, count)
            VALUES ($1, $2, 1)
            ON CONFLICT (subscription_id, feature)
            DO UPDATE SET count = usage_counters.count + 1, updated_utc = now()
            WHERE usage_counters.count < $3
            RETURNING count
            "#,
        )
        .bind(subscription_id)
        .bind(feature)
        .bind(ceiling)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to increment usage: {}", e))
        })?;

        timer.observe_duration();

        Ok(count)
    }

    /// All counters of a subscription.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn list_usage_counters(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<UsageCounter>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_usage_counters"])
            .start_timer();

        let counters = sqlx::query_as::<_, UsageCounter>(
            r#"
            SELECT subscription_id, feature, count, created_utc, updated_utc
            FROM usage_counters
            WHERE subscription_id = $1
            ORDER BY feature
            "#,
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list usage counters: {}", e))
        })?;

        timer.observe_duration();

        Ok(counters)
    }
}
