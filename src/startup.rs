use crate::config::Config;
use crate::health::{
    check_health, DependencyChecker, DependencyStatus, HealthReport, OrderServiceChecker,
    PostgresChecker, RedisChecker,
};
use anyhow::{Context, Result};
use sqlx::PgPool;

/// `None` means the dependency is not configured and was not checked.
pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub migrations: bool,
    pub redis: Option<bool>,
    pub order_service: Option<bool>,
    /// Rolled-up dependency status: healthy, degraded or unhealthy.
    pub health: String,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment
            && self.database
            && self.migrations
            && self.redis.unwrap_or(true)
            && self.order_service.unwrap_or(true)
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Migrations Applied:    {}", status(self.migrations));
        println!("Redis Connectivity:    {}", optional_status(self.redis));
        println!("Order Service:         {}", optional_status(self.order_service));
        println!("Dependency Health:     {}", self.health);

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

fn optional_status(ok: Option<bool>) -> &'static str {
    match ok {
        Some(ok) => status(ok),
        None => "- disabled",
    }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut checkers: Vec<Box<dyn DependencyChecker>> =
        vec![Box::new(PostgresChecker::new(pool.clone()))];
    if let Some(url) = &config.redis_url {
        checkers.push(Box::new(RedisChecker::new(url.clone())));
    }
    if let Some(url) = &config.order_service_url {
        checkers.push(Box::new(OrderServiceChecker::new(url.clone())));
    }

    let mut report = report_from_health(check_health(&checkers).await);

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.insert(0, format!("Environment: {}", e));
    }

    if report.database {
        if let Err(e) = validate_migrations(pool).await {
            report.migrations = false;
            report.errors.push(format!("Migrations: {}", e));
        }
    }

    Ok(report)
}

/// Dependencies missing from the health report were not configured.
fn report_from_health(health: HealthReport) -> ValidationReport {
    let mut errors = Vec::new();
    let mut healthy = |name: &str| -> Option<bool> {
        let status = health.dependencies.get(name)?;
        if let DependencyStatus::Unhealthy { error, .. } = status {
            errors.push(format!("{}: {}", name, error));
        }
        Some(status.is_healthy())
    };

    let database = healthy("postgres").unwrap_or(false);
    let redis = healthy("redis");
    let order_service = healthy("order_service");

    ValidationReport {
        environment: true,
        database,
        migrations: database,
        redis,
        order_service,
        health: health.status,
        errors,
    }
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.database_max_connections == 0 {
        anyhow::bail!("DATABASE_MAX_CONNECTIONS must be greater than 0");
    }
    if config.ledger_max_attempts == 0 {
        anyhow::bail!("LEDGER_MAX_ATTEMPTS must be greater than 0");
    }

    if let Some(url) = &config.order_service_url {
        reqwest::Url::parse(url).context("ORDER_SERVICE_URL is not a valid URL")?;
    }
    if let Some(url) = &config.redis_url {
        redis::Client::open(url.as_str()).context("REDIS_URL is not a valid Redis URL")?;
    }

    Ok(())
}

async fn validate_migrations(pool: &PgPool) -> Result<()> {
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}
