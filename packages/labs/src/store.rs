//! SQLite-backed sales data store.
//!
//! Each query the model can trigger is a parameterized read. Listing
//! queries are capped at 25 rows; `get_customers` and `get_products`
//! refuse to run without at least one filter so the model cannot dump
//! whole tables into the conversation.

use anyhow::{bail, Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::info;

/// Hard cap on rows returned to the model per call.
const ROW_LIMIT: i64 = 25;

#[derive(Debug, Default, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerFilter {
    /// Optional filter for the customer ID.
    #[serde(rename = "customerID")]
    pub customer_id: Option<i64>,
    /// Optional filter for the first name.
    pub first_name: Option<String>,
    /// Optional filter for the middle name.
    pub middle_name: Option<String>,
    /// Optional filter for the last name.
    pub last_name: Option<String>,
    /// Optional filter for the company name.
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(rename = "customerID")]
    pub customer_id: i64,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub company_name: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    /// Optional filter for the product ID.
    #[serde(rename = "productID")]
    pub product_id: Option<i64>,
    /// Optional filter for the product name.
    pub name: Option<String>,
    /// Optional filter for the product number.
    pub product_number: Option<String>,
    /// Optional filter for the product category ID.
    #[serde(rename = "productCategoryID")]
    pub product_category_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(rename = "productID")]
    pub product_id: i64,
    pub name: String,
    pub product_number: String,
    pub color: Option<String>,
    pub list_price: f64,
    #[serde(rename = "productCategoryID")]
    pub product_category_id: Option<i64>,
}

#[derive(Debug, Default, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevenueFilter {
    /// Optional customer for which the revenue should be queried.
    #[serde(rename = "customerID")]
    pub customer_id: Option<i64>,
    /// Optional product for which the revenue should be queried.
    #[serde(rename = "productID")]
    pub product_id: Option<i64>,
    /// Optional filter for the year of the orders.
    pub year: Option<i64>,
    /// Optional filter for the month of the orders.
    pub month: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RevenueStat {
    #[serde(rename = "customerID")]
    pub customer_id: i64,
    #[serde(rename = "productID")]
    pub product_id: i64,
    pub year: i64,
    pub month: i64,
    pub total_revenue: f64,
}

/// A product model with its marketing description, used as the
/// retrieval corpus in the embeddings lab.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductModel {
    pub product_model_id: i64,
    pub name: String,
    pub category: String,
    pub description: String,
}

/// Connection pool plus the read queries exposed as tools.
#[derive(Clone)]
pub struct SalesStore {
    pool: SqlitePool,
}

impl SalesStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .with_context(|| format!("Failed to open database {database_url}"))?;
        Ok(Self { pool })
    }

    /// Single-connection in-memory store, for tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;
        Ok(Self { pool })
    }

    /// Create the tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .context("Failed to create schema")?;
        Ok(())
    }

    /// Insert the demo dataset when the store is empty, so the labs
    /// have something to talk about out of the box.
    pub async fn seed_demo_data(&self) -> Result<()> {
        let customers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        if customers > 0 {
            return Ok(());
        }

        info!("seeding demo sales data");
        sqlx::raw_sql(SEED_SQL)
            .execute(&self.pool)
            .await
            .context("Failed to seed demo data")?;
        Ok(())
    }

    /// Filtered customer listing, capped at 25 rows. Requires at least
    /// one filter.
    pub async fn get_customers(&self, filter: &CustomerFilter) -> Result<Vec<Customer>> {
        if filter.customer_id.is_none()
            && filter.first_name.is_none()
            && filter.middle_name.is_none()
            && filter.last_name.is_none()
            && filter.company_name.is_none()
        {
            bail!("At least one filter must be provided.");
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT customer_id, first_name, middle_name, last_name, company_name \
             FROM customers WHERE 1 = 1",
        );
        if let Some(id) = filter.customer_id {
            query.push(" AND customer_id = ").push_bind(id);
        }
        push_like(&mut query, "first_name", filter.first_name.as_deref());
        push_like(&mut query, "middle_name", filter.middle_name.as_deref());
        push_like(&mut query, "last_name", filter.last_name.as_deref());
        push_like(&mut query, "company_name", filter.company_name.as_deref());
        query.push(" LIMIT ").push_bind(ROW_LIMIT);

        Ok(query.build_query_as().fetch_all(&self.pool).await?)
    }

    /// Filtered product listing, capped at 25 rows. Requires at least
    /// one filter.
    pub async fn get_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        if filter.product_id.is_none()
            && filter.name.is_none()
            && filter.product_number.is_none()
            && filter.product_category_id.is_none()
        {
            bail!("At least one filter must be provided.");
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT product_id, name, product_number, color, list_price, product_category_id \
             FROM products WHERE 1 = 1",
        );
        if let Some(id) = filter.product_id {
            query.push(" AND product_id = ").push_bind(id);
        }
        push_like(&mut query, "name", filter.name.as_deref());
        push_like(&mut query, "product_number", filter.product_number.as_deref());
        if let Some(category) = filter.product_category_id {
            query.push(" AND product_category_id = ").push_bind(category);
        }
        query.push(" LIMIT ").push_bind(ROW_LIMIT);

        Ok(query.build_query_as().fetch_all(&self.pool).await?)
    }

    /// Revenue grouped by customer, product, year, and month. All
    /// filters optional; capped at 25 groups.
    pub async fn get_customer_revenue(&self, filter: &RevenueFilter) -> Result<Vec<RevenueStat>> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT customer_id, product_id, order_year AS year, order_month AS month, \
             SUM(line_total) AS total_revenue FROM order_lines WHERE 1 = 1",
        );
        if let Some(id) = filter.customer_id {
            query.push(" AND customer_id = ").push_bind(id);
        }
        if let Some(id) = filter.product_id {
            query.push(" AND product_id = ").push_bind(id);
        }
        if let Some(year) = filter.year {
            query.push(" AND order_year = ").push_bind(year);
        }
        if let Some(month) = filter.month {
            query.push(" AND order_month = ").push_bind(month);
        }
        query.push(
            " GROUP BY customer_id, product_id, order_year, order_month \
             ORDER BY customer_id, product_id, order_year, order_month",
        );
        query.push(" LIMIT ").push_bind(ROW_LIMIT);

        Ok(query.build_query_as().fetch_all(&self.pool).await?)
    }

    /// The full product-model corpus for the retrieval lab.
    pub async fn get_product_models(&self) -> Result<Vec<ProductModel>> {
        Ok(sqlx::query_as(
            "SELECT product_model_id, name, category, description \
             FROM product_models ORDER BY product_model_id",
        )
        .fetch_all(&self.pool)
        .await?)
    }
}

/// Append ` AND column LIKE '%value%'` with a bound pattern.
fn push_like(query: &mut QueryBuilder<'_, Sqlite>, column: &str, value: Option<&str>) {
    if let Some(value) = value {
        query
            .push(format!(" AND {column} LIKE "))
            .push_bind(format!("%{value}%"));
    }
}

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS customers (
    customer_id  INTEGER PRIMARY KEY,
    first_name   TEXT NOT NULL,
    middle_name  TEXT,
    last_name    TEXT NOT NULL,
    company_name TEXT
);

CREATE TABLE IF NOT EXISTS products (
    product_id          INTEGER PRIMARY KEY,
    name                TEXT NOT NULL,
    product_number      TEXT NOT NULL,
    color               TEXT,
    list_price          REAL NOT NULL,
    product_category_id INTEGER
);

CREATE TABLE IF NOT EXISTS order_lines (
    order_line_id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id   INTEGER NOT NULL,
    product_id    INTEGER NOT NULL,
    order_year    INTEGER NOT NULL,
    order_month   INTEGER NOT NULL,
    line_total    REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS product_models (
    product_model_id INTEGER PRIMARY KEY,
    name             TEXT NOT NULL,
    category         TEXT NOT NULL,
    description      TEXT NOT NULL
);
";

const SEED_SQL: &str = r"
INSERT INTO customers (customer_id, first_name, middle_name, last_name, company_name) VALUES
    (1, 'Orlando', NULL, 'Gee', 'A Bike Store'),
    (2, 'Keith', NULL, 'Harris', 'Progressive Sports'),
    (3, 'Donna', 'F.', 'Carreras', 'Advanced Bike Components'),
    (4, 'Janet', 'M.', 'Gates', 'Modular Cycle Systems'),
    (5, 'Lucy', NULL, 'Harrington', 'Metropolitan Sports Supply'),
    (6, 'Orlando', NULL, 'Gee', 'A Bike Store');

INSERT INTO products (product_id, name, product_number, color, list_price, product_category_id) VALUES
    (7, 'Road-150 Red, 62', 'BK-R93R-62', 'Red', 3578.27, 2),
    (8, 'Mountain-100 Silver, 38', 'BK-M82S-38', 'Silver', 3399.99, 1),
    (9, 'Touring-1000 Blue, 46', 'BK-T79U-46', 'Blue', 2384.07, 3),
    (10, 'HL Road Pedal', 'PD-R956', 'Silver', 80.99, 7),
    (11, 'ML Mountain Pedal', 'PD-M340', 'Silver', 62.09, 7),
    (12, 'Half-Finger Gloves, M', 'GL-H102-M', 'Black', 24.49, 8);

INSERT INTO order_lines (customer_id, product_id, order_year, order_month, line_total) VALUES
    (1, 7, 2023, 3, 7156.54),
    (1, 10, 2023, 3, 161.98),
    (1, 7, 2023, 7, 3578.27),
    (1, 12, 2024, 1, 48.98),
    (2, 8, 2023, 5, 3399.99),
    (2, 11, 2024, 2, 124.18),
    (3, 9, 2024, 2, 4768.14),
    (4, 12, 2024, 4, 73.47),
    (5, 10, 2024, 6, 80.99);

INSERT INTO product_models (product_model_id, name, category, description) VALUES
    (1, 'Road-150', 'Road Bikes', 'The ultimate race machine with the lightest frame we offer.'),
    (2, 'Mountain-100', 'Mountain Bikes', 'Competition mountain bike with a full suspension frame.'),
    (3, 'Touring-1000', 'Touring Bikes', 'Travel in style and comfort on long distance rides.'),
    (4, 'HL Road Pedal', 'Pedals', 'Top-of-the-line clipless pedals with adjustable tension.'),
    (5, 'ML Mountain Pedal', 'Pedals', 'Mid-range mountain pedals that work with regular shoes.'),
    (6, 'Half-Finger Gloves', 'Gloves', 'Synthetic palm and absorbent terry cloth for sweaty rides.');
";
