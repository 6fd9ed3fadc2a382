//! Sales query tools the model can call.
//!
//! Each tool wraps one [`SalesStore`] query. The descriptions tell the
//! model which columns exist and that the listing tools need at least
//! one filter; the store enforces the same rule server-side.

use async_trait::async_trait;
use openai_chat::{Tool, ToolError, ToolRegistry};

use crate::store::{
    Customer, CustomerFilter, Product, ProductFilter, RevenueFilter, RevenueStat, SalesStore,
};

pub struct GetCustomers {
    store: SalesStore,
}

#[async_trait]
impl Tool for GetCustomers {
    const NAME: &'static str = "getCustomers";
    type Args = CustomerFilter;
    type Output = Vec<Customer>;
    type Error = anyhow::Error;

    fn description(&self) -> &str {
        "Gets customers with their customerID, firstName, middleName, lastName and companyName. \
         At least one filter MUST be provided. Name filters match substrings. \
         Returns at most 25 customers."
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        self.store.get_customers(&args).await
    }
}

pub struct GetProducts {
    store: SalesStore,
}

#[async_trait]
impl Tool for GetProducts {
    const NAME: &'static str = "getProducts";
    type Args = ProductFilter;
    type Output = Vec<Product>;
    type Error = anyhow::Error;

    fn description(&self) -> &str {
        "Gets products with their productID, name, productNumber, color, listPrice and \
         productCategoryID. At least one filter MUST be provided. Name and number filters \
         match substrings. Returns at most 25 products."
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        self.store.get_products(&args).await
    }
}

pub struct GetCustomerRevenue {
    store: SalesStore,
}

#[async_trait]
impl Tool for GetCustomerRevenue {
    const NAME: &'static str = "getCustomerRevenueStatistics";
    type Args = RevenueFilter;
    type Output = Vec<RevenueStat>;
    type Error = anyhow::Error;

    fn description(&self) -> &str {
        "Gets revenue statistics grouped by customerID, productID, year and month. \
         All filters are optional. Returns at most 25 groups."
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        self.store.get_customer_revenue(&args).await
    }
}

/// The full sales tool set backed by one store.
pub fn sales_registry(store: SalesStore) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(GetCustomers {
        store: store.clone(),
    })?;
    registry.register(GetProducts {
        store: store.clone(),
    })?;
    registry.register(GetCustomerRevenue { store })?;
    Ok(registry)
}
