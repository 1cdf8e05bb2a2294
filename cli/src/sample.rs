//! Sample store dataset used to seed an empty memory bank

use memorybank_core::{PersistedState, Record, SyncStatus};
use serde_json::json;

fn order(id: &str, customer: &str, status: &str, total: f64, date: &str) -> Record {
    Record::new()
        .with("id", id)
        .with("orderNumber", format!("ORD-{}", id))
        .with("customerId", customer)
        .with("status", status)
        .with("paymentStatus", if status == "cancelled" { "refunded" } else { "paid" })
        .with("total", total)
        .with("createdAt", date)
}

fn product(id: &str, name: &str, category: &str, price: f64, stock: u32) -> Record {
    Record::new()
        .with("id", id)
        .with("name", name)
        .with("sku", format!("SKU-{}", id))
        .with("categoryId", category)
        .with("price", price)
        .with("stock", stock)
        .with("status", if stock == 0 { "out_of_stock" } else { "active" })
}

fn customer(id: &str, name: &str, email: &str, orders: u32, spent: f64) -> Record {
    Record::new()
        .with("id", id)
        .with("name", name)
        .with("email", email)
        .with("totalOrders", orders)
        .with("totalSpent", spent)
}

/// A small but complete dataset touching every collection
pub fn sample_state() -> PersistedState {
    let mut state = PersistedState::empty();

    state.categories = vec![
        Record::new().with("id", "cat-1").with("name", "Kitchen").with("slug", "kitchen"),
        Record::new().with("id", "cat-2").with("name", "Apparel").with("slug", "apparel"),
    ];
    state.products = vec![
        product("p-1", "Stoneware Mug", "cat-1", 18.0, 120),
        product("p-2", "Chef Knife", "cat-1", 89.5, 14),
        product("p-3", "Linen Apron", "cat-2", 32.0, 0),
    ];
    state.inventory = state
        .products
        .iter()
        .map(|p| {
            Record::new()
                .with("productId", p.id().unwrap_or_default())
                .with("quantity", p.get("stock").cloned().unwrap_or(json!(0)))
                .with("reorderLevel", 10)
                .with("warehouse", "main")
        })
        .collect();
    state.customers = vec![
        customer("c-1", "Ada Byron", "ada@example.com", 2, 125.5),
        customer("c-2", "Grace Hopper", "grace@example.com", 1, 89.5),
    ];
    state.orders = vec![
        order("1001", "c-1", "delivered", 36.0, "2024-03-02T09:15:00.000Z"),
        order("1002", "c-2", "shipped", 89.5, "2024-03-04T14:40:00.000Z"),
        order("1003", "c-1", "processing", 89.5, "2024-03-05T08:05:00.000Z"),
    ];
    state.reviews = vec![Record::new()
        .with("id", "r-1")
        .with("productId", "p-1")
        .with("customerId", "c-1")
        .with("rating", 5)
        .with("status", "approved")];
    state.coupons = vec![Record::new()
        .with("id", "cp-1")
        .with("code", "SPRING10")
        .with("type", "percentage")
        .with("value", 10)
        .with("active", true)];
    state.discount_rules = vec![Record::new()
        .with("id", "dr-1")
        .with("name", "Bulk mugs")
        .with("minQuantity", 6)
        .with("discountPercent", 15)];
    state.shipping_zones = vec![Record::new()
        .with("id", "sz-1")
        .with("name", "Domestic")
        .with("countries", json!(["US"]))];
    state.shipping_methods = vec![
        Record::new()
            .with("id", "sm-1")
            .with("zoneId", "sz-1")
            .with("name", "Standard")
            .with("rate", 5.99),
        Record::new()
            .with("id", "sm-2")
            .with("zoneId", "sz-1")
            .with("name", "Express")
            .with("rate", 14.99),
    ];
    state.users = vec![Record::new()
        .with("id", "u-1")
        .with("name", "Store Admin")
        .with("email", "admin@example.com")
        .with("role", "admin")];
    state.activity_logs = vec![Record::new()
        .with("id", "log-1")
        .with("userId", "u-1")
        .with("action", "seeded sample data")];
    state.settings = Record::new()
        .with("storeName", "Sample Store")
        .with("currency", "USD")
        .with("timezone", "UTC")
        .with("taxRate", 0.08);
    state.sync_status = SyncStatus::Synced;

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use memorybank_state::validator;

    #[test]
    fn test_sample_is_valid() {
        let value = serde_json::to_value(sample_state()).unwrap();
        assert!(validator::validate(&value));
    }

    #[test]
    fn test_sample_covers_every_collection() {
        let state = sample_state();
        for (name, collection) in state.collections() {
            assert!(!collection.is_empty(), "{name} is empty");
        }
        assert_eq!(state.total_revenue(), 215.0);
    }
}
