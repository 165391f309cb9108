use bottle_flex::{DataType, DatabaseBuilder, Entity, Model, Value, eq, from_row, json, more_eq, to_row};
use serde::{Deserialize, Serialize};

#[derive(Entity, Debug, Clone, Serialize, Deserialize)]
#[flex(schema = "app", name = "orders")]
struct Order {
    #[flex(primary_key)]
    id: String,
    #[flex(index)]
    user_id: String,
    total: f64,
    created_at: chrono::NaiveDateTime,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let db = DatabaseBuilder::from_env().connect_with(&bottle_flex::DriverRegistry::with_defaults()).await?;

    // A flexible model: undeclared keys land in `source`.
    let mut users = Model::new("app", "users", 1);
    users.define_column("id", DataType::Key, Value::Null)?;
    users.define_column("name", DataType::Text, Value::Null)?;
    users.define_column("age", DataType::Int, Value::Null)?;
    users.define_source_field("source")?;
    users.define_primary_keys(&["id"]);
    users.define_rollup("orders_total", "orders", &[("user_id", "id")], &["sum(total):total"])?;

    let loaded = db.migrator().register(users).register_entity::<Order>().run().await?;
    println!("Database migration completed! {} models", loaded.len());

    let users = db.model("app.users")?;
    let orders = db.model("app.orders")?;

    users.before_insert(|_, _, new| {
        if !new.contains_key("age") {
            new.insert("age".to_string(), json!(0));
        }
        Ok(())
    });

    let inserted = db.insert(&users, to_row(&json!({"id": "u1", "name": "Ann", "tag": "vip"}))?).exec().await?;
    println!("Inserted user: {:?}", inserted);

    let order = Order { id: "o1".to_string(), user_id: "u1".to_string(), total: 42.5, created_at: chrono::Utc::now().naive_utc() };
    db.insert(&orders, to_row(&order)?).exec().await?;

    let user = db.from(&users, "A").select(&["*", "tag", "orders_total"]).filter(eq("id", "u1")).first().await?;
    println!("Found user: {:?}", user);

    db.update(&users, to_row(&json!({"tag": "gold"}))?).filter(eq("id", "u1")).exec().await?;

    let rows = db.from(&orders, "A").filter(more_eq("total", 10)).order_by_desc(&["total"]).all().await?;
    for row in rows {
        let order: Order = from_row(row)?;
        println!("Order: {:?}", order);
    }

    let page = db.from(&users, "A").paginate(1, 10).await?;
    println!("Users page {} of {} ({} total)", page.page, page.total_pages, page.total);

    let result = db
        .query_json(&json!({
            "from": {"users": "U"},
            "select": ["U.name", "U.tag"],
            "where": [{"U.id": {"eq": "u1"}}]
        }))
        .await?;
    println!("JSON query: {}", serde_json::to_string(&result)?);

    db.delete(&orders).filter(eq("user_id", "u1")).exec().await?;
    db.delete(&users).filter(eq("id", "u1")).exec().await?;
    db.close().await;

    Ok(())
}
