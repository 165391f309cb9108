//! Runs against a live server. Set `DATABASE_URL` (a `.env` file works) and
//! run with `cargo test -- --ignored`.

use bottle_flex::{DataType, DatabaseBuilder, DriverRegistry, Model, TableCatalog, Value, eq, json};

fn row(value: Value) -> bottle_flex::Row {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
#[ignore]
async fn test_flexible_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let _ = env_logger::builder().is_test(true).try_init();

    let db = DatabaseBuilder::from_env().connect_with(&DriverRegistry::with_defaults()).await?;
    let suffix = uuid::Uuid::new_v4().simple().to_string();

    let mut people = Model::new("flex_test", format!("people_{}", &suffix[..8]), 1);
    people.define_column("id", DataType::Key, Value::Null)?;
    people.define_column("name", DataType::Text, Value::Null)?;
    people.define_column("age", DataType::Int, Value::Null)?;
    people.define_source_field("source")?;
    people.define_primary_keys(&["id"]);
    let people = db.load(people).await?;
    assert!(db.table_exists(&people).await?);

    let inserted = db.insert(&people, row(json!({"id": "p1", "name": "Ann", "age": 30, "tag": "vip"}))).exec().await?;
    // Attributes come back through selects, not through RETURNING.
    assert_eq!(inserted[0]["name"], json!("Ann"));
    assert!(!inserted[0].contains_key("source"));
    assert!(!inserted[0].contains_key("tag"));
    let stored = db.from(&people, "A").filter(eq("id", "p1")).first().await?.expect("inserted row");
    assert_eq!(stored["tag"], json!("vip"));

    db.update(&people, row(json!({"tag": "gold", "age": 31}))).filter(eq("id", "p1")).exec().await?;

    let found = db.from(&people, "A").filter(eq("tag", "gold")).first().await?.expect("updated row");
    assert_eq!(found["age"], json!(31));
    assert_eq!(found["name"], json!("Ann"));

    let tx = db.begin();
    db.insert(&people, row(json!({"id": "p2", "name": "Bob"}))).exec_tx(&tx).await?;
    tx.rollback().await?;
    assert!(!db.from(&people, "A").filter(eq("id", "p2")).exists().await?);

    assert_eq!(db.from(&people, "A").count().await?, 1);
    db.delete(&people).filter(eq("id", "p1")).exec().await?;
    assert_eq!(db.from(&people, "A").count().await?, 0);

    let catalog = TableCatalog::open(&db).await?;
    db.save_model(&catalog, &people).await?;
    let restored = db.restore_model(&catalog, &people.table()).await?;
    assert_eq!(restored.columns, people.columns);

    db.fetch_all(None, &format!("DROP TABLE {};", people.table())).await?;
    db.close().await;
    Ok(())
}
