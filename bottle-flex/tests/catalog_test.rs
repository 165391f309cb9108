mod common;

use bottle_flex::{Catalog, Error, MemoryCatalog, TableCatalog, json};
use common::{MockConnection, detached_db, mock_db, row, users_model};

#[tokio::test]
async fn test_memory_catalog_round_trips_models() -> Result<(), Box<dyn std::error::Error>> {
    let catalog = MemoryCatalog::new();
    let source = detached_db();
    let mut users = users_model();
    users.define_hidden(&["age"]);
    users.define_rollup("orders_total", "orders", &[("user_id", "id")], &["sum(total):total"])?;

    source.save_model(&catalog, &users).await?;
    assert_eq!(catalog.len().await, 1);
    assert!(catalog.get("model", "app.users").await?.is_some());

    let target = detached_db();
    let restored = target.restore_model(&catalog, "app.users").await?;
    assert_eq!(restored.columns, users.columns);
    assert_eq!(restored.hidden, vec!["age"]);
    assert_eq!(restored.rollups, users.rollups);
    assert!(target.model("users").is_ok());

    let missing = target.restore_model(&catalog, "app.ghosts").await;
    assert!(matches!(missing, Err(Error::ModelNotFound(_))));

    assert!(catalog.delete("model", "app.users").await?);
    assert!(!catalog.delete("model", "app.users").await?);

    Ok(())
}

#[tokio::test]
async fn test_table_catalog_statements() -> Result<(), Box<dyn std::error::Error>> {
    let conn = MockConnection::new(|sql| {
        if sql.starts_with("SELECT EXISTS") {
            Ok(vec![row(json!({"exists": false}))])
        } else if sql.starts_with("SELECT A.definition, A.version") {
            Ok(vec![row(json!({"definition": {"schema": "app", "name": "users"}, "version": 1}))])
        } else if sql.starts_with("SELECT") {
            Ok(vec![row(json!({"type": "model", "id": "app.users", "version": 1, "definition": {}}))])
        } else {
            Ok(vec![row(json!({"result": {"type": "model", "id": "app.users"}}))])
        }
    });
    let db = mock_db(&conn);
    let catalog = TableCatalog::attach(&db)?;
    assert!(db.model("core.catalog")?.is_core);

    catalog.set("model", "app.users", 1, json!({"schema": "app", "name": "users"})).await?;
    let definition = catalog.get("model", "app.users").await?;
    assert_eq!(definition, Some(json!({"schema": "app", "name": "users"})));
    assert!(catalog.delete("model", "app.users").await?);

    let statements = conn.statements();
    assert!(statements[0].starts_with("SELECT EXISTS(SELECT 1\nFROM core.catalog AS A\nWHERE A.type = 'model'\nAND A.id = 'app.users')"));
    assert!(statements[1].starts_with(
        "INSERT INTO core.catalog AS A (type, id, version, definition, updated_at)\n\
         VALUES ('model', 'app.users', 1, '{\"schema\":\"app\",\"name\":\"users\"}'::jsonb, '"
    ));
    assert_eq!(
        statements[2],
        "SELECT A.definition, A.version\nFROM core.catalog AS A\nWHERE A.type = 'model'\nAND A.id = 'app.users'\nLIMIT 1;"
    );
    assert_eq!(
        statements.last().map(String::as_str),
        Some("DELETE FROM core.catalog AS A\nWHERE A.type = 'model'\nAND A.id = 'app.users'\nRETURNING to_jsonb(A) AS result;")
    );

    Ok(())
}

#[tokio::test]
async fn test_table_catalog_ddl() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let ddl = db.driver().render_ddl(&TableCatalog::definition()?, true)?;

    assert!(ddl.contains("CREATE TABLE IF NOT EXISTS core.catalog ("));
    assert!(ddl.contains("definition JSONB DEFAULT '{}',"));
    assert!(ddl.contains("CONSTRAINT pk_core_catalog PRIMARY KEY (type, id)"));
    assert!(!ddl.contains("TRIGGER"));

    Ok(())
}
