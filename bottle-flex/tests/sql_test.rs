mod common;

use bottle_flex::{
    Condition, DataType, Error, Model, Operator, QueryKind, Value, eq, in_list, is, json, less_eq, like, more, not_null,
};
use common::{detached_db, orders_model, row, users_model};

// ============================================================================
// DDL
// ============================================================================

#[test]
fn test_ddl_for_flexible_model() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let sql = db.driver().render_ddl(&users_model(), false)?;

    assert_eq!(
        sql,
        "CREATE SCHEMA IF NOT EXISTS app;\n\
         CREATE TABLE IF NOT EXISTS app.users (\n\
         id VARCHAR(80) DEFAULT '',\n\
         name VARCHAR(250) DEFAULT '',\n\
         age BIGINT DEFAULT 0,\n\
         source JSONB DEFAULT '{}',\n\
         CONSTRAINT pk_app_users PRIMARY KEY (id)\n\
         );\n\
         CREATE INDEX IF NOT EXISTS idx_users_source ON app.users USING GIN(source);"
    );

    Ok(())
}

#[test]
fn test_ddl_types_defaults_and_definitions() -> Result<(), Box<dyn std::error::Error>> {
    let mut model = Model::new("app", "samples", 1);
    model.define_column("payload", DataType::Bytes, Value::Null)?;
    model.define_column("ratio", DataType::Float, json!(1.5))?;
    model.define_column("note", DataType::Memo, Value::Null)?;
    model.define_column("seen_at", DataType::DateTime, Value::Null)?;
    model.define_column("active", DataType::Boolean, Value::Null)?;
    model.define_column("shape", DataType::Geometry, Value::Null)?;
    model.define_column("anything", DataType::Any, Value::Null)?;
    model.define_column("serial", DataType::Int, Value::Null)?.definition = Some("BIGSERIAL".to_string());
    model.define_unique(&["serial"]);

    let sql = detached_db().driver().render_ddl(&model, false)?;
    assert!(sql.contains("payload BYTEA DEFAULT '',\n"));
    assert!(sql.contains("ratio DOUBLE PRECISION DEFAULT 1.5,\n"));
    assert!(sql.contains("note TEXT DEFAULT '',\n"));
    assert!(sql.contains("seen_at TIMESTAMP DEFAULT NOW(),\n"));
    assert!(sql.contains("active BOOLEAN DEFAULT FALSE,\n"));
    assert!(sql.contains("shape JSONB DEFAULT '{}',\n"));
    assert!(sql.contains("anything VARCHAR(250),\n"));
    assert!(sql.contains("serial BIGSERIAL\n"));
    assert!(sql.contains("CREATE UNIQUE INDEX IF NOT EXISTS unique_samples_serial ON app.samples(serial);"));
    assert!(!sql.contains("CONSTRAINT"));

    Ok(())
}

#[test]
fn test_ddl_cascading_detail_references_parent() -> Result<(), Box<dyn std::error::Error>> {
    let mut users = users_model();
    let notes = users.define_detail("notes", &[("user_id", "id")], 1)?;
    assert!(notes.foreign_keys.is_empty());

    let items = users.define_detail_cascade("items", &[("user_id", "id")], 1, true, true)?;
    let sql = detached_db().driver().render_ddl(&items, false)?;
    assert_eq!(
        sql,
        "CREATE SCHEMA IF NOT EXISTS app;\n\
         CREATE TABLE IF NOT EXISTS app.users_items (\n\
         user_id VARCHAR(80) DEFAULT '',\n\
         CONSTRAINT fk_users_items_users FOREIGN KEY (user_id) REFERENCES app.users(id) ON DELETE CASCADE ON UPDATE CASCADE\n\
         );"
    );

    Ok(())
}

#[test]
fn test_ddl_change_tracking_trigger() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let mut model = Model::new("app", "projects", 1);
    model.define_model()?;

    let tracked = db.driver().render_ddl(&model, true)?;
    assert!(tracked.contains("CREATE INDEX IF NOT EXISTS idx_projects_index ON app.projects(index);"));
    assert!(tracked.contains("DROP TRIGGER IF EXISTS records_set ON app.projects CASCADE;"));
    assert!(tracked.contains("EXECUTE FUNCTION core.after_records('index');"));

    let untracked = db.driver().render_ddl(&model, false)?;
    assert!(!untracked.contains("TRIGGER"));

    model.is_core = true;
    assert!(!db.driver().render_ddl(&model, true)?.contains("TRIGGER"));

    Ok(())
}

#[test]
fn test_core_schema_and_table_exists() {
    let db = detached_db();
    let core = db.driver().render_core();
    assert!(core.contains("CREATE TABLE IF NOT EXISTS core.records ("));
    assert!(core.contains("CREATE TABLE IF NOT EXISTS core.recyclings ("));
    assert!(core.contains("CREATE OR REPLACE FUNCTION core.after_records()"));
    assert!(core.contains("vnew->>'status' = 'for_delete'"));

    assert_eq!(
        db.driver().render_table_exists(&users_model()),
        "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_schema = 'app' AND table_name = 'users') AS exists;"
    );
}

// ============================================================================
// Mutations
// ============================================================================

#[test]
fn test_insert_routes_unknown_keys_into_source() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let users = db.register(users_model());

    let sql = db.insert(&users, row(json!({"id": "u1", "name": "Ann", "tag": "vip"}))).to_sql()?;
    assert_eq!(
        sql,
        "INSERT INTO app.users AS A (id, name, source)\n\
         VALUES ('u1', 'Ann', '{\"tag\":\"vip\"}'::jsonb)\n\
         RETURNING to_jsonb(A) - 'source' AS result;"
    );

    Ok(())
}

#[test]
fn test_insert_into_locked_model_drops_unknown_keys() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let orders = db.register(orders_model());

    let sql = db.insert(&orders, row(json!({"id": "o1", "total": 9.5, "tag": "x"}))).to_sql()?;
    assert_eq!(sql, "INSERT INTO app.orders AS A (id, total)\nVALUES ('o1', 9.5)\nRETURNING to_jsonb(A) AS result;");

    let empty = db.insert(&orders, row(json!({}))).to_sql()?;
    assert_eq!(empty, "INSERT INTO app.orders AS A DEFAULT VALUES\nRETURNING to_jsonb(A) AS result;");

    Ok(())
}

#[test]
fn test_update_chains_jsonb_set_per_attribute() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let users = db.register(users_model());

    let sql = db
        .update(&users, row(json!({"name": "Bea", "tag": "gold", "level": 2})))
        .filter(eq("id", "u1"))
        .to_sql()?;
    assert_eq!(
        sql,
        "UPDATE app.users AS A SET\n\
         name = 'Bea',\n\
         source = jsonb_set(jsonb_set(COALESCE(A.source, '{}'::jsonb), '{tag}', '\"gold\"'::jsonb, true), '{level}', '2'::jsonb, true)\n\
         WHERE A.id = 'u1'\n\
         RETURNING to_jsonb(A) - 'source' AS result;"
    );

    let nothing = db.update(&users, row(json!({}))).filter(eq("id", "u1")).to_sql();
    assert!(matches!(nothing, Err(Error::DataRequired)));

    Ok(())
}

#[test]
fn test_delete_statement() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let orders = db.register(orders_model());

    let sql = db.delete(&orders).filter(eq("id", "o1")).or(eq("user_id", "u9")).to_sql()?;
    assert_eq!(
        sql,
        "DELETE FROM app.orders AS A\nWHERE A.id = 'o1'\nOR A.user_id = 'u9'\nRETURNING to_jsonb(A) AS result;"
    );

    Ok(())
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_data_mode_select_merges_source() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let users = db.register(users_model());

    let sql = db.from(&users, "A").filter(eq("id", "u1")).to_sql()?;
    assert_eq!(
        sql,
        "SELECT (COALESCE(A.source, '{}'::jsonb) || to_jsonb(A)) - ARRAY['source']::text[] AS result\n\
         FROM app.users AS A\n\
         WHERE A.id = 'u1'\n\
         LIMIT 100;"
    );

    Ok(())
}

#[test]
fn test_hidden_columns_are_removed() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let mut users = users_model();
    users.define_hidden(&["age"]);
    let users = db.register(users);

    let sql = db.from(&users, "A").to_sql()?;
    assert!(sql.starts_with("SELECT (COALESCE(A.source, '{}'::jsonb) || to_jsonb(A)) - ARRAY['source', 'age']::text[] AS result"));

    let shown = db.from(&users, "A").show_hidden().to_sql()?;
    assert!(shown.starts_with("SELECT (COALESCE(A.source, '{}'::jsonb) || to_jsonb(A)) - ARRAY['source']::text[] AS result"));

    let mut orders = orders_model();
    orders.define_hidden(&["total"]);
    let orders = db.register(orders);
    let sql = db.from(&orders, "A").to_sql()?;
    assert!(sql.starts_with("SELECT A.id, A.user_id\nFROM app.orders AS A"));

    let prepared = db.from(&orders, "A").select(&["id", "total"]).prepared().to_sql()?;
    assert!(prepared.starts_with("SELECT A.id\nFROM"));

    Ok(())
}

#[test]
fn test_hidden_fields_match_by_alias() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let users = db.register(users_model());
    let orders = db.register(orders_model());

    let renamed = db.from(&users, "A").select(&["A.name:display", "A.id"]).hidden(&["A.name"]).prepared().to_sql()?;
    assert!(renamed.starts_with("SELECT jsonb_build_object('display', A.name, 'id', A.id) AS result\n"));

    let by_alias = db.from(&users, "A").select(&["A.name:display", "A.id"]).hidden(&["A.name:display"]).prepared().to_sql()?;
    assert!(by_alias.starts_with("SELECT jsonb_build_object('id', A.id) AS result\n"));

    let plain = db.from(&orders, "A").select(&["A.total:amount", "A.id"]).hidden(&["A.total"]).prepared().to_sql()?;
    assert!(plain.starts_with("SELECT A.total AS amount, A.id\nFROM"));

    Ok(())
}

#[test]
fn test_data_mode_explicit_select_packs_attributes() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let users = db.register(users_model());

    let sql = db.from(&users, "A").select(&["name", "tag:label"]).to_sql()?;
    assert!(sql.starts_with(
        "SELECT jsonb_build_object('label', A.source->'tag') || jsonb_build_object('name', A.name) AS result\n"
    ));

    let star = db.from(&users, "A").select(&["*"]).to_sql()?;
    assert!(star.starts_with("SELECT jsonb_build_object('id', A.id, 'name', A.name, 'age', A.age) AS result\n"));

    Ok(())
}

#[test]
fn test_grouping_having_and_pagination() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let orders = db.register(orders_model());

    let sql = db
        .from(&orders, "A")
        .select(&["A.user_id", "sum(A.total):total", "count(*)"])
        .group_by(&["A.user_id"])
        .having(more("count(*)", 1))
        .order_by_desc(&["A.user_id"])
        .page(2)
        .rows(10)
        .to_sql()?;
    assert_eq!(
        sql,
        "SELECT A.user_id, SUM(A.total) AS total, COUNT(*) AS count\n\
         FROM app.orders AS A\n\
         GROUP BY A.user_id\n\
         HAVING COUNT(*) > 1\n\
         ORDER BY A.user_id DESC\n\
         LIMIT 10 OFFSET 10;"
    );

    Ok(())
}

#[test]
fn test_limit_is_clamped_and_page_zero_has_no_offset() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let orders = db.register(orders_model());

    assert!(db.from(&orders, "A").rows(1000).to_sql()?.ends_with("\nLIMIT 100;"));
    assert!(db.from(&orders, "A").rows(0).to_sql()?.ends_with("\nLIMIT 1;"));
    assert!(db.from(&orders, "A").page(0).rows(20).to_sql()?.ends_with("\nLIMIT 20;"));
    assert!(db.from(&orders, "A").page(1).rows(20).to_sql()?.ends_with("\nLIMIT 20 OFFSET 0;"));
    assert!(db.from(&orders, "A").page(3).rows(20).to_sql()?.ends_with("\nLIMIT 20 OFFSET 40;"));

    Ok(())
}

#[test]
fn test_joins_and_count_exists() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let users = db.register(users_model());
    let orders = db.register(orders_model());

    let sql = db.from(&users, "A").left_join(&orders, "B", &[("user_id", "id")]).select(&["A.name", "B.total"]).to_sql()?;
    assert_eq!(
        sql,
        "SELECT jsonb_build_object('name', A.name, 'total', B.total) AS result\n\
         FROM app.users AS A\n\
         LEFT JOIN app.orders AS B ON B.user_id = A.id\n\
         LIMIT 100;"
    );

    let count = db.from(&orders, "A").filter(more("total", 10)).kind(QueryKind::Count).to_sql()?;
    assert_eq!(count, "SELECT COUNT(*) AS count\nFROM app.orders AS A\nWHERE A.total > 10;");

    let exists = db.from(&orders, "A").filter(eq("id", "o1")).kind(QueryKind::Exists).to_sql()?;
    assert_eq!(exists, "SELECT EXISTS(SELECT 1\nFROM app.orders AS A\nWHERE A.id = 'o1') AS exists;");

    Ok(())
}

// ============================================================================
// Conditions
// ============================================================================

fn where_clause(db: &bottle_flex::Database, model: &std::sync::Arc<Model>, condition: Condition) -> Result<String, Error> {
    let sql = db.from(model, "A").filter(condition).to_sql()?;
    let start = sql.find("WHERE ").map(|i| i + 6).unwrap_or(0);
    let end = sql.find("\nLIMIT").unwrap_or(sql.len());
    Ok(sql[start..end].to_string())
}

#[test]
fn test_condition_rendering() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let users = db.register(users_model());

    assert_eq!(where_clause(&db, &users, eq("name", "O'Brien"))?, "A.name = 'O''Brien'");
    assert_eq!(where_clause(&db, &users, eq("name", Value::Null))?, "A.name IS NULL");
    assert_eq!(where_clause(&db, &users, bottle_flex::neg("name", Value::Null))?, "A.name IS NOT NULL");
    assert_eq!(where_clause(&db, &users, less_eq("age", 30))?, "A.age <= 30");
    assert_eq!(where_clause(&db, &users, in_list("id", ["a", "b"]))?, "A.id IN ('a', 'b')");
    assert_eq!(where_clause(&db, &users, in_list("id", Vec::<String>::new()))?, "A.id IN (NULL)");
    assert_eq!(where_clause(&db, &users, bottle_flex::between("age", 18, 30))?, "A.age BETWEEN 18 AND 30");
    assert_eq!(where_clause(&db, &users, not_null("name"))?, "A.name IS NOT NULL");

    assert_eq!(where_clause(&db, &users, eq("tag", "vip"))?, "A.source->'tag' = '\"vip\"'::jsonb");
    assert_eq!(where_clause(&db, &users, like("tag", "v%"))?, "A.source->>'tag' LIKE 'v%'");
    assert_eq!(where_clause(&db, &users, is("verified", true))?, "(A.source->>'verified')::boolean IS TRUE");

    Ok(())
}

#[test]
fn test_invalid_conditions_fail_to_render() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let users = db.register(users_model());
    let orders = db.register(orders_model());

    let malformed = where_clause(&db, &users, Condition::new("age", Operator::Between, 5));
    assert!(matches!(malformed, Err(Error::InvalidCondition(_))));

    let not_bool = where_clause(&db, &users, is("age", 3));
    assert!(matches!(not_bool, Err(Error::InvalidCondition(_))));

    let unresolved = db.from(&orders, "A").filter(eq("missing", 1)).to_sql();
    match unresolved {
        Err(Error::UnresolvedField(name)) => assert_eq!(name, "missing"),
        other => panic!("expected an unresolved field, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_bytes_are_hex_escaped() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    let mut files = Model::new("app", "files", 1);
    files.define_column("id", DataType::Key, Value::Null)?;
    files.define_column("payload", DataType::Bytes, Value::Null)?;
    let files = db.register(files);

    let sql = db.insert(&files, row(json!({"id": "f1", "payload": [1, 171]}))).to_sql()?;
    assert!(sql.contains("VALUES ('f1', '\\x01ab')"));

    assert_eq!(where_clause(&db, &files, eq("payload", "ab"))?, "A.payload = '\\x6162'");

    Ok(())
}
