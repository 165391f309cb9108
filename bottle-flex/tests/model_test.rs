mod common;

use bottle_flex::{ColumnKind, DataType, Error, Model, Value, json};
use common::{detached_db, users_model};

#[test]
fn test_names_are_snake_cased_and_validated() {
    let mut model = Model::new("App", "UserProfiles", 1);
    assert_eq!(model.table(), "app.user_profiles");

    assert!(matches!(model.define_column("", DataType::Text, Value::Null), Err(Error::NameRequired)));
    assert!(matches!(model.define_column("bad name", DataType::Text, Value::Null), Err(Error::InvalidName(_))));
}

#[test]
fn test_constraint_lists_ignore_undeclared_columns() -> Result<(), Box<dyn std::error::Error>> {
    let mut model = Model::new("app", "items", 1);
    model.define_column("code", DataType::Key, Value::Null)?;

    model.define_primary_keys(&["code", "missing"]);
    model.define_unique(&["missing"]);
    model.define_hidden(&["missing"]);
    model.define_index(&["code", "code"]);

    assert_eq!(model.primary_keys, vec!["code"]);
    assert_eq!(model.required, vec!["code"]);
    assert!(model.unique.is_empty());
    assert!(model.hidden.is_empty());
    assert_eq!(model.indexes, vec!["code"]);

    Ok(())
}

#[test]
fn test_define_model_preset() -> Result<(), Box<dyn std::error::Error>> {
    let mut model = Model::new("app", "projects", 1);
    model.define_project_model()?;

    let names: Vec<&str> = model.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["created_at", "updated_at", "status", "id", "source", "index", "project_id"]);
    assert_eq!(model.primary_keys, vec!["id"]);
    assert_eq!(model.source_field.as_deref(), Some("source"));
    assert_eq!(model.index_field.as_deref(), Some("index"));
    assert!(model.indexes.contains(&"project_id".to_string()));
    assert!(model.indexes.contains(&"source".to_string()));

    Ok(())
}

#[test]
fn test_define_attribute_creates_source() -> Result<(), Box<dyn std::error::Error>> {
    let mut model = Model::new("app", "things", 1);
    model.define_attribute("color", DataType::Text, json!("red"))?;

    assert_eq!(model.source_field.as_deref(), Some("source"));
    let color = model.find_column("color").expect("declared attribute");
    assert_eq!(color.kind, ColumnKind::Attrib);
    assert_eq!(color.default, json!("red"));
    assert_eq!(color.source.as_deref(), Some("source"));

    Ok(())
}

#[test]
fn test_writable_columns() {
    let users = users_model();
    assert!(users.is_writable("name"));
    assert!(users.is_writable("tag"));
    assert!(!users.is_writable("source"));
}

#[test]
fn test_where_by_primary_keys_skips_missing_values() {
    let users = users_model();
    let data = common::row(json!({"id": "u1", "name": "Ann"}));
    let wheres = users.where_by_primary_keys(&data);
    assert_eq!(wheres.len(), 1);
    assert_eq!(wheres.to_json(), json!([{"id": {"eq": "u1"}}]));

    assert!(users.where_by_primary_keys(&common::row(json!({"name": "Ann"}))).is_empty());
}

#[test]
fn test_model_serde_skips_hooks() -> Result<(), Box<dyn std::error::Error>> {
    let users = users_model();
    users.before_insert(|_, _, _| Ok(()));

    let value = serde_json::to_value(&users)?;
    assert_eq!(value["name"], json!("users"));
    assert_eq!(value["source_field"], json!("source"));

    let restored: Model = serde_json::from_value(value)?;
    assert_eq!(restored.table(), "app.users");
    assert_eq!(restored.columns, users.columns);
    assert!(restored.triggers().before_insert.is_empty());

    Ok(())
}

#[test]
fn test_registry_keeps_schemas_apart() -> Result<(), Box<dyn std::error::Error>> {
    let db = detached_db();
    db.register(users_model());

    let mut auth_users = Model::new("auth", "users", 1);
    auth_users.define_column("login", DataType::Key, Value::Null)?;
    db.register(auth_users);

    assert_eq!(db.model("app.users")?.table(), "app.users");
    assert_eq!(db.model("auth.users")?.table(), "auth.users");
    assert!(db.model("app.users")?.find_column("login").is_none());
    assert_eq!(db.models().len(), 2);

    // A bare name only resolves when one schema holds it.
    assert!(matches!(db.model("users"), Err(Error::ModelNotFound(ref name)) if name == "users"));
    assert!(matches!(db.model("crm.users"), Err(Error::ModelNotFound(_))));

    let mut orders = Model::new("app", "orders", 1);
    orders.define_column("id", DataType::Key, Value::Null)?;
    db.register(orders);
    assert_eq!(db.model("orders")?.table(), "app.orders");

    Ok(())
}
