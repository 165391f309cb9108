use bottle_flex::{Condition, Connector, Operator, Wheres, between, eq, in_list, json, more, neg, null};

#[test]
fn test_connector_defaults() {
    let mut wheres = Wheres::new();
    wheres.add(eq("id", "u1").or());
    wheres.add(more("age", 18));
    wheres.or(neg("name", "Bob"));

    let connectors: Vec<Connector> = wheres.iter().map(|c| c.connector).collect();
    assert_eq!(connectors, vec![Connector::None, Connector::And, Connector::Or]);
}

#[test]
fn test_json_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let mut wheres = Wheres::new();
    wheres.add(eq("A.id", "u1"));
    wheres.add(in_list("A.status", ["active", "new"]));
    wheres.or(between("A.age", 18, 30));
    wheres.add(null("A.deleted_at"));

    let encoded = wheres.to_json();
    assert_eq!(
        encoded,
        json!([
            {"A.id": {"eq": "u1"}},
            {"and": {"A.status": {"in": ["active", "new"]}}},
            {"or": {"A.age": {"between": [18, 30]}}},
            {"and": {"A.deleted_at": {"null": null}}}
        ])
    );

    let decoded = Wheres::from_json(&encoded)?;
    assert_eq!(decoded, wheres);

    Ok(())
}

#[test]
fn test_first_key_wins_and_scalar_means_eq() -> Result<(), Box<dyn std::error::Error>> {
    let condition = Condition::from_json(&json!({"name": {"like": "A%", "eq": "x"}, "age": {"more": 1}}))
        .expect("condition");
    assert_eq!(condition.field.key(), "name");
    assert_eq!(condition.operator, Operator::Like);
    assert_eq!(condition.value, json!("A%"));

    let scalar = Condition::from_json(&json!({"id": "u1"})).expect("condition");
    assert_eq!(scalar.operator, Operator::Eq);
    assert_eq!(scalar.value, json!("u1"));

    assert_eq!(Operator::parse("MORE_EQ"), Some(Operator::MoreEq));
    assert!(Operator::parse("gte").is_none());
    assert!(Condition::from_json(&json!({"id": {"approximately": 3}})).is_none());
    assert!(Wheres::from_json(&json!([{"id": {"eq": 1}}, {"or": {"age": {"gte": 5}}}])).is_err());

    Ok(())
}

#[test]
fn test_from_json_accepts_single_object_and_null() -> Result<(), Box<dyn std::error::Error>> {
    assert_eq!(Wheres::from_json(&json!({"id": {"eq": 1}}))?.len(), 1);
    assert!(Wheres::from_json(&json!(null))?.is_empty());
    assert!(Wheres::from_json(&json!("id = 1")).is_err());
    assert!(Wheres::from_json(&json!([{}])).is_err());

    Ok(())
}

#[test]
fn test_unresolved_names_are_reported() {
    let mut wheres = Wheres::new();
    wheres.add(eq("id", 1));
    assert_eq!(wheres.unresolved(), vec!["id".to_string()]);
}
