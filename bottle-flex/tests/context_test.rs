mod common;

use std::sync::Arc;

use bottle_flex::{Context, DatabaseBuilder, Error, PostgresDriver};
use common::{MockConnection, detached_db};

#[tokio::test]
async fn test_databases_are_looked_up_by_name() -> Result<(), Box<dyn std::error::Error>> {
    let context = Context::init();
    assert_eq!(context.drivers().names(), vec!["postgres".to_string()]);

    let conn = MockConnection::empty();
    let reports = DatabaseBuilder::new().name("reports").with_connection(Arc::new(conn), Arc::new(PostgresDriver::new()));
    context.attach(reports).await;
    context.attach(detached_db()).await;

    let mut names = context.names().await;
    names.sort();
    assert_eq!(names, vec!["default".to_string(), "reports".to_string()]);
    assert_eq!(context.database("reports").await?.name(), "reports");

    let missing = context.database("archive").await;
    assert!(matches!(missing, Err(Error::DatabaseNotFound(ref name)) if name == "archive"));

    // An attached name is reused instead of reconnecting.
    let existing = context.connect("reports", DatabaseBuilder::new().driver("nope")).await?;
    assert!(existing.connection().is_ok());

    context.shutdown().await;
    assert!(context.names().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_unknown_driver_is_rejected() {
    let context = Context::default();
    let result = context.connect("main", DatabaseBuilder::new()).await;
    assert!(matches!(result, Err(Error::DriverNotFound(ref name)) if name == "postgres"));
}
