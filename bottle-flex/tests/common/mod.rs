#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bottle_flex::{Connection, DataType, Database, DatabaseBuilder, Model, PostgresDriver, Row, Session, Value};
use futures::future::BoxFuture;

pub type Responder = Arc<dyn Fn(&str) -> Result<Vec<Row>, sqlx::Error> + Send + Sync>;

/// A connection that records every statement and answers from a closure.
#[derive(Clone)]
pub struct MockConnection {
    pub log: Arc<Mutex<Vec<String>>>,
    responder: Responder,
}

impl MockConnection {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<Row>, sqlx::Error> + Send + Sync + 'static,
    {
        Self { log: Arc::new(Mutex::new(Vec::new())), responder: Arc::new(responder) }
    }

    /// Every statement answers with no rows.
    pub fn empty() -> Self {
        Self::new(|_| Ok(Vec::new()))
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn answer(&self, sql: &str) -> Result<Vec<Row>, sqlx::Error> {
        self.log.lock().unwrap().push(sql.to_string());
        (self.responder)(sql)
    }
}

impl Connection for MockConnection {
    fn fetch_all<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<Row>, sqlx::Error>> {
        Box::pin(async move { self.answer(sql) })
    }

    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn Session>, sqlx::Error>> {
        Box::pin(async move {
            self.log.lock().unwrap().push("BEGIN".to_string());
            Ok(Box::new(MockSession { conn: self.clone() }) as Box<dyn Session>)
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

pub struct MockSession {
    conn: MockConnection,
}

impl Session for MockSession {
    fn fetch_all<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<Vec<Row>, sqlx::Error>> {
        Box::pin(async move { self.conn.answer(sql) })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), sqlx::Error>> {
        Box::pin(async move {
            self.conn.log.lock().unwrap().push("COMMIT".to_string());
            Ok(())
        })
    }

    fn rollback(self: Box<Self>) -> BoxFuture<'static, Result<(), sqlx::Error>> {
        Box::pin(async move {
            self.conn.log.lock().unwrap().push("ROLLBACK".to_string());
            Ok(())
        })
    }
}

/// A database over `conn` using the Postgres renderer.
pub fn mock_db(conn: &MockConnection) -> Database {
    let _ = env_logger::builder().is_test(true).try_init();
    DatabaseBuilder::new().with_connection(Arc::new(conn.clone()), Arc::new(PostgresDriver::new()))
}

/// A database that renders SQL but has no connection.
pub fn detached_db() -> Database {
    let _ = env_logger::builder().is_test(true).try_init();
    DatabaseBuilder::new().detached(Arc::new(PostgresDriver::new()))
}

/// `app.users`: `id` key primary key, `name` text, `age` int, `source` overlay, unlocked.
pub fn users_model() -> Model {
    let mut users = Model::new("app", "users", 1);
    users.define_column("id", DataType::Key, Value::Null).unwrap();
    users.define_column("name", DataType::Text, Value::Null).unwrap();
    users.define_column("age", DataType::Int, Value::Null).unwrap();
    users.define_source_field("source").unwrap();
    users.define_primary_keys(&["id"]);
    users
}

/// `app.orders`: `id` primary key, `user_id` key, `total` float, no overlay.
pub fn orders_model() -> Model {
    let mut orders = Model::new("app", "orders", 1);
    orders.define_column("id", DataType::Key, Value::Null).unwrap();
    orders.define_column("user_id", DataType::Key, Value::Null).unwrap();
    orders.define_column("total", DataType::Float, Value::Null).unwrap();
    orders.define_primary_keys(&["id"]);
    orders
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}
