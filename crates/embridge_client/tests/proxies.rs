//! End-to-end tests of the proxies against the in-memory engine.

use embridge_client::{
    BridgeError, Connection, Database, DatabaseConfig, Dispatcher, ObjectKind, Value,
};
use embridge_testkit::{init_tracing, CountingFactory, FailingFactory, MemoryEngineFactory};
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn dispatcher() -> Dispatcher {
    init_tracing();
    Dispatcher::new(Arc::new(MemoryEngineFactory::new()))
}

async fn table_with_rows(conn: &Connection, ids: &[i64]) {
    conn.query("CREATE NODE TABLE t(id INT64, PRIMARY KEY(id))")
        .await
        .unwrap()
        .close()
        .await
        .unwrap();
    for id in ids {
        let result = conn
            .query(&format!("CREATE (:t {{id: {id}}})"))
            .await
            .unwrap();
        result.close().await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_use_starts_one_worker() {
    init_tracing();
    let factory = Arc::new(CountingFactory::new().with_delay(Duration::from_millis(50)));
    let dispatcher = Dispatcher::new(factory.clone());

    let workers = join_all((0..8).map(|_| dispatcher.worker())).await;
    let first = workers[0].as_ref().unwrap();
    for worker in &workers {
        assert!(Arc::ptr_eq(first, worker.as_ref().unwrap()));
    }
    assert_eq!(factory.loads(), 1);
    dispatcher.close().await;
}

#[tokio::test]
async fn concurrent_first_use_shares_a_failure() {
    init_tracing();
    let factory = Arc::new(FailingFactory::new(1));
    let dispatcher = Dispatcher::new(factory.clone());

    let outcomes = join_all((0..4).map(|_| dispatcher.init())).await;
    for outcome in outcomes {
        assert_eq!(
            outcome,
            Err(BridgeError::Initialization("Failed to load engine module".into()))
        );
    }
    assert_eq!(factory.attempts(), 1);

    dispatcher.init().await.unwrap();
    assert_eq!(factory.attempts(), 2);
    dispatcher.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_queries_open_each_object_once() {
    init_tracing();
    let factory = Arc::new(MemoryEngineFactory::new());
    let dispatcher = Dispatcher::new(factory.clone());
    let db = Database::in_memory(&dispatcher);
    let conn = Connection::new(&db);

    let queries = (0..8).map(|_| async {
        let result = conn.query("RETURN 1").await?;
        result.close().await
    });
    for outcome in join_all(queries).await {
        outcome.unwrap();
    }
    assert_eq!(factory.databases_opened(), 1);
    assert_eq!(factory.connections_opened(), 1);

    let inits = join_all((0..8).map(|_| db.init())).await;
    assert!(inits.iter().all(Result::is_ok));
    assert_eq!(factory.databases_opened(), 1);

    db.close().await.unwrap();
    dispatcher.close().await;
}

#[tokio::test]
async fn create_insert_match() {
    let dispatcher = dispatcher();
    let db = Database::new(&dispatcher, DatabaseConfig::in_memory());
    let conn = Connection::new(&db);
    table_with_rows(&conn, &[1]).await;

    let result = conn.query("MATCH (n:t) RETURN n.id").await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.column_names().await.unwrap(), vec!["n.id"]);
    assert_eq!(result.column_types().await.unwrap(), vec!["INT64"]);
    assert_eq!(result.num_tuples().await.unwrap(), 1);
    assert_eq!(result.num_columns().await.unwrap(), 1);

    let objects = result.get_all_objects().await.unwrap();
    let objects: Vec<_> = objects.iter().map(|r| r.to_json()).collect();
    assert_eq!(objects, vec![json!({ "n.id": 1 })]);

    result.close().await.unwrap();
    conn.close().await.unwrap();
    db.close().await.unwrap();
    dispatcher.close().await;
}

#[tokio::test]
async fn cursor_flags_track_iteration() {
    let dispatcher = dispatcher();
    let db = Database::in_memory(&dispatcher);
    let conn = Connection::new(&db);
    table_with_rows(&conn, &[3, 1, 2]).await;

    let result = conn
        .query("MATCH (n:t) RETURN n.id ORDER BY n.id")
        .await
        .unwrap();
    assert!(result.has_next());
    assert!(!result.has_next_query_result());

    let mut seen = Vec::new();
    while result.has_next() {
        let row = result.get_next().await.unwrap().unwrap();
        seen.push(row[0].clone());
    }
    assert_eq!(seen, vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]);
    assert_eq!(result.get_next().await.unwrap(), None);

    result.reset_iterator().await.unwrap();
    assert!(result.has_next());
    assert_eq!(result.get_all_rows().await.unwrap().len(), 3);
    assert!(!result.has_next());

    db.close().await.unwrap();
    dispatcher.close().await;
}

#[tokio::test]
async fn statement_chains() {
    let dispatcher = dispatcher();
    let db = Database::in_memory(&dispatcher);
    let conn = Connection::new(&db);

    let first = conn.query("RETURN 1; RETURN 2").await.unwrap();
    assert!(first.has_next_query_result());
    let second = first.next_query_result().await.unwrap().unwrap();
    assert!(!second.has_next_query_result());
    assert_eq!(
        second.get_all_rows().await.unwrap(),
        vec![vec![Value::Int64(2)]]
    );
    assert!(second.next_query_result().await.unwrap().is_none());

    let summary = first.query_summary().await.unwrap();
    assert!(summary.compiling_time_ms >= 0.0);

    db.close().await.unwrap();
    dispatcher.close().await;
}

#[tokio::test]
async fn engine_errors_are_relayed_verbatim() {
    let dispatcher = dispatcher();
    let db = Database::in_memory(&dispatcher);
    let conn = Connection::new(&db);

    let err = conn.prepare("MATCH (a:dog) RETURN a").await.unwrap_err();
    assert_eq!(
        err,
        BridgeError::Engine("Binder exception: Table dog does not exist.".into())
    );

    let err = conn.query("MATCH (a:dog) RETURN a").await.unwrap_err();
    assert!(err.to_string().contains("dog"), "{err}");

    // the connection is still usable
    let result = conn.query("RETURN 1").await.unwrap();
    assert!(result.is_success());

    db.close().await.unwrap();
    dispatcher.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn five_connections_query_concurrently() {
    let dispatcher = dispatcher();
    let db = Database::in_memory(&dispatcher);
    let conns: Vec<_> = (0..5).map(|_| Connection::new(&db)).collect();

    let queries = conns.iter().enumerate().map(|(i, conn)| async move {
        let result = conn.query(&format!("RETURN {i}")).await?;
        let rows = result.get_all_rows().await?;
        result.close().await?;
        Ok::<_, BridgeError>(rows)
    });
    let outcomes = join_all(queries).await;
    for (i, rows) in outcomes.into_iter().enumerate() {
        assert_eq!(rows.unwrap(), vec![vec![Value::Int64(i as i64)]]);
    }

    db.close().await.unwrap();
    dispatcher.close().await;
}

#[tokio::test]
async fn prepared_statements_and_parameters() {
    let dispatcher = dispatcher();
    let db = Database::in_memory(&dispatcher);
    let conn = Connection::new(&db);
    conn.query("CREATE NODE TABLE person(id INT64, name STRING, PRIMARY KEY(id))")
        .await
        .unwrap();

    let insert = conn
        .prepare("CREATE (:person {id: $id, name: $name})")
        .await
        .unwrap();
    assert!(insert.is_success());
    assert_eq!(insert.error_message(), "");
    for (id, name) in [(1, "Alice"), (2, "Bob")] {
        conn.execute(&insert, json!({ "id": id, "name": name }))
            .await
            .unwrap();
    }

    let lookup = conn
        .prepare("MATCH (p:person) WHERE p.id = $id RETURN p.name")
        .await
        .unwrap();
    let result = conn.execute(&lookup, json!({ "id": 2 })).await.unwrap();
    assert_eq!(
        result.get_all_rows().await.unwrap(),
        vec![vec![Value::String("Bob".into())]]
    );

    let err = conn.execute(&lookup, json!([2])).await.unwrap_err();
    assert_eq!(
        err,
        BridgeError::InvalidArgument(
            "Parameters must be a map of parameter names to values".into()
        )
    );

    let echo = conn.prepare("RETURN $xs").await.unwrap();
    let err = conn
        .execute(&echo, json!({ "xs": [1, "two"] }))
        .await
        .unwrap_err();
    match err {
        BridgeError::InvalidParameter(message) => {
            assert!(message.contains("'xs'"), "{message}")
        }
        other => panic!("unexpected error {other:?}"),
    }

    insert.close().await.unwrap();
    assert_eq!(
        conn.execute(&insert, json!({ "id": 3, "name": "Eve" }))
            .await
            .unwrap_err(),
        BridgeError::closed(ObjectKind::PreparedStatement)
    );

    db.close().await.unwrap();
    dispatcher.close().await;
}

#[tokio::test]
async fn close_is_idempotent_everywhere() {
    let dispatcher = dispatcher();
    let db = Database::in_memory(&dispatcher);
    let conn = Connection::new(&db);
    let statement = conn.prepare("RETURN 1").await.unwrap();
    let result = conn.query("RETURN 1").await.unwrap();

    for _ in 0..2 {
        result.close().await.unwrap();
        statement.close().await.unwrap();
        conn.close().await.unwrap();
        db.close().await.unwrap();
    }
    assert!(result.is_closed() && statement.is_closed());
    assert!(conn.is_closed() && db.is_closed());

    assert_eq!(
        result.get_next().await.unwrap_err(),
        BridgeError::closed(ObjectKind::QueryResult)
    );
    assert_eq!(
        conn.query("RETURN 1").await.unwrap_err().to_string(),
        "Connection is closed"
    );
    assert_eq!(
        db.init().await.unwrap_err(),
        BridgeError::closed(ObjectKind::Database)
    );
    dispatcher.close().await;
}

#[tokio::test]
async fn closing_a_database_cascades() {
    let dispatcher = dispatcher();
    let db = Database::in_memory(&dispatcher);
    let conn = Connection::new(&db);
    let result = conn.query("RETURN 1").await.unwrap();

    db.close().await.unwrap();
    assert_eq!(
        conn.query("RETURN 1").await.unwrap_err(),
        BridgeError::NotFound("Connection not found".into())
    );
    assert_eq!(
        result.render().await.unwrap_err(),
        BridgeError::NotFound("Query result not found".into())
    );

    // the proxies still own their handles; closing them is harmless
    result.close().await.unwrap();
    conn.close().await.unwrap();
    dispatcher.close().await;
}

#[tokio::test]
async fn failed_construction_closes_the_proxy() {
    let dispatcher = dispatcher();
    let db = Database::new(&dispatcher, DatabaseConfig::in_memory().read_only(true));

    let outcomes = join_all((0..3).map(|_| db.init())).await;
    for outcome in outcomes {
        assert_eq!(
            outcome,
            Err(BridgeError::Construction(
                "Cannot open an in-memory database under READ ONLY mode.".into()
            ))
        );
    }
    assert!(db.is_closed());
    assert_eq!(
        db.init().await,
        Err(BridgeError::closed(ObjectKind::Database))
    );

    let conn = Connection::new(&db);
    assert_eq!(
        conn.query("RETURN 1").await.unwrap_err(),
        BridgeError::closed(ObjectKind::Database)
    );
    assert!(conn.is_closed());
    dispatcher.close().await;
}

#[tokio::test]
async fn close_during_initialization_waits_for_it() {
    init_tracing();
    let factory = Arc::new(CountingFactory::new().with_delay(Duration::from_millis(30)));
    let dispatcher = Dispatcher::new(factory);
    let db = Database::in_memory(&dispatcher);

    let (opened, closed) = tokio::join!(db.init(), db.close());
    assert_eq!(opened, Ok(()));
    assert_eq!(closed, Ok(()));
    assert!(db.is_closed());
    assert!(dispatcher.worker().await.unwrap().is_alive());
    dispatcher.close().await;
}

#[tokio::test]
async fn close_without_worker_is_local() {
    let dispatcher = dispatcher();
    let unused = Database::in_memory(&dispatcher);
    unused.close().await.unwrap();
    assert!(!dispatcher.is_running());

    let db = Database::in_memory(&dispatcher);
    db.init().await.unwrap();
    dispatcher.close().await;
    db.close().await.unwrap();
    assert!(!dispatcher.is_running());
}

#[tokio::test]
async fn connection_settings() {
    let dispatcher = dispatcher();
    let db = Database::in_memory(&dispatcher);

    let conn = Connection::with_num_threads(&db, 3);
    assert_eq!(conn.max_num_thread_for_exec().await.unwrap(), 3);
    conn.set_max_num_thread_for_exec(2).await.unwrap();
    assert_eq!(conn.max_num_thread_for_exec().await.unwrap(), 2);
    assert_eq!(
        conn.set_max_num_thread_for_exec(0).await,
        Err(BridgeError::Engine(
            "Number of threads must be greater than 0.".into()
        ))
    );
    conn.set_query_timeout(1_000).await.unwrap();

    let other = Connection::new(&db);
    assert_eq!(
        other.max_num_thread_for_exec().await.unwrap(),
        embridge_testkit::DEFAULT_MAX_NUM_THREADS
    );
    assert!(std::ptr::eq(other.database().config(), db.config()));

    db.close().await.unwrap();
    dispatcher.close().await;
}

#[tokio::test]
async fn versions() {
    let dispatcher = dispatcher();
    assert!(!dispatcher.version().await.unwrap().is_empty());
    assert_eq!(
        dispatcher.storage_version().await.unwrap(),
        embridge_testkit::STORAGE_VERSION
    );
    dispatcher.close().await;
}
