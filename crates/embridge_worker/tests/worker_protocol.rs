//! Integration tests for the worker thread and its endpoint.

use embridge_engine::{DatabaseConfig, Value};
use embridge_testkit::{init_tracing, MemoryEngineFactory};
use embridge_worker::{
    CursorFlags, Envelope, FailureKind, Handle, Payload, Request, Response, Transfer,
    WorkerHandle, WorkerOptions,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

async fn started() -> WorkerHandle {
    init_tracing();
    let worker = WorkerHandle::spawn(
        Arc::new(MemoryEngineFactory::new()),
        WorkerOptions::default(),
    )
    .unwrap();
    assert!(envelope(worker.call(Request::Init).await.unwrap()).is_success());
    worker
}

fn envelope(response: Response) -> Envelope {
    match response {
        Response::Envelope(envelope) => envelope,
        other => panic!("expected envelope, got {other:?}"),
    }
}

async fn create(worker: &WorkerHandle, request: Request) -> Handle {
    match envelope(worker.call(request).await.unwrap()) {
        Envelope::Success { id: Some(id), .. } => id,
        other => panic!("expected a new handle, got {other:?}"),
    }
}

async fn value(worker: &WorkerHandle, request: Request) -> Payload {
    match envelope(worker.call(request).await.unwrap()) {
        Envelope::Success {
            result: Some(payload),
            ..
        } => payload,
        other => panic!("expected a value, got {other:?}"),
    }
}

async fn failure(worker: &WorkerHandle, request: Request) -> (FailureKind, String) {
    match envelope(worker.call(request).await.unwrap()) {
        Envelope::Failure { kind, error } => (kind, error),
        other => panic!("expected a failure, got {other:?}"),
    }
}

async fn open(worker: &WorkerHandle) -> (Handle, Handle) {
    let database = create(
        worker,
        Request::DatabaseConstruct {
            config: DatabaseConfig::in_memory(),
        },
    )
    .await;
    let connection = create(
        worker,
        Request::ConnectionConstruct {
            database,
            num_threads: None,
        },
    )
    .await;
    (database, connection)
}

#[tokio::test]
async fn database_close_cascades_to_dependents() {
    let worker = started().await;
    let (database, connection) = open(&worker).await;
    let result = create(
        &worker,
        Request::ConnectionQuery {
            id: connection,
            statement: "RETURN 1".into(),
        },
    )
    .await;

    let closed = worker.call(Request::DatabaseClose { id: database }).await;
    assert_eq!(envelope(closed.unwrap()), Envelope::done());

    let (kind, error) = failure(
        &worker,
        Request::ConnectionQuery {
            id: connection,
            statement: "RETURN 1".into(),
        },
    )
    .await;
    assert_eq!(kind, FailureKind::NotFound);
    assert_eq!(error, "Connection not found");

    let (_, error) = failure(&worker, Request::QueryResultHasNext { id: result }).await;
    assert_eq!(error, "Query result not found");

    worker.terminate().await;
}

#[tokio::test]
async fn close_is_silent_for_absent_handles() {
    let worker = started().await;
    let (database, _) = open(&worker).await;
    for _ in 0..2 {
        let reply = worker.call(Request::DatabaseClose { id: database }).await;
        assert_eq!(envelope(reply.unwrap()), Envelope::done());
    }
    let reply = worker
        .call(Request::QueryResultClose {
            id: Handle::generate(),
        })
        .await;
    assert_eq!(envelope(reply.unwrap()), Envelope::done());
    worker.terminate().await;
}

#[tokio::test]
async fn handle_of_another_kind_is_not_found() {
    let worker = started().await;
    let (database, connection) = open(&worker).await;

    let (kind, error) = failure(&worker, Request::QueryResultGetNumTuples { id: connection }).await;
    assert_eq!(kind, FailureKind::NotFound);
    assert_eq!(error, "Query result not found");

    // a close of the wrong kind leaves the object alive
    let reply = worker.call(Request::ConnectionClose { id: database }).await;
    assert_eq!(envelope(reply.unwrap()), Envelope::done());
    let threads = value(
        &worker,
        Request::ConnectionGetMaxNumThreadForExec { id: connection },
    )
    .await;
    assert!(matches!(threads, Payload::Count(n) if n > 0));

    worker.terminate().await;
}

#[tokio::test]
async fn handles_are_unique() {
    let worker = started().await;
    let (_, connection) = open(&worker).await;
    let mut seen = HashSet::new();
    for _ in 0..200 {
        let handle = create(
            &worker,
            Request::ConnectionQuery {
                id: connection,
                statement: "RETURN 1".into(),
            },
        )
        .await;
        assert!(seen.insert(handle));
    }
    worker.terminate().await;
}

#[tokio::test]
async fn statement_chain_and_cursor_flags() {
    let worker = started().await;
    let (_, connection) = open(&worker).await;
    let first = create(
        &worker,
        Request::ConnectionQuery {
            id: connection,
            statement: "RETURN 1; RETURN 2".into(),
        },
    )
    .await;

    let flags = value(&worker, Request::QueryResultSyncValues { id: first }).await;
    assert_eq!(
        flags,
        Payload::Flags(CursorFlags {
            has_next: true,
            has_next_query_result: true,
            is_success: true,
        })
    );

    let second = create(&worker, Request::QueryResultGetNextQueryResult { id: first }).await;
    let row = value(&worker, Request::QueryResultGetNext { id: second }).await;
    assert_eq!(row, Payload::Row(Some(vec![Value::Int64(2)])));
    let row = value(&worker, Request::QueryResultGetNext { id: second }).await;
    assert_eq!(row, Payload::Row(None));

    let reply = worker
        .call(Request::QueryResultGetNextQueryResult { id: second })
        .await;
    assert_eq!(envelope(reply.unwrap()), Envelope::done());

    // both results hang off the connection
    let reply = worker.call(Request::ConnectionClose { id: connection }).await;
    assert_eq!(envelope(reply.unwrap()), Envelope::done());
    let (_, error) = failure(&worker, Request::QueryResultHasNext { id: second }).await;
    assert_eq!(error, "Query result not found");

    worker.terminate().await;
}

#[tokio::test]
async fn execute_rejects_mixed_lists_before_the_engine() {
    let worker = started().await;
    let (_, connection) = open(&worker).await;
    let statement = create(
        &worker,
        Request::ConnectionPrepare {
            id: connection,
            statement: "RETURN $xs".into(),
        },
    )
    .await;

    let params = json!({ "xs": [1, "two"] });
    let (kind, error) = failure(
        &worker,
        Request::ConnectionExecute {
            id: connection,
            statement,
            params: params.as_object().cloned().unwrap(),
        },
    )
    .await;
    assert_eq!(kind, FailureKind::InvalidParameter);
    assert!(error.starts_with("Unsupported parameter 'xs'"), "{error}");

    let params = json!({ "xs": [1, 2] });
    let result = create(
        &worker,
        Request::ConnectionExecute {
            id: connection,
            statement,
            params: params.as_object().cloned().unwrap(),
        },
    )
    .await;
    let rows = value(&worker, Request::QueryResultGetAllRows { id: result }).await;
    assert_eq!(
        rows,
        Payload::Rows(vec![vec![Value::List(vec![
            Value::Int64(1),
            Value::Int64(2)
        ])]])
    );

    worker.terminate().await;
}

#[tokio::test]
async fn file_reads_use_the_transfer_path() {
    let worker = started().await;

    let reply = worker
        .call(Request::FsReadFile {
            path: "/missing.csv".into(),
        })
        .await
        .unwrap();
    match reply {
        Response::Transfer(Transfer::Fail { error }) => {
            assert_eq!(error, "ENOENT: no such file or directory, '/missing.csv'")
        }
        other => panic!("expected a failed transfer, got {other:?}"),
    }

    let reply = worker
        .call(Request::FsWriteFile {
            path: "/people.csv".into(),
            data: bytes::Bytes::from_static(b"1,Alice\n"),
        })
        .await;
    assert_eq!(envelope(reply.unwrap()), Envelope::done());

    let reply = worker
        .call(Request::FsReadFile {
            path: "/people.csv".into(),
        })
        .await
        .unwrap();
    assert_eq!(
        reply,
        Response::Transfer(Transfer::Buffer(bytes::Bytes::from_static(b"1,Alice\n")))
    );

    worker.terminate().await;
}

#[tokio::test]
async fn engine_failures_keep_the_worker_serving() {
    let worker = started().await;
    let (kind, error) = failure(
        &worker,
        Request::DatabaseConstruct {
            config: DatabaseConfig::in_memory().read_only(true),
        },
    )
    .await;
    assert_eq!(kind, FailureKind::Engine);
    assert_eq!(
        error,
        "Cannot open an in-memory database under READ ONLY mode."
    );

    let version = value(&worker, Request::GetStorageVersion).await;
    assert_eq!(version, Payload::Count(embridge_testkit::STORAGE_VERSION));
    worker.terminate().await;
}
