//! Translation of worker replies into results.

use crate::error::{BridgeError, BridgeResult};
use embridge_engine::{FileStat, QuerySummary, Record, Row};
use embridge_worker::{CursorFlags, Envelope, FailureKind, Handle, Payload};

pub(crate) fn failure(kind: FailureKind, error: String) -> BridgeError {
    match kind {
        FailureKind::NotFound => BridgeError::NotFound(error),
        FailureKind::Engine => BridgeError::Engine(error),
        FailureKind::InvalidParameter => BridgeError::InvalidParameter(error),
        FailureKind::Uninitialized => BridgeError::Initialization(error),
    }
}

/// Success with nothing to return.
pub(crate) fn unit(envelope: Envelope) -> BridgeResult<()> {
    match envelope {
        Envelope::Success { .. } => Ok(()),
        Envelope::Failure { kind, error } => Err(failure(kind, error)),
    }
}

/// The handle minted by a constructing operation.
pub(crate) fn created(envelope: Envelope) -> BridgeResult<Handle> {
    optional_handle(envelope)?
        .ok_or_else(|| BridgeError::Protocol("constructing operation returned no handle".into()))
}

/// Like [`created`], but any failure is a construction failure.
pub(crate) fn constructed(envelope: Envelope) -> BridgeResult<Handle> {
    match envelope {
        Envelope::Failure { error, .. } => Err(BridgeError::Construction(error)),
        success => created(success),
    }
}

/// A handle that may legitimately be absent.
pub(crate) fn optional_handle(envelope: Envelope) -> BridgeResult<Option<Handle>> {
    match envelope {
        Envelope::Success { id, .. } => Ok(id),
        Envelope::Failure { kind, error } => Err(failure(kind, error)),
    }
}

fn payload<T>(
    envelope: Envelope,
    expected: &str,
    extract: impl FnOnce(Payload) -> Option<T>,
) -> BridgeResult<T> {
    match envelope {
        Envelope::Success {
            result: Some(result),
            ..
        } => {
            let shape = format!("{result:?}");
            extract(result).ok_or_else(|| {
                BridgeError::Protocol(format!("expected {expected}, got {shape}"))
            })
        }
        Envelope::Success { result: None, .. } => Err(BridgeError::Protocol(format!(
            "expected {expected}, got nothing"
        ))),
        Envelope::Failure { kind, error } => Err(failure(kind, error)),
    }
}

pub(crate) fn boolean(envelope: Envelope) -> BridgeResult<bool> {
    payload(envelope, "a flag", |p| match p {
        Payload::Bool(b) => Some(b),
        _ => None,
    })
}

pub(crate) fn count(envelope: Envelope) -> BridgeResult<u64> {
    payload(envelope, "a count", |p| match p {
        Payload::Count(n) => Some(n),
        _ => None,
    })
}

pub(crate) fn text(envelope: Envelope) -> BridgeResult<String> {
    payload(envelope, "a string", |p| match p {
        Payload::Text(s) => Some(s),
        _ => None,
    })
}

pub(crate) fn texts(envelope: Envelope) -> BridgeResult<Vec<String>> {
    payload(envelope, "a list of strings", |p| match p {
        Payload::Texts(v) => Some(v),
        _ => None,
    })
}

pub(crate) fn row(envelope: Envelope) -> BridgeResult<Option<Row>> {
    payload(envelope, "a row", |p| match p {
        Payload::Row(r) => Some(r),
        _ => None,
    })
}

pub(crate) fn rows(envelope: Envelope) -> BridgeResult<Vec<Row>> {
    payload(envelope, "rows", |p| match p {
        Payload::Rows(r) => Some(r),
        _ => None,
    })
}

pub(crate) fn records(envelope: Envelope) -> BridgeResult<Vec<Record>> {
    payload(envelope, "records", |p| match p {
        Payload::Records(r) => Some(r),
        _ => None,
    })
}

pub(crate) fn summary(envelope: Envelope) -> BridgeResult<QuerySummary> {
    payload(envelope, "a query summary", |p| match p {
        Payload::Summary(s) => Some(s),
        _ => None,
    })
}

pub(crate) fn flags(envelope: Envelope) -> BridgeResult<CursorFlags> {
    payload(envelope, "cursor flags", |p| match p {
        Payload::Flags(f) => Some(f),
        _ => None,
    })
}

pub(crate) fn stat(envelope: Envelope) -> BridgeResult<FileStat> {
    payload(envelope, "file metadata", |p| match p {
        Payload::Stat(s) => Some(s),
        _ => None,
    })
}

pub(crate) fn entries(envelope: Envelope) -> BridgeResult<Vec<String>> {
    payload(envelope, "directory entries", |p| match p {
        Payload::Entries(e) => Some(e),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_keep_their_message() {
        let reply = Envelope::failure(FailureKind::NotFound, "Connection not found");
        assert_eq!(
            unit(reply),
            Err(BridgeError::NotFound("Connection not found".into()))
        );
        let reply = Envelope::failure(FailureKind::Engine, "Cannot open");
        assert_eq!(
            constructed(reply),
            Err(BridgeError::Construction("Cannot open".into()))
        );
    }

    #[test]
    fn shape_mismatch_is_a_protocol_error() {
        assert!(matches!(
            count(Envelope::value(Payload::Bool(true))),
            Err(BridgeError::Protocol(_))
        ));
        assert!(matches!(text(Envelope::done()), Err(BridgeError::Protocol(_))));
        assert!(matches!(created(Envelope::done()), Err(BridgeError::Protocol(_))));
    }

    #[test]
    fn optional_handles() {
        let handle = Handle::generate();
        assert_eq!(optional_handle(Envelope::created(handle)), Ok(Some(handle)));
        assert_eq!(optional_handle(Envelope::done()), Ok(None));
        assert_eq!(row(Envelope::value(Payload::Row(None))), Ok(None));
    }
}
