//! For some reason, the mongodb crate doesn't provide error code constants.
//! This module fills in the gaps.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR};

pub const DUPLICATE_KEY: i32 = 11000;
pub const WRITE_CONFLICT: i32 = 112;

/// Extract the server error code, if the error carries one.
fn error_code(err: &DbError) -> Option<i32> {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => Some(e.code),
        ErrorKind::Write(WriteFailure::WriteConcernError(ref e)) => Some(e.code),
        ErrorKind::Command(ref e) => Some(e.code),
        _ => None,
    }
}

/// Return true if the given error is a duplicate key write error.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    error_code(err) == Some(DUPLICATE_KEY)
}

/// Return true if the given error is a transaction write conflict, i.e. a
/// concurrent transaction touched the same document or index key first.
pub fn is_write_conflict(err: &DbError) -> bool {
    error_code(err) == Some(WRITE_CONFLICT)
}

/// Return true if the server labelled the error as safe to retry the whole
/// transaction.
pub fn is_transient_transaction_error(err: &DbError) -> bool {
    err.contains_label(TRANSIENT_TRANSACTION_ERROR)
}
