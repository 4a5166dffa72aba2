mod bson;
mod collection;
mod errors;

pub use bson::Id;
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use errors::{
    is_duplicate_key_error, is_transient_transaction_error, is_write_conflict, DUPLICATE_KEY,
    WRITE_CONFLICT,
};
