mod entry;
mod keys;
mod predicates;
mod serialization;
mod staleness;

pub use entry::EntryState;
pub use keys::*;
pub use predicates::{normalize_predicates, KeyPredicate, PatternPart};
pub use serialization::{
    deserialize_record, deserialize_records, serialize_record, serialize_records,
    SerializationError,
};
pub use staleness::StalenessPolicy;
