pub mod memory;
pub mod postgres;
pub mod query_builder;
pub mod store;

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;
pub use store::{
    decode_row, decode_rows, ChangeKind, Filter, Order, RecordChange, RecordStore, StoreError,
    Subscription,
};

/// Table names used by the portal
pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const TICKETS: &str = "tickets";
    pub const PAYMENTS: &str = "payments";
}
