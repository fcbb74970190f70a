//! Document store boundary.
//!
//! Components never talk to a database directly: they declare the keys they
//! touch and hand a work closure to [`DocumentStore::transact`]. Live readers
//! hold a [`Subscription`](agencyops_events::Subscription) of full query
//! snapshots.
//!
//! - `r#trait`: the boundary ([`DocumentStore`], [`EventLogReader`]) and the
//!   [`Transaction`] unit of work
//! - `in_memory`: the reference implementation used by tests and the simulator
//! - `keys`: the persisted layout (`{collection}/{agencyId}/{documentId}`)

pub mod clock;
pub mod error;
pub mod in_memory;
pub mod keys;
pub mod r#trait;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::StoreError;
pub use in_memory::{EventLogReaderExt, InMemoryDocumentStore};
pub use keys::{Collection, DocKey, Query};
pub use r#trait::{
    CancelToken, Committed, DocumentStore, EventLogReader, EventPage, NewEvent, QuerySnapshot,
    StoredDocument, StoredEvent, Transaction, TxChanges, TxOptions,
};
