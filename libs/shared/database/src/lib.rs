pub mod memory;
pub mod store;
pub mod supabase;

pub use memory::MemoryDocumentStore;
pub use store::{DocumentStore, Filter, FilterClause, FilterOp, StoreError, Subscription};
pub use supabase::{SupabaseClient, SupabaseDocumentStore};
