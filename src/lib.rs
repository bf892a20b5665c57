#![doc = include_str!("../README.md")]

// Core modules
pub mod client;
pub mod key;
pub mod state;

pub mod errors;
pub mod global;
pub mod mutation;
pub mod observer;

pub mod prelude {
    //! The prelude exports all the most common types and functions for using query-broker.

    // The cache authority and its configuration
    pub use crate::client::{QueryClient, QueryOptions, QuerySubscription};

    // Query keys and the macro for building them
    pub use crate::key::{IntoKeyPart, KeyPart, QueryKey};
    pub use crate::query_key;

    // State types, needed for matching and assertions
    pub use crate::state::{QuerySnapshot, QueryStatus};

    // The reactive read binding
    pub use crate::observer::{ObserverOptions, QueryObserver, QueryView};

    // One-shot actions
    pub use crate::mutation::{Mutation, MutationState};

    // Errors
    pub use crate::errors::{QueryError, QueryResult};

    // Global initialization
    pub use crate::global::{global_client, init_global_client, is_initialized};
}
