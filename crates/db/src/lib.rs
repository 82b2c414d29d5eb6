pub mod carts;
pub mod connection;
pub mod conversations;
pub mod credentials;
pub mod locks;
pub mod migrations;
pub mod repositories;

pub use carts::{CartManager, CartSummary};
pub use connection::{connect, connect_with_settings, DbPool};
pub use conversations::{ConversationManager, CustomerStats};
pub use credentials::{CredentialInfo, CredentialStore, SessionCredentials};
pub use locks::KeyedLocks;
pub use repositories::{
    DocumentStore, FileDocumentStore, InMemoryDocumentStore, Namespace, RepositoryError,
    SqlDocumentStore,
};
