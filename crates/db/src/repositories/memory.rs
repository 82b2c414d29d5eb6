use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;

use super::{validate_key, DocumentStore, Namespace, RepositoryError};

#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<(Namespace, String), Value>>,
}

impl InMemoryDocumentStore {
    pub async fn len(&self, namespace: Namespace) -> usize {
        let documents = self.documents.read().await;
        documents.keys().filter(|(ns, _)| *ns == namespace).count()
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Value>, RepositoryError> {
        validate_key(key)?;
        let documents = self.documents.read().await;
        Ok(documents.get(&(namespace, key.to_string())).cloned())
    }

    async fn put(
        &self,
        namespace: Namespace,
        key: &str,
        document: &Value,
    ) -> Result<(), RepositoryError> {
        validate_key(key)?;
        let mut documents = self.documents.write().await;
        documents.insert((namespace, key.to_string()), document.clone());
        Ok(())
    }

    async fn delete(&self, namespace: Namespace, key: &str) -> Result<bool, RepositoryError> {
        validate_key(key)?;
        let mut documents = self.documents.write().await;
        Ok(documents.remove(&(namespace, key.to_string())).is_some())
    }

    async fn keys(&self, namespace: Namespace) -> Result<Vec<String>, RepositoryError> {
        let documents = self.documents.read().await;
        Ok(documents
            .keys()
            .filter(|(ns, _)| *ns == namespace)
            .map(|(_, key)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::repositories::{contract, InMemoryDocumentStore, Namespace};

    #[tokio::test]
    async fn in_memory_store_satisfies_document_contract() {
        let store = InMemoryDocumentStore::default();
        contract::exercise(&store).await;
        assert_eq!(store.len(Namespace::Conversations).await, 1);
    }
}
