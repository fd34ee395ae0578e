use super::records::Record;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Errors raised by the persistence layer
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("External id {0} is already used by another record")]
	DuplicateExternalId(String),

	#[error("Record {0} not found")]
	NotFound(u64),

	#[error("Storage backend error: {0}")]
	Backend(String),
}

/// Repository for one entity type
#[async_trait::async_trait]
pub trait EntityRepository<R: Record>: Send + Sync {
	async fn find_by_id(&self, id: u64) -> Result<Option<R>, StoreError>;
	async fn find_by_external_id(&self, external_id: &str) -> Result<Option<R>, StoreError>;
	/// When several records share the key, one without an external id is preferred
	async fn find_by_natural_key(&self, key: &str) -> Result<Option<R>, StoreError>;
	/// Insert or replace, returning the stored record with its local id assigned
	async fn save(&self, record: R) -> Result<R, StoreError>;
	async fn find_all(&self) -> Result<Vec<R>, StoreError>;
	async fn count(&self) -> Result<usize, StoreError>;
}

/// In-memory implementation of EntityRepository
pub struct InMemoryRepository<R> {
	records: RwLock<BTreeMap<u64, R>>,
	next_id: AtomicU64,
}

impl<R: Record> InMemoryRepository<R> {
	pub fn new() -> Self {
		Self {
			records: RwLock::new(BTreeMap::new()),
			next_id: AtomicU64::new(1),
		}
	}
}

impl<R: Record> Default for InMemoryRepository<R> {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl<R: Record> EntityRepository<R> for InMemoryRepository<R> {
	async fn find_by_id(&self, id: u64) -> Result<Option<R>, StoreError> {
		Ok(self.records.read().await.get(&id).cloned())
	}

	async fn find_by_external_id(&self, external_id: &str) -> Result<Option<R>, StoreError> {
		Ok(self
			.records
			.read()
			.await
			.values()
			.find(|r| r.external_id() == Some(external_id))
			.cloned())
	}

	async fn find_by_natural_key(&self, key: &str) -> Result<Option<R>, StoreError> {
		let records = self.records.read().await;
		let mut matches = records.values().filter(|r| r.natural_key() == key);
		let Some(first) = matches.next() else {
			return Ok(None);
		};
		if first.external_id().is_none() {
			return Ok(Some(first.clone()));
		}
		Ok(Some(
			matches
				.find(|r| r.external_id().is_none())
				.unwrap_or(first)
				.clone(),
		))
	}

	async fn save(&self, mut record: R) -> Result<R, StoreError> {
		let mut records = self.records.write().await;

		if let Some(external_id) = record.external_id() {
			let clash = records
				.values()
				.any(|r| r.external_id() == Some(external_id) && r.local_id() != record.local_id());
			if clash {
				return Err(StoreError::DuplicateExternalId(external_id.to_string()));
			}
		}

		let id = match record.local_id() {
			Some(id) => {
				if !records.contains_key(&id) {
					return Err(StoreError::NotFound(id));
				}
				id
			}
			None => {
				let id = self.next_id.fetch_add(1, Ordering::SeqCst);
				record.assign_local_id(id);
				id
			}
		};

		debug!("Saved record {} ({})", id, record.natural_key());
		records.insert(id, record.clone());
		Ok(record)
	}

	async fn find_all(&self) -> Result<Vec<R>, StoreError> {
		Ok(self.records.read().await.values().cloned().collect())
	}

	async fn count(&self) -> Result<usize, StoreError> {
		Ok(self.records.read().await.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::Wrestler;

	fn wrestler(name: &str, external_id: Option<&str>) -> Wrestler {
		Wrestler {
			name: name.to_string(),
			external_id: external_id.map(str::to_string),
			..Wrestler::default()
		}
	}

	#[tokio::test]
	async fn test_save_assigns_ids_and_replaces() {
		let repo = InMemoryRepository::<Wrestler>::new();
		let saved = repo
			.save(wrestler("Kane", Some("w-1")))
			.await
			.expect("Failed while saving wrestler");
		assert_eq!(saved.id, Some(1));

		let mut updated = saved.clone();
		updated.fans = Some(100);
		repo.save(updated).await.expect("Failed while updating wrestler");

		assert_eq!(repo.count().await.expect("Failed while counting"), 1);
		let found = repo
			.find_by_external_id("w-1")
			.await
			.expect("Failed while finding wrestler")
			.expect("Wrestler should exist");
		assert_eq!(found.fans, Some(100));
	}

	#[tokio::test]
	async fn test_external_id_is_unique() {
		let repo = InMemoryRepository::<Wrestler>::new();
		repo.save(wrestler("Kane", Some("w-1")))
			.await
			.expect("Failed while saving wrestler");

		let result = repo.save(wrestler("Impostor", Some("w-1"))).await;
		assert!(matches!(result, Err(StoreError::DuplicateExternalId(_))));
	}

	#[tokio::test]
	async fn test_find_by_natural_key() {
		let repo = InMemoryRepository::<Wrestler>::new();
		repo.save(wrestler("Kane", None))
			.await
			.expect("Failed while saving wrestler");

		assert!(
			repo.find_by_natural_key("Kane")
				.await
				.expect("Failed while finding wrestler")
				.is_some()
		);
		assert!(
			repo.find_by_natural_key("Edge")
				.await
				.expect("Failed while finding wrestler")
				.is_none()
		);
	}

	#[tokio::test]
	async fn test_natural_key_prefers_uncorrelated_record() {
		let repo = InMemoryRepository::<Wrestler>::new();
		repo.save(wrestler("Rey Mysterio", Some("w-1")))
			.await
			.expect("Failed while saving wrestler");
		let local = repo
			.save(wrestler("Rey Mysterio", None))
			.await
			.expect("Failed while saving wrestler");

		let found = repo
			.find_by_natural_key("Rey Mysterio")
			.await
			.expect("Failed while finding wrestler")
			.expect("Wrestler should exist");
		assert_eq!(found.id, local.id);
		assert!(found.external_id.is_none());
	}

	#[tokio::test]
	async fn test_natural_key_falls_back_to_correlated_record() {
		let repo = InMemoryRepository::<Wrestler>::new();
		repo.save(wrestler("Batista", Some("w-1")))
			.await
			.expect("Failed while saving wrestler");

		let found = repo
			.find_by_natural_key("Batista")
			.await
			.expect("Failed while finding wrestler")
			.expect("Wrestler should exist");
		assert_eq!(found.external_id.as_deref(), Some("w-1"));
	}
}
