use std::fmt::Debug;

use futures_util::TryStreamExt;
use mongodb::{
    bson::{self, Bson, Document},
    error::{ErrorKind, WriteError, WriteFailure},
    Database, IndexModel,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A key-value collection persisted in MongoDB.
///
/// Every document has the shape `{ key, value }` with a unique index on `key`,
/// so keys can be structs (filtered with `key.<field>`) and values can be
/// updated in place with the atomic operators of the server. Nothing is cached
/// in memory: several stores may point to the same collection.
pub struct PersistentStore<K: Send + Sync, V: Send + Sync> {
    db: mongodb::Collection<StoreEntry<K, V>>,
}

impl<K: Send + Sync, V: Send + Sync> Debug for PersistentStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStore")
            .field("collection", &self.db.name())
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreEntry<K, V> {
    pub key: K,
    pub value: V,
}

const DUPLICATE_KEY: i32 = 11000;

fn key_field_filter(field: &str, value: impl Into<Bson>) -> Document {
    let mut filter = Document::new();
    filter.insert(format!("key.{field}"), value.into());
    filter
}

impl<K, V> PersistentStore<K, V>
where
    K: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static,
    V: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static,
{
    pub async fn new(db: Database, name: &str) -> Result<Self, anyhow::Error> {
        let collection = db.collection(name);
        collection
            .create_index(
                IndexModel::builder()
                    .keys(bson::doc! { "key": 1 })
                    .options(
                        mongodb::options::IndexOptions::builder()
                            .unique(true)
                            .build(),
                    )
                    .build(),
            )
            .await?;
        Ok(Self { db: collection })
    }

    fn key_filter(key: &K) -> Result<Document, anyhow::Error> {
        Ok(bson::doc! { "key": bson::to_bson(key)? })
    }

    pub async fn get(&self, key: &K) -> Result<Option<V>, anyhow::Error> {
        Ok(self
            .db
            .find_one(Self::key_filter(key)?)
            .await?
            .map(|entry| entry.value))
    }

    /// Inserts the value only if the key is not taken yet. Returns `false`
    /// and leaves the stored value untouched if it is.
    pub async fn insert_if_not_exists(&self, key: K, value: V) -> Result<bool, anyhow::Error> {
        if let Err(err) = self.db.insert_one(StoreEntry { key, value }).await {
            if let ErrorKind::Write(WriteFailure::WriteError(WriteError {
                code: DUPLICATE_KEY,
                ..
            })) = &*err.kind
            {
                return Ok(false);
            }
            Err(err.into())
        } else {
            Ok(true)
        }
    }

    pub async fn insert_or_update(&self, key: K, value: V) -> Result<(), anyhow::Error> {
        let value_bson = bson::to_bson(&value)?;
        self.db
            .update_one(
                Self::key_filter(&key)?,
                bson::doc! { "$set": { "value": value_bson } },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    /// Replaces the value only if the stored one matches `condition`, which
    /// is a filter over `value.*` fields. Returns whether anything was
    /// replaced. The check and the write are a single server-side operation.
    pub async fn replace_if(
        &self,
        key: &K,
        condition: Document,
        value: V,
    ) -> Result<bool, anyhow::Error> {
        let mut filter = Self::key_filter(key)?;
        for (field, expected) in condition {
            filter.insert(field, expected);
        }
        let value_bson = bson::to_bson(&value)?;
        let result = self
            .db
            .update_one(filter, bson::doc! { "$set": { "value": value_bson } })
            .await?;
        Ok(result.matched_count == 1)
    }

    /// Atomically adds `delta` to a numeric value, creating the entry with
    /// `delta` as its value if it doesn't exist.
    pub async fn increment(&self, key: &K, delta: i64) -> Result<(), anyhow::Error> {
        self.db
            .update_one(
                Self::key_filter(key)?,
                bson::doc! { "$inc": { "value": delta } },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    /// Deletes the entry only if its value matches `condition`, a filter over
    /// `value` or `value.*`. Returns whether an entry was deleted.
    pub async fn delete_if(&self, key: &K, condition: Document) -> Result<bool, anyhow::Error> {
        let mut filter = Self::key_filter(key)?;
        for (field, expected) in condition {
            filter.insert(field, expected);
        }
        Ok(self.db.delete_one(filter).await?.deleted_count == 1)
    }

    /// Sets one field of an existing value, leaving the rest of it untouched.
    /// Returns `false` if there is no entry for `key`.
    pub async fn set_value_field(
        &self,
        key: &K,
        field: &str,
        value: impl Into<Bson>,
    ) -> Result<bool, anyhow::Error> {
        let mut update = Document::new();
        update.insert(format!("value.{field}"), value.into());
        let result = self
            .db
            .update_one(Self::key_filter(key)?, bson::doc! { "$set": update })
            .await?;
        Ok(result.matched_count == 1)
    }

    /// Entries whose key field `field` equals `value`.
    pub async fn find_by_key_field(
        &self,
        field: &str,
        value: impl Into<Bson>,
    ) -> Result<Vec<(K, V)>, anyhow::Error> {
        let cursor = self
            .db
            .find(key_field_filter(field, value))
            .await?;
        Ok(cursor
            .try_collect::<Vec<_>>()
            .await?
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect())
    }

    pub async fn count_by_key_field(
        &self,
        field: &str,
        value: impl Into<Bson>,
    ) -> Result<u64, anyhow::Error> {
        Ok(self
            .db
            .count_documents(key_field_filter(field, value))
            .await?)
    }

    /// Deletes all entries whose key field `field` equals `value`, returns
    /// how many were deleted.
    pub async fn delete_by_key_field(
        &self,
        field: &str,
        value: impl Into<Bson>,
    ) -> Result<u64, anyhow::Error> {
        let result = self
            .db
            .delete_many(key_field_filter(field, value))
            .await?;
        Ok(result.deleted_count)
    }

    /// Entries sorted by value, highest first.
    pub async fn top_by_value(&self, limit: usize) -> Result<Vec<(K, V)>, anyhow::Error> {
        let cursor = self
            .db
            .find(bson::doc! {})
            .sort(bson::doc! { "value": -1, "key": 1 })
            .limit(limit as i64)
            .await?;
        Ok(cursor
            .try_collect::<Vec<_>>()
            .await?
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect())
    }

    pub async fn values(&self) -> Result<Vec<(K, V)>, anyhow::Error> {
        let cursor = self.db.find(bson::doc! {}).await?;
        Ok(cursor
            .try_collect::<Vec<_>>()
            .await?
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect())
    }

    pub async fn clear(&self) -> Result<u64, anyhow::Error> {
        Ok(self.db.delete_many(bson::doc! {}).await?.deleted_count)
    }
}
