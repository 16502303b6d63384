//! Uniform search/create/save/delete access to array collections.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::array::{ArrayError, ArrayRequest, ArraySession, Transport};

mod types;

pub use types::{
    Draft, Host, HostIqn, Mapping, NewHost, NewHostIqn, NewMapping, NewSnapshot, NewVolume,
    NewVolumeGroup, ObjectRef, Resource, RetentionPolicy, Savable, Snapshot, Stateful,
    SystemCapacity, SystemState, VolSnap, Volume, VolumeGroup,
};

/// Search filters, sent as query string pairs.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Filters {
    pairs: Vec<(String, String)>,
}

impl Filters {
    /// Creates an empty filter set matching every object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches objects whose `field` equals `value`.
    #[must_use]
    pub fn field(mut self, field: &str, value: impl Into<String>) -> Self {
        self.pairs.push((field.to_owned(), value.into()));
        self
    }

    /// Matches objects whose `field` references `target`.
    #[must_use]
    pub fn refers_to(mut self, field: &str, target: &ObjectRef) -> Self {
        self.pairs.push((field.to_owned(), target.path().to_owned()));
        self
    }

    /// Shorthand for a filter on the `name` field.
    #[must_use]
    pub fn name(value: impl Into<String>) -> Self {
        Self::new().field("name", value)
    }

    fn into_query(self) -> Vec<(String, String)> {
        self.pairs
    }
}

/// Result of a collection search. `total == 0` means nothing matched.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(bound = "R: DeserializeOwned")]
pub struct ResultSet<R> {
    /// Number of matching objects.
    pub total: u64,
    /// Matching objects.
    #[serde(default = "Vec::new")]
    pub hits: Vec<R>,
}

impl<R> ResultSet<R> {
    /// Returns true when nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0 || self.hits.is_empty()
    }

    /// Consumes the set and returns its first hit, if any.
    #[must_use]
    pub fn into_first(self) -> Option<R> {
        if self.total == 0 {
            return None;
        }
        self.hits.into_iter().next()
    }
}

/// Entity repository over one array session.
#[derive(Debug)]
pub struct ArrayClient<T> {
    session: ArraySession<T>,
}

impl<T: Transport> ArrayClient<T> {
    /// Creates a repository that issues requests through `transport`.
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self {
            session: ArraySession::new(transport),
        }
    }

    /// Returns the underlying session.
    #[must_use]
    pub const fn session(&self) -> &ArraySession<T> {
        &self.session
    }

    /// Searches the resource's collection.
    ///
    /// # Errors
    ///
    /// Returns [`ArrayError`] when the request fails or the answer cannot be
    /// decoded.
    pub async fn search<R: Resource>(&self, filters: Filters) -> Result<ResultSet<R>, ArrayError> {
        let request = ArrayRequest::get(format!("/{}", R::COLLECTION)).with_query(filters.into_query());
        let value = self.session.execute(&request).await?;
        decode(value, R::COLLECTION)
    }

    /// Searches and returns the first hit, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ArrayError`] when the search fails.
    pub async fn find<R: Resource>(&self, filters: Filters) -> Result<Option<R>, ArrayError> {
        Ok(self.search::<R>(filters).await?.into_first())
    }

    /// Fetches the current version of the object at `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`ArrayError`] when the request fails or the object is gone.
    pub async fn get<R: Resource>(&self, reference: &ObjectRef) -> Result<R, ArrayError> {
        let value = self
            .session
            .execute(&ArrayRequest::get(reference.path()))
            .await?;
        decode(value, R::KIND)
    }

    /// Creates a new object from `draft` and returns it as stored.
    ///
    /// # Errors
    ///
    /// Returns [`ArrayError`] when the array rejects the object.
    pub async fn create<D: Draft>(&self, draft: &D) -> Result<D::Output, ArrayError> {
        let body = serde_json::to_value(draft)
            .map_err(|err| ArrayError::decode(<D::Output as Resource>::KIND, &err))?;
        let path = format!("/{}", <D::Output as Resource>::COLLECTION);
        let value = self.session.execute(&ArrayRequest::post(path, body)).await?;
        decode(value, <D::Output as Resource>::KIND)
    }

    /// Writes the mutable fields of `entity` back to the array.
    ///
    /// # Errors
    ///
    /// Returns [`ArrayError`] when the array rejects the update.
    pub async fn save<R: Savable>(&self, entity: &R) -> Result<R, ArrayError> {
        let request = ArrayRequest::patch(entity.object_ref().path(), entity.changes());
        let value = self.session.execute(&request).await?;
        decode(value, R::KIND)
    }

    /// Deletes `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`ArrayError`] when the array rejects the deletion.
    pub async fn delete<R: Resource>(&self, entity: &R) -> Result<(), ArrayError> {
        self.session
            .execute(&ArrayRequest::delete(entity.object_ref().path()))
            .await
            .map(drop)
    }
}

fn decode<V: DeserializeOwned>(value: Value, what: &str) -> Result<V, ArrayError> {
    serde_json::from_value(value).map_err(|err| ArrayError::decode(what, &err))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn filters_send_references_as_paths() {
        let filters = Filters::name("cv-1")
            .refers_to("volume", &ObjectRef::new("volumes", 3))
            .into_query();
        assert_eq!(
            filters,
            vec![
                (String::from("name"), String::from("cv-1")),
                (String::from("volume"), String::from("/volumes/3")),
            ]
        );
    }

    #[test]
    fn empty_result_set_has_no_first_hit() {
        let set: ResultSet<RetentionPolicy> =
            decode(json!({"total": 0, "hits": []}), "retention policy")
                .unwrap_or_else(|err| panic!("decode: {err}"));
        assert!(set.is_empty());
        assert_eq!(set.into_first(), None);
    }

    #[test]
    fn result_set_without_hits_field_decodes_empty() {
        let set: ResultSet<Host> =
            decode(json!({"total": 0}), "hosts").unwrap_or_else(|err| panic!("decode: {err}"));
        assert!(set.hits.is_empty());
    }

    #[test]
    fn result_set_yields_first_hit() {
        let set: ResultSet<RetentionPolicy> = decode(
            json!({"total": 1, "hits": [{"id": 2, "name": "Best_Effort_Retention"}]}),
            "retention policy",
        )
        .unwrap_or_else(|err| panic!("decode: {err}"));
        assert_eq!(
            set.into_first().map(|policy| policy.id),
            Some(2)
        );
    }
}
