//! Content ↔ row column mapping
//!
//! The master knows nothing about document content. A [`RowMapper`] turns
//! content into the entity columns of a row and back. [`SerdeMapper`] covers
//! the common case of storing any serde type as one MessagePack column.

use docmaster_core::{Columns, MasterError, MasterResult, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

/// Converts document content to and from entity columns
pub trait RowMapper: Send + Sync {
    /// Business content type
    type Content: Clone + Send + Sync;

    /// Entity columns for a row holding `content`
    ///
    /// # Errors
    ///
    /// `Serialization` if the content cannot be represented.
    fn to_columns(&self, content: &Self::Content) -> MasterResult<Columns>;

    /// Content stored in a row's entity columns
    ///
    /// # Errors
    ///
    /// `Serialization` if the columns do not hold valid content.
    fn from_columns(&self, columns: &Columns) -> MasterResult<Self::Content>;

    /// Carry over fields the caller did not supply, from the row being
    /// superseded by an update or correction
    ///
    /// # Errors
    ///
    /// Any error aborts the mutation.
    fn merge_non_updated(&self, _new: &mut Self::Content, _old: &Self::Content) -> MasterResult<()> {
        Ok(())
    }
}

/// Column used by [`SerdeMapper`]
pub const CONTENT_COLUMN: &str = "content";

/// Stores any serde content as MessagePack bytes in [`CONTENT_COLUMN`]
pub struct SerdeMapper<T> {
    _content: PhantomData<fn() -> T>,
}

impl<T> SerdeMapper<T> {
    /// New mapper
    pub fn new() -> Self {
        SerdeMapper {
            _content: PhantomData,
        }
    }
}

impl<T> Default for SerdeMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SerdeMapper<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SerdeMapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerdeMapper")
            .field("content", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> RowMapper for SerdeMapper<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    type Content = T;

    fn to_columns(&self, content: &T) -> MasterResult<Columns> {
        let bytes = rmp_serde::to_vec_named(content).map_err(MasterError::serialization)?;
        let mut columns = Columns::new();
        columns.insert(CONTENT_COLUMN.to_string(), Value::Bytes(bytes));
        Ok(columns)
    }

    fn from_columns(&self, columns: &Columns) -> MasterResult<T> {
        let bytes = columns
            .get(CONTENT_COLUMN)
            .and_then(Value::as_bytes)
            .ok_or_else(|| {
                MasterError::serialization(format!("missing bytes column '{}'", CONTENT_COLUMN))
            })?;
        rmp_serde::from_slice(bytes).map_err(MasterError::serialization)
    }
}
