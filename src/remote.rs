//! Remote configuration API surface.
//!
//! The transport is someone else's job: [`ApiClient`] is the seam an HTTP
//! client plugs into. [`ResourceApi`] layers typed create/read/update/delete
//! over it using each type's wire form.
use std::fmt;
use std::marker::PhantomData;

use crate::error::ApiError;
use crate::model::FlatModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        })
    }
}

/// One request/response exchange. Implementations return the response body
/// when the status equals `expected_status` and
/// [`ApiError::UnexpectedStatus`] otherwise.
pub trait ApiClient: fmt::Debug {
    fn call(&self, method: Method, path: &str, body: Option<&[u8]>, expected_status: u16) -> Result<Vec<u8>, ApiError>;

    fn get(&self, path: &str, expected_status: u16) -> Result<Vec<u8>, ApiError> {
        self.call(Method::Get, path, None, expected_status)
    }

    fn post(&self, path: &str, body: &[u8], expected_status: u16) -> Result<Vec<u8>, ApiError> {
        self.call(Method::Post, path, Some(body), expected_status)
    }

    fn put(&self, path: &str, body: &[u8], expected_status: u16) -> Result<Vec<u8>, ApiError> {
        self.call(Method::Put, path, Some(body), expected_status)
    }

    fn delete(&self, path: &str, expected_status: u16) -> Result<Vec<u8>, ApiError> {
        self.call(Method::Delete, path, None, expected_status)
    }
}

impl<C: ApiClient + ?Sized> ApiClient for &C {
    fn call(&self, method: Method, path: &str, body: Option<&[u8]>, expected_status: u16) -> Result<Vec<u8>, ApiError> {
        (**self).call(method, path, body, expected_status)
    }
}

/// A remote resource addressed by `<COLLECTION>/<id>`.
///
/// The id is optional on read and assigned by the server on create.
pub trait Identified {
    const KIND: &'static str;
    const COLLECTION: &'static str;

    fn id(&self) -> Option<&str>;
}

// ------------------------------ Resource API ------------------------------ //

pub struct ResourceApi<C, T> {
    client: C,
    _resource: PhantomData<fn() -> T>,
}

impl<C: ApiClient, T: FlatModel + Identified> ResourceApi<C, T> {
    pub fn new(client: C) -> Self {
        Self { client, _resource: PhantomData }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn item_path(id: &str) -> String {
        format!("{}/{}", T::COLLECTION, id)
    }

    fn required_id<'v>(value: &'v T, action: &'static str) -> Result<&'v str, ApiError> {
        value
            .id()
            .filter(|id| !id.is_empty())
            .ok_or(ApiError::MissingId { kind: T::KIND, action })
    }

    pub fn create(&self, value: &T) -> Result<T, ApiError> {
        let body = value.to_wire()?;
        let out = self.client.post(T::COLLECTION, &body, 201)?;
        Ok(T::from_wire(&out)?)
    }

    pub fn read(&self, id: &str) -> Result<T, ApiError> {
        let out = self.client.get(&Self::item_path(id), 200)?;
        Ok(T::from_wire(&out)?)
    }

    pub fn update(&self, value: &T) -> Result<T, ApiError> {
        let id = Self::required_id(value, "updated")?;
        let body = value.to_wire()?;
        let out = self.client.put(&Self::item_path(id), &body, 200)?;
        Ok(T::from_wire(&out)?)
    }

    pub fn delete(&self, value: &T) -> Result<(), ApiError> {
        let id = Self::required_id(value, "deleted")?;
        self.client.delete(&Self::item_path(id), 204)?;
        tracing::debug!(kind = T::KIND, id, "deleted");
        Ok(())
    }
}

// ------------------------------- Tests ------------------------------------ //
