/// Type-state markers for the builder pattern
///
/// These types are used to track which fields have been set
/// in the builder at compile-time, preventing invalid configurations.

use std::marker::PhantomData;

/// Marker trait for endpoint state
pub trait EndpointState {}

/// Endpoint has not been set
pub struct NoEndpoint;
impl EndpointState for NoEndpoint {}

/// Endpoint has been set
pub struct HasEndpoint;
impl EndpointState for HasEndpoint {}

/// Placeholder occupying the transport slot until `pin()` or `transport()` is called
///
/// Does not implement `WsTransport`, so `build()` is unavailable while it is in place.
pub struct NoTransport;

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<E> {
    _endpoint: PhantomData<E>,
}

impl<E> TypeState<E> {
    pub(crate) fn new() -> Self {
        Self {
            _endpoint: PhantomData,
        }
    }
}

impl<E> Default for TypeState<E> {
    fn default() -> Self {
        Self::new()
    }
}
