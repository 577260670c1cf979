//! Typed external ports: the phantom-typed addresses a host application
//! sends [`crate::command::Command`]s through, standing in for an OSC
//! address or a plugin-host parameter id without committing this crate to
//! either.

use std::marker::PhantomData;

/// A typed port identifier. `T` is never constructed; it exists purely so
/// `Port<PositionPayload>` and `Port<GainPayload>` are distinct types at
/// the call site even though both wrap the same `address: String`.
#[derive(Debug, Clone)]
pub struct Port<T> {
    pub address: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Port<T> {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into(), _payload: PhantomData }
    }
}

impl<T> PartialEq for Port<T> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

/// Position/orientation updates (`Move`/`Glide`).
pub struct TransformPayload;
/// Per-source gain.
pub struct GainPayload;
/// Listener-model-wide feature toggles (bypass, near-field on/off).
pub struct FlagPayload;
/// Room geometry (`AddWall`/wall absorption).
pub struct GeometryPayload;
/// Source lifecycle (`AddSource`/`RemoveSource`).
pub struct LifecyclePayload;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_compare_by_address_regardless_of_payload_type() {
        let a: Port<TransformPayload> = Port::new("/listener/1/position");
        let b: Port<TransformPayload> = Port::new("/listener/1/position");
        assert_eq!(a, b);
    }
}
