//! Property-Based Tests for the Marshalling Layer
//!
//! # Test Properties
//!
//! 1. **Varint Encoding**: decode(encode(n)) = n and the length matches `encoded_len`
//! 2. **Object Streams**: decoding an encoded object graph yields an equal graph
//! 3. **Hash Stability**: a marshalled value keeps its hash through every transition
//! 4. **Representation-Blind Equality**: wrappers compare equal exactly when their values do,
//!    whatever form each side is held in
//! 5. **Robustness**: truncated streams fail with a decode error, never a panic
//! 6. **Compaction**: exactly one form remains after compacting

#![cfg(test)]

use bytes::{Bytes, BytesMut};
use proptest::prelude::*;

use super::varint;
use super::{MarshalledValue, Object, VersionAwareMarshaller};
use crate::error::Result;

// =============================================================================
// Property Strategies
// =============================================================================

/// Scalars covered by the built-in codecs
fn scalar_strategy() -> impl Strategy<Value = Object> {
    prop_oneof![
        any::<i32>().prop_map(Object::from),
        any::<i64>().prop_map(Object::from),
        any::<bool>().prop_map(Object::from),
        ".{0,32}".prop_map(Object::from),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(|b| Object::from(Bytes::from(b))),
    ]
}

/// Scalars and sequences nested up to three levels deep
fn object_strategy() -> impl Strategy<Value = Object> {
    scalar_strategy().prop_recursive(3, 32, 8, |inner| {
        prop::collection::vec(inner, 0..8).prop_map(Object::from)
    })
}

/// Pairs that are equal about half the time
fn pair_strategy() -> impl Strategy<Value = (Object, Object)> {
    object_strategy().prop_flat_map(|x| (Just(x.clone()), prop_oneof![Just(x), object_strategy()]))
}

/// How a wrapper is held before it is compared
#[derive(Debug, Clone, Copy)]
enum Form {
    Instance,
    Both,
    Raw,
}

fn form_strategy() -> impl Strategy<Value = Form> {
    prop_oneof![Just(Form::Instance), Just(Form::Both), Just(Form::Raw)]
}

fn wrap_in(object: Object, form: Form, marshaller: &VersionAwareMarshaller) -> Result<MarshalledValue> {
    let mv = MarshalledValue::new(object, true, marshaller.clone());
    match form {
        Form::Instance => {}
        Form::Both => mv.serialize()?,
        Form::Raw => mv.compact()?,
    }
    Ok(mv)
}

// =============================================================================
// Varint Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: every u64 survives a varint round trip.
    #[test]
    fn prop_varint_roundtrip(value in any::<u64>()) {
        let mut buf = BytesMut::new();
        varint::write_unsigned_long(&mut buf, value);
        prop_assert_eq!(buf.len(), varint::encoded_len(value));

        let mut bytes = buf.freeze();
        prop_assert_eq!(varint::read_unsigned_long(&mut bytes)?, value);
        prop_assert!(bytes.is_empty());
    }
}

// =============================================================================
// Object Stream Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: encoded object graphs decode to equal graphs.
    #[test]
    fn prop_object_roundtrip(object in object_strategy()) {
        let marshaller = VersionAwareMarshaller::with_builtins();
        let bytes = marshaller.object_to_bytes(&object)?;
        let back = marshaller.object_from_bytes(bytes)?;
        prop_assert_eq!(back, object);
        prop_assert_eq!(marshaller.active_sessions(), 0);
    }

    /// Property: any strict prefix of a stream is rejected as a decode error.
    #[test]
    fn prop_truncated_stream_is_rejected(object in object_strategy(), cut in any::<prop::sample::Index>()) {
        let marshaller = VersionAwareMarshaller::with_builtins();
        let bytes = marshaller.object_to_bytes(&object)?;
        let cut = cut.index(bytes.len());
        let err = marshaller.object_from_bytes(bytes.slice(..cut)).unwrap_err();
        prop_assert!(err.is_decode_error(), "unexpected error: {}", err);
    }
}

// =============================================================================
// Marshalled Value Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: the hash never changes across serialize, compact and deserialize.
    #[test]
    fn prop_hash_stable_across_transitions(object in object_strategy()) {
        let marshaller = VersionAwareMarshaller::with_builtins();
        let mv = MarshalledValue::new(object.clone(), true, marshaller.clone());
        let hash = mv.hash_code();
        prop_assert_eq!(hash, object.stable_hash());

        mv.serialize()?;
        prop_assert_eq!(mv.hash_code(), hash);
        mv.compact()?;
        prop_assert_eq!(mv.hash_code(), hash);
        mv.deserialize()?;
        prop_assert_eq!(mv.hash_code(), hash);
        prop_assert_eq!(mv.get()?, object);
    }

    /// Property: a wrapper received off the wire equals a fresh local wrapper.
    #[test]
    fn prop_raw_equals_instance(object in object_strategy()) {
        let marshaller = VersionAwareMarshaller::with_builtins();
        let local = MarshalledValue::new(object.clone(), true, marshaller.clone());
        let wire = marshaller.object_to_bytes(&Object::from(MarshalledValue::new(
            object,
            true,
            marshaller.clone(),
        )))?;
        let received = marshaller.object_from_bytes(wire)?;
        let received = received.as_marshalled().expect("decoded a marshalled value");

        prop_assert_eq!(received.hash_code(), local.hash_code());
        prop_assert!(received == &local);
        prop_assert!(&local == received);
    }

    /// Property: wrappers are equal exactly when the wrapped values are.
    #[test]
    fn prop_equality_is_representation_blind(
        (x, y) in pair_strategy(),
        left in form_strategy(),
        right in form_strategy(),
    ) {
        let marshaller = VersionAwareMarshaller::with_builtins();
        let expected = x == y;
        let a = wrap_in(x, left, &marshaller)?;
        let b = wrap_in(y, right, &marshaller)?;

        prop_assert_eq!(a == b, expected);
        prop_assert_eq!(b == a, expected);
        if expected {
            prop_assert_eq!(a.hash_code(), b.hash_code());
        }
    }

    /// Property: compaction leaves exactly one form behind.
    #[test]
    fn prop_compact_keeps_one_form(
        object in object_strategy(),
        form in form_strategy(),
        prefer_serialized in any::<bool>(),
    ) {
        let marshaller = VersionAwareMarshaller::with_builtins();
        let mv = wrap_in(object.clone(), form, &marshaller)?;
        mv.compact()?;
        prop_assert!(mv.has_raw() ^ mv.has_instance());
        prop_assert!(mv.has_raw());

        mv.deserialize()?;
        mv.compact_with(prefer_serialized, true)?;
        prop_assert!(mv.has_raw() ^ mv.has_instance());
        prop_assert_eq!(mv.has_raw(), prefer_serialized);
        prop_assert_eq!(mv.get()?, object);
    }
}
