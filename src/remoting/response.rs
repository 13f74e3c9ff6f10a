//! Responses to Remote Commands
//!
//! A peer answers every command with one of three responses. A successful
//! response carries the encoded result (a value record for a clustered get,
//! empty for write acknowledgements) and compares by those bytes, so equal
//! answers from different peers collapse into one.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::marshall::builtin::tags;
use crate::marshall::{Codec, Object, VersionAwareMarshaller};

/// Answer from a peer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Response {
    /// Command applied; carries the encoded result, if any
    Successful(Bytes),
    /// Peer does not hold the requested key
    Unsuccessful,
    /// Peer is not a current member or the cache is not available there
    Invalid,
}

impl Response {
    /// Acknowledgement carrying no result
    pub fn ack() -> Self {
        Response::Successful(Bytes::new())
    }

    /// Successful response carrying `result` encoded with `marshaller`
    pub fn with_result(marshaller: &VersionAwareMarshaller, result: &Object) -> Result<Self> {
        Ok(Response::Successful(marshaller.object_to_bytes(result)?))
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, Response::Successful(_))
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Response::Invalid)
    }

    /// Decode the carried result; `None` for acknowledgements and non-successful responses
    pub fn result(&self, marshaller: &VersionAwareMarshaller) -> Result<Option<Object>> {
        match self {
            Response::Successful(bytes) if !bytes.is_empty() => {
                marshaller.object_from_bytes(bytes.clone()).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn to_object(&self) -> Object {
        match self {
            Response::Successful(bytes) => Object::new(SuccessfulResponse(bytes.clone())),
            Response::Unsuccessful => Object::new(UnsuccessfulResponse),
            Response::Invalid => Object::new(InvalidResponse),
        }
    }

    pub fn from_object(object: &Object) -> Result<Self> {
        if let Some(successful) = object.downcast_ref::<SuccessfulResponse>() {
            return Ok(Response::Successful(successful.0.clone()));
        }
        if object.is::<UnsuccessfulResponse>() {
            return Ok(Response::Unsuccessful);
        }
        if object.is::<InvalidResponse>() {
            return Ok(Response::Invalid);
        }
        Err(Error::UnexpectedResponse(format!(
            "expected a response, got {}",
            object.type_name()
        )))
    }
}

// Wire forms, one per tag

#[derive(Debug, PartialEq, Eq, Hash)]
struct SuccessfulResponse(Bytes);

#[derive(Debug, PartialEq, Eq, Hash)]
struct UnsuccessfulResponse;

#[derive(Debug, PartialEq, Eq, Hash)]
struct InvalidResponse;

/// Codecs for the three response kinds
pub(crate) fn codecs() -> Vec<Codec> {
    vec![
        Codec::new::<SuccessfulResponse, _, _>(
            tags::SUCCESSFUL_RESPONSE,
            |out, r| {
                out.write_bytes(&r.0);
                Ok(())
            },
            |input| Ok(SuccessfulResponse(input.read_bytes()?)),
        ),
        Codec::new::<UnsuccessfulResponse, _, _>(
            tags::UNSUCCESSFUL_RESPONSE,
            |_, _| Ok(()),
            |_| Ok(UnsuccessfulResponse),
        ),
        Codec::new::<InvalidResponse, _, _>(
            tags::INVALID_RESPONSE,
            |_, _| Ok(()),
            |_| Ok(InvalidResponse),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_wire_round_trip() {
        let marshaller = VersionAwareMarshaller::with_builtins();
        for response in [
            Response::with_result(&marshaller, &Object::from("v")).unwrap(),
            Response::ack(),
            Response::Unsuccessful,
            Response::Invalid,
        ] {
            let bytes = marshaller.object_to_bytes(&response.to_object()).unwrap();
            let back = Response::from_object(&marshaller.object_from_bytes(bytes).unwrap()).unwrap();
            assert_eq!(back, response);
        }
    }

    #[test]
    fn test_successful_responses_collapse_by_bytes() {
        let marshaller = VersionAwareMarshaller::with_builtins();
        let a = Response::with_result(&marshaller, &Object::from("same")).unwrap();
        let b = Response::with_result(&marshaller, &Object::from("same")).unwrap();
        let c = Response::with_result(&marshaller, &Object::from("different")).unwrap();

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert!(!set.contains(&c));
    }

    #[test]
    fn test_result_decoding() {
        let marshaller = VersionAwareMarshaller::with_builtins();
        let response = Response::with_result(&marshaller, &Object::from(3i32)).unwrap();
        assert_eq!(response.result(&marshaller).unwrap(), Some(Object::from(3i32)));
        assert_eq!(Response::ack().result(&marshaller).unwrap(), None);
        assert_eq!(Response::Unsuccessful.result(&marshaller).unwrap(), None);
        assert!(!Response::Invalid.is_valid());
    }

    #[test]
    fn test_from_object_rejects_other_types() {
        assert!(matches!(
            Response::from_object(&Object::from(1i32)),
            Err(Error::UnexpectedResponse(_))
        ));
    }
}
