//! Response Filters
//!
//! A filter is a streaming reduction over the responses of one remote call.
//! The transport feeds it each response as it arrives; the filter says
//! whether to keep the response and whether the call may stop waiting.

use std::collections::HashSet;

use tracing::trace;

use super::address::Address;
use super::response::Response;

/// Whether the transport should keep waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Done,
}

/// Outcome of offering one response to a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Include the response in the call's result
    pub keep: bool,
    pub verdict: Verdict,
}

/// Stateful collector consulted once per arriving response
pub trait ResponseFilter: Send {
    fn accept(&mut self, sender: &Address, response: &Response) -> Decision;
}

/// Validity filter for clustered gets
///
/// Membership is captured when the filter is built; a response counts only
/// if its sender was a member then and the response is not [`Response::Invalid`].
/// The call may stop at the first kept successful response, or once every
/// target has answered.
#[derive(Debug)]
pub struct ClusteredGetResponseValidityFilter {
    valid_members: HashSet<Address>,
    pending: HashSet<Address>,
}

impl ClusteredGetResponseValidityFilter {
    pub fn new(valid_members: impl IntoIterator<Item = Address>) -> Self {
        let valid_members: HashSet<Address> = valid_members.into_iter().collect();
        Self {
            pending: valid_members.clone(),
            valid_members,
        }
    }

    /// Members that have not answered yet
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl ResponseFilter for ClusteredGetResponseValidityFilter {
    fn accept(&mut self, sender: &Address, response: &Response) -> Decision {
        self.pending.remove(sender);
        let keep = self.valid_members.contains(sender) && response.is_valid();
        trace!(%sender, keep, pending = self.pending.len(), "filtered clustered get response");

        let verdict = if (keep && response.is_successful()) || self.pending.is_empty() {
            Verdict::Done
        } else {
            Verdict::Continue
        };
        Decision { keep, verdict }
    }
}
