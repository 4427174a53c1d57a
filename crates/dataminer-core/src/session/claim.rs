//! Exclusive ownership of running instances.
//!
//! A process can only be meaningfully suspended by one session at a time. The
//! claim table records which pids are owned by a live session in this process.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use once_cell::sync::Lazy;

use crate::error::{DataminerError, DataminerResult};
use crate::types::ProcessId;

static CLAIMED: Lazy<Mutex<HashSet<ProcessId>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Held for as long as a session owns `pid`; released on drop
#[derive(Debug)]
pub(crate) struct InstanceClaim(ProcessId);

impl InstanceClaim
{
    /// ## Errors
    ///
    /// - `InstanceBusy`: another live session owns `pid`
    pub(crate) fn acquire(pid: ProcessId) -> DataminerResult<Self>
    {
        let mut claimed = CLAIMED.lock().unwrap_or_else(PoisonError::into_inner);
        if !claimed.insert(pid) {
            return Err(DataminerError::InstanceBusy(pid));
        }
        Ok(Self(pid))
    }
}

impl Drop for InstanceClaim
{
    fn drop(&mut self)
    {
        CLAIMED.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.0);
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_claim_is_exclusive_until_dropped()
    {
        let pid = ProcessId(4_000_001);
        let claim = InstanceClaim::acquire(pid).unwrap();
        assert!(matches!(InstanceClaim::acquire(pid), Err(DataminerError::InstanceBusy(p)) if p == pid));

        drop(claim);
        assert!(InstanceClaim::acquire(pid).is_ok());
    }

    #[test]
    fn test_claims_are_per_pid()
    {
        let _first = InstanceClaim::acquire(ProcessId(4_000_002)).unwrap();
        let _second = InstanceClaim::acquire(ProcessId(4_000_003)).unwrap();
    }
}
