// Multicast group membership at the hardware filter level

use heapless::Vec as BoundedVec;

use crate::backend::{MulticastError, PacketBackend, ReceiveMode};
use crate::error::LinkError;
use crate::types::LinkAddress;

/// Most filter entries any supported back-end can hold.
pub const MAX_MCAST_GROUPS: usize = 20;

/// A bounded multicast filter list as exchanged with back-ends.
pub type McastList = BoundedVec<LinkAddress, MAX_MCAST_GROUPS>;

/// Tracks which groups upper layers asked for.
///
/// The logical membership set is kept even after the back-end has been
/// demoted to a coarser receive mode, so a later reconciliation pass can
/// prune the filter back down. The demotion itself is never undone here.
pub struct MulticastMembership {
    groups: McastList,
}

impl MulticastMembership {
    pub fn new() -> Self {
        Self {
            groups: BoundedVec::new(),
        }
    }

    /// Groups upper layers are logically joined to.
    pub fn groups(&self) -> &[LinkAddress] {
        &self.groups
    }

    /// Join a multicast group at the physical layer.
    ///
    /// Succeeds trivially when the back-end already receives all
    /// multicast traffic. When the filter is full or missing, membership
    /// degrades permanently to [`ReceiveMode::AllMulticast`] instead of
    /// failing the caller.
    pub fn join(
        &mut self,
        backend: &mut dyn PacketBackend,
        addr: &LinkAddress,
    ) -> Result<(), LinkError> {
        if !self.groups.contains(addr) {
            let _ = self.groups.push(*addr);
        }

        let mode = backend.receive_mode();
        if mode >= ReceiveMode::AllMulticast {
            return Ok(());
        }

        if mode < ReceiveMode::MulticastList && !backend.set_receive_mode(ReceiveMode::MulticastList)
        {
            if backend.set_receive_mode(ReceiveMode::Promiscuous) {
                return Ok(());
            }
            return Err(LinkError::Backend("no usable receive mode".into()));
        }

        let mut list = match backend.multicast_list() {
            Ok(list) => list,
            Err(MulticastError::NotSupported) => return degrade_to_all_multicast(backend),
            Err(_) => return Err(LinkError::Backend("multicast list fetch failed".into())),
        };

        if list.contains(addr) {
            return Ok(());
        }
        if list.push(*addr).is_err() {
            return degrade_to_all_multicast(backend);
        }

        match backend.set_multicast_list(&list) {
            Ok(()) => Ok(()),
            Err(MulticastError::NoSpace) | Err(MulticastError::NotSupported) => {
                degrade_to_all_multicast(backend)
            }
            Err(MulticastError::Backend) => {
                Err(LinkError::Backend("multicast list reprogram failed".into()))
            }
        }
    }

    /// Leave a multicast group at the physical layer.
    ///
    /// A no-op when the back-end receives all multicast traffic anyway;
    /// the mode is intentionally not downgraded when the filter list
    /// shrinks.
    pub fn leave(
        &mut self,
        backend: &mut dyn PacketBackend,
        addr: &LinkAddress,
    ) -> Result<(), LinkError> {
        if let Some(pos) = self.groups.iter().position(|g| g == addr) {
            self.groups.remove(pos);
        }

        if backend.receive_mode() >= ReceiveMode::AllMulticast {
            return Ok(());
        }

        let mut list = backend
            .multicast_list()
            .map_err(|_| LinkError::Backend("multicast list fetch failed".into()))?;

        match list.iter().position(|g| g == addr) {
            Some(pos) => {
                list.remove(pos);
            }
            // Not in the filter; nothing to reprogram.
            None => return Ok(()),
        }

        match backend.set_multicast_list(&list) {
            Ok(()) => Ok(()),
            Err(MulticastError::NoSpace) | Err(MulticastError::NotSupported) => {
                degrade_to_all_multicast(backend)
            }
            Err(MulticastError::Backend) => {
                Err(LinkError::Backend("multicast list reprogram failed".into()))
            }
        }
    }
}

impl Default for MulticastMembership {
    fn default() -> Self {
        Self::new()
    }
}

fn degrade_to_all_multicast(backend: &mut dyn PacketBackend) -> Result<(), LinkError> {
    if backend.set_receive_mode(ReceiveMode::AllMulticast) {
        log::debug!("multicast filter exhausted, receiving all multicast");
        Ok(())
    } else {
        Err(LinkError::Backend("all-multicast mode refused".into()))
    }
}
