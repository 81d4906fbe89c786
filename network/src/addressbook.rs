//! Peer address book: ban bookkeeping and candidate selection for the
//! dial loop (spec.md §4.8, "Lifecycle summary").
//!
//! Wraps [`thunderbolt_storage::MetaView`] — the address book has no state
//! of its own beyond the embedded metadata store's `'a'` prefix.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::seq::SliceRandom;

use thunderbolt_core::model::{NetworkAddress, NetworkAddressMetadata};
use thunderbolt_storage::{MetaView, MetadataStore};

use crate::params::{ADDRESS_RETENTION, BAN_DURATION_SECS};

pub struct AddressBook<S: MetadataStore + ?Sized> {
    view: MetaView<S>,
}

impl<S: MetadataStore + ?Sized> Clone for AddressBook<S> {
    fn clone(&self) -> Self {
        Self { view: self.view.clone() }
    }
}

impl<S: MetadataStore + ?Sized> AddressBook<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { view: MetaView::new(store) }
    }

    /// Records (or refreshes) a gossiped or handshaked address.
    pub fn observe(&self, addr: NetworkAddress) -> thunderbolt_storage::Result<()> {
        let now = unix_now();
        let existing = self.view.get_address(&addr.ip)?;
        let meta = match existing {
            Some(mut m) => {
                m.last_seen = now;
                m.addr = addr;
                m
            }
            None => NetworkAddressMetadata::fresh(addr, now),
        };
        self.view.put_address(&meta)
    }

    /// Applies spec.md §4.7's ban consequence: mark banned, set a 24h
    /// expiry from now.
    pub fn ban(&self, addr: &NetworkAddress) -> thunderbolt_storage::Result<()> {
        let now = unix_now();
        let mut meta = self.view.get_address(&addr.ip)?.unwrap_or_else(|| NetworkAddressMetadata::fresh(*addr, now));
        meta.is_banned = true;
        meta.ban_expiry = now + BAN_DURATION_SECS;
        self.view.put_address(&meta)
    }

    /// Lifts a ban immediately, regardless of its expiry (spec.md §6 CLI
    /// `unbanPeer`).
    pub fn unban(&self, addr: &NetworkAddress) -> thunderbolt_storage::Result<bool> {
        match self.view.get_address(&addr.ip)? {
            Some(mut meta) if meta.is_banned => {
                meta.is_banned = false;
                meta.ban_expiry = 0;
                self.view.put_address(&meta)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Every address currently carrying an unexpired ban (spec.md §6 CLI
    /// `listBannedPeers`).
    pub fn banned(&self) -> thunderbolt_storage::Result<Vec<NetworkAddressMetadata>> {
        let now = unix_now();
        Ok(self.view.scan_addresses()?.into_iter().filter(|m| m.is_banned && m.ban_expiry > now).collect())
    }

    /// True while `addr` carries an unexpired ban.
    pub fn is_banned(&self, addr: &NetworkAddress) -> thunderbolt_storage::Result<bool> {
        let now = unix_now();
        Ok(match self.view.get_address(&addr.ip)? {
            Some(meta) => meta.is_banned && meta.ban_expiry > now,
            None => false,
        })
    }

    /// Up to `count` unbanned addresses, chosen at random, for the dial
    /// loop to try (spec.md §4.8: "select up to 5·MAX_PEERS candidates").
    pub fn sample(&self, count: usize) -> thunderbolt_storage::Result<Vec<NetworkAddress>> {
        let now = unix_now();
        let mut candidates: Vec<NetworkAddress> = self
            .view
            .scan_addresses()?
            .into_iter()
            .filter(|m| !(m.is_banned && m.ban_expiry > now))
            .map(|m| m.addr)
            .collect();
        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(count);
        Ok(candidates)
    }

    /// Drops entries unseen for longer than [`ADDRESS_RETENTION`] and
    /// lifts expired bans (spec.md's periodic `cleanUp()`).
    pub fn clean_up(&self) -> thunderbolt_storage::Result<usize> {
        let now = unix_now();
        let retention = ADDRESS_RETENTION.as_secs() as u32;
        let mut dropped = 0;
        for mut meta in self.view.scan_addresses()? {
            if meta.is_banned && meta.ban_expiry <= now {
                meta.is_banned = false;
                meta.ban_expiry = 0;
            }
            if now.saturating_sub(meta.last_seen) > retention {
                self.view.delete_address(&meta.addr.ip)?;
                dropped += 1;
            } else {
                self.view.put_address(&meta)?;
            }
        }
        Ok(dropped)
    }
}

fn unix_now() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0)
}
