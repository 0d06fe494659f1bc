// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the per-connection prepared statement registry.

use crate::frame::{
    ColumnSpec,
    PreparedResult,
};
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        RwLock,
    },
};
use tokio::sync::broadcast;

/// A statement prepared on this connection. The id is the opaque bytes the
/// server assigned; it is swapped in place when the statement is re-prepared
/// after an UNPREPARED error, so every holder of the handle sees the fresh id.
#[derive(Debug)]
pub struct PreparedStatement {
    keyspace: Option<String>,
    statement: String,
    state: RwLock<PreparedState>,
}

#[derive(Debug)]
struct PreparedState {
    id: Vec<u8>,
    pk_indexes: Vec<u16>,
    bind_specs: Option<Vec<ColumnSpec>>,
    result_specs: Option<Vec<ColumnSpec>>,
}

impl PreparedStatement {
    pub(super) fn new(keyspace: Option<String>, statement: String, result: &PreparedResult) -> Self {
        Self {
            keyspace,
            statement,
            state: RwLock::new(PreparedState::from(result)),
        }
    }

    /// Get the keyspace this statement was prepared against, if any.
    pub fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    /// Get the statement text.
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Get the current server-assigned id.
    pub fn id(&self) -> Vec<u8> {
        self.state.read().expect("Prepared state lock poisoned").id.clone()
    }

    /// Get the indices of the partition key columns within the bind parameters.
    pub fn pk_indexes(&self) -> Vec<u16> {
        self.state
            .read()
            .expect("Prepared state lock poisoned")
            .pk_indexes
            .clone()
    }

    /// Get the bind-parameter column specs, if the server provided them.
    pub fn bind_specs(&self) -> Option<Vec<ColumnSpec>> {
        self.state
            .read()
            .expect("Prepared state lock poisoned")
            .bind_specs
            .clone()
    }

    /// Get the result column specs, if the server provided them.
    pub fn result_specs(&self) -> Option<Vec<ColumnSpec>> {
        self.state
            .read()
            .expect("Prepared state lock poisoned")
            .result_specs
            .clone()
    }

    /// Replace the descriptor atomically, e.g. after a re-prepare.
    pub(super) fn update(&self, result: &PreparedResult) {
        *self.state.write().expect("Prepared state lock poisoned") = PreparedState::from(result);
    }
}

impl From<&PreparedResult> for PreparedState {
    fn from(result: &PreparedResult) -> Self {
        Self {
            id: result.id().to_vec(),
            pk_indexes: result.metadata().pk_indexes().to_vec(),
            bind_specs: result.metadata().column_specs().clone(),
            result_specs: result
                .result_metadata()
                .as_ref()
                .and_then(|m| m.column_specs().clone()),
        }
    }
}

type RegistryKey = (Option<String>, String);

enum Entry {
    /// The statement is prepared and usable.
    Ready(Arc<PreparedStatement>),
    /// A prepare round-trip is in progress; subscribers await its outcome.
    Pending(broadcast::Sender<Arc<PreparedStatement>>),
}

/// What a caller should do after asking the registry for a statement.
pub(super) enum Lookup {
    /// The statement is cached.
    Ready(Arc<PreparedStatement>),
    /// Another caller is preparing it right now; await this receiver. A
    /// receive error means that prepare failed, ask the registry again.
    Wait(broadcast::Receiver<Arc<PreparedStatement>>),
    /// The caller holds the prepare ticket and must perform the round-trip,
    /// then call `complete` or `abort`.
    Prepare,
}

/// The per-connection cache of prepared statements, keyed by keyspace and
/// statement text. Entries never expire. Concurrent prepares of the same key
/// coalesce onto one round-trip.
#[derive(Default)]
pub(super) struct PreparedRegistry {
    entries: Mutex<HashMap<RegistryKey, Entry>>,
}

impl PreparedRegistry {
    /// Look up a statement, atomically claiming the prepare ticket when it is
    /// absent.
    pub(super) fn lookup(&self, keyspace: Option<&str>, statement: &str) -> Lookup {
        let key = (keyspace.map(ToOwned::to_owned), statement.to_owned());
        let mut entries = self.entries.lock().expect("Prepared registry lock poisoned");
        match entries.get(&key) {
            Some(Entry::Ready(prepared)) => Lookup::Ready(prepared.clone()),
            Some(Entry::Pending(tx)) => Lookup::Wait(tx.subscribe()),
            None => {
                let (tx, _) = broadcast::channel(1);
                entries.insert(key, Entry::Pending(tx));
                Lookup::Prepare
            }
        }
    }

    /// Publish a freshly prepared statement, waking coalesced waiters.
    pub(super) fn complete(
        &self,
        keyspace: Option<&str>,
        statement: &str,
        result: &PreparedResult,
    ) -> Arc<PreparedStatement> {
        let key = (keyspace.map(ToOwned::to_owned), statement.to_owned());
        let prepared = Arc::new(PreparedStatement::new(
            key.0.clone(),
            statement.to_owned(),
            result,
        ));
        let mut entries = self.entries.lock().expect("Prepared registry lock poisoned");
        if let Some(Entry::Pending(tx)) = entries.insert(key, Entry::Ready(prepared.clone())) {
            let _ = tx.send(prepared.clone());
        }
        prepared
    }

    /// Drop a pending entry after a failed prepare; waiters observe the closed
    /// channel and retry.
    pub(super) fn abort(&self, keyspace: Option<&str>, statement: &str) {
        let key = (keyspace.map(ToOwned::to_owned), statement.to_owned());
        let mut entries = self.entries.lock().expect("Prepared registry lock poisoned");
        if matches!(entries.get(&key), Some(Entry::Pending(_))) {
            entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{
        write_int,
        write_short_bytes,
        FromPayload,
    };

    fn prepared_result(id: &[u8]) -> PreparedResult {
        let mut payload = Vec::new();
        write_short_bytes(id, &mut payload);
        // bind metadata with no columns and no pks
        write_int(0, &mut payload);
        write_int(0, &mut payload);
        write_int(0, &mut payload);
        // result metadata with no columns
        write_int(0, &mut payload);
        write_int(0, &mut payload);
        PreparedResult::from_payload(&mut 0, &payload).unwrap()
    }

    #[test]
    fn lookup_claims_the_prepare_ticket_once() {
        let registry = PreparedRegistry::default();
        assert!(matches!(registry.lookup(None, "SELECT 1"), Lookup::Prepare));
        assert!(matches!(registry.lookup(None, "SELECT 1"), Lookup::Wait(_)));
        let prepared = registry.complete(None, "SELECT 1", &prepared_result(&[1]));
        assert_eq!(prepared.id(), vec![1]);
        assert!(matches!(registry.lookup(None, "SELECT 1"), Lookup::Ready(_)));
    }

    #[test]
    fn abort_releases_the_ticket() {
        let registry = PreparedRegistry::default();
        assert!(matches!(registry.lookup(None, "SELECT 1"), Lookup::Prepare));
        registry.abort(None, "SELECT 1");
        assert!(matches!(registry.lookup(None, "SELECT 1"), Lookup::Prepare));
    }

    #[tokio::test]
    async fn coalesced_waiters_receive_the_statement() {
        let registry = Arc::new(PreparedRegistry::default());
        assert!(matches!(registry.lookup(None, "SELECT 1"), Lookup::Prepare));
        let mut rx = match registry.lookup(None, "SELECT 1") {
            Lookup::Wait(rx) => rx,
            _ => panic!("Expected a pending entry"),
        };
        let registry2 = registry.clone();
        let publisher = tokio::spawn(async move {
            registry2.complete(None, "SELECT 1", &prepared_result(&[7, 7]));
        });
        let prepared = rx.recv().await.unwrap();
        assert_eq!(prepared.id(), vec![7, 7]);
        publisher.await.unwrap();
    }

    #[test]
    fn update_swaps_the_id_in_place() {
        let registry = PreparedRegistry::default();
        let _ = registry.lookup(None, "SELECT 1");
        let prepared = registry.complete(None, "SELECT 1", &prepared_result(&[1]));
        prepared.update(&prepared_result(&[2]));
        assert_eq!(prepared.id(), vec![2]);
        // the cached entry is the same Arc, so it sees the swap too
        match registry.lookup(None, "SELECT 1") {
            Lookup::Ready(cached) => assert_eq!(cached.id(), vec![2]),
            _ => panic!("Expected a ready entry"),
        }
    }
}
