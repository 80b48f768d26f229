//! Verify-ticket history.
//!
//! The vendor rotates the verify ticket roughly every 10 minutes. Delivery
//! and clock races mean the component-token endpoint sometimes only accepts
//! the previous value, so the two most recent tickets are kept per identity
//! as an ordered fallback pair.

use crate::error::AppError;
use crate::models::Ticket;
use crate::store::{namespaces, CredentialStore};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const CAPACITY: usize = 2;

/// Stored wrapper; keeps the persisted value a document rather than a bare
/// array.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TicketHistory {
    tickets: Vec<Ticket>,
}

/// Bounded newest-first ticket history over the CredentialStore.
#[derive(Clone)]
pub struct TicketRing {
    store: CredentialStore,
}

impl TicketRing {
    pub fn new(store: CredentialStore) -> Self {
        Self { store }
    }

    /// Prepend a ticket for the identity, evicting beyond capacity.
    /// Returns the resulting history, newest first.
    pub async fn push(&self, identity: &str, ticket: Ticket) -> Result<Vec<Ticket>, AppError> {
        let mut ring: VecDeque<Ticket> = self.list(identity).await?.into();
        ring.push_front(ticket);
        while ring.len() > CAPACITY {
            ring.pop_back();
        }

        let tickets: Vec<Ticket> = ring.into();
        self.store
            .set(
                namespaces::COMPONENT_TICKETS,
                identity,
                &TicketHistory {
                    tickets: tickets.clone(),
                },
            )
            .await?;
        Ok(tickets)
    }

    /// Tickets for the identity, newest first, length 0–2.
    pub async fn list(&self, identity: &str) -> Result<Vec<Ticket>, AppError> {
        Ok(self
            .store
            .get::<TicketHistory>(namespaces::COMPONENT_TICKETS, identity)
            .await?
            .map(|history| history.tickets)
            .unwrap_or_default())
    }
}
