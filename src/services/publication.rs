//! Publication of the caller's own roles to a client-side cache.
//!
//! A signed-in caller receives exactly one document: their own id and roles
//! field. An anonymous caller receives a publication that is ready at once
//! and carries nothing.

use std::sync::Arc;

use tracing::instrument;

use crate::Result;
use crate::models::{FindOptions, Projection, UserFilter};
use crate::storage::{UserCursor, UserStore};

/// Supplies the id of the caller on whose behalf a request runs.
pub trait IdentityProvider: Send + Sync {
    /// Returns the signed-in caller's id, or `None` when anonymous.
    fn current_user_id(&self) -> Option<String>;
}

/// Result of publishing roles for a caller.
#[derive(Debug)]
pub enum Publication {
    /// Complete with zero documents.
    Ready,
    /// The caller's own record, reduced to id and roles.
    Documents(UserCursor),
}

impl Publication {
    /// Returns `true` when nothing is published.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Drains the published documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails while the cursor is read.
    pub fn into_documents(self) -> Result<Vec<crate::models::UserRecord>> {
        match self {
            Self::Ready => Ok(Vec::new()),
            Self::Documents(cursor) => Ok(cursor.fetch()?),
        }
    }
}

/// Named publication exposing a caller's roles.
pub struct RolesPublication {
    store: Arc<dyn UserStore>,
}

impl RolesPublication {
    /// Publication name clients subscribe to.
    pub const NAME: &'static str = "_roles";

    /// Creates a publication over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Publishes the roles of `caller_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    #[instrument(skip(self), fields(publication = RolesPublication::NAME))]
    pub fn publish(&self, caller_id: Option<&str>) -> Result<Publication> {
        let Some(caller_id) = caller_id.filter(|id| !id.is_empty()) else {
            tracing::debug!("No signed-in caller, publication ready");
            return Ok(Publication::Ready);
        };

        let options = FindOptions::default().with_projection(Projection::Roles);
        let cursor = self.store.find(&UserFilter::by_id(caller_id), &options)?;
        Ok(Publication::Documents(cursor))
    }

    /// Publishes the roles of whoever `identity` reports as signed in.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn publish_current(&self, identity: &dyn IdentityProvider) -> Result<Publication> {
        self.publish(identity.current_user_id().as_deref())
    }
}
