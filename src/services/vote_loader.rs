use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    error::VoteError,
    models::{Caller, VoteDirection},
    services::vote_store::VoteStore,
};

/// Per-request cache of one viewer's votes, filled in batches.
///
/// Build one per inbound request and let it drop with the request.
pub struct VoteStatusLoader<'a, S: ?Sized> {
    store: &'a S,
    viewer: Option<Uuid>,
    cache: HashMap<Uuid, Option<VoteDirection>>,
}

impl<'a, S: VoteStore + ?Sized> VoteStatusLoader<'a, S> {
    pub fn new(store: &'a S, viewer: Caller) -> Self {
        Self {
            store,
            viewer: viewer.user_id(),
            cache: HashMap::new(),
        }
    }

    /// The viewer's direction for each id, in input order.
    pub async fn load_many(
        &mut self,
        target_ids: &[Uuid],
    ) -> Result<Vec<Option<VoteDirection>>, VoteError> {
        let Some(user_id) = self.viewer else {
            return Ok(vec![None; target_ids.len()]);
        };

        let mut missing: Vec<Uuid> = target_ids
            .iter()
            .copied()
            .filter(|id| !self.cache.contains_key(id))
            .collect();
        missing.sort_unstable();
        missing.dedup();

        if !missing.is_empty() {
            let votes = self.store.find_votes(user_id, &missing).await?;
            for id in missing {
                self.cache.insert(id, None);
            }
            for vote in votes {
                self.cache.insert(vote.target_id, Some(vote.direction));
            }
        }

        Ok(target_ids
            .iter()
            .map(|id| self.cache.get(id).copied().flatten())
            .collect())
    }

    pub async fn load(&mut self, target_id: Uuid) -> Result<Option<VoteDirection>, VoteError> {
        Ok(self.load_many(&[target_id]).await?.pop().flatten())
    }
}
