use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

fn validate_listing(new: &NewListing) -> Result<u32, EngineError> {
    if new.title.trim().is_empty() || new.description.trim().is_empty() {
        return Err(EngineError::InvalidOperation("title and description are required"));
    }
    if new.title.len() > MAX_TITLE_LEN {
        return Err(EngineError::LimitExceeded("title too long"));
    }
    if new.description.len() > MAX_DESCRIPTION_LEN {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    let duration = new.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
    if duration == 0 || duration > MAX_DURATION_MINUTES {
        return Err(EngineError::LimitExceeded("duration out of range"));
    }
    Ok(duration)
}

impl Engine {
    pub async fn create_listing(
        &self,
        id: Ulid,
        teacher_id: Ulid,
        new: NewListing,
    ) -> Result<Listing, EngineError> {
        let duration_minutes = validate_listing(&new)?;
        if self.store.get_account(&teacher_id).is_none() {
            return Err(EngineError::NotFound(teacher_id));
        }
        if self.store.listing_count_for(&teacher_id) >= MAX_LISTINGS_PER_TEACHER {
            return Err(EngineError::LimitExceeded("too many listings"));
        }
        if self.store.get_listing(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }

        let listing = Listing {
            id,
            teacher_id,
            title: new.title.trim().to_string(),
            description: new.description.trim().to_string(),
            category: new.category,
            duration_minutes,
            created_at: now_ms(),
        };
        {
            let _gate = self.write_gate().await;
            self.journal
                .append(&Event::ListingCreated(listing.clone()))
                .await?;
            self.store.insert_listing(listing.clone());
        }

        info!("listing {id} created by {teacher_id}");
        Ok(listing)
    }

    /// Only the owning teacher may delete. Existing transactions keep their
    /// reference to the deleted id.
    pub async fn delete_listing(&self, id: Ulid, requester: Ulid) -> Result<(), EngineError> {
        let listing = self.store.get_listing(&id).ok_or(EngineError::NotFound(id))?;
        if listing.teacher_id != requester {
            return Err(EngineError::Unauthorized(requester));
        }

        let gate = self.write_gate().await;
        // The removal itself decides which of two racing deletes wins.
        let Some(listing) = self.store.remove_listing(&id) else {
            return Err(EngineError::NotFound(id));
        };
        let event = Event::ListingDeleted {
            id,
            teacher_id: listing.teacher_id,
        };
        if let Err(e) = self.journal.append(&event).await {
            self.store.insert_listing(listing);
            return Err(e);
        }
        drop(gate);

        info!("listing {id} deleted");
        Ok(())
    }

    pub fn listing(&self, id: Ulid) -> Option<Listing> {
        self.store.get_listing(&id)
    }

    /// All listings, newest first.
    pub fn listings(&self) -> Vec<Listing> {
        let mut all = self.store.all_listings();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        all
    }

    pub fn listings_by_teacher(&self, teacher_id: Ulid) -> Vec<Listing> {
        self.store.listings_for(&teacher_id)
    }
}
