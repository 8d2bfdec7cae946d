use shared::{
    domain::{Award, AwardDraft, AwardId, Demo, DemoDraft, DemoId, EventId},
    error::ApiError,
};
use storage::{OrderedCollection, OrderedKind};
use tracing::info;

use crate::{republish, require_name, retry_on_conflict, store, ApiContext};

pub async fn list_demos(ctx: &ApiContext, event_id: EventId) -> Result<Vec<Demo>, ApiError> {
    list(ctx, &ctx.storage.demos(), event_id).await
}

pub async fn create_demo(
    ctx: &ApiContext,
    event_id: EventId,
    draft: &DemoDraft,
) -> Result<Demo, ApiError> {
    require_name(&draft.name)?;
    append(&ctx.storage.demos(), event_id, draft).await
}

pub async fn update_demo(
    ctx: &ApiContext,
    demo_id: DemoId,
    draft: &DemoDraft,
) -> Result<Demo, ApiError> {
    require_name(&draft.name)?;
    ctx.storage
        .demos()
        .update(demo_id, draft)
        .await
        .map_err(store)
}

pub async fn move_demo(ctx: &ApiContext, demo_id: DemoId, index: i64) -> Result<Demo, ApiError> {
    move_item(&ctx.storage.demos(), demo_id, index).await
}

/// Deletes the demo. Votes for it become retracted and the event's current
/// demo is cleared if it was this one.
pub async fn delete_demo(ctx: &ApiContext, demo_id: DemoId) -> Result<Demo, ApiError> {
    remove(ctx, &ctx.storage.demos(), demo_id).await
}

pub async fn replace_demos(
    ctx: &ApiContext,
    event_id: EventId,
    drafts: &[DemoDraft],
) -> Result<Vec<Demo>, ApiError> {
    for draft in drafts {
        require_name(&draft.name)?;
    }
    replace(ctx, &ctx.storage.demos(), event_id, drafts).await
}

pub async fn list_awards(ctx: &ApiContext, event_id: EventId) -> Result<Vec<Award>, ApiError> {
    list(ctx, &ctx.storage.awards(), event_id).await
}

pub async fn create_award(
    ctx: &ApiContext,
    event_id: EventId,
    draft: &AwardDraft,
) -> Result<Award, ApiError> {
    require_name(&draft.name)?;
    append(&ctx.storage.awards(), event_id, draft).await
}

pub async fn update_award(
    ctx: &ApiContext,
    award_id: AwardId,
    draft: &AwardDraft,
) -> Result<Award, ApiError> {
    require_name(&draft.name)?;
    ctx.storage
        .awards()
        .update(award_id, draft)
        .await
        .map_err(store)
}

pub async fn move_award(
    ctx: &ApiContext,
    award_id: AwardId,
    index: i64,
) -> Result<Award, ApiError> {
    move_item(&ctx.storage.awards(), award_id, index).await
}

/// Deletes the award with its votes. A reveal pointer on it is cleared.
pub async fn delete_award(ctx: &ApiContext, award_id: AwardId) -> Result<Award, ApiError> {
    remove(ctx, &ctx.storage.awards(), award_id).await
}

pub async fn replace_awards(
    ctx: &ApiContext,
    event_id: EventId,
    drafts: &[AwardDraft],
) -> Result<Vec<Award>, ApiError> {
    for draft in drafts {
        require_name(&draft.name)?;
    }
    replace(ctx, &ctx.storage.awards(), event_id, drafts).await
}

async fn list<K: OrderedKind>(
    ctx: &ApiContext,
    items: &OrderedCollection<K>,
    event_id: EventId,
) -> Result<Vec<K::Item>, ApiError> {
    ctx.storage.require_event(event_id).await.map_err(store)?;
    items.list(event_id).await.map_err(store)
}

async fn append<K: OrderedKind>(
    items: &OrderedCollection<K>,
    event_id: EventId,
    draft: &K::Draft,
) -> Result<K::Item, ApiError> {
    retry_on_conflict(move || items.append(event_id, draft))
        .await
        .map_err(store)
}

async fn move_item<K: OrderedKind>(
    items: &OrderedCollection<K>,
    id: K::Id,
    index: i64,
) -> Result<K::Item, ApiError> {
    retry_on_conflict(move || items.move_to(id, index))
        .await
        .map_err(store)
}

async fn remove<K: OrderedKind>(
    ctx: &ApiContext,
    items: &OrderedCollection<K>,
    id: K::Id,
) -> Result<K::Item, ApiError> {
    let item = retry_on_conflict(move || items.remove(id))
        .await
        .map_err(store)?;
    let event_id = K::event_of(&item);
    info!(kind = K::KIND, id = K::raw_id(id), %event_id, "item deleted");
    republish(ctx, event_id).await?;
    Ok(item)
}

async fn replace<K: OrderedKind>(
    ctx: &ApiContext,
    items: &OrderedCollection<K>,
    event_id: EventId,
    drafts: &[K::Draft],
) -> Result<Vec<K::Item>, ApiError> {
    let replaced = retry_on_conflict(move || items.replace_all(event_id, drafts))
        .await
        .map_err(store)?;
    info!(kind = K::KIND, %event_id, count = replaced.len(), "items replaced");
    republish(ctx, event_id).await?;
    Ok(replaced)
}
