use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::events::ChangeEvent;
use crate::schema::storefront_outbox;

use super::change_feed::ChangeFeed;
use super::models::{NewOutboxEventRow, OutboxEventRow};

/// Appends a change event to the outbox. Call it inside the transaction
/// that made the change so the event exists if and only if the change does.
pub fn record_change(conn: &mut PgConnection, event: &ChangeEvent) -> Result<(), DomainError> {
    let payload = serde_json::to_value(event)
        .map_err(|e| DomainError::MalformedRecord(format!("change event: {e}")))?;
    diesel::insert_into(storefront_outbox::table)
        .values(&NewOutboxEventRow {
            id: Uuid::new_v4(),
            aggregate_type: event.aggregate_type().to_string(),
            aggregate_id: event.aggregate_id().to_string(),
            event_type: event.event_type().to_string(),
            payload,
        })
        .execute(conn)?;
    Ok(())
}

pub fn decode_event(row: &OutboxEventRow) -> Result<ChangeEvent, DomainError> {
    serde_json::from_value(row.payload.clone())
        .map_err(|e| DomainError::MalformedRecord(format!("outbox row {}: {e}", row.id)))
}

/// Polls `storefront_outbox` and republishes new rows on the change feed.
///
/// Rows can become visible out of timestamp order when transactions commit
/// late, so every poll re-reads a short window behind the high-water mark and
/// skips the ids it already published.
#[derive(Debug)]
pub struct OutboxRelay {
    pool: DbPool,
    feed: ChangeFeed,
    high_water: DateTime<Utc>,
    seen: HashMap<Uuid, DateTime<Utc>>,
    lookback: Duration,
    batch_size: i64,
}

impl OutboxRelay {
    /// Starts relaying from the current head; older rows are history.
    pub fn starting_at_head(pool: DbPool, feed: ChangeFeed) -> Result<Self, DomainError> {
        let mut conn = pool.get()?;
        let head: Option<DateTime<Utc>> = storefront_outbox::table
            .select(diesel::dsl::max(storefront_outbox::created_at))
            .first(&mut conn)?;
        Ok(Self {
            pool,
            feed,
            high_water: head.unwrap_or_else(Utc::now),
            seen: HashMap::new(),
            lookback: Duration::seconds(5),
            batch_size: 500,
        })
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Publishes every unseen row and returns how many went out.
    ///
    /// Pages through the look-back window by `(created_at, id)`, so a burst
    /// larger than one batch is drained in a single poll.
    pub fn poll_once(&mut self) -> Result<usize, DomainError> {
        let mut conn = self.pool.get()?;
        let since = self.high_water - self.lookback;
        let mut after: Option<(DateTime<Utc>, Uuid)> = None;
        let mut published = 0;

        loop {
            let mut query = storefront_outbox::table
                .select(OutboxEventRow::as_select())
                .filter(storefront_outbox::created_at.gt(since))
                .into_boxed();
            if let Some((at, id)) = after {
                query = query.filter(
                    storefront_outbox::created_at.gt(at).or(storefront_outbox::created_at
                        .eq(at)
                        .and(storefront_outbox::id.gt(id))),
                );
            }
            let rows = query
                .order((storefront_outbox::created_at.asc(), storefront_outbox::id.asc()))
                .limit(self.batch_size)
                .load(&mut conn)?;

            let full_page = rows.len() as i64 >= self.batch_size;
            after = rows.last().map(|row| (row.created_at, row.id));
            for row in rows {
                if self.relay(row) {
                    published += 1;
                }
            }
            if !full_page {
                break;
            }
        }

        let horizon = self.high_water - self.lookback;
        self.seen.retain(|_, created_at| *created_at > horizon);
        Ok(published)
    }

    fn relay(&mut self, row: OutboxEventRow) -> bool {
        if self.seen.contains_key(&row.id) {
            return false;
        }
        self.seen.insert(row.id, row.created_at);
        if row.created_at > self.high_water {
            self.high_water = row.created_at;
        }
        match decode_event(&row) {
            Ok(event) => {
                log::debug!("relaying {} for {}", row.event_type, row.aggregate_id);
                self.feed.publish(event);
                true
            }
            Err(e) => {
                log::warn!("skipping outbox row: {e}");
                false
            }
        }
    }

    pub async fn run(self, every: std::time::Duration) {
        let mut relay = self;
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let outcome = tokio::task::spawn_blocking(move || {
                let result = relay.poll_once();
                (relay, result)
            })
            .await;
            match outcome {
                Ok((back, result)) => {
                    relay = back;
                    if let Err(e) = result {
                        log::error!("outbox poll failed: {e}");
                    }
                }
                Err(e) => {
                    log::error!("outbox relay stopped: {e}");
                    return;
                }
            }
        }
    }
}
