use super::channel::{Channel, ChannelError};
use crate::DbPool;
use diesel::prelude::*;

type PooledConn = diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<SqliteConnection>>;

/// Load/save for [`Channel`] rows.
///
/// Every call checks out its own connection and returns it before the caller
/// goes back to the network.
#[derive(Clone)]
pub struct ChannelRepository {
    pool: DbPool,
}

impl ChannelRepository {
    pub fn new(pool: DbPool) -> Self {
        ChannelRepository { pool }
    }

    fn conn(&self) -> Result<PooledConn, ChannelError> {
        Ok(self.pool.get()?)
    }

    pub fn find(&self, channel_id: &str) -> Result<Option<Channel>, ChannelError> {
        use crate::schema::channels::dsl::channels;
        let mut conn = self.conn()?;
        let channel = channels
            .find(channel_id)
            .select(Channel::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(channel)
    }

    pub fn get(&self, channel_id: &str) -> Result<Channel, ChannelError> {
        self.find(channel_id)?
            .ok_or_else(|| ChannelError::NotFound(channel_id.to_string()))
    }

    pub fn all(&self) -> Result<Vec<Channel>, ChannelError> {
        use crate::schema::channels::dsl::{channels, created_at, id};
        let mut conn = self.conn()?;
        let rows = channels
            .order((created_at.asc(), id.asc()))
            .select(Channel::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    pub fn active_ids(&self) -> Result<Vec<String>, ChannelError> {
        use crate::schema::channels::dsl::{active, channels, id};
        let mut conn = self.conn()?;
        let ids = channels
            .filter(active.eq(true))
            .select(id)
            .load::<String>(&mut conn)?;
        Ok(ids)
    }

    /// Insert a fresh row. Returns `false` when the id is already taken.
    pub fn insert(&self, channel: &Channel) -> Result<bool, ChannelError> {
        use crate::schema::channels::dsl::channels;
        let mut conn = self.conn()?;
        let inserted = diesel::insert_or_ignore_into(channels)
            .values(channel)
            .execute(&mut conn)?;
        Ok(inserted == 1)
    }

    /// Persist the lease related columns of a channel.
    pub fn save_hub_state(&self, channel: &Channel) -> Result<(), ChannelError> {
        use crate::schema::channels::dsl::*;
        let mut conn = self.conn()?;
        let updated = diesel::update(channels.find(&channel.id))
            .set((
                active.eq(channel.active),
                hub_info.eq(channel.hub_info().cloned()),
                subscribe_timestamp.eq(channel.subscribe_timestamp),
                unsubscribe_timestamp.eq(channel.unsubscribe_timestamp),
            ))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(ChannelError::NotFound(channel.id.clone()));
        }
        Ok(())
    }

    pub fn save_metadata(&self, channel: &Channel) -> Result<(), ChannelError> {
        use crate::schema::channels::dsl::*;
        let mut conn = self.conn()?;
        let updated = diesel::update(channels.find(&channel.id))
            .set((name.eq(&channel.name), infos.eq(&channel.infos)))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(ChannelError::NotFound(channel.id.clone()));
        }
        Ok(())
    }

    /// Remove a bare channel row, used to roll back a failed creation.
    pub fn remove(&self, channel_id: &str) -> Result<bool, ChannelError> {
        use crate::schema::channels::dsl::channels;
        let mut conn = self.conn()?;
        let deleted = diesel::delete(channels.find(channel_id)).execute(&mut conn)?;
        Ok(deleted > 0)
    }

    /// Remove a channel together with its videos and callback log.
    pub fn remove_with_history(&self, channel_id: &str) -> Result<bool, ChannelError> {
        use crate::schema::{callbacks, channels, videos};
        let mut conn = self.conn()?;
        let deleted = conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(videos::table.filter(videos::channel_id.eq(channel_id)))
                .execute(conn)?;
            diesel::delete(callbacks::table.filter(callbacks::channel_id.eq(channel_id)))
                .execute(conn)?;
            diesel::delete(channels::table.find(channel_id)).execute(conn)
        })?;
        Ok(deleted > 0)
    }
}
