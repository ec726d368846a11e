use crate::schema::*;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// A user's interest in a channel.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, PartialEq)]
#[diesel(table_name = subscriptions)]
pub struct Subscription {
    pub id: i32,
    pub user_id: i32,
    pub channel_id: String,
    /// Free-form per-user JSON preferences
    pub preferences: String,
    pub created_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct NewSubscription {
    pub user_id: i32,
    pub channel_id: String,
    pub preferences: String,
    pub created_at: i64,
}

impl NewSubscription {
    pub fn insert(&self, conn: &mut SqliteConnection) -> Result<Subscription, diesel::result::Error> {
        use crate::schema::subscriptions::dsl::*;
        match diesel::insert_into(subscriptions)
            .values(self)
            .returning(Subscription::as_returning())
            .get_result(conn)
        {
            Ok(subscription) => Ok(subscription),
            Err(e) => {
                log::warn!("Error inserting subscription: {:?}", e);
                Err(e)
            }
        }
    }
}

impl Subscription {
    pub fn get_for_user(
        conn: &mut SqliteConnection,
        user: i32,
    ) -> Result<Vec<Subscription>, diesel::result::Error> {
        use crate::schema::subscriptions::dsl::{created_at, subscriptions, user_id};
        subscriptions
            .filter(user_id.eq(user))
            .order(created_at.asc())
            .select(Subscription::as_select())
            .load(conn)
    }

    pub fn get_for_user_and_channel(
        conn: &mut SqliteConnection,
        user: i32,
        channel: &str,
    ) -> Result<Option<Subscription>, diesel::result::Error> {
        use crate::schema::subscriptions::dsl::{channel_id, subscriptions, user_id};
        subscriptions
            .filter(user_id.eq(user))
            .filter(channel_id.eq(channel))
            .select(Subscription::as_select())
            .first(conn)
            .optional()
    }

    pub fn count_for_channel(
        conn: &mut SqliteConnection,
        channel: &str,
    ) -> Result<i64, diesel::result::Error> {
        use crate::schema::subscriptions::dsl::{channel_id, subscriptions};
        subscriptions
            .filter(channel_id.eq(channel))
            .count()
            .get_result(conn)
    }

    pub fn delete(
        conn: &mut SqliteConnection,
        user: i32,
        channel: &str,
    ) -> Result<bool, diesel::result::Error> {
        use crate::schema::subscriptions::dsl::{channel_id, subscriptions, user_id};
        let deleted = diesel::delete(
            subscriptions
                .filter(user_id.eq(user))
                .filter(channel_id.eq(channel)),
        )
        .execute(conn)?;
        Ok(deleted > 0)
    }
}
