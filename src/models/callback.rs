use crate::schema::*;
use diesel::{
    backend::Backend,
    deserialize::{self, FromSql, FromSqlRow},
    dsl::min,
    prelude::*,
    serialize::{self, Output, ToSql},
    sql_types::Integer,
    AsExpression,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Append-only log row. Never updated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, PartialEq)]
#[diesel(table_name = callbacks)]
pub struct Callback {
    pub id: i32,
    pub channel_id: String,
    pub action: CallbackAction,
    pub received_at: i64,
    pub details: Option<String>,
    /// Set for hub notifications that named a video.
    pub video_id: Option<String>,
}

#[repr(i32)]
#[derive(Debug, Serialize, Deserialize, AsExpression, Clone, Copy, FromSqlRow, PartialEq, Eq)]
#[diesel(sql_type=Integer)]
#[serde(rename_all = "snake_case")]
pub enum CallbackAction {
    HubNotification = 0,
    Subscribe = 1,
    Unsubscribe = 2,
    Renew = 3,
    HubInfoRefresh = 4,
    /// Verification of intent handshake from the hub.
    Verification = 5,
}

impl fmt::Display for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::HubNotification => write!(f, "Hub Notification"),
            CallbackAction::Subscribe => write!(f, "Subscribe"),
            CallbackAction::Unsubscribe => write!(f, "Unsubscribe"),
            CallbackAction::Renew => write!(f, "Renew"),
            CallbackAction::HubInfoRefresh => write!(f, "Hub Info Refresh"),
            CallbackAction::Verification => write!(f, "Verification"),
        }
    }
}

impl<DB> FromSql<Integer, DB> for CallbackAction
where
    DB: Backend,
    i32: FromSql<Integer, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
        match i32::from_sql(bytes)? {
            0 => Ok(CallbackAction::HubNotification),
            1 => Ok(CallbackAction::Subscribe),
            2 => Ok(CallbackAction::Unsubscribe),
            3 => Ok(CallbackAction::Renew),
            4 => Ok(CallbackAction::HubInfoRefresh),
            5 => Ok(CallbackAction::Verification),
            _ => Err("Unrecognized enum variant".into()),
        }
    }
}

impl<DB> ToSql<Integer, DB> for CallbackAction
where
    DB: Backend,
    i32: ToSql<Integer, DB>,
{
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, DB>) -> serialize::Result {
        match self {
            CallbackAction::HubNotification => 0.to_sql(out),
            CallbackAction::Subscribe => 1.to_sql(out),
            CallbackAction::Unsubscribe => 2.to_sql(out),
            CallbackAction::Renew => 3.to_sql(out),
            CallbackAction::HubInfoRefresh => 4.to_sql(out),
            CallbackAction::Verification => 5.to_sql(out),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Insertable)]
#[diesel(table_name = callbacks)]
pub struct NewCallback {
    pub channel_id: String,
    pub action: CallbackAction,
    pub received_at: i64,
    pub details: Option<String>,
    pub video_id: Option<String>,
}

impl NewCallback {
    pub fn new(channel_id: &str, action: CallbackAction, received_at: i64) -> Self {
        NewCallback {
            channel_id: channel_id.to_string(),
            action,
            received_at,
            details: None,
            video_id: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_video(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into());
        self
    }

    pub fn insert(&self, conn: &mut SqliteConnection) -> Result<Callback, diesel::result::Error> {
        use crate::schema::callbacks::dsl::*;
        diesel::insert_into(callbacks)
            .values(self)
            .returning(Callback::as_returning())
            .get_result(conn)
    }
}

/// How often the hub told us about a video before we stored it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotificationStats {
    pub count: i64,
    pub first_received_at: Option<i64>,
}

impl Callback {
    pub fn get_since(
        conn: &mut SqliteConnection,
        since: i64,
    ) -> Result<Vec<Callback>, diesel::result::Error> {
        use crate::schema::callbacks::dsl::{callbacks, id, received_at};
        callbacks
            .filter(received_at.ge(since))
            .order((received_at.desc(), id.desc()))
            .select(Callback::as_select())
            .load(conn)
    }

    pub fn get_for_channel(
        conn: &mut SqliteConnection,
        channel: &str,
        limit: i64,
    ) -> Result<Vec<Callback>, diesel::result::Error> {
        use crate::schema::callbacks::dsl::{callbacks, channel_id, id, received_at};
        callbacks
            .filter(channel_id.eq(channel))
            .order((received_at.desc(), id.desc()))
            .limit(limit)
            .select(Callback::as_select())
            .load(conn)
    }

    pub fn notification_stats(
        conn: &mut SqliteConnection,
        video: &str,
    ) -> Result<NotificationStats, diesel::result::Error> {
        use crate::schema::callbacks::dsl::{action, callbacks, received_at, video_id};
        let base = callbacks
            .filter(video_id.eq(video))
            .filter(action.eq(CallbackAction::HubNotification));
        let count = base.clone().count().get_result(conn)?;
        let first_received_at = base.select(min(received_at)).get_result::<Option<i64>>(conn)?;
        Ok(NotificationStats {
            count,
            first_received_at,
        })
    }
}
