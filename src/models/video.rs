use crate::schema::*;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, PartialEq)]
#[diesel(table_name = videos)]
pub struct Video {
    pub id: String,
    pub channel_id: String,
    pub published_at: Option<i64>,
    /// Cached metadata as JSON, filled lazily.
    pub infos: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Insertable)]
#[diesel(table_name = videos)]
pub struct NewVideo {
    pub id: String,
    pub channel_id: String,
    pub published_at: Option<i64>,
    pub infos: Option<String>,
    pub created_at: i64,
}

impl NewVideo {
    /// Insert unless a video with the same remote id is already stored.
    ///
    /// Returns whether a row was created.
    pub fn insert_if_not_present(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<bool, diesel::result::Error> {
        use crate::schema::videos::dsl::videos;

        if Video::has(conn, &self.id)? {
            return Ok(false);
        }
        // a concurrent ingest may win between the check and the insert
        match diesel::insert_or_ignore_into(videos)
            .values(self)
            .execute(conn)
        {
            Ok(inserted) => Ok(inserted == 1),
            Err(e) => {
                log::warn!("Error inserting video {}: {e:?}", self.id);
                Err(e)
            }
        }
    }
}

impl Video {
    pub fn has(conn: &mut SqliteConnection, video_id: &str) -> Result<bool, diesel::result::Error> {
        use crate::schema::videos::dsl::{id, videos};
        let count: i64 = videos.filter(id.eq(video_id)).count().get_result(conn)?;
        Ok(count > 0)
    }

    pub fn get_by_id(
        conn: &mut SqliteConnection,
        video_id: &str,
    ) -> Result<Option<Video>, diesel::result::Error> {
        use crate::schema::videos::dsl::videos;
        videos
            .find(video_id)
            .select(Video::as_select())
            .first(conn)
            .optional()
    }

    pub fn get_by_channel(
        conn: &mut SqliteConnection,
        channel: &str,
    ) -> Result<Vec<Video>, diesel::result::Error> {
        use crate::schema::videos::dsl::{channel_id, published_at, videos};
        videos
            .filter(channel_id.eq(channel))
            .order(published_at.desc())
            .select(Video::as_select())
            .load(conn)
    }

    pub fn count_for_channel(
        conn: &mut SqliteConnection,
        channel: &str,
    ) -> Result<i64, diesel::result::Error> {
        use crate::schema::videos::dsl::{channel_id, videos};
        videos.filter(channel_id.eq(channel)).count().get_result(conn)
    }

    pub fn infos_json(&self) -> Option<serde_json::Value> {
        self.infos
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}
